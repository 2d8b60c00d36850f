//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware layers)
//!     → pipeline (trace → auth → permission)
//!     → forward.rs (upstream request)
//!     → Send to client
//!
//! response.rs renders the gateway's own JSON rejections.
//! headers.rs names every header the gateway reads or writes.
//! ```

pub mod forward;
pub mod headers;
pub mod response;
pub mod server;

pub use forward::{ForwardError, Forwarder, UpstreamForwarder};
pub use server::{AppState, HttpServer};
