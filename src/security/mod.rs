//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client admission, optional)
//!     → pattern.rs (whitelist match)
//!     → credentials.rs (bearer token → Identity via claims.rs)
//!     → access_control.rs (menus → Allow / Deny)
//! ```
//!
//! # Design Decisions
//! - Fail closed: any verification failure rejects the request
//! - Key material and pattern sets are immutable after startup
//! - No trust in client-supplied identity headers

pub mod access_control;
pub mod claims;
pub mod credentials;
pub mod pattern;
pub mod rate_limit;

pub use access_control::{DenyReason, PermissionDecision, PermissionGate};
pub use claims::{Identity, Menu, RoleClaim};
pub use credentials::{bearer_token, CredentialError, CredentialVerifier, KeyError, PublicKey};
pub use pattern::{canonical_path, AntPathMatcher, PathMatcher, PatternSet};
