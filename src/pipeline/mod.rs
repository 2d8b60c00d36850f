//! Edge filter pipeline.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → tracing_filter.rs     Received → Traced
//!     → auth_filter.rs        → WhitelistBypassed | Authenticated | Rejected401
//!     → permission_filter.rs  → PermissionSkipped | PermissionGranted | Rejected403
//!     → Forwarder             → Forwarded
//! ```
//!
//! # Design Decisions
//! - Stage order is a static list assembled once in `FilterPipeline::from_config`
//! - Each stage receives the remaining chain and decides whether to continue;
//!   a stage that returns without calling `proceed` terminates the request
//! - Identity headers are written only at forward time, so a rejected
//!   request never carries partial identity
//! - Dot segments are resolved on entry; every stage and the upstream see
//!   the same canonical path
//! - The visited states travel back on the response as a `StateTrail`

pub mod auth_filter;
pub mod permission_filter;
pub mod tracing_filter;

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Uri};
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::config::GatewayConfig;
use crate::http::forward::Forwarder;
use crate::http::headers;
use crate::http::response;
use crate::observability::observer::PipelineObserver;
use crate::observability::tracing::{TraceContextResolver, TraceInfo};
use crate::security::access_control::PermissionGate;
use crate::security::claims::Identity;
use crate::security::credentials::CredentialVerifier;
use crate::security::pattern::{canonical_path, AntPathMatcher, PathMatcher, PatternSet};

pub use auth_filter::AuthFilter;
pub use permission_filter::PermissionFilter;
pub use tracing_filter::TracingFilter;

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Received,
    Traced,
    WhitelistBypassed,
    Authenticated,
    PermissionSkipped,
    PermissionGranted,
    Forwarded,
    Rejected401,
    Rejected403,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Forwarded | PipelineState::Rejected401 | PipelineState::Rejected403
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// States visited by one request, in order. Attached to the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrail(pub Vec<PipelineState>);

impl StateTrail {
    pub fn last(&self) -> Option<PipelineState> {
        self.0.last().copied()
    }
}

/// Who the caller turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Whitelisted path: forwarded with empty identity headers.
    Anonymous,
    Verified(Identity),
}

/// A request travelling through the pipeline plus what stages learned.
#[derive(Debug)]
pub struct Exchange {
    request: Request<Body>,
    path: String,
    trail: Vec<PipelineState>,
    trace: Option<TraceInfo>,
    caller: Option<Caller>,
}

impl Exchange {
    pub fn new(mut request: Request<Body>) -> Self {
        let path = canonical_path(request.uri().path());
        if path != request.uri().path() {
            tracing::debug!(raw = %request.uri().path(), canonical = %path, "Request path canonicalized");
            rewrite_path(&mut request, &path);
        }
        Self {
            request,
            path,
            trail: vec![PipelineState::Received],
            trace: None,
            caller: None,
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    /// Canonical request path, as matched by whitelists and menus.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> PipelineState {
        self.trail.last().copied().unwrap_or(PipelineState::Received)
    }

    pub fn trace(&self) -> Option<&TraceInfo> {
        self.trace.as_ref()
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    pub fn advance(&mut self, next: PipelineState) {
        tracing::trace!(from = %self.state(), to = %next, "Pipeline transition");
        self.trail.push(next);
    }

    pub fn set_trace(&mut self, trace: TraceInfo) {
        self.trace = Some(trace);
        self.advance(PipelineState::Traced);
    }

    pub fn set_caller(&mut self, caller: Caller) {
        let next = match caller {
            Caller::Anonymous => PipelineState::WhitelistBypassed,
            Caller::Verified(_) => PipelineState::Authenticated,
        };
        self.caller = Some(caller);
        self.advance(next);
    }

    /// End the request here with a gateway-produced response.
    pub fn reject(mut self, state: PipelineState, mut response: Response) -> Response {
        self.advance(state);
        response.extensions_mut().insert(StateTrail(self.trail));
        response
    }

    /// Write identity headers, replacing anything the client sent.
    fn attach_identity(&mut self) {
        let map = self.request.headers_mut();
        match &self.caller {
            None => {
                for name in headers::IDENTITY_HEADERS {
                    map.remove(name);
                }
            }
            Some(Caller::Anonymous) => {
                for name in headers::IDENTITY_HEADERS {
                    map.insert(name, HeaderValue::from_static(""));
                }
            }
            Some(Caller::Verified(identity)) => {
                let roles = identity.joined_roles();
                let values = [
                    identity.user_id.as_str(),
                    identity.username.as_str(),
                    roles.as_str(),
                    identity.menus_json.as_str(),
                ];
                for (name, value) in headers::IDENTITY_HEADERS.into_iter().zip(values) {
                    insert_lossy(map, name, value);
                }
            }
        }
    }
}

fn rewrite_path(request: &mut Request<Body>, path: &str) {
    let path_and_query = match request.uri().query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };
    let mut parts = request.uri().clone().into_parts();
    let rewritten = PathAndQuery::try_from(path_and_query)
        .map_err(axum::http::Error::from)
        .and_then(|pq| {
            parts.path_and_query = Some(pq);
            Uri::from_parts(parts).map_err(axum::http::Error::from)
        });
    match rewritten {
        Ok(uri) => *request.uri_mut() = uri,
        Err(e) => tracing::warn!(error = %e, "Cannot rewrite canonical path, forwarding as received"),
    }
}

fn insert_lossy(map: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_bytes(value.as_bytes()) {
        Ok(value) => {
            map.insert(name, value);
        }
        Err(_) => {
            tracing::warn!(header = %name, "Identity value is not a valid header, sending empty");
            map.insert(name, HeaderValue::from_static(""));
        }
    }
}

/// One pipeline stage.
pub trait GatewayFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handle the exchange. Call `chain.proceed` to continue, or return a
    /// response to stop.
    fn filter<'a>(&'a self, exchange: Exchange, chain: Chain<'a>) -> BoxFuture<'a, Response>;
}

/// The stages still to run, then the forwarder.
pub struct Chain<'a> {
    filters: &'a [Arc<dyn GatewayFilter>],
    forwarder: &'a dyn Forwarder,
}

impl<'a> Chain<'a> {
    pub fn proceed(self, exchange: Exchange) -> BoxFuture<'a, Response> {
        match self.filters.split_first() {
            Some((first, rest)) => first.filter(
                exchange,
                Chain {
                    filters: rest,
                    forwarder: self.forwarder,
                },
            ),
            None => Box::pin(forward(exchange, self.forwarder)),
        }
    }
}

async fn forward(mut exchange: Exchange, forwarder: &dyn Forwarder) -> Response {
    exchange.attach_identity();
    exchange.advance(PipelineState::Forwarded);
    let Exchange { request, trail, .. } = exchange;

    let mut response = match forwarder.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Upstream error");
            response::bad_gateway("Upstream request failed")
        }
    };
    response.extensions_mut().insert(StateTrail(trail));
    response
}

/// Ordered stages in front of a forwarder.
pub struct FilterPipeline {
    filters: Vec<Arc<dyn GatewayFilter>>,
    forwarder: Arc<dyn Forwarder>,
}

impl FilterPipeline {
    pub fn new(filters: Vec<Arc<dyn GatewayFilter>>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self { filters, forwarder }
    }

    /// The gateway's stage list: tracing, authentication, permission.
    pub fn from_config(
        config: &GatewayConfig,
        verifier: CredentialVerifier,
        forwarder: Arc<dyn Forwarder>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        let matcher: Arc<dyn PathMatcher> = Arc::new(AntPathMatcher::new());
        let auth = &config.auth;

        let filters: Vec<Arc<dyn GatewayFilter>> = vec![
            Arc::new(TracingFilter::new(TraceContextResolver::new(), observer.clone())),
            Arc::new(AuthFilter::new(
                PatternSet::new(auth.whitelist.clone(), matcher.clone()),
                verifier,
                observer.clone(),
            )),
            Arc::new(PermissionFilter::new(
                auth.enable_menu_permission,
                PatternSet::new(auth.menu_permission_whitelist.clone(), matcher.clone()),
                PermissionGate::new(matcher, auth.menu_prefix_match),
                observer,
            )),
        ];
        Self::new(filters, forwarder)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub async fn handle(&self, request: Request<Body>) -> Response {
        let chain = Chain {
            filters: &self.filters,
            forwarder: self.forwarder.as_ref(),
        };
        chain.proceed(Exchange::new(request)).await
    }
}
