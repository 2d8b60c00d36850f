//! Third stage: menu permission check for verified callers.

use std::sync::Arc;

use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::response;
use crate::observability::observer::{PipelineObserver, SecurityOutcome};
use crate::pipeline::{Caller, Chain, Exchange, GatewayFilter, PipelineState};
use crate::security::access_control::{PermissionDecision, PermissionGate};
use crate::security::pattern::PatternSet;

pub struct PermissionFilter {
    enabled: bool,
    whitelist: PatternSet,
    gate: PermissionGate,
    observer: Arc<dyn PipelineObserver>,
}

impl PermissionFilter {
    pub fn new(
        enabled: bool,
        whitelist: PatternSet,
        gate: PermissionGate,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            enabled,
            whitelist,
            gate,
            observer,
        }
    }

    /// `None` when the check does not apply to this exchange.
    fn decide(&self, exchange: &Exchange) -> Option<PermissionDecision> {
        let identity = match exchange.caller() {
            Some(Caller::Verified(identity)) => identity,
            _ => return None,
        };
        if !self.enabled || self.whitelist.matches(exchange.path()) {
            return None;
        }
        Some(self.gate.check(exchange.path(), &identity.menus))
    }
}

impl GatewayFilter for PermissionFilter {
    fn name(&self) -> &'static str {
        "permission"
    }

    fn filter<'a>(&'a self, mut exchange: Exchange, chain: Chain<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let (state, outcome) = match self.decide(&exchange) {
                None => (PipelineState::PermissionSkipped, SecurityOutcome::PermissionSkipped),
                Some(PermissionDecision::Allow) => {
                    (PipelineState::PermissionGranted, SecurityOutcome::PermissionGranted)
                }
                Some(PermissionDecision::Deny(reason)) => {
                    tracing::warn!(path = %exchange.path(), reason = ?reason, "Permission denied");
                    if let Some(trace) = exchange.trace() {
                        self.observer
                            .on_security_outcome(trace, SecurityOutcome::PermissionDenied);
                    }
                    return exchange.reject(
                        PipelineState::Rejected403,
                        response::forbidden(reason.message()),
                    );
                }
            };

            if let Some(trace) = exchange.trace() {
                self.observer.on_security_outcome(trace, outcome);
            }
            exchange.advance(state);
            chain.proceed(exchange).await
        })
    }
}
