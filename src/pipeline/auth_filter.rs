//! Second stage: whitelist bypass or bearer credential verification.

use std::sync::Arc;

use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::response;
use crate::observability::observer::{PipelineObserver, SecurityOutcome};
use crate::pipeline::{Caller, Chain, Exchange, GatewayFilter, PipelineState};
use crate::security::credentials::{bearer_token, CredentialError, CredentialVerifier};
use crate::security::pattern::PatternSet;

pub struct AuthFilter {
    whitelist: PatternSet,
    verifier: CredentialVerifier,
    observer: Arc<dyn PipelineObserver>,
}

impl AuthFilter {
    pub fn new(
        whitelist: PatternSet,
        verifier: CredentialVerifier,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            whitelist,
            verifier,
            observer,
        }
    }

    fn authenticate(&self, exchange: &Exchange) -> Result<Caller, CredentialError> {
        if self.whitelist.matches(exchange.path()) {
            tracing::debug!(path = %exchange.path(), "Path is whitelisted, skipping authentication");
            return Ok(Caller::Anonymous);
        }
        let token = bearer_token(exchange.request().headers())?;
        let identity = self.verifier.verify(token)?;
        Ok(Caller::Verified(identity))
    }

    fn notify(&self, exchange: &Exchange, outcome: SecurityOutcome) {
        if let Some(trace) = exchange.trace() {
            self.observer.on_security_outcome(trace, outcome);
        }
    }
}

impl GatewayFilter for AuthFilter {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn filter<'a>(&'a self, mut exchange: Exchange, chain: Chain<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match self.authenticate(&exchange) {
                Ok(caller) => {
                    let outcome = match &caller {
                        Caller::Anonymous => SecurityOutcome::WhitelistBypassed,
                        Caller::Verified(identity) => {
                            tracing::debug!(user_id = %identity.user_id, "Caller authenticated");
                            SecurityOutcome::Authenticated
                        }
                    };
                    self.notify(&exchange, outcome);
                    exchange.set_caller(caller);
                    chain.proceed(exchange).await
                }
                Err(e) => {
                    tracing::warn!(path = %exchange.path(), reason = %e, "Authentication failed");
                    self.notify(&exchange, SecurityOutcome::Unauthenticated);
                    exchange.reject(PipelineState::Rejected401, response::unauthorized(&e.to_string()))
                }
            }
        })
    }
}
