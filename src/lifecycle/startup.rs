//! Startup orchestration.
//!
//! # Responsibilities
//! - Load key material and decode the public key
//! - Build the upstream forwarder and the filter pipeline
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Nothing here runs per request

use std::sync::Arc;
use std::time::Duration;

use axum::http::uri::InvalidUri;
use thiserror::Error;

use crate::config::{read_public_key, ConfigError, GatewayConfig};
use crate::http::forward::UpstreamForwarder;
use crate::observability::observer::PipelineObserver;
use crate::pipeline::FilterPipeline;
use crate::security::credentials::{CredentialVerifier, KeyError, PublicKey};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot load public key: {0}")]
    Key(#[from] KeyError),

    #[error("invalid upstream address: {0}")]
    Upstream(#[from] InvalidUri),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("metrics setup failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Decode the configured public key into a verifier.
pub fn build_verifier(config: &GatewayConfig) -> Result<CredentialVerifier, StartupError> {
    let pem = read_public_key(&config.auth)?;
    let key = PublicKey::from_pem(&pem)?;
    tracing::info!(fingerprint = %key.fingerprint(), "Public key loaded");
    Ok(CredentialVerifier::new(key, config.auth.clock_skew_secs))
}

/// Assemble the pipeline that fronts the configured upstream.
pub fn build_pipeline(
    config: &GatewayConfig,
    observer: Arc<dyn PipelineObserver>,
) -> Result<FilterPipeline, StartupError> {
    let verifier = build_verifier(config)?;
    let forwarder = UpstreamForwarder::new(
        &config.upstream.address,
        Duration::from_secs(config.timeouts.connect_secs),
    )?;

    let pipeline = FilterPipeline::from_config(config, verifier, Arc::new(forwarder), observer);
    tracing::info!(
        stages = ?pipeline.stage_names(),
        upstream = %config.upstream.address,
        whitelist = config.auth.whitelist.len(),
        menu_permission = config.auth.enable_menu_permission,
        "Filter pipeline assembled"
    );
    Ok(pipeline)
}
