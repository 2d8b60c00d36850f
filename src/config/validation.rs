//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that a key source is configured
//! - Reject malformed path patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("auth: one of public_key or public_key_path must be set")]
    MissingPublicKey,

    #[error("auth: public_key and public_key_path are mutually exclusive")]
    AmbiguousPublicKey,

    #[error("{field}: pattern '{pattern}' must start with '/'")]
    RelativePattern { field: &'static str, pattern: String },
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "upstream.address", &config.upstream.address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue { field: "timeouts.request_secs" });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroValue { field: "timeouts.connect_secs" });
    }

    match (&config.auth.public_key, &config.auth.public_key_path) {
        (None, None) => errors.push(ValidationError::MissingPublicKey),
        (Some(_), Some(_)) => errors.push(ValidationError::AmbiguousPublicKey),
        _ => {}
    }

    check_patterns(&mut errors, "auth.whitelist", &config.auth.whitelist);
    check_patterns(
        &mut errors,
        "auth.menu_permission_whitelist",
        &config.auth.menu_permission_whitelist,
    );

    if config.rate_limit.enabled {
        if config.rate_limit.requests_per_second == 0 {
            errors.push(ValidationError::ZeroValue { field: "rate_limit.requests_per_second" });
        }
        if config.rate_limit.burst_size == 0 {
            errors.push(ValidationError::ZeroValue { field: "rate_limit.burst_size" });
        }
        if config.rate_limit.idle_timeout_secs == 0 {
            errors.push(ValidationError::ZeroValue { field: "rate_limit.idle_timeout_secs" });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_patterns(errors: &mut Vec<ValidationError>, field: &'static str, patterns: &[String]) {
    for pattern in patterns {
        if !pattern.starts_with('/') {
            errors.push(ValidationError::RelativePattern {
                field,
                pattern: pattern.clone(),
            });
        }
    }
}
