//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Mandatory integrations must be configured; optional ones may be absent
//! - Validate value ranges (intervals > 0, thresholds >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.startup_window_ms == 0 {
        errors.push(ValidationError::new("listener.startup_window_ms", "must be > 0"));
    }

    if config.storage.url.is_empty() {
        errors.push(ValidationError::new("storage.url", "is required"));
    }
    if config.storage.max_connections == 0 {
        errors.push(ValidationError::new("storage.max_connections", "must be > 0"));
    }
    if config.storage.min_connections > config.storage.max_connections {
        errors.push(ValidationError::new(
            "storage.min_connections",
            "must not exceed max_connections",
        ));
    }

    if config.lifecycle.grace_period_ms == 0 {
        errors.push(ValidationError::new("lifecycle.grace_period_ms", "must be > 0"));
    }

    if config.health.enabled {
        if config.health.interval_ms == 0 {
            errors.push(ValidationError::new("health.interval_ms", "must be > 0"));
        }
        if config.health.failure_threshold == 0 {
            errors.push(ValidationError::new("health.failure_threshold", "must be >= 1"));
        }
    }

    if config.rate_limit.enabled {
        if config.rate_limit.requests_per_second == 0 {
            errors.push(ValidationError::new("rate_limit.requests_per_second", "must be > 0"));
        }
        if config.rate_limit.cleanup_interval_secs == 0 {
            errors.push(ValidationError::new("rate_limit.cleanup_interval_secs", "must be > 0"));
        }
    }

    // Payments is mandatory: an unconfigured provider is a broken deployment.
    if config.payments.api_url.is_empty() {
        errors.push(ValidationError::new("payments.api_url", "is required"));
    }
    if config.payments.api_key.is_empty() {
        errors.push(ValidationError::new("payments.api_key", "is required"));
    }

    // Messaging is optional; only check it when a token is present.
    if config.messaging.is_configured() {
        if config.messaging.api_url.is_empty() {
            errors.push(ValidationError::new(
                "messaging.api_url",
                "is required when bot_token is set",
            ));
        }
        if config.messaging.webhook_url.is_some() && config.messaging.webhook_attempts == 0 {
            errors.push(ValidationError::new("messaging.webhook_attempts", "must be >= 1"));
        }
    }

    if config.observability.pool_stats_interval_secs == 0 {
        errors.push(ValidationError::new(
            "observability.pool_stats_interval_secs",
            "must be > 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
