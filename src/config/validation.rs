//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, margins sane)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: SidecarConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::SidecarConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every failure.
pub fn validate_config(config: &SidecarConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.module.module_id.is_empty() {
        errors.push(ValidationError {
            field: "module.module_id".into(),
            message: "must not be empty".into(),
        });
    }

    if config.token_cache.min_refresh_margin_secs < 30 {
        errors.push(ValidationError {
            field: "token_cache.min_refresh_margin_secs".into(),
            message: "must be at least 30".into(),
        });
    }

    if config.token_cache.introspection_default_ttl_secs == 0 {
        errors.push(ValidationError {
            field: "token_cache.introspection_default_ttl_secs".into(),
            message: "must be greater than zero".into(),
        });
    }

    for (field, value) in [
        ("timeouts.identity_provider_secs", config.timeouts.identity_provider_secs),
        ("timeouts.discovery_secs", config.timeouts.discovery_secs),
        ("timeouts.forward_secs", config.timeouts.forward_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError {
                field: field.into(),
                message: "must be greater than zero".into(),
            });
        }
    }

    if config.retries.enabled && config.retries.max_attempts == 0 {
        errors.push(ValidationError {
            field: "retries.max_attempts".into(),
            message: "must be at least 1 when retries are enabled".into(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
