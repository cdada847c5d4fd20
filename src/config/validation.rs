//! Configuration validation.
//!
//! Semantic checks on top of what serde already guarantees syntactically.
//! All errors are collected and returned together, not just the first.

use base64::Engine;

use crate::config::schema::GuardConfig;

/// One semantic problem found in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(key) = &config.encryption_key {
        match base64::engine::general_purpose::STANDARD.decode(key) {
            Ok(bytes) if bytes.len() == 32 => {}
            Ok(bytes) => errors.push(ValidationError {
                field: "encryption_key".to_string(),
                message: format!("expected 32 bytes after base64 decode, got {}", bytes.len()),
            }),
            Err(_) => errors.push(ValidationError {
                field: "encryption_key".to_string(),
                message: "not valid base64".to_string(),
            }),
        }
    }

    let rl = &config.active_defense.rate_limit;
    if rl.enabled && rl.window_ms == 0 {
        errors.push(ValidationError {
            field: "active_defense.rate_limit.window_ms".to_string(),
            message: "must be greater than 0".to_string(),
        });
    }
    if rl.enabled && rl.max == 0 {
        errors.push(ValidationError {
            field: "active_defense.rate_limit.max".to_string(),
            message: "must be greater than 0".to_string(),
        });
    }

    for (i, ip) in config.active_defense.blocked_ips.iter().enumerate() {
        if ip.parse::<std::net::IpAddr>().is_err() {
            errors.push(ValidationError {
                field: format!("active_defense.blocked_ips[{}]", i),
                message: format!("'{}' is not a valid IP address", ip),
            });
        }
    }

    for list in [
        &config.active_defense.blocked_countries,
        &config.active_defense.allowed_countries,
    ] {
        for code in list {
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                errors.push(ValidationError {
                    field: "active_defense country lists".to_string(),
                    message: format!("'{}' is not a two-letter country code", code),
                });
            }
        }
    }

    for (i, hook) in config.webhooks.iter().enumerate() {
        if url::Url::parse(&hook.url).is_err() {
            errors.push(ValidationError {
                field: format!("webhooks[{}].url", i),
                message: format!("'{}' is not a valid URL", hook.url),
            });
        }
    }

    if config.logging.enabled
        && config.logging.output != crate::config::schema::LogOutput::Console
        && config.logging.file_path.is_empty()
    {
        errors.push(ValidationError {
            field: "logging.file_path".to_string(),
            message: "required when file output is selected".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
