//! Security response headers.
//!
//! Applied to every response leaving the guard, allow or deny. Values come
//! from config; the permissions policy is intentionally restrictive and not
//! configurable.

use axum::http::{HeaderMap, HeaderValue};

use crate::config::schema::SecurityHeadersConfig;

const PERMISSIONS_POLICY: &str = "geolocation=(), microphone=(), camera=()";

/// Config-driven header set applied to outgoing responses.
pub struct SecurityHeaders {
    config: SecurityHeadersConfig,
}

impl SecurityHeaders {
    pub fn new(config: SecurityHeadersConfig) -> Self {
        Self { config }
    }

    /// Insert the configured headers. Existing values are overwritten: the
    /// guard's posture wins over whatever a handler set.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if !self.config.enabled {
            return;
        }

        if self.config.hsts {
            let value = format!(
                "max-age={}; includeSubDomains",
                self.config.hsts_max_age
            );
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert("strict-transport-security", value);
            }
        }

        headers.insert(
            "x-content-type-options",
            HeaderValue::from_static("nosniff"),
        );

        if let Ok(value) = HeaderValue::from_str(&self.config.x_frame_options) {
            headers.insert("x-frame-options", value);
        }

        if let Some(csp) = &self.config.csp {
            if let Ok(value) = HeaderValue::from_str(csp) {
                headers.insert("content-security-policy", value);
            }
        }

        if let Ok(value) = HeaderValue::from_str(&self.config.referrer_policy) {
            headers.insert("referrer-policy", value);
        }

        headers.insert(
            "permissions-policy",
            HeaderValue::from_static(PERMISSIONS_POLICY),
        );
    }
}
