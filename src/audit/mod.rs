//! Audit logging subsystem.
//!
//! # Data Flow
//! ```text
//! response completed
//!     → emitter.rs: assemble record
//!     → crypto.rs: anonymize IP → encrypt PII → attach integrity HMAC
//!     → serialize once (serde_json)
//!     → sinks.rs fan-out: console / rotating file / callback / webhooks
//! ```
//!
//! # Design Decisions
//! - Exactly one record per completed request, allow or deny
//! - The record is not retained after emission; sinks own durability
//! - The schema is additive-only: downstream consumers rely on it

pub mod crypto;
pub mod emitter;
pub mod sinks;

use serde::{Deserialize, Serialize};

pub use emitter::AuditEmitter;
pub use sinks::AuditCallback;

/// Severity derived from the response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    /// 5xx → ERROR, 4xx → WARN, everything else → INFO.
    pub fn from_status(status: u16) -> Self {
        match status {
            500.. => Level::Error,
            400..=499 => Level::Warn,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Inbound side of an audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub path: String,
    /// Client address, possibly anonymized.
    pub ip: String,
}

/// Outbound side of an audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub duration_ms: u64,
}

/// One structured record per completed request/response cycle.
///
/// Field order matters: the integrity hash is computed over the serialized
/// record with `integrity_hash` absent, so reordering fields invalidates
/// previously signed records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// RFC3339 timestamp of record construction.
    pub timestamp: String,
    pub level: Level,
    pub request: RequestDescriptor,
    pub response: ResponseDescriptor,
    /// Possibly an opaque `enc:` token when PII encryption is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// HMAC-SHA256 hex digest over the rest of the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_status() {
        assert_eq!(Level::from_status(200), Level::Info);
        assert_eq!(Level::from_status(304), Level::Info);
        assert_eq!(Level::from_status(403), Level::Warn);
        assert_eq!(Level::from_status(429), Level::Warn);
        assert_eq!(Level::from_status(500), Level::Error);
        assert_eq!(Level::from_status(503), Level::Error);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let record = AuditRecord {
            id: "00000000-0000-0000-0000-000000000000".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            level: Level::Info,
            request: RequestDescriptor {
                method: "GET".to_string(),
                path: "/".to_string(),
                ip: "10.0.0.1".to_string(),
            },
            response: ResponseDescriptor {
                status: 200,
                duration_ms: 3,
            },
            user_id: None,
            metadata: None,
            integrity_hash: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("user_id"));
        assert!(!json.contains("integrity_hash"));
        assert!(json.contains("\"level\":\"INFO\""));
    }
}
