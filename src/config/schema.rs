//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the request-pipeline guard.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Master switch. When false the guard passes every request through.
    pub enabled: bool,

    /// Take the client IP from the first `x-forwarded-for` entry instead of
    /// the socket address. Only enable behind a trusted proxy.
    pub trust_proxy_header: bool,

    /// Base64-encoded 32-byte key for PII encryption in audit records.
    pub encryption_key: Option<String>,

    /// Key for the HMAC integrity hash attached to audit records.
    pub integrity_key: Option<String>,

    /// Audit logging settings.
    pub logging: LoggingConfig,

    /// Admission stages (block lists, Tor, geo, rate limit, session guard).
    pub active_defense: ActiveDefenseConfig,

    /// Security response headers.
    pub security_headers: SecurityHeadersConfig,

    /// Webhook sinks receiving security events and audit records.
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,

    /// Listener settings for the gateway binary.
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_proxy_header: false,
            encryption_key: None,
            integrity_key: None,
            logging: LoggingConfig::default(),
            active_defense: ActiveDefenseConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
            webhooks: Vec::new(),
            listener: ListenerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl GuardConfig {
    /// A config with every check switched off. Used as the degraded fallback
    /// when a config file fails to load.
    pub fn passthrough() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable audit record emission.
    pub enabled: bool,

    /// Mask the trailing component of client addresses in audit records.
    pub anonymize_ip: bool,

    /// Encrypt the user identifier and `pii_fields` metadata entries.
    pub encrypt_pii: bool,

    /// Metadata field names treated as PII when `encrypt_pii` is on.
    pub pii_fields: Vec<String>,

    /// Where finished records go.
    pub output: LogOutput,

    /// Path for the rotating file sink.
    pub file_path: String,

    /// Size threshold (bytes) triggering file rotation.
    pub max_file_size: u64,

    /// Number of rotated files retained.
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anonymize_ip: false,
            encrypt_pii: false,
            pii_fields: Vec::new(),
            output: LogOutput::Console,
            file_path: "gatewall-audit.log".to_string(),
            max_file_size: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// stdout for INFO, stderr for WARN/ERROR.
    #[default]
    Console,
    /// Rotating file only.
    File,
    /// Console and file.
    Both,
}

/// Admission stage configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ActiveDefenseConfig {
    /// Rate limiting settings.
    pub rate_limit: RateLimitConfig,

    /// Deny requests from known Tor exit nodes.
    pub block_tor: bool,

    /// Static IP denylist.
    pub blocked_ips: Vec<String>,

    /// ISO country codes to deny.
    pub blocked_countries: Vec<String>,

    /// ISO country codes to allow; when non-empty, everything else is denied.
    pub allowed_countries: Vec<String>,

    /// Path to a MaxMind-format country database.
    pub geoip_database_path: Option<String>,

    /// Tor exit-list refresh settings.
    pub tor: TorConfig,

    /// Session fingerprint validation settings.
    pub session_guard: SessionGuardConfig,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Fixed window duration in milliseconds.
    pub window_ms: u64,

    /// Maximum hits per key per window.
    pub max: u64,

    /// Interval between expired-record sweeps of the in-memory store, seconds.
    pub sweep_interval_secs: u64,

    /// Redis URL for the distributed store. Requires the `redis-store`
    /// feature; when absent the in-memory store is used.
    pub redis_url: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max: 100,
            sweep_interval_secs: 60,
            redis_url: None,
        }
    }
}

/// Tor exit-list refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TorConfig {
    /// Endpoint serving the bulk exit-node list, one address per line.
    pub exit_list_url: String,

    /// Refresh interval in seconds.
    pub refresh_interval_secs: u64,

    /// Fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            exit_list_url: "https://check.torproject.org/torbulkexitlist".to_string(),
            refresh_interval_secs: 6 * 3600,
            fetch_timeout_secs: 10,
        }
    }
}

/// Session fingerprint validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionGuardConfig {
    /// Enable session fingerprint validation.
    pub enabled: bool,

    /// Treat an IP change within a bound session as a violation.
    pub enforce_ip_binding: bool,

    /// Treat a User-Agent change within a bound session as a violation.
    pub enforce_ua_binding: bool,

    /// Path prefixes that bypass the session guard entirely.
    pub exclude_paths: Vec<String>,
}

impl Default for SessionGuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enforce_ip_binding: true,
            enforce_ua_binding: true,
            exclude_paths: Vec::new(),
        }
    }
}

/// Security response header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    /// Enable the header stage.
    pub enabled: bool,

    /// Emit Strict-Transport-Security.
    pub hsts: bool,

    /// HSTS max-age in seconds.
    pub hsts_max_age: u64,

    /// Content-Security-Policy value, emitted only when set.
    pub csp: Option<String>,

    /// X-Frame-Options value.
    pub x_frame_options: String,

    /// Referrer-Policy value.
    pub referrer_policy: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hsts: true,
            hsts_max_age: 31_536_000,
            csp: None,
            x_frame_options: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
        }
    }
}

/// One webhook sink.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Target URL receiving serialized events as JSON POSTs.
    pub url: String,

    /// Per-delivery timeout in milliseconds.
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_webhook_timeout_ms() -> u64 {
    5_000
}

/// Listener configuration for the gateway binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
