//! Audit record construction and fan-out.

use std::net::IpAddr;
use std::sync::Arc;

use super::crypto::{anonymize_ip, IntegritySigner, PiiCipher};
use super::sinks::{AuditCallback, AuditSink, CallbackSink, ConsoleSink, RotatingFileSink, WebhookSink};
use super::{AuditRecord, Level, RequestDescriptor, ResponseDescriptor};
use crate::config::schema::{GuardConfig, LogOutput};
use crate::events::EventSender;
use crate::observability::metrics;

/// Builds one record per completed request and hands it to every sink.
///
/// Transformation order is fixed: assemble → anonymize IP → encrypt PII →
/// attach integrity hash. Sinks receive the finished record; none of them
/// can affect the response path.
pub struct AuditEmitter {
    enabled: bool,
    anonymize: bool,
    pii_fields: Vec<String>,
    cipher: Option<PiiCipher>,
    signer: Option<IntegritySigner>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditEmitter {
    /// Assemble the emitter from config. Bad keys degrade the corresponding
    /// feature with a logged warning; they never fail construction.
    pub fn from_config(
        config: &GuardConfig,
        events: EventSender,
        callback: Option<AuditCallback>,
    ) -> Self {
        let logging = &config.logging;

        let cipher = if logging.encrypt_pii {
            match config.encryption_key.as_deref() {
                Some(key) => match PiiCipher::from_base64_key(key) {
                    Ok(cipher) => Some(cipher),
                    Err(e) => {
                        tracing::warn!(error = %e, "Invalid encryption key, PII encryption disabled");
                        None
                    }
                },
                None => {
                    tracing::warn!("encrypt_pii is on but no encryption_key configured");
                    None
                }
            }
        } else {
            None
        };

        let signer = config
            .integrity_key
            .as_deref()
            .map(IntegritySigner::new);

        let mut sinks: Vec<Arc<dyn AuditSink>> = Vec::new();
        match logging.output {
            LogOutput::Console => sinks.push(Arc::new(ConsoleSink)),
            LogOutput::File => sinks.push(Arc::new(RotatingFileSink::new(
                &logging.file_path,
                logging.max_file_size,
                logging.max_files,
            ))),
            LogOutput::Both => {
                sinks.push(Arc::new(ConsoleSink));
                sinks.push(Arc::new(RotatingFileSink::new(
                    &logging.file_path,
                    logging.max_file_size,
                    logging.max_files,
                )));
            }
        }
        if let Some(callback) = callback {
            sinks.push(Arc::new(CallbackSink::new(callback)));
        }
        if !config.webhooks.is_empty() {
            sinks.push(Arc::new(WebhookSink::new(events)));
        }

        Self {
            enabled: logging.enabled,
            anonymize: logging.anonymize_ip,
            pii_fields: logging.pii_fields.clone(),
            cipher,
            signer,
            sinks,
        }
    }

    /// Emit one record for a completed request/response cycle.
    pub fn emit(
        &self,
        method: &str,
        path: &str,
        client_ip: IpAddr,
        status: u16,
        duration_ms: u64,
        user_id: Option<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) {
        if !self.enabled {
            return;
        }

        let ip = if self.anonymize {
            anonymize_ip(client_ip)
        } else {
            client_ip
        };

        let user_id = user_id.map(|id| match &self.cipher {
            Some(cipher) => cipher.encrypt(&id),
            None => id,
        });

        let metadata = metadata.map(|mut map| {
            if let Some(cipher) = &self.cipher {
                for field in &self.pii_fields {
                    if let Some(value) = map.get_mut(field) {
                        if let Some(plain) = value.as_str() {
                            *value = serde_json::Value::String(cipher.encrypt(plain));
                        }
                    }
                }
            }
            map
        });

        let mut record = AuditRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: Level::from_status(status),
            request: RequestDescriptor {
                method: method.to_string(),
                path: path.to_string(),
                ip: ip.to_string(),
            },
            response: ResponseDescriptor {
                status,
                duration_ms,
            },
            user_id,
            metadata,
            integrity_hash: None,
        };

        if let Some(signer) = &self.signer {
            record.integrity_hash = Some(signer.sign(&record));
        }

        let serialized = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Audit record failed to serialize");
                return;
            }
        };

        metrics::record_audit_record(record.level.as_str());
        for sink in &self.sinks {
            sink.write(&record, &serialized);
        }
    }
}
