//! Audit record sinks.
//!
//! Every sink receives the finished, already-encrypted/signed record. Sinks
//! are independent: one failing never stops the others.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::{AuditRecord, Level};
use crate::events::{EventSender, Outbound};

/// User-supplied callback receiving each finished record.
pub type AuditCallback = Arc<dyn Fn(&AuditRecord) + Send + Sync>;

/// A destination for serialized audit records.
pub trait AuditSink: Send + Sync {
    fn write(&self, record: &AuditRecord, serialized: &str);
}

/// stdout for INFO, stderr for WARN/ERROR.
pub struct ConsoleSink;

impl AuditSink for ConsoleSink {
    fn write(&self, record: &AuditRecord, serialized: &str) {
        match record.level {
            Level::Info => println!("{}", serialized),
            Level::Warn | Level::Error => eprintln!("{}", serialized),
        }
    }
}

/// Size-rotated file sink with a bounded number of retained rotations.
///
/// `app.log` rotates to `app.log.1`, shifting older rotations up to
/// `app.log.{max_files}`; the oldest is deleted. Write errors fall back to
/// the console so records are never silently lost.
pub struct RotatingFileSink {
    path: PathBuf,
    max_size: u64,
    max_files: usize,
    state: Mutex<Option<FileState>>,
}

struct FileState {
    file: File,
    size: u64,
}

impl RotatingFileSink {
    pub fn new(path: impl Into<PathBuf>, max_size: u64, max_files: usize) -> Self {
        Self {
            path: path.into(),
            max_size,
            max_files: max_files.max(1),
            state: Mutex::new(None),
        }
    }

    fn open(&self) -> std::io::Result<FileState> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let size = file.metadata()?.len();
        Ok(FileState { file, size })
    }

    fn rotate(&self) -> std::io::Result<()> {
        // shift app.log.{n} → app.log.{n+1}, dropping the oldest
        let rotated = |n: usize| PathBuf::from(format!("{}.{}", self.path.display(), n));
        let oldest = rotated(self.max_files);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_files).rev() {
            let from = rotated(n);
            if from.exists() {
                std::fs::rename(&from, rotated(n + 1))?;
            }
        }
        std::fs::rename(&self.path, rotated(1))
    }
}

impl AuditSink for RotatingFileSink {
    fn write(&self, record: &AuditRecord, serialized: &str) {
        let mut guard = self.state.lock().expect("file sink mutex poisoned");

        let result = (|| -> std::io::Result<()> {
            if guard.is_none() {
                *guard = Some(self.open()?);
            }
            let line_len = serialized.len() as u64 + 1;
            // an empty file always takes the line, even an oversized one
            let needs_rotation = guard
                .as_ref()
                .map(|s| s.size > 0 && s.size + line_len > self.max_size)
                .unwrap_or(false);
            if needs_rotation {
                *guard = None;
                self.rotate()?;
                *guard = Some(self.open()?);
            }
            let state = guard.as_mut().expect("opened above");
            writeln!(state.file, "{}", serialized)?;
            state.size += line_len;
            Ok(())
        })();

        if let Err(e) = result {
            // drop the handle so the next write retries a fresh open
            *guard = None;
            tracing::error!(path = ?self.path, error = %e, "Audit file write failed, falling back to console");
            ConsoleSink.write(record, serialized);
        }
    }
}

/// Invokes a user-supplied handler with each record.
pub struct CallbackSink {
    callback: AuditCallback,
}

impl CallbackSink {
    pub fn new(callback: AuditCallback) -> Self {
        Self { callback }
    }
}

impl AuditSink for CallbackSink {
    fn write(&self, record: &AuditRecord, _serialized: &str) {
        (self.callback)(record);
    }
}

/// Ships records through the outbound event queue to webhook targets.
pub struct WebhookSink {
    events: EventSender,
}

impl WebhookSink {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

impl AuditSink for WebhookSink {
    fn write(&self, _record: &AuditRecord, serialized: &str) {
        match serde_json::from_str(serialized) {
            Ok(value) => self.events.send(Outbound::AuditRecord(value)),
            Err(e) => tracing::error!(error = %e, "Audit record did not re-parse for webhook shipping"),
        }
    }
}
