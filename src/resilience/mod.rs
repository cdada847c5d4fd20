//! Resilience helpers for outbound deliveries.
//!
//! # Design Decisions
//! - Every external call has a deadline (`tokio::time::timeout`)
//! - Jittered backoff prevents thundering herd on webhook retries

pub mod backoff;
