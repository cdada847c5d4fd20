//! HTTP integration subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, peer addresses, graceful shutdown)
//!     → middleware.rs (admission pipeline, short-circuit on deny)
//!     → [application handlers]
//!     → middleware.rs (quota + security headers, audit emission)
//!     → Send to client
//! ```

pub mod middleware;
pub mod response;
pub mod server;

pub use middleware::{guard_middleware, AuditIdentity};
pub use server::{protect, GuardServer};
