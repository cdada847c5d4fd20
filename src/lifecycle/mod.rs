//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build guard → Start background tasks → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast to sweeper/refresher/dispatcher → Drain → Exit
//! ```
//!
//! # Design Decisions
//! - Every background task subscribes to the same broadcast channel
//! - A rebuilt guard (config reload) owns its own shutdown scope, so old
//!   tasks stop when the new guard takes over

pub mod shutdown;

pub use shutdown::Shutdown;
