//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On reload signal:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → guard rebuilt and atomically swapped
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - A bad config degrades to a disabled guard, never a crash

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::GuardConfig;
pub use schema::LoggingConfig;
pub use schema::RateLimitConfig;
pub use schema::SessionGuardConfig;
