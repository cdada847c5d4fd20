//! Request-pipeline guard for axum services.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                      GATEWALL                        │
//!                 │                                                      │
//!  Client Request │  ┌──────────┐   ┌──────────┐   ┌──────────────────┐  │
//!  ───────────────┼─▶│   http   │──▶│ defense  │──▶│   continuation   │  │
//!                 │  │middleware│   │ pipeline │   │ (app handlers)   │  │
//!                 │  └──────────┘   └────┬─────┘   └────────┬─────────┘  │
//!                 │                      │ deny             │            │
//!                 │                      ▼                  ▼            │
//!  Client Response│  ┌──────────┐   ┌──────────┐   ┌──────────────────┐  │
//!  ◀──────────────┼──│ security │◀──│   deny   │   │  audit emitter   │  │
//!                 │  │ headers  │   │ response │   │ (per response)   │  │
//!                 │  └──────────┘   └──────────┘   └──────────────────┘  │
//!                 │                                                      │
//!                 │  ┌────────────────────────────────────────────────┐  │
//!                 │  │             Cross-Cutting Concerns             │  │
//!                 │  │  ┌────────┐ ┌───────┐ ┌──────────┐ ┌────────┐  │  │
//!                 │  │  │ config │ │ store │ │ events   │ │observa-│  │  │
//!                 │  │  │        │ │ sweep │ │dispatcher│ │ bility │  │  │
//!                 │  │  └────────┘ └───────┘ └──────────┘ └────────┘  │  │
//!                 │  └────────────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! The stage order is fixed: static IP block → Tor exit block → geo block →
//! rate limit → session guard. The first deny short-circuits the rest and
//! the downstream handler; every request gets exactly one audit record.

// Core subsystems
pub mod config;
pub mod defense;
pub mod guard;
pub mod http;
pub mod store;

// Audit and notification
pub mod audit;
pub mod events;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::GuardConfig;
pub use guard::{Guard, GuardHandle};
pub use http::{protect, AuditIdentity, GuardServer};
pub use lifecycle::Shutdown;
