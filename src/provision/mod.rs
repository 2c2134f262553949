//! Provisioning (bootstrap) subsystem.
//!
//! # Data Flow
//! ```text
//! things/channels events (stream)
//!     → events::dispatcher
//!     → service.rs ConfigService handlers
//!     → store.rs (bootstrap configs kept in sync)
//!
//! operators / devices
//!     → api.rs (HTTP, bearer key) → store.rs
//! ```
//!
//! # Design Decisions
//! - Handlers are idempotent: events are delivered at least once
//! - Events about unknown things or channels are no-ops, not errors

pub mod api;
pub mod service;
pub mod store;

pub use service::{Channel, ConfigService, ServiceError};
pub use store::{BootstrapConfig, ConfigState, ConfigStore};
