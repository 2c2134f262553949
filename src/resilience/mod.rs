//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Stream read returns an error or nothing:
//!     → backoff.rs (exponential delay with jitter, capped)
//!     → consumer waits, racing the delay against a stop request
//!     → next read resets the attempt counter once entries arrive
//! ```
//!
//! # Design Decisions
//! - Never hot-loop against an unavailable log
//! - Jittered backoff prevents synchronized retries across consumers in one group

pub mod backoff;

pub use backoff::{calculate_backoff, BackoffPolicy};
