//! Event-driven configuration synchronization.
//!
//! # Data Flow
//! ```text
//! event log ──▶ StreamConsumer ──▶ EventDispatcher ──▶ ConfigService
//!     ▲              │ (batch pull)    (decode + route)      │
//!     └──── ack ─────┴───────────────────────────────────────┘
//! ```
//!
//! # Submodules
//! - `entry`: ordered entry IDs and raw log entries
//! - `event`: domain events and payload decoding
//! - `dispatcher`: routes decoded events to service handlers
//! - `log`: consumer-group log abstraction
//! - `redis`: Redis Streams backend
//! - `memory`: in-process backend for tests and local runs
//! - `consumer`: the stoppable subscription loop
//!
//! Delivery is at-least-once. An entry is acknowledged only after its handler
//! succeeds, so handlers must be idempotent.

pub mod consumer;
pub mod dispatcher;
pub mod entry;
pub mod event;
pub mod log;
pub mod memory;
pub mod redis;

pub use consumer::{
    ConsumerError, ConsumerSettings, ConsumerState, FailurePolicy, StreamConsumer, DEFAULT_BATCH_SIZE,
    DEFAULT_BLOCK,
};
pub use dispatcher::{Dispatched, EventDispatcher};
pub use entry::{EntryId, LogEntry};
pub use event::{decode, Decoded, DomainEvent};
pub use self::log::{EventLog, GroupStart, LogError, ReadGroup, ReadPosition};
pub use memory::MemoryLog;
pub use self::redis::RedisEventLog;
