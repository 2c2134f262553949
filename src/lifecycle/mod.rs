//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build listeners → start(errs) each
//!
//! Monitor (monitor.rs):
//!     SignalSet fires      → stop() every listener in registration order → return
//!     ErrorSink reports    → log and return immediately, nothing stopped
//!
//! Listener (listener.rs):
//!     start(errs) spawns serve task → fatal error reported once on errs
//!     stop(timeout)        → stop accepting → drain in-flight → bounded wait
//! ```
//!
//! # Design Decisions
//! - The monitor owns no resources and never spawns
//! - Stop failures are logged, never propagated as process failures
//! - Shutdown has timeout: the caller's wait is bounded, the work is cooperative

pub mod listener;
pub mod monitor;
pub mod shutdown;
pub mod signals;

pub use listener::{ErrorSink, GracefulListener, ServeError, StopError};
pub use monitor::{MonitorExit, ServiceMonitor, DEFAULT_STOP_TIMEOUT};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{SignalSet, TerminationSignal};
