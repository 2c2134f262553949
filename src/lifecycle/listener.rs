//! The graceful listener contract shared by every network-facing component.
//!
//! Each listener exposes a transport-specific `start` that spawns its serve
//! task, plus [`GracefulListener::stop`]. Fatal serving errors flow into a
//! single error-report channel that the [`ServiceMonitor`] watches.
//!
//! [`ServiceMonitor`]: crate::lifecycle::ServiceMonitor

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::net::tls::TlsError;

/// Capacity of the error-report channel. One slot per listener is enough
/// since each serve task reports at most once.
pub const ERROR_CHANNEL_CAPACITY: usize = 8;

/// A component that can be asked to stop and drain within a deadline.
#[async_trait]
pub trait GracefulListener: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Stop accepting new work and wait up to `timeout` for in-flight work.
    async fn stop(&self, timeout: Duration) -> Result<(), StopError>;
}

/// Fatal error reported by a listener's serve task.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Bind or serve failed at the socket level.
    #[error("{listener}: I/O failure on {addr}: {source}")]
    Io {
        listener: String,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// TLS material could not be loaded.
    #[error("{listener}: TLS setup failed: {source}")]
    Tls {
        listener: String,
        #[source]
        source: TlsError,
    },

    /// A gRPC listener was started without a service registration hook.
    #[error("{listener}: service registration hook is missing")]
    MissingRegistration { listener: String },

    /// Transport-level serve failure.
    #[error("{listener}: serve failed: {message}")]
    Serve { listener: String, message: String },

    /// The stream consumer could not subscribe.
    #[error("{listener}: subscribe failed: {source}")]
    Subscribe {
        listener: String,
        #[source]
        source: crate::events::ConsumerError,
    },
}

impl ServeError {
    /// Name of the listener that reported the error.
    pub fn listener(&self) -> &str {
        match self {
            ServeError::Io { listener, .. }
            | ServeError::Tls { listener, .. }
            | ServeError::MissingRegistration { listener }
            | ServeError::Serve { listener, .. }
            | ServeError::Subscribe { listener, .. } => listener,
        }
    }
}

/// Error returned by [`GracefulListener::stop`].
#[derive(Debug, Error)]
pub enum StopError {
    /// The worker did not acknowledge the stop request in time.
    #[error("{listener}: graceful shutdown timed out after {timeout:?}")]
    Timeout { listener: String, timeout: Duration },

    /// Another stop request is still outstanding.
    #[error("{listener}: a stop request is already in flight")]
    InProgress { listener: String },

    /// The worker is gone without acknowledging.
    #[error("{listener}: worker exited before acknowledging shutdown")]
    WorkerGone { listener: String },

    #[error("{listener}: {message}")]
    Failed { listener: String, message: String },
}

/// Sending half of the shared error-report channel.
///
/// Cloned into every serve task. [`ErrorSink::report`] consumes the clone so a
/// task can report at most once.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<ServeError>,
}

impl ErrorSink {
    /// Create the error-report channel.
    pub fn channel() -> (ErrorSink, mpsc::Receiver<ServeError>) {
        Self::with_capacity(ERROR_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (ErrorSink, mpsc::Receiver<ServeError>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ErrorSink { tx }, rx)
    }

    /// Report a fatal serving error.
    ///
    /// Never blocks: if the monitor has already exited or the channel is full
    /// the error is logged and dropped.
    pub fn report(self, error: ServeError) {
        tracing::error!(listener = %error.listener(), error = %error, "Listener reported fatal error");
        if let Err(e) = self.tx.try_send(error) {
            tracing::debug!(error = %e, "Error report dropped, monitor no longer listening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn report_reaches_receiver() {
        let (sink, mut rx) = ErrorSink::channel();
        sink.clone().report(ServeError::MissingRegistration {
            listener: "grpc".into(),
        });

        let err = rx.recv().await.unwrap();
        assert_eq!(err.listener(), "grpc");
        assert_eq!(err.to_string(), "grpc: service registration hook is missing");
    }

    #[tokio::test]
    async fn report_after_receiver_dropped_does_not_panic() {
        let (sink, rx) = ErrorSink::with_capacity(1);
        drop(rx);
        sink.report(ServeError::Serve {
            listener: "http".into(),
            message: "boom".into(),
        });
    }
}
