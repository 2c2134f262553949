//! Blocking coordinator that ties listener lifetimes to the process lifetime.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::lifecycle::listener::{GracefulListener, ServeError};
use crate::lifecycle::signals::SignalSet;
use crate::observability::metrics;

/// Stop timeout applied to each listener when none is configured.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// How a monitor run ended.
#[derive(Debug)]
pub enum MonitorExit {
    /// A termination signal arrived and every listener was asked to stop.
    Signalled {
        /// Listeners that stopped cleanly.
        stopped: usize,
        /// Listeners whose stop returned an error.
        failed: usize,
    },
    /// A listener reported a fatal error; nothing was stopped.
    Fatal(ServeError),
}

impl MonitorExit {
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorExit::Fatal(_))
    }
}

/// Waits for a termination signal or a fatal listener error.
///
/// On a signal every registered listener is stopped in registration order.
/// On a fatal error the monitor returns immediately and stops nothing: the
/// reporting component is already broken, and the process is expected to exit.
#[derive(Debug, Clone)]
pub struct ServiceMonitor {
    signals: SignalSet,
    stop_timeout: Duration,
}

impl ServiceMonitor {
    pub fn new(signals: SignalSet) -> Self {
        Self {
            signals,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Override the per-listener stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn signals(&self) -> &SignalSet {
        &self.signals
    }

    /// Block until one of the configured OS signals or a fatal error arrives.
    pub async fn run(
        &self,
        errors: mpsc::Receiver<ServeError>,
        listeners: &[Arc<dyn GracefulListener>],
    ) -> MonitorExit {
        let signals = self.signals.clone();
        let termination = async move {
            match signals.wait().await {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handlers, only fatal errors end the monitor");
                    std::future::pending::<crate::lifecycle::signals::TerminationSignal>().await
                }
            }
        };
        self.run_until(errors, listeners, termination).await
    }

    /// Like [`run`](Self::run) but with a caller-supplied termination source.
    pub async fn run_until<F>(
        &self,
        mut errors: mpsc::Receiver<ServeError>,
        listeners: &[Arc<dyn GracefulListener>],
        termination: F,
    ) -> MonitorExit
    where
        F: Future,
        F::Output: fmt::Display,
    {
        tracing::info!(
            listeners = listeners.len(),
            signals = ?self.signals.signals(),
            "Graceful server monitor started"
        );

        tokio::pin!(termination);
        let mut errors_open = true;

        loop {
            tokio::select! {
                biased;
                report = errors.recv(), if errors_open => match report {
                    Some(error) => {
                        tracing::error!(
                            listener = %error.listener(),
                            error = %error,
                            "Graceful server monitor exiting due to error"
                        );
                        return MonitorExit::Fatal(error);
                    }
                    None => {
                        tracing::debug!("All error reporters dropped, waiting for signal only");
                        errors_open = false;
                    }
                },
                reason = &mut termination => {
                    tracing::info!(signal = %reason, "Received termination signal");
                    let exit = self.stop_all(listeners).await;
                    tracing::info!("Graceful server monitor exit");
                    return exit;
                }
            }
        }
    }

    async fn stop_all(&self, listeners: &[Arc<dyn GracefulListener>]) -> MonitorExit {
        let mut stopped = 0;
        let mut failed = 0;

        for listener in listeners {
            match listener.stop(self.stop_timeout).await {
                Ok(()) => {
                    stopped += 1;
                    metrics::record_listener_stop(listener.name(), true);
                }
                Err(e) => {
                    failed += 1;
                    metrics::record_listener_stop(listener.name(), false);
                    tracing::error!(listener = %listener.name(), error = %e, "Error during server stop");
                }
            }
        }

        MonitorExit::Signalled { stopped, failed }
    }
}

impl Default for ServiceMonitor {
    fn default() -> Self {
        Self::new(SignalSet::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::listener::{ErrorSink, StopError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct MockListener {
        name: String,
        fail: bool,
        calls: AtomicUsize,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl MockListener {
        fn new(name: &str, fail: bool, order: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                calls: AtomicUsize::new(0),
                order: Arc::clone(order),
            })
        }
    }

    #[async_trait]
    impl GracefulListener for MockListener {
        fn name(&self) -> &str {
            &self.name
        }

        async fn stop(&self, _timeout: Duration) -> Result<(), StopError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.name.clone());
            if self.fail {
                return Err(StopError::Failed {
                    listener: self.name.clone(),
                    message: "error stopping server".into(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn signal_stops_every_listener_once_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mocks = vec![
            MockListener::new("http", false, &order),
            MockListener::new("grpc", true, &order),
            MockListener::new("stream", false, &order),
        ];
        let listeners: Vec<Arc<dyn GracefulListener>> = mocks
            .iter()
            .map(|m| Arc::clone(m) as Arc<dyn GracefulListener>)
            .collect();

        let (_sink, errors) = ErrorSink::channel();
        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        signal_tx.send(()).unwrap();

        let exit = ServiceMonitor::default()
            .with_stop_timeout(Duration::from_millis(100))
            .run_until(errors, &listeners, async move {
                let _ = signal_rx.await;
                "interrupt"
            })
            .await;

        match exit {
            MonitorExit::Signalled { stopped, failed } => {
                assert_eq!(stopped, 2);
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected exit: {other:?}"),
        }
        for mock in &mocks {
            assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
        }
        assert_eq!(*order.lock().unwrap(), vec!["http", "grpc", "stream"]);
    }

    #[tokio::test]
    async fn fatal_error_returns_without_stopping() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mock = MockListener::new("http", false, &order);
        let listeners: Vec<Arc<dyn GracefulListener>> = vec![mock.clone()];

        let (sink, errors) = ErrorSink::channel();
        sink.report(ServeError::Serve {
            listener: "http".into(),
            message: "server error".into(),
        });

        let exit = ServiceMonitor::default()
            .run_until(errors, &listeners, std::future::pending::<&str>())
            .await;

        assert!(exit.is_fatal());
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn closed_error_channel_keeps_waiting_for_signal() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mock = MockListener::new("udp", false, &order);
        let listeners: Vec<Arc<dyn GracefulListener>> = vec![mock.clone()];

        let (sink, errors) = ErrorSink::channel();
        drop(sink);

        let exit = ServiceMonitor::default()
            .run_until(errors, &listeners, async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                "terminate"
            })
            .await;

        assert!(matches!(exit, MonitorExit::Signalled { stopped: 1, failed: 0 }));
        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }
}
