//! OS signal handling.
//!
//! # Responsibilities
//! - Hold the set of termination signals a monitor reacts to
//! - Register handlers only when a monitor starts waiting
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The signal set is a value passed to each monitor, not process-wide state,
//!   so independent monitors (and tests) can watch different signals

use std::fmt;
use std::str::FromStr;

/// A termination signal a monitor can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM (systemd, Kubernetes).
    Terminate,
    /// SIGQUIT.
    Quit,
    /// SIGHUP.
    Hangup,
}

impl TerminationSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationSignal::Interrupt => "interrupt",
            TerminationSignal::Terminate => "terminate",
            TerminationSignal::Quit => "quit",
            TerminationSignal::Hangup => "hangup",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            TerminationSignal::Interrupt => SignalKind::interrupt(),
            TerminationSignal::Terminate => SignalKind::terminate(),
            TerminationSignal::Quit => SignalKind::quit(),
            TerminationSignal::Hangup => SignalKind::hangup(),
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a signal name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal: {0}")]
pub struct UnknownSignal(pub String);

impl FromStr for TerminationSignal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().trim_start_matches("sig") {
            "int" | "interrupt" => Ok(TerminationSignal::Interrupt),
            "term" | "terminate" => Ok(TerminationSignal::Terminate),
            "quit" => Ok(TerminationSignal::Quit),
            "hup" | "hangup" => Ok(TerminationSignal::Hangup),
            _ => Err(UnknownSignal(s.to_string())),
        }
    }
}

/// The signals a [`ServiceMonitor`](crate::lifecycle::ServiceMonitor) waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSet {
    signals: Vec<TerminationSignal>,
}

impl SignalSet {
    pub fn new(signals: impl IntoIterator<Item = TerminationSignal>) -> Self {
        let mut set = Vec::new();
        for signal in signals {
            if !set.contains(&signal) {
                set.push(signal);
            }
        }
        Self { signals: set }
    }

    /// Parse a list of names such as `["interrupt", "SIGTERM"]`.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, UnknownSignal> {
        let signals = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(signals))
    }

    pub fn signals(&self) -> &[TerminationSignal] {
        &self.signals
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Wait for any signal in the set and return which one fired.
    ///
    /// An empty set never resolves.
    #[cfg(unix)]
    pub async fn wait(&self) -> std::io::Result<TerminationSignal> {
        let mut waits = Vec::with_capacity(self.signals.len());
        for signal in &self.signals {
            let mut stream = tokio::signal::unix::signal(signal.kind())?;
            let which = *signal;
            waits.push(Box::pin(async move {
                stream.recv().await;
                which
            }));
        }

        if waits.is_empty() {
            std::future::pending::<()>().await;
        }

        let (fired, _, _) = futures_util::future::select_all(waits).await;
        Ok(fired)
    }

    /// Wait for Ctrl+C; other signals do not exist on this platform.
    #[cfg(not(unix))]
    pub async fn wait(&self) -> std::io::Result<TerminationSignal> {
        if !self.signals.contains(&TerminationSignal::Interrupt) {
            std::future::pending::<()>().await;
        }
        tokio::signal::ctrl_c().await?;
        Ok(TerminationSignal::Interrupt)
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new([TerminationSignal::Interrupt, TerminationSignal::Terminate])
    }
}
