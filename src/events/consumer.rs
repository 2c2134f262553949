//! Consumer-group subscription that keeps bootstrap configs in sync.
//!
//! # Responsibilities
//! - Ensure the consumer group exists, then pull batches until asked to stop
//! - Dispatch entries in delivery order, acknowledging each one after its handler succeeds
//! - Recover this consumer's pending entries at startup and after a failed batch,
//!   returning to them until a pending read comes back empty
//! - Two-phase stop: the stopper enqueues an acknowledge channel, the worker answers it on exit
//!
//! # Design Decisions
//! - Backoff sleeps and log reads are raced against the stop request. A batch
//!   that is being dispatched always runs to completion (or to its first
//!   failure under [`FailurePolicy::AbortBatch`]).
//! - The stop channel holds a single request, so a second concurrent stop is
//!   rejected instead of queued.
//! - Stop requests are enqueued and drained under the state watch's lock, so a
//!   request can never outlive the loop it was meant for.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, Mutex, MutexGuard};

use crate::events::dispatcher::{Dispatched, EventDispatcher};
use crate::events::entry::LogEntry;
use crate::events::log::{EventLog, GroupStart, LogError, ReadGroup, ReadPosition};
use crate::lifecycle::{ErrorSink, GracefulListener, ServeError, StopError};
use crate::observability::metrics;
use crate::resilience::BackoffPolicy;

/// Entries pulled per read.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// How long a read for new entries may wait on the log.
pub const DEFAULT_BLOCK: Duration = Duration::from_secs(1);

/// What to do with the rest of a batch once an entry's handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop processing the batch. The failed entry and everything after it stay pending.
    #[default]
    AbortBatch,
    /// Leave the failed entry pending and carry on with the next one.
    SkipAndContinue,
}

/// Observable lifecycle of a [`StreamConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Subscribing,
    Reading,
    Dispatching,
    Stopping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to create consumer group {group} on {stream}: {source}")]
    CreateGroup {
        stream: String,
        group: String,
        #[source]
        source: LogError,
    },

    #[error("consumer is already subscribed")]
    AlreadySubscribed,
}

/// Group membership and loop tuning.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub group: String,
    pub consumer: String,
    pub batch_size: usize,
    pub block: Duration,
    pub backoff: BackoffPolicy,
    pub failure_policy: FailurePolicy,
}

impl ConsumerSettings {
    pub fn new(group: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            consumer: consumer.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            block: DEFAULT_BLOCK,
            backoff: BackoffPolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

type StopRequest = oneshot::Sender<()>;

enum Step {
    Stop(Option<StopRequest>),
    Read(Result<Vec<LogEntry>, LogError>),
}

/// Chooses between pending-recovery and new-entry reads.
///
/// While this consumer may own unacknowledged entries, every `>` read is followed
/// by a pending read. A pending batch that fails again is followed by one `>` read
/// so a poison entry cannot starve new events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Recovery {
    outstanding: bool,
    next: ReadPosition,
}

impl Recovery {
    /// Start by recovering whatever a previous run left pending.
    fn new() -> Self {
        Self {
            outstanding: true,
            next: ReadPosition::Pending,
        }
    }

    fn position(&self) -> ReadPosition {
        self.next
    }

    fn empty(&mut self, position: ReadPosition) {
        if position == ReadPosition::Pending {
            self.outstanding = false;
            self.next = ReadPosition::New;
        } else if self.outstanding {
            self.next = ReadPosition::Pending;
        }
    }

    fn processed(&mut self, position: ReadPosition, clean: bool) {
        self.next = match (clean, position) {
            (false, ReadPosition::Pending) => ReadPosition::New,
            (false, ReadPosition::New) => ReadPosition::Pending,
            // Keep draining until a pending read comes back empty.
            (true, ReadPosition::Pending) => ReadPosition::Pending,
            (true, ReadPosition::New) if self.outstanding => ReadPosition::Pending,
            (true, ReadPosition::New) => ReadPosition::New,
        };
        if !clean {
            self.outstanding = true;
        }
    }
}

/// A stoppable consumer-group subscription.
pub struct StreamConsumer {
    name: String,
    log: Arc<dyn EventLog>,
    dispatcher: EventDispatcher,
    settings: ConsumerSettings,
    stop_tx: mpsc::Sender<StopRequest>,
    stop_rx: Mutex<mpsc::Receiver<StopRequest>>,
    state: watch::Sender<ConsumerState>,
}

impl StreamConsumer {
    pub fn new(
        name: impl Into<String>,
        log: Arc<dyn EventLog>,
        dispatcher: EventDispatcher,
        settings: ConsumerSettings,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            name: name.into(),
            log,
            dispatcher,
            settings,
            stop_tx,
            stop_rx: Mutex::new(stop_rx),
            state,
        }
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::trace!(consumer = %self.name, from = ?previous, to = ?state, "Consumer state changed");
        }
    }

    /// Move `Idle` or `Stopped` to `Subscribing`. Returns `false` if a loop already owns the consumer.
    fn claim(&self) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, ConsumerState::Idle | ConsumerState::Stopped) {
                *state = ConsumerState::Subscribing;
                true
            } else {
                false
            }
        })
    }

    /// Run [`subscribe`](Self::subscribe) on its own task.
    ///
    /// A fatal subscribe failure is reported on `errs`.
    pub fn start(self: &Arc<Self>, topic: impl Into<String>, errs: ErrorSink) {
        if !self.claim() {
            tracing::warn!(consumer = %self.name, "Stream consumer already started");
            return;
        }

        let this = Arc::clone(self);
        let topic = topic.into();
        tokio::spawn(async move {
            if let Err(source) = this.run(&topic).await {
                errs.report(ServeError::Subscribe {
                    listener: this.name.clone(),
                    source,
                });
            }
        });
    }

    /// Join the consumer group on `topic` and process entries until stopped.
    ///
    /// Returns `Ok(())` after a graceful stop.
    pub async fn subscribe(&self, topic: &str) -> Result<(), ConsumerError> {
        if !self.claim() {
            return Err(ConsumerError::AlreadySubscribed);
        }
        self.run(topic).await
    }

    async fn run(&self, topic: &str) -> Result<(), ConsumerError> {
        // Waits only while a previous loop finishes exiting.
        let mut stop_rx = self.stop_rx.lock().await;

        let group = self.settings.group.as_str();
        match self.log.create_group(topic, group, GroupStart::Latest).await {
            Ok(()) => {}
            Err(LogError::GroupExists) => {
                tracing::debug!(stream = %topic, group = %group, "Consumer group already exists");
            }
            Err(source) => {
                self.finish(stop_rx);
                return Err(ConsumerError::CreateGroup {
                    stream: topic.to_string(),
                    group: group.to_string(),
                    source,
                });
            }
        }

        tracing::info!(
            consumer = %self.name,
            stream = %topic,
            group = %group,
            member = %self.settings.consumer,
            "Stream consumer subscribed"
        );

        let mut recovery = Recovery::new();
        let mut attempts: u32 = 0;
        loop {
            self.set_state(ConsumerState::Reading);

            let delay = self.settings.backoff.delay(attempts);
            let position = recovery.position();
            let request = ReadGroup {
                stream: topic,
                group,
                consumer: &self.settings.consumer,
                position,
                count: self.settings.batch_size,
                block: self.settings.block,
            };
            let read = async {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.log.read_group(&request).await
            };

            let step = tokio::select! {
                biased;
                ack = stop_rx.recv() => Step::Stop(ack),
                result = read => Step::Read(result),
            };

            let batch = match step {
                Step::Stop(ack) => {
                    self.set_state(ConsumerState::Stopping);
                    tracing::info!(consumer = %self.name, stream = %topic, "Stream consumer stopping");
                    self.finish(stop_rx);
                    if let Some(ack) = ack {
                        // The stopper may have given up already.
                        let _ = ack.send(());
                    }
                    return Ok(());
                }
                Step::Read(Ok(batch)) => batch,
                Step::Read(Err(e)) => {
                    metrics::record_read_error();
                    tracing::warn!(consumer = %self.name, stream = %topic, error = %e, "Failed to read from stream");
                    attempts = attempts.saturating_add(1);
                    continue;
                }
            };

            if batch.is_empty() {
                if position == ReadPosition::Pending {
                    tracing::debug!(consumer = %self.name, "No pending entries left, reading new entries");
                    attempts = 0;
                } else {
                    attempts = attempts.saturating_add(1);
                }
                recovery.empty(position);
                continue;
            }

            self.set_state(ConsumerState::Dispatching);
            let clean = self.process(topic, &batch).await;
            if clean {
                attempts = 0;
            } else {
                attempts = attempts.saturating_add(1);
            }
            recovery.processed(position, clean);
        }
    }
    /// Dispatch a batch. Returns `false` if any handler failed.
    async fn process(&self, topic: &str, batch: &[LogEntry]) -> bool {
        let mut clean = true;
        for entry in batch {
            let operation = entry.field("operation").unwrap_or_default();
            match self.dispatcher.dispatch(entry).await {
                Ok(dispatched) => {
                    let outcome = match dispatched {
                        Dispatched::Handled { .. } => "handled",
                        Dispatched::Ignored { .. } => "ignored",
                    };
                    metrics::record_event(operation, outcome);
                    self.acknowledge(topic, entry).await;
                }
                Err(e) => {
                    metrics::record_event(operation, "failed");
                    tracing::warn!(
                        consumer = %self.name,
                        entry_id = %entry.id,
                        operation = %operation,
                        error = %e,
                        "Failed to handle event"
                    );
                    clean = false;
                    if self.settings.failure_policy == FailurePolicy::AbortBatch {
                        break;
                    }
                }
            }
        }
        clean
    }

    async fn acknowledge(&self, topic: &str, entry: &LogEntry) {
        match self
            .log
            .ack(topic, &self.settings.group, std::slice::from_ref(&entry.id))
            .await
        {
            Ok(acked) => metrics::record_ack(acked),
            Err(e) => {
                // The entry stays pending and is redelivered by a pending-recovery read.
                tracing::warn!(consumer = %self.name, entry_id = %entry.id, error = %e, "Failed to acknowledge entry");
            }
        }
    }

    /// Mark the loop as exited and answer stop requests that arrived meanwhile.
    ///
    /// The drain runs under the state lock, the same lock [`stop`](GracefulListener::stop)
    /// enqueues under, so no request is left behind for the next loop.
    fn finish(&self, mut stop_rx: MutexGuard<'_, mpsc::Receiver<StopRequest>>) {
        let mut waiting = Vec::new();
        self.state.send_modify(|state| {
            tracing::trace!(consumer = %self.name, from = ?state, to = ?ConsumerState::Stopped, "Consumer state changed");
            *state = ConsumerState::Stopped;
            while let Ok(ack) = stop_rx.try_recv() {
                waiting.push(ack);
            }
        });
        drop(stop_rx);
        for ack in waiting {
            let _ = ack.send(());
        }
    }
}

#[async_trait]
impl GracefulListener for StreamConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stop(&self, timeout: Duration) -> Result<(), StopError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let mut sent = Ok(false);
        // Checked and enqueued under the state lock, so an exiting loop either drains
        // this request or has already published `Stopped`.
        self.state.send_if_modified(|state| {
            if !matches!(state, ConsumerState::Idle | ConsumerState::Stopped) {
                sent = self.stop_tx.try_send(ack_tx).map(|()| true);
            }
            false
        });

        match sent {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(consumer = %self.name, "Stream consumer is not running");
                return Ok(());
            }
            Err(TrySendError::Full(_)) => {
                return Err(StopError::InProgress {
                    listener: self.name.clone(),
                });
            }
            Err(TrySendError::Closed(_)) => {
                return Err(StopError::WorkerGone {
                    listener: self.name.clone(),
                });
            }
        }

        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(consumer = %self.name, "Stream consumer stopped");
                Ok(())
            }
            Ok(Err(_)) => Err(StopError::WorkerGone {
                listener: self.name.clone(),
            }),
            Err(_) => Err(StopError::Timeout {
                listener: self.name.clone(),
                timeout,
            }),
        }
    }
}
