//! In-process [`EventLog`] with consumer-group semantics.
//!
//! Used by tests and local runs without Redis. Delivery follows the stream
//! model: `>` hands out entries past the group's last-delivered position and
//! records them as pending for the reading consumer; `0` replays that
//! consumer's pending entries until they are acknowledged.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::events::entry::{EntryId, LogEntry};
use crate::events::log::{EventLog, GroupStart, LogError, ReadGroup, ReadPosition};

#[derive(Default)]
struct GroupState {
    /// Index into the stream of the next undelivered entry.
    next: usize,
    /// Delivered, unacknowledged entries and the consumer that owns them.
    pending: BTreeMap<EntryId, String>,
    acked: Vec<EntryId>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<LogEntry>,
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
struct State {
    streams: HashMap<String, StreamState>,
    sequence: u64,
}

/// Thread-safe in-memory event log.
#[derive(Default)]
pub struct MemoryLog {
    state: Mutex<State>,
    appended: Notify,
    failing_reads: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry to `stream`, creating the stream if needed.
    pub fn append<K, V>(&self, stream: &str, pairs: impl IntoIterator<Item = (K, V)>) -> EntryId
    where
        K: Into<String>,
        V: Into<String>,
    {
        let id = {
            let mut state = self.lock();
            state.sequence += 1;
            let id = EntryId::from_parts(state.sequence, 0);
            let entry = LogEntry::from_pairs(id.clone(), pairs);
            state.streams.entry(stream.to_string()).or_default().entries.push(entry);
            id
        };
        self.appended.notify_waiters();
        id
    }

    /// Make the next `count` reads fail with a backend error.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Total `read_group` calls served, failed ones included.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Pending entry IDs of `group`, in log order.
    pub fn pending(&self, stream: &str, group: &str) -> Vec<EntryId> {
        self.lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Acknowledged entry IDs of `group`, in ack order.
    pub fn acked(&self, stream: &str, group: &str) -> Vec<EntryId> {
        self.lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.acked.clone())
            .unwrap_or_default()
    }

    pub fn has_group(&self, stream: &str, group: &str) -> bool {
        self.lock()
            .streams
            .get(stream)
            .is_some_and(|s| s.groups.contains_key(group))
    }

    fn take_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn try_read(&self, request: &ReadGroup<'_>) -> Result<Vec<LogEntry>, LogError> {
        let mut state = self.lock();
        let stream = state
            .streams
            .get_mut(request.stream)
            .ok_or_else(|| LogError::NoGroup(request.stream.to_string()))?;
        let group = stream
            .groups
            .get_mut(request.group)
            .ok_or_else(|| LogError::NoGroup(request.group.to_string()))?;

        match request.position {
            ReadPosition::Pending => {
                let owned: Vec<&EntryId> = group
                    .pending
                    .iter()
                    .filter(|(_, owner)| owner.as_str() == request.consumer)
                    .map(|(id, _)| id)
                    .take(request.count)
                    .collect();
                Ok(stream
                    .entries
                    .iter()
                    .filter(|e| owned.contains(&&e.id))
                    .cloned()
                    .collect())
            }
            ReadPosition::New => {
                let end = stream.entries.len().min(group.next + request.count);
                let batch: Vec<LogEntry> = stream.entries[group.next..end].to_vec();
                group.next = end;
                for entry in &batch {
                    group.pending.insert(entry.id.clone(), request.consumer.to_string());
                }
                Ok(batch)
            }
        }
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<(), LogError> {
        let mut state = self.lock();
        let stream = state.streams.entry(stream.to_string()).or_default();
        if stream.groups.contains_key(group) {
            return Err(LogError::GroupExists);
        }
        let next = match start {
            GroupStart::Latest => stream.entries.len(),
            GroupStart::Beginning => 0,
        };
        stream.groups.insert(
            group.to_string(),
            GroupState {
                next,
                ..GroupState::default()
            },
        );
        Ok(())
    }

    async fn read_group(&self, request: &ReadGroup<'_>) -> Result<Vec<LogEntry>, LogError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(LogError::Backend("injected read failure".into()));
        }

        // Register interest before looking so an append in between is not missed.
        let appended = self.appended.notified();
        let batch = self.try_read(request)?;
        if !batch.is_empty() || request.position == ReadPosition::Pending || request.block.is_zero() {
            return Ok(batch);
        }

        if tokio::time::timeout(request.block, appended).await.is_err() {
            return Ok(Vec::new());
        }
        self.try_read(request)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64, LogError> {
        let mut state = self.lock();
        let Some(group) = state
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
        else {
            return Ok(0);
        };

        let mut acked = 0;
        for id in ids {
            if group.pending.remove(id).is_some() {
                group.acked.push(id.clone());
                acked += 1;
            }
        }
        Ok(acked)
    }
}
