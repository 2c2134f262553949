//! Abstraction over an append-only log with consumer groups.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::events::entry::{EntryId, LogEntry};

/// Where a group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPosition {
    /// Entries never delivered to any consumer of the group (`>`).
    New,
    /// Entries delivered to this consumer but not yet acknowledged (`0`).
    Pending,
}

impl ReadPosition {
    /// Cursor token understood by the log backend.
    pub fn as_cursor(&self) -> &'static str {
        match self {
            ReadPosition::New => ">",
            ReadPosition::Pending => "0",
        }
    }
}

/// Where a newly created group starts consuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupStart {
    /// Only entries appended after creation (`$`).
    #[default]
    Latest,
    /// Every entry in the log (`0`).
    Beginning,
}

impl GroupStart {
    pub fn as_cursor(&self) -> &'static str {
        match self {
            GroupStart::Latest => "$",
            GroupStart::Beginning => "0",
        }
    }
}

/// One group read request.
#[derive(Debug, Clone)]
pub struct ReadGroup<'a> {
    pub stream: &'a str,
    pub group: &'a str,
    pub consumer: &'a str,
    pub position: ReadPosition,
    pub count: usize,
    /// How long the backend may wait for new entries. Ignored for pending reads.
    pub block: Duration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("consumer group already exists")]
    GroupExists,

    #[error("no such stream or consumer group: {0}")]
    NoGroup(String),

    #[error("log backend error: {0}")]
    Backend(String),
}

/// Log operations the stream consumer needs.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Create `group` on `stream`, creating the stream if it does not exist.
    ///
    /// Returns [`LogError::GroupExists`] when the group is already there.
    async fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<(), LogError>;

    /// Read up to `count` entries for `consumer`. An empty vector means nothing arrived.
    async fn read_group(&self, request: &ReadGroup<'_>) -> Result<Vec<LogEntry>, LogError>;

    /// Acknowledge `ids` for `group`. Returns how many were pending.
    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64, LogError>;
}
