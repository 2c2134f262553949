//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use devicehub::events::{EntryId, EventLog, GroupStart, LogEntry, LogError, ReadGroup};
use devicehub::provision::{BootstrapConfig, Channel, ConfigService, ConfigState, ServiceError};

/// Poll `check` until it holds, panicking after five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Await `fut`, panicking after five seconds.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("future did not complete in time")
}

pub fn channel(id: &str, name: &str) -> Channel {
    Channel {
        id: id.into(),
        name: name.into(),
        metadata: Default::default(),
    }
}

pub fn bootstrap_config(thing_id: &str, channels: Vec<Channel>) -> BootstrapConfig {
    BootstrapConfig {
        thing_id: thing_id.into(),
        external_id: format!("ext-{thing_id}"),
        external_key: format!("key-{thing_id}"),
        name: format!("thing {thing_id}"),
        content: "{}".into(),
        state: ConfigState::Active,
        channels,
    }
}

/// Config service that records every call in order.
#[derive(Default)]
pub struct RecordingService {
    calls: Mutex<Vec<String>>,
}

impl RecordingService {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ConfigService for RecordingService {
    async fn remove_config(&self, thing_id: &str) -> Result<(), ServiceError> {
        self.record(format!("remove_config:{thing_id}"));
        Ok(())
    }

    async fn update_channel(&self, channel: Channel) -> Result<(), ServiceError> {
        self.record(format!("update_channel:{}:{}", channel.id, channel.name));
        Ok(())
    }

    async fn remove_channel(&self, id: &str) -> Result<(), ServiceError> {
        self.record(format!("remove_channel:{id}"));
        Ok(())
    }

    async fn disconnect_thing(&self, channel_id: &str, thing_id: &str) -> Result<(), ServiceError> {
        self.record(format!("disconnect_thing:{channel_id}:{thing_id}"));
        Ok(())
    }
}

/// Event log whose group creation always fails.
pub struct UnreachableLog;

#[async_trait]
impl EventLog for UnreachableLog {
    async fn create_group(&self, _: &str, _: &str, _: GroupStart) -> Result<(), LogError> {
        Err(LogError::Backend("connection refused".into()))
    }

    async fn read_group(&self, _: &ReadGroup<'_>) -> Result<Vec<LogEntry>, LogError> {
        Err(LogError::Backend("connection refused".into()))
    }

    async fn ack(&self, _: &str, _: &str, _: &[EntryId]) -> Result<u64, LogError> {
        Err(LogError::Backend("connection refused".into()))
    }
}

