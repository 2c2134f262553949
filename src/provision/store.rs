//! In-memory bootstrap configuration store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::provision::service::{Channel, ConfigService, ServiceError};

/// Whether a thing may fetch its bootstrap configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigState {
    #[default]
    Inactive,
    Active,
}

/// Bootstrap configuration for one thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub thing_id: String,
    pub external_id: String,
    /// Never echoed back by the API.
    #[serde(default, skip_serializing)]
    pub external_key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub state: ConfigState,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// Thread-safe store of bootstrap configurations keyed by thing ID.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    inner: Arc<DashMap<String, BootstrapConfig>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a configuration.
    pub fn save(&self, config: BootstrapConfig) -> Result<(), ServiceError> {
        if config.thing_id.is_empty() {
            return Err(ServiceError::Malformed("thing_id is required".into()));
        }
        if config.external_id.is_empty() {
            return Err(ServiceError::Malformed("external_id is required".into()));
        }

        self.inner.insert(config.thing_id.clone(), config);
        metrics::record_config_count(self.inner.len());
        Ok(())
    }

    pub fn get(&self, thing_id: &str) -> Option<BootstrapConfig> {
        self.inner.get(thing_id).map(|c| c.value().clone())
    }

    /// All configurations ordered by thing ID.
    pub fn list(&self) -> Vec<BootstrapConfig> {
        let mut configs: Vec<_> = self.inner.iter().map(|c| c.value().clone()).collect();
        configs.sort_by(|a, b| a.thing_id.cmp(&b.thing_id));
        configs
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl ConfigService for ConfigStore {
    async fn remove_config(&self, thing_id: &str) -> Result<(), ServiceError> {
        if self.inner.remove(thing_id).is_some() {
            tracing::debug!(thing_id = %thing_id, "Removed bootstrap config");
            metrics::record_config_count(self.inner.len());
        }
        Ok(())
    }

    async fn update_channel(&self, channel: Channel) -> Result<(), ServiceError> {
        let mut updated = 0usize;
        for mut config in self.inner.iter_mut() {
            for connected in config.channels.iter_mut().filter(|c| c.id == channel.id) {
                connected.name = channel.name.clone();
                connected.metadata = channel.metadata.clone();
                updated += 1;
            }
        }
        tracing::debug!(channel_id = %channel.id, configs = updated, "Updated channel");
        Ok(())
    }

    async fn remove_channel(&self, id: &str) -> Result<(), ServiceError> {
        for mut config in self.inner.iter_mut() {
            config.channels.retain(|c| c.id != id);
        }
        tracing::debug!(channel_id = %id, "Removed channel from bootstrap configs");
        Ok(())
    }

    async fn disconnect_thing(&self, channel_id: &str, thing_id: &str) -> Result<(), ServiceError> {
        if let Some(mut config) = self.inner.get_mut(thing_id) {
            config.channels.retain(|c| c.id != channel_id);
            config.state = ConfigState::Inactive;
            tracing::debug!(thing_id = %thing_id, channel_id = %channel_id, "Disconnected thing");
        }
        Ok(())
    }
}
