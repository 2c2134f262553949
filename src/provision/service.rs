//! Configuration-service contract consumed by the event dispatcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A channel as known to the provisioning service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Errors returned by configuration-service handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("entity not found")]
    NotFound,

    #[error("malformed entity: {0}")]
    Malformed(String),

    #[error("provisioning backend unavailable: {0}")]
    Unavailable(String),
}

/// Handlers that keep bootstrap configurations in sync with things and channels.
///
/// Implementations must be idempotent.
#[async_trait]
pub trait ConfigService: Send + Sync {
    /// A thing was removed: drop its bootstrap configuration.
    async fn remove_config(&self, thing_id: &str) -> Result<(), ServiceError>;

    /// A channel was renamed or its metadata changed.
    async fn update_channel(&self, channel: Channel) -> Result<(), ServiceError>;

    /// A channel was removed.
    async fn remove_channel(&self, id: &str) -> Result<(), ServiceError>;

    /// A thing was disconnected from a channel.
    async fn disconnect_thing(&self, channel_id: &str, thing_id: &str) -> Result<(), ServiceError>;
}
