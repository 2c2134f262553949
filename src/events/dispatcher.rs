//! Routes decoded events to the configuration service.

use std::sync::Arc;

use crate::events::entry::LogEntry;
use crate::events::event::{decode, Decoded, DomainEvent};
use crate::provision::{Channel, ConfigService, ServiceError};

/// What the dispatcher did with an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler ran and succeeded.
    Handled { operation: &'static str },
    /// The entry carries an operation this service does not react to.
    Ignored { operation: String },
}

/// Decodes entries and invokes exactly one configuration-service handler per event.
#[derive(Clone)]
pub struct EventDispatcher {
    service: Arc<dyn ConfigService>,
}

impl EventDispatcher {
    pub fn new(service: Arc<dyn ConfigService>) -> Self {
        Self { service }
    }

    /// Decode and route one entry.
    pub async fn dispatch(&self, entry: &LogEntry) -> Result<Dispatched, ServiceError> {
        match decode(&entry.fields) {
            Decoded::Event(event) => {
                let operation = event.operation();
                self.handle(event).await?;
                Ok(Dispatched::Handled { operation })
            }
            Decoded::Ignored { operation } => {
                tracing::debug!(entry_id = %entry.id, operation = %operation, "Ignoring event");
                Ok(Dispatched::Ignored { operation })
            }
        }
    }

    /// Invoke the handler matching `event`.
    pub async fn handle(&self, event: DomainEvent) -> Result<(), ServiceError> {
        match event {
            DomainEvent::RemoveThing { id } => self.service.remove_config(&id).await,
            DomainEvent::DisconnectThing {
                channel_id,
                thing_id,
            } => self.service.disconnect_thing(&channel_id, &thing_id).await,
            DomainEvent::UpdateChannel { id, name, metadata } => {
                self.service
                    .update_channel(Channel { id, name, metadata })
                    .await
            }
            DomainEvent::RemoveChannel { id } => self.service.remove_channel(&id).await,
        }
    }
}
