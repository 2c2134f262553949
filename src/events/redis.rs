//! Redis Streams implementation of [`EventLog`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisError};

use crate::events::entry::{EntryId, LogEntry};
use crate::events::log::{EventLog, GroupStart, LogError, ReadGroup, ReadPosition};

/// Event log backed by Redis Streams consumer groups.
///
/// Cloning shares the underlying `ConnectionManager`, which reconnects on its own.
#[derive(Clone)]
pub struct RedisEventLog {
    conn_manager: ConnectionManager,
}

impl RedisEventLog {
    /// Connect to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self, LogError> {
        let client = Client::open(redis_url)
            .map_err(|e| LogError::Backend(format!("Failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            LogError::Backend(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Redis event log connected");
        Ok(Self { conn_manager })
    }

    pub fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

fn backend(err: RedisError) -> LogError {
    match err.code() {
        Some("BUSYGROUP") => LogError::GroupExists,
        Some("NOGROUP") => LogError::NoGroup(err.to_string()),
        _ => LogError::Backend(err.to_string()),
    }
}

/// Flatten a read reply into entries. Non-string field values are dropped.
fn into_entries(reply: StreamReadReply) -> Vec<LogEntry> {
    reply
        .keys
        .into_iter()
        .flat_map(|key| key.ids)
        .map(|stream_id| {
            let fields = stream_id
                .map
                .iter()
                .filter_map(|(field, value)| {
                    redis::from_redis_value::<String>(value)
                        .ok()
                        .map(|value| (field.clone(), value))
                })
                .collect();
            LogEntry::new(EntryId::new(stream_id.id), fields)
        })
        .collect()
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<(), LogError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .xgroup_create_mkstream(stream, group, start.as_cursor())
            .await
            .map_err(backend)?;

        tracing::info!(stream = %stream, group = %group, "Created consumer group");
        Ok(())
    }

    async fn read_group(&self, request: &ReadGroup<'_>) -> Result<Vec<LogEntry>, LogError> {
        let mut conn = self.conn_manager.clone();

        let mut options = StreamReadOptions::default()
            .group(request.group, request.consumer)
            .count(request.count);
        if request.position == ReadPosition::New && !request.block.is_zero() {
            let block_ms = usize::try_from(request.block.as_millis()).unwrap_or(usize::MAX);
            options = options.block(block_ms);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[request.stream], &[request.position.as_cursor()], &options)
            .await
            .map_err(backend)?;

        Ok(reply.map(into_entries).unwrap_or_default())
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64, LogError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn_manager.clone();
        let ids: Vec<&str> = ids.iter().map(EntryId::as_str).collect();
        let acked: u64 = conn.xack(stream, group, &ids[..]).await.map_err(backend)?;
        Ok(acked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::streams::{StreamId, StreamKey};
    use redis::{ErrorKind, Value};
    use std::collections::HashMap;

    #[test]
    fn reply_flattens_and_drops_non_string_values() {
        let mut map = HashMap::new();
        map.insert("operation".to_string(), Value::BulkString(b"thing.remove".to_vec()));
        map.insert("id".to_string(), Value::BulkString(b"t1".to_vec()));
        map.insert("nested".to_string(), Value::Array(vec![Value::Int(1)]));

        let reply = StreamReadReply {
            keys: vec![StreamKey {
                key: "things".into(),
                ids: vec![StreamId {
                    id: "1-0".into(),
                    map,
                    ..Default::default()
                }],
            }],
        };

        let entries = into_entries(reply);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id.as_str(), "1-0");
        assert_eq!(entries[0].field("operation"), Some("thing.remove"));
        assert_eq!(entries[0].field("id"), Some("t1"));
        assert_eq!(entries[0].field("nested"), None);
    }

    /// Decode a raw RESP error reply the way the connection would.
    fn server_error(reply: &[u8]) -> RedisError {
        match redis::parse_redis_value(reply) {
            Ok(value) => value.extract_error().unwrap_err(),
            Err(err) => err,
        }
    }

    #[test]
    fn busygroup_reply_means_group_exists() {
        let err = server_error(b"-BUSYGROUP Consumer Group name already exists\r\n");
        assert_eq!(err.code(), Some("BUSYGROUP"));
        assert_eq!(backend(err), LogError::GroupExists);
    }

    #[test]
    fn nogroup_reply_maps_to_no_group() {
        let err = server_error(
            b"-NOGROUP No such key 'things' or consumer group 'bootstrap' in XREADGROUP with GROUP option\r\n",
        );
        assert_eq!(err.code(), Some("NOGROUP"));
        let LogError::NoGroup(detail) = backend(err) else {
            panic!("expected NoGroup");
        };
        assert!(detail.contains("consumer group"), "{detail}");
    }

    #[test]
    fn other_server_errors_map_to_backend() {
        let err = server_error(b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n");
        assert!(matches!(backend(err), LogError::Backend(_)));
    }

    #[test]
    fn generic_errors_map_to_backend() {
        let err = RedisError::from((ErrorKind::IoError, "connection reset"));
        assert!(matches!(backend(err), LogError::Backend(_)));
    }
}
