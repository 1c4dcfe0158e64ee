//! Redis Streams backend (`redis-stream` feature).
//!
//! XADD / XREADGROUP / XACK / XPENDING against a shared
//! `ConnectionManager`. Consumer-group creation tolerates BUSYGROUP so
//! several workers can race on startup.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::types::{EngineError, EngineResult, TransactionRecord};

use super::{StreamEntry, StreamId, TxStream};

/// Redis Streams [`TxStream`] backend.
pub struct RedisStream {
    conn: ConnectionManager,
    key: String,
}

impl RedisStream {
    /// Connect and ensure the consumer group exists.
    pub async fn connect(url: &str, key: &str, group: &str) -> EngineResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| EngineError::Stream(format!("redis open: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| EngineError::Stream(format!("redis connect: {e}")))?;
        let stream = Self {
            conn,
            key: key.to_string(),
        };
        stream.ensure_group(group).await?;
        info!(key, group, "redis stream ready");
        Ok(stream)
    }

    async fn ensure_group(&self, group: &str) -> EngineResult<()> {
        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.key, group, "0")
            .await;
        match created {
            Ok(()) => Ok(()),
            Err(err) if err.to_string().contains("BUSYGROUP") => {
                debug!(group, "consumer group already exists");
                Ok(())
            }
            Err(err) => Err(EngineError::Stream(format!("xgroup create: {err}"))),
        }
    }
}

#[async_trait]
impl TxStream for RedisStream {
    async fn append(&self, record: &TransactionRecord) -> EngineResult<StreamId> {
        let payload = serde_json::to_string(record)
            .map_err(|e| EngineError::Stream(format!("serialize record: {e}")))?;
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(&self.key, "*", &[("payload", payload.as_str())])
            .await
            .map_err(|e| EngineError::Stream(format!("xadd: {e}")))?;
        Ok(id)
    }

    async fn consume(
        &self,
        group: &str,
        consumer: &str,
        max_batch: usize,
        block_ms: u64,
    ) -> EngineResult<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(max_batch)
            .block(block_ms as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[&self.key], &[">"], &opts)
            .await
            .map_err(|e| EngineError::Stream(format!("xreadgroup: {e}")))?;

        let mut entries = Vec::new();
        for stream_key in reply.keys {
            for raw in stream_key.ids {
                let Some(redis::Value::Data(bytes)) = raw.map.get("payload") else {
                    continue;
                };
                let record: TransactionRecord = serde_json::from_slice(bytes)
                    .map_err(|e| EngineError::Stream(format!("decode record: {e}")))?;
                entries.push(StreamEntry {
                    id: raw.id.clone(),
                    record,
                });
            }
        }
        Ok(entries)
    }

    async fn ack(&self, group: &str, id: &StreamId) -> EngineResult<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn
            .xack(&self.key, group, &[id])
            .await
            .map_err(|e| EngineError::Stream(format!("xack: {e}")))?;
        Ok(())
    }

    async fn pending_count(&self, group: &str) -> EngineResult<usize> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamPendingReply = conn
            .xpending(&self.key, group)
            .await
            .map_err(|e| EngineError::Stream(format!("xpending: {e}")))?;
        Ok(reply.count())
    }

    async fn backlog(&self, _group: &str) -> EngineResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn
            .xlen(&self.key)
            .await
            .map_err(|e| EngineError::Stream(format!("xlen: {e}")))?;
        Ok(len)
    }
}
