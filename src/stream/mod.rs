//! # Stream Adapter
//!
//! Durable, ordered, at-least-once transaction queue with consumer groups.
//! A record stays pending until acknowledged; records whose consumer died
//! are redelivered to a live consumer after a visibility timeout.
//!
//! Two backends share the [`TxStream`] trait: the in-process
//! [`MemoryStream`] (always available, used by tests and single-node
//! deployments) and, behind the `redis-stream` feature, a Redis Streams
//! implementation.

mod memory;
#[cfg(feature = "redis-stream")]
mod redis_backend;
pub mod simulator;

pub use memory::MemoryStream;
#[cfg(feature = "redis-stream")]
pub use redis_backend::RedisStream;

use async_trait::async_trait;

use crate::types::{EngineResult, TransactionRecord};

/// Position of a record in the stream.
pub type StreamId = String;

/// One delivered stream entry.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: StreamId,
    pub record: TransactionRecord,
}

/// Durable ordered queue with consumer-group delivery.
#[async_trait]
pub trait TxStream: Send + Sync {
    /// Append a record; returns its stream id.
    async fn append(&self, record: &TransactionRecord) -> EngineResult<StreamId>;

    /// Deliver up to `max_batch` records to `consumer` within `group`,
    /// blocking up to `block_ms` when the stream is drained. Expired
    /// pending records from dead consumers are redelivered first.
    async fn consume(
        &self,
        group: &str,
        consumer: &str,
        max_batch: usize,
        block_ms: u64,
    ) -> EngineResult<Vec<StreamEntry>>;

    /// Acknowledge a delivered record, removing it from the pending set.
    async fn ack(&self, group: &str, id: &StreamId) -> EngineResult<()>;

    /// Delivered-but-unacknowledged records for the group.
    async fn pending_count(&self, group: &str) -> EngineResult<usize>;

    /// Records appended and not yet delivered to the group (queue depth
    /// used for the backpressure high-water mark).
    async fn backlog(&self, group: &str) -> EngineResult<usize>;
}
