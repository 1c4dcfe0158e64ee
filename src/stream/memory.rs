//! In-process durable queue with consumer-group semantics.
//!
//! The log is append-only; each group tracks a delivery cursor and a
//! pending map of delivered, un-ACKed entries. Entries whose visibility
//! timeout expired are redelivered before new ones are handed out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::types::{EngineResult, TransactionRecord};

use super::{StreamEntry, StreamId, TxStream};

struct PendingEntry {
    index: usize,
    #[allow(dead_code)]
    consumer: String,
    delivered_at: Instant,
}

#[derive(Default)]
struct GroupState {
    cursor: usize,
    pending: HashMap<StreamId, PendingEntry>,
}

#[derive(Default)]
struct Log {
    entries: Vec<(StreamId, TransactionRecord)>,
    groups: HashMap<String, GroupState>,
    next_seq: u64,
}

/// Always-available in-memory [`TxStream`] backend.
pub struct MemoryStream {
    log: Mutex<Log>,
    notify: Arc<Notify>,
    visibility_timeout: Duration,
}

impl MemoryStream {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            log: Mutex::new(Log::default()),
            notify: Arc::new(Notify::new()),
            visibility_timeout,
        }
    }

    /// Total records ever appended.
    pub fn len(&self) -> usize {
        self.log.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drain_ready(&self, group: &str, consumer: &str, max_batch: usize) -> Vec<StreamEntry> {
        let mut log = self.log.lock();
        let now = Instant::now();
        let timeout = self.visibility_timeout;

        let state = log.groups.entry(group.to_string()).or_default();
        let mut out = Vec::new();

        // Redeliver entries whose visibility timeout expired.
        let expired: Vec<StreamId> = state
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.delivered_at) >= timeout)
            .map(|(id, _)| id.clone())
            .take(max_batch)
            .collect();
        for id in expired {
            if let Some(p) = state.pending.get_mut(&id) {
                p.delivered_at = now;
                p.consumer = consumer.to_string();
                out.push(p.index);
            }
        }

        // Then fresh entries from the cursor.
        let entries_len = log.entries.len();
        let state = log.groups.get_mut(group).expect("group just inserted");
        let mut delivered_indices: Vec<usize> = out;
        while delivered_indices.len() < max_batch && state.cursor < entries_len {
            let index = state.cursor;
            state.cursor += 1;
            delivered_indices.push(index);
        }

        let mut result = Vec::with_capacity(delivered_indices.len());
        for index in delivered_indices {
            let (id, record) = log.entries[index].clone();
            log.groups
                .get_mut(group)
                .expect("group exists")
                .pending
                .entry(id.clone())
                .or_insert(PendingEntry {
                    index,
                    consumer: consumer.to_string(),
                    delivered_at: now,
                })
                .delivered_at = now;
            result.push(StreamEntry { id, record });
        }
        result
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl TxStream for MemoryStream {
    async fn append(&self, record: &TransactionRecord) -> EngineResult<StreamId> {
        let id = {
            let mut log = self.log.lock();
            log.next_seq += 1;
            let id = format!("{}-0", log.next_seq);
            log.entries.push((id.clone(), record.clone()));
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn consume(
        &self,
        group: &str,
        consumer: &str,
        max_batch: usize,
        block_ms: u64,
    ) -> EngineResult<Vec<StreamEntry>> {
        let batch = self.drain_ready(group, consumer, max_batch);
        if !batch.is_empty() || block_ms == 0 {
            return Ok(batch);
        }
        // Drained: wait for an append or the block budget, then try once more.
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(Duration::from_millis(block_ms)) => {}
        }
        Ok(self.drain_ready(group, consumer, max_batch))
    }

    async fn ack(&self, group: &str, id: &StreamId) -> EngineResult<()> {
        let mut log = self.log.lock();
        if let Some(state) = log.groups.get_mut(group) {
            state.pending.remove(id);
        }
        Ok(())
    }

    async fn pending_count(&self, group: &str) -> EngineResult<usize> {
        let log = self.log.lock();
        Ok(log
            .groups
            .get(group)
            .map(|s| s.pending.len())
            .unwrap_or(0))
    }

    async fn backlog(&self, group: &str) -> EngineResult<usize> {
        let log = self.log.lock();
        let cursor = log.groups.get(group).map(|s| s.cursor).unwrap_or(0);
        Ok(log.entries.len().saturating_sub(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxId;
    use chrono::Utc;

    fn record(tx: &str) -> TransactionRecord {
        TransactionRecord {
            tx_id: TxId(tx.to_string()),
            sender_id: "a".into(),
            receiver_id: "b".into(),
            amount: 10.0,
            timestamp: Utc::now(),
            device_hash: "d".into(),
            device_os: None,
            capability_mask: None,
            ip_address: None,
            sender_lat: None,
            sender_lon: None,
            channel: Default::default(),
            credential_type: Default::default(),
            upi_id_sender: None,
            upi_id_receiver: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn delivery_is_per_consumer_within_group() {
        let stream = MemoryStream::default();
        stream.append(&record("t1")).await.unwrap();
        stream.append(&record("t2")).await.unwrap();

        let a = stream.consume("g", "c1", 1, 0).await.unwrap();
        let b = stream.consume("g", "c2", 1, 0).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_ne!(a[0].record.tx_id, b[0].record.tx_id);
    }

    #[tokio::test]
    async fn record_stays_pending_until_acked() {
        let stream = MemoryStream::default();
        stream.append(&record("t1")).await.unwrap();

        let batch = stream.consume("g", "c1", 10, 0).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(stream.pending_count("g").await.unwrap(), 1);

        stream.ack("g", &batch[0].id).await.unwrap();
        assert_eq!(stream.pending_count("g").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unacked_record_redelivered_after_visibility_timeout() {
        let stream = MemoryStream::new(Duration::from_millis(20));
        stream.append(&record("t1")).await.unwrap();

        let first = stream.consume("g", "dead-worker", 10, 0).await.unwrap();
        assert_eq!(first.len(), 1);

        // Not yet expired: nothing to hand out.
        let nothing = stream.consume("g", "live-worker", 10, 0).await.unwrap();
        assert!(nothing.is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let redelivered = stream.consume("g", "live-worker", 10, 0).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].record.tx_id, first[0].record.tx_id);
    }

    #[tokio::test]
    async fn separate_groups_see_all_records() {
        let stream = MemoryStream::default();
        stream.append(&record("t1")).await.unwrap();
        let a = stream.consume("g1", "c", 10, 0).await.unwrap();
        let b = stream.consume("g2", "c", 10, 0).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn backlog_reflects_undelivered_records() {
        let stream = MemoryStream::default();
        for i in 0..5 {
            stream.append(&record(&format!("t{i}"))).await.unwrap();
        }
        assert_eq!(stream.backlog("g").await.unwrap(), 5);
        stream.consume("g", "c", 2, 0).await.unwrap();
        assert_eq!(stream.backlog("g").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn blocking_consume_wakes_on_append() {
        let stream = Arc::new(MemoryStream::default());
        let consumer = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.consume("g", "c", 1, 1_000).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.append(&record("t1")).await.unwrap();
        let batch = consumer.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }
}
