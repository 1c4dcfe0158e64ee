//! Stream worker pool.
//!
//! N parallel consumers drain the transaction stream in bounded batches.
//! Per record: score through the engine pipeline, then ACK on success or
//! poison-drop; transient exhaustion, store faults and blown deadlines
//! leave the record un-ACKed for redelivery.
//!
//! Backpressure: when the stream backlog crosses the high-water mark the
//! workers halve their batch size, and a shared EWMA of transient store
//! failures drives a common backoff sleep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics::EngineMetrics;
use crate::stream::TxStream;
use crate::types::EngineError;

use super::{describe_failure, RiskEngine};

/// EWMA smoothing for the shared transient-failure signal.
const EWMA_ALPHA: f64 = 0.2;
/// Above this failure rate the pool sleeps between batches.
const EWMA_BACKOFF_THRESHOLD: f64 = 0.5;
const EWMA_SCALE: f64 = 1_000.0;

/// Pool of stream consumers.
pub struct WorkerPool {
    engine: Arc<RiskEngine>,
    stream: Arc<dyn TxStream>,
    metrics: Arc<EngineMetrics>,
    running: Arc<RwLock<bool>>,
    /// Shared transient-failure EWMA, scaled by `EWMA_SCALE`.
    failure_ewma: Arc<AtomicU64>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(engine: Arc<RiskEngine>, stream: Arc<dyn TxStream>) -> Self {
        let metrics = engine.metrics().clone();
        Self {
            engine,
            stream,
            metrics,
            running: Arc::new(RwLock::new(false)),
            failure_ewma: Arc::new(AtomicU64::new(0)),
            handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Spawn the configured number of workers.
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("worker pool already running");
                return;
            }
            *running = true;
        }
        let config = self.engine.config();
        let count = config.worker_count.max(1);
        let mut handles = self.handles.lock();
        for i in 0..count {
            let worker = Worker {
                name: format!("worker-{i}"),
                engine: self.engine.clone(),
                stream: self.stream.clone(),
                metrics: self.metrics.clone(),
                running: self.running.clone(),
                failure_ewma: self.failure_ewma.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        info!(workers = count, group = %config.consumer_group, "worker pool started");
    }

    /// Signal shutdown and wait for the workers to finish their batches.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!("worker pool stopped");
    }
}

struct Worker {
    name: String,
    engine: Arc<RiskEngine>,
    stream: Arc<dyn TxStream>,
    metrics: Arc<EngineMetrics>,
    running: Arc<RwLock<bool>>,
    failure_ewma: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self) {
        let config = self.engine.config().clone();
        let group = config.consumer_group.clone();
        debug!(worker = %self.name, "consumer started");

        while *self.running.read().await {
            // Backpressure: halve the batch above the high-water mark.
            let backlog = self.stream.backlog(&group).await.unwrap_or(0);
            let batch_size = if backlog > config.backpressure_high_water {
                (config.worker_batch_size / 2).max(1)
            } else {
                config.worker_batch_size
            };

            // A hot transient-failure EWMA puts the whole pool to sleep.
            let ewma = self.failure_ewma.load(Ordering::Relaxed) as f64 / EWMA_SCALE;
            if ewma > EWMA_BACKOFF_THRESHOLD {
                let sleep_ms = (ewma * 400.0) as u64;
                debug!(worker = %self.name, ewma, sleep_ms, "store under pressure, backing off");
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            }

            let entries = match self
                .stream
                .consume(&group, &self.name, batch_size, 1_000)
                .await
            {
                Ok(entries) => entries,
                Err(err) => {
                    error!(worker = %self.name, %err, "stream consume failed");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
            };

            for entry in entries {
                let started = std::time::Instant::now();
                match self.engine.score(&entry.record).await {
                    Ok(scored) => {
                        self.observe_outcome(false);
                        if let Err(err) = self.stream.ack(&group, &entry.id).await {
                            warn!(worker = %self.name, %err, "ack failed, record will redeliver");
                            continue;
                        }
                        self.metrics
                            .record_processed(started.elapsed().as_micros() as u64);
                        if self.metrics.records_processed.load(Ordering::Relaxed) % 100 == 0 {
                            info!(
                                worker = %self.name,
                                processed = self.metrics.records_processed.load(Ordering::Relaxed),
                                avg_ms = self.metrics.avg_latency_ms(),
                                tps = self.metrics.tps(),
                                "throughput checkpoint"
                            );
                        }
                        debug!(
                            worker = %self.name,
                            tx_id = %scored.tx_id,
                            risk = scored.risk_score,
                            "record scored"
                        );
                    }
                    Err(err) if err.is_poison() => {
                        // Structured reject: drop the poison message.
                        self.observe_outcome(false);
                        self.metrics.invalid_records.fetch_add(1, Ordering::Relaxed);
                        self.metrics.records_dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            worker = %self.name,
                            tx_id = %entry.record.tx_id,
                            %err,
                            "invalid record dropped"
                        );
                        let _ = self.stream.ack(&group, &entry.id).await;
                    }
                    Err(err) => {
                        // Store faults, blown deadlines and extractor
                        // failures leave the record for redelivery.
                        let transient = matches!(err, EngineError::TransientStore(_));
                        self.observe_outcome(transient);
                        error!(
                            worker = %self.name,
                            tx_id = %entry.record.tx_id,
                            kind = describe_failure(&err),
                            %err,
                            "record failed, left un-ACKed"
                        );
                    }
                }
            }
        }
        debug!(worker = %self.name, "consumer stopped");
    }

    fn observe_outcome(&self, transient_failure: bool) {
        let sample = if transient_failure { 1.0 } else { 0.0 };
        let current = self.failure_ewma.load(Ordering::Relaxed) as f64 / EWMA_SCALE;
        let next = (1.0 - EWMA_ALPHA) * current + EWMA_ALPHA * sample;
        self.failure_ewma
            .store((next * EWMA_SCALE) as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertBroadcaster;
    use crate::analyzer::CollusionCache;
    use crate::asn::AsnResolver;
    use crate::config::EngineConfig;
    use crate::store::MemoryGraphStore;
    use crate::stream::MemoryStream;
    use crate::types::{TransactionRecord, TxId};
    use chrono::Utc;
    use std::collections::HashMap;

    fn record(tx: &str, amount: f64) -> TransactionRecord {
        TransactionRecord {
            tx_id: TxId(tx.to_string()),
            sender_id: "a".into(),
            receiver_id: "b".into(),
            amount,
            timestamp: Utc::now(),
            device_hash: "d".into(),
            device_os: Some("Android 14".into()),
            capability_mask: None,
            ip_address: None,
            sender_lat: None,
            sender_lon: None,
            channel: Default::default(),
            credential_type: Default::default(),
            upi_id_sender: None,
            upi_id_receiver: None,
            extra: HashMap::new(),
        }
    }

    fn pool(stream: Arc<MemoryStream>) -> WorkerPool {
        let config = Arc::new(EngineConfig {
            worker_count: 2,
            ..Default::default()
        });
        let metrics = Arc::new(EngineMetrics::new());
        let alerts = AlertBroadcaster::new(16, metrics.clone());
        let engine = Arc::new(RiskEngine::new(
            Arc::new(MemoryGraphStore::new()),
            Arc::new(AsnResolver::disabled("IN")),
            Arc::new(CollusionCache::new()),
            alerts,
            metrics,
            config,
        ));
        WorkerPool::new(engine, stream)
    }

    #[tokio::test]
    async fn workers_drain_and_ack_the_stream() {
        let stream = Arc::new(MemoryStream::default());
        for i in 0..20 {
            stream.append(&record(&format!("t{i}"), 100.0)).await.unwrap();
        }
        let pool = pool(stream.clone());
        pool.start().await;

        // Wait for the queue to drain.
        let mut drained = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let backlog = stream.backlog("fraud_workers").await.unwrap();
            let pending = stream.pending_count("fraud_workers").await.unwrap();
            if backlog == 0 && pending == 0 {
                drained = true;
                break;
            }
        }
        pool.stop().await;
        assert!(drained, "stream did not drain");
        assert_eq!(
            pool.metrics.records_processed.load(Ordering::Relaxed),
            20
        );
    }

    #[tokio::test]
    async fn poison_records_are_acked_and_counted() {
        let stream = Arc::new(MemoryStream::default());
        stream.append(&record("bad", -10.0)).await.unwrap();
        stream.append(&record("good", 10.0)).await.unwrap();

        let pool = pool(stream.clone());
        pool.start().await;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if stream.pending_count("fraud_workers").await.unwrap() == 0
                && stream.backlog("fraud_workers").await.unwrap() == 0
            {
                break;
            }
        }
        pool.stop().await;

        assert_eq!(pool.metrics.invalid_records.load(Ordering::Relaxed), 1);
        assert_eq!(pool.metrics.records_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(pool.metrics.records_processed.load(Ordering::Relaxed), 1);
    }
}
