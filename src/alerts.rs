//! # Alert Broadcaster
//!
//! Fan-out of scored records at or above the medium threshold to an
//! in-process subscriber set. Publishing never blocks the worker: the
//! underlying broadcast channel drops messages for lagging subscribers,
//! and closed receivers prune themselves when dropped.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::metrics::EngineMetrics;
use crate::types::ScoredRecord;

/// Shared broadcaster handle. Cheap to clone.
#[derive(Clone)]
pub struct AlertBroadcaster {
    tx: broadcast::Sender<ScoredRecord>,
    metrics: Arc<EngineMetrics>,
}

impl AlertBroadcaster {
    pub fn new(capacity: usize, metrics: Arc<EngineMetrics>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, metrics }
    }

    /// Publish an alert. Fire-and-forget: with no subscribers the record
    /// is counted as dropped, never treated as a failure.
    pub fn publish(&self, record: ScoredRecord) {
        match self.tx.send(record) {
            Ok(receivers) => {
                self.metrics.alerts_published.fetch_add(1, Ordering::Relaxed);
                debug!(receivers, "alert published");
            }
            Err(_) => {
                self.metrics.alerts_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("no alert subscribers, record dropped");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScoredRecord> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskBreakdown, RiskLevel, TxId};
    use chrono::Utc;

    fn scored(risk: f64) -> ScoredRecord {
        ScoredRecord {
            tx_id: TxId::new(),
            risk_score: risk,
            risk_level: RiskLevel::Medium,
            breakdown: RiskBreakdown::default(),
            cluster_id: None,
            flags: vec![],
            reason: String::new(),
            processing_time_ms: 1.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_alert() {
        let metrics = Arc::new(EngineMetrics::new());
        let alerts = AlertBroadcaster::new(16, metrics.clone());
        let mut rx = alerts.subscribe();
        alerts.publish(scored(55.0));
        let got = rx.recv().await.unwrap();
        assert!((got.risk_score - 55.0).abs() < 1e-9);
        assert_eq!(metrics.alerts_published.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_counts_drop() {
        let metrics = Arc::new(EngineMetrics::new());
        let alerts = AlertBroadcaster::new(16, metrics.clone());
        alerts.publish(scored(80.0));
        assert_eq!(metrics.alerts_dropped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn slow_subscriber_misses_overflowed_messages() {
        let metrics = Arc::new(EngineMetrics::new());
        let alerts = AlertBroadcaster::new(2, metrics);
        let mut rx = alerts.subscribe();
        for i in 0..5 {
            alerts.publish(scored(40.0 + i as f64));
        }
        // The first recv reports the lag, subsequent ones drain what's left.
        let first = rx.recv().await;
        assert!(matches!(
            first,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert!(rx.recv().await.is_ok());
    }
}
