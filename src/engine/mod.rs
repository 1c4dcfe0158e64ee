//! # Risk Engine
//!
//! Orchestrates the full per-transaction pipeline: ingest with retry, ASN
//! enrichment, the five-way extractor fan-out joined before fusion, the
//! weighted combination, mule classification, risk write-back and alert
//! publication. The same pipeline backs both the stream workers and the
//! synchronous scoring endpoint.

pub mod explain;
pub mod mule;
pub mod worker;

pub use mule::MuleClassifier;
pub use worker::WorkerPool;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::alerts::AlertBroadcaster;
use crate::analyzer::CollusionCache;
use crate::asn::{AsnAssessment, AsnResolver};
use crate::config::EngineConfig;
use crate::features::{
    BehavioralExtractor, DeviceExtractor, DormantExtractor, GraphExtractor, VelocityExtractor,
};
use crate::metrics::EngineMetrics;
use crate::store::{GraphStore, RetryPolicy};
use crate::types::{
    EngineError, EngineResult, RiskBreakdown, RiskLevel, ScoredRecord, TransactionRecord,
};

/// Central scoring engine; one instance per process.
pub struct RiskEngine {
    store: Arc<dyn GraphStore>,
    resolver: Arc<AsnResolver>,
    collusion: Arc<CollusionCache>,
    alerts: AlertBroadcaster,
    metrics: Arc<EngineMetrics>,
    config: Arc<EngineConfig>,
    retry: RetryPolicy,

    behavioral: BehavioralExtractor,
    dormant: DormantExtractor,
    device: DeviceExtractor,
    graph: GraphExtractor,
    velocity: VelocityExtractor,
}

impl RiskEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        resolver: Arc<AsnResolver>,
        collusion: Arc<CollusionCache>,
        alerts: AlertBroadcaster,
        metrics: Arc<EngineMetrics>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            behavioral: BehavioralExtractor::new(store.clone(), config.clone()),
            dormant: DormantExtractor::new(store.clone(), config.clone()),
            device: DeviceExtractor::new(store.clone(), config.clone()),
            graph: GraphExtractor::new(store.clone()),
            velocity: VelocityExtractor::new(store.clone(), config.clone()),
            store,
            resolver,
            collusion,
            alerts,
            metrics,
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn alerts(&self) -> &AlertBroadcaster {
        &self.alerts
    }

    /// Score one record end to end. The soft deadline covers ingest, the
    /// extractor fan-out and the risk write-back; on expiry all
    /// outstanding extractor work is dropped and the error propagates so
    /// the caller can leave the record un-ACKed.
    pub async fn score(&self, record: &TransactionRecord) -> EngineResult<ScoredRecord> {
        record.validate()?;
        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.record_deadline_ms);

        let scored = match tokio::time::timeout(deadline, self.score_inner(record, started)).await {
            Ok(result) => result?,
            Err(_) => {
                self.metrics
                    .deadline_exceeded
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(EngineError::DeadlineExceeded(
                    self.config.record_deadline_ms,
                ));
            }
        };

        // Alerts are fire-and-forget and excluded from the deadline.
        if scored.risk_score >= self.config.medium_threshold {
            self.alerts.publish(scored.clone());
        }
        Ok(scored)
    }

    async fn score_inner(
        &self,
        record: &TransactionRecord,
        started: Instant,
    ) -> EngineResult<ScoredRecord> {
        let cfg = &self.config;

        // 1. Ingest under the transient-conflict budget.
        self.retry
            .run(&self.metrics, || self.store.ingest_transaction(record))
            .await?;

        // 2. ASN enrichment, endpoint write included.
        let asn = match &record.ip_address {
            Some(ip) => {
                let assessment = self
                    .resolver
                    .assess(self.store.as_ref(), &record.sender_id, ip)
                    .await?;
                if let Some(info) = &assessment.info {
                    self.store
                        .record_endpoint(&record.sender_id, ip, info, record.timestamp)
                        .await?;
                }
                assessment
            }
            None => AsnAssessment::default(),
        };

        // 3. Five-way fan-out, joined before fusion.
        let (behavioral, dormant, device, graph, velocity) = tokio::try_join!(
            self.behavioral.compute(record, &asn),
            self.dormant
                .compute(&record.sender_id, record.amount, record.timestamp),
            self.device.compute(record),
            self.graph.compute(&record.sender_id),
            self.velocity
                .compute(&record.sender_id, record.amount, record.timestamp),
        )?;

        // 4. Circadian x new-device compound: the signals originate in two
        //    different extractors, so the boost lands here.
        let mut s_behavioral = behavioral.risk;
        if behavioral.circadian_anomaly && device.new_device {
            let boost =
                cfg.signals.circadian_new_device_penalty - cfg.signals.circadian_penalty;
            s_behavioral = (s_behavioral + boost).min(100.0);
        }

        // 5. Weighted fusion.
        let weights = &cfg.weights;
        let fused = (weights.graph * graph.risk
            + weights.behavioral * s_behavioral
            + weights.device * device.risk
            + weights.dead_account * dormant.risk
            + weights.velocity * velocity.risk)
            .min(100.0);

        let risk_level = if fused >= cfg.high_threshold {
            RiskLevel::High
        } else if fused >= cfg.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        // 6. Flags: extractor flags, cached collusion flags, mule verdict.
        let mut flags: Vec<String> = Vec::new();
        flags.extend(behavioral.flags.iter().cloned());
        flags.extend(dormant.flags.iter().cloned());
        flags.extend(device.flags.iter().cloned());
        flags.extend(graph.flags.iter().cloned());
        flags.extend(velocity.flags.iter().cloned());

        let snapshot = self.collusion.load();
        flags.extend(snapshot.account_flags(&record.sender_id).iter().cloned());

        let mule = MuleClassifier::evaluate(
            cfg, &behavioral, &dormant, &device, &graph, &velocity, fused,
        );
        if mule.is_mule {
            flags.push(format!(
                "MULE SUSPECTED (confidence={:.0}%)",
                mule.confidence * 100.0
            ));
            flags.extend(mule.reasons.iter().cloned());
        }
        dedup_preserving_order(&mut flags);

        let cluster_id = graph
            .community_id
            .or_else(|| snapshot.account_cluster(&record.sender_id))
            .map(|id| id.to_string());

        // 7. Explanation, derived purely from the fired booleans.
        let reason = explain::build_reason(
            cfg, &behavioral, &dormant, &device, &graph, &velocity, fused,
        );

        // 8. Risk write-back, last-writer-wins on the account.
        self.retry
            .run(&self.metrics, || {
                self.store
                    .persist_risk(&record.tx_id, &record.sender_id, fused)
            })
            .await?;

        Ok(ScoredRecord {
            tx_id: record.tx_id.clone(),
            risk_score: round2(fused),
            risk_level,
            breakdown: RiskBreakdown {
                graph: round2(graph.risk),
                behavioral: round2(s_behavioral),
                device: round2(device.risk),
                dead_account: round2(dormant.risk),
                velocity: round2(velocity.risk),
            },
            cluster_id,
            flags,
            reason,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: record.timestamp,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn dedup_preserving_order(flags: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    flags.retain(|flag| seen.insert(flag.clone()));
}

/// Log-and-classify helper shared by the worker loop and the API.
pub(crate) fn describe_failure(err: &EngineError) -> &'static str {
    match err {
        EngineError::InvalidInput(_) => "invalid_input",
        EngineError::TransientStore(_) => "transient_store",
        EngineError::Store(_) => "store",
        EngineError::Extractor(_) => "extractor",
        EngineError::DeadlineExceeded(_) => "deadline",
        EngineError::Subscriber(_) => "subscriber",
        EngineError::Analyzer(_) => "analyzer",
        EngineError::Stream(_) => "stream",
        EngineError::Configuration(_) => "configuration",
    }
}

/// Convenience constructor wiring every shared component together.
pub fn build_engine(
    store: Arc<dyn GraphStore>,
    resolver: Arc<AsnResolver>,
    collusion: Arc<CollusionCache>,
    metrics: Arc<EngineMetrics>,
    config: Arc<EngineConfig>,
) -> EngineResult<Arc<RiskEngine>> {
    if let Err(err) = config.weights.validate() {
        warn!(%err, "rejecting engine construction");
        return Err(err);
    }
    let alerts = AlertBroadcaster::new(config.alert_capacity, metrics.clone());
    Ok(Arc::new(RiskEngine::new(
        store, resolver, collusion, alerts, metrics, config,
    )))
}
