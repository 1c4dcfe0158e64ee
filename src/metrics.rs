//! # Engine Metrics
//!
//! Process-wide counters maintained by the worker pool, broadcaster and
//! batch analyzer, plus an offline evaluation calculator for labelled
//! scoring runs.
//!
//! Drops are never silent: `records_dropped`, `retries_exhausted` and
//! `alerts_dropped` are incremented on every discard path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Shared atomic counters. Cheap to clone behind an `Arc`.
#[derive(Debug)]
pub struct EngineMetrics {
    pub records_processed: AtomicU64,
    /// Poison records ACKed and discarded.
    pub records_dropped: AtomicU64,
    pub invalid_records: AtomicU64,
    /// Store retries that ran out of budget.
    pub retries_exhausted: AtomicU64,
    pub store_retries: AtomicU64,
    pub alerts_published: AtomicU64,
    pub alerts_dropped: AtomicU64,
    pub deadline_exceeded: AtomicU64,
    pub analyzer_cycles: AtomicU64,
    pub analyzer_failures: AtomicU64,
    /// Cumulative scoring latency in microseconds.
    total_latency_us: AtomicU64,
    started_at: Instant,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            records_processed: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            invalid_records: AtomicU64::new(0),
            retries_exhausted: AtomicU64::new(0),
            store_retries: AtomicU64::new(0),
            alerts_published: AtomicU64::new(0),
            alerts_dropped: AtomicU64::new(0),
            deadline_exceeded: AtomicU64::new(0),
            analyzer_cycles: AtomicU64::new(0),
            analyzer_failures: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self, latency_us: u64) {
        self.records_processed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let n = self.records_processed.load(Ordering::Relaxed);
        if n == 0 {
            return 0.0;
        }
        self.total_latency_us.load(Ordering::Relaxed) as f64 / n as f64 / 1000.0
    }

    pub fn tps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64().max(1.0);
        self.records_processed.load(Ordering::Relaxed) as f64 / elapsed
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            invalid_records: self.invalid_records.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            store_retries: self.store_retries.load(Ordering::Relaxed),
            alerts_published: self.alerts_published.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
            deadline_exceeded: self.deadline_exceeded.load(Ordering::Relaxed),
            analyzer_cycles: self.analyzer_cycles.load(Ordering::Relaxed),
            analyzer_failures: self.analyzer_failures.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            tps: self.tps(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Serializable point-in-time view of [`EngineMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub records_processed: u64,
    pub records_dropped: u64,
    pub invalid_records: u64,
    pub retries_exhausted: u64,
    pub store_retries: u64,
    pub alerts_published: u64,
    pub alerts_dropped: u64,
    pub deadline_exceeded: u64,
    pub analyzer_cycles: u64,
    pub analyzer_failures: u64,
    pub avg_latency_ms: f64,
    pub tps: f64,
    pub uptime_secs: u64,
}

// ===== Offline evaluation =====

/// One scored transaction with its ground-truth label.
#[derive(Debug, Clone)]
pub struct LabelledResult {
    pub predicted_risk: f64,
    pub actual_is_fraud: bool,
    pub processing_time_ms: f64,
}

/// Aggregate precision/recall/latency report over a labelled run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub false_positive_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub risk_threshold: f64,
}

/// Collects labelled results and computes an [`EvaluationReport`].
#[derive(Debug)]
pub struct EvaluationCalculator {
    risk_threshold: f64,
    results: Vec<LabelledResult>,
}

impl EvaluationCalculator {
    pub fn new(risk_threshold: f64) -> Self {
        Self {
            risk_threshold,
            results: Vec::new(),
        }
    }

    pub fn add(&mut self, result: LabelledResult) {
        self.results.push(result);
    }

    pub fn compute(&self) -> EvaluationReport {
        let mut report = EvaluationReport {
            total: self.results.len(),
            risk_threshold: self.risk_threshold,
            ..Default::default()
        };
        if self.results.is_empty() {
            return report;
        }

        let mut latencies: Vec<f64> = Vec::with_capacity(self.results.len());
        for r in &self.results {
            let predicted = r.predicted_risk >= self.risk_threshold;
            match (predicted, r.actual_is_fraud) {
                (true, true) => report.true_positives += 1,
                (true, false) => report.false_positives += 1,
                (false, true) => report.false_negatives += 1,
                (false, false) => report.true_negatives += 1,
            }
            latencies.push(r.processing_time_ms);
        }

        let tp_fp = report.true_positives + report.false_positives;
        if tp_fp > 0 {
            report.precision = report.true_positives as f64 / tp_fp as f64;
        }
        let tp_fn = report.true_positives + report.false_negatives;
        if tp_fn > 0 {
            report.recall = report.true_positives as f64 / tp_fn as f64;
        }
        if report.precision + report.recall > 0.0 {
            report.f1_score =
                2.0 * report.precision * report.recall / (report.precision + report.recall);
        }
        let fp_tn = report.false_positives + report.true_negatives;
        if fp_tn > 0 {
            report.false_positive_rate = report.false_positives as f64 / fp_tn as f64;
        }

        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        report.avg_latency_ms = latencies.iter().sum::<f64>() / latencies.len() as f64;
        report.p95_latency_ms = percentile(&latencies, 0.95);
        report.p99_latency_ms = percentile(&latencies, 0.99);
        report
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = EngineMetrics::new();
        m.record_processed(2_000);
        m.record_processed(4_000);
        let snap = m.snapshot();
        assert_eq!(snap.records_processed, 2);
        assert!((snap.avg_latency_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn evaluation_confusion_matrix() {
        let mut calc = EvaluationCalculator::new(70.0);
        calc.add(LabelledResult { predicted_risk: 85.0, actual_is_fraud: true, processing_time_ms: 10.0 });
        calc.add(LabelledResult { predicted_risk: 75.0, actual_is_fraud: false, processing_time_ms: 12.0 });
        calc.add(LabelledResult { predicted_risk: 20.0, actual_is_fraud: true, processing_time_ms: 8.0 });
        calc.add(LabelledResult { predicted_risk: 10.0, actual_is_fraud: false, processing_time_ms: 9.0 });
        let report = calc.compute();
        assert_eq!(report.true_positives, 1);
        assert_eq!(report.false_positives, 1);
        assert_eq!(report.false_negatives, 1);
        assert_eq!(report.true_negatives, 1);
        assert!((report.precision - 0.5).abs() < 1e-9);
        assert!((report.recall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn percentile_interpolates() {
        let v = vec![1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&v, 0.5) - 2.5).abs() < 1e-9);
        assert!((percentile(&v, 1.0) - 4.0).abs() < 1e-9);
    }
}
