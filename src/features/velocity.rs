//! Velocity and pass-through extraction.
//!
//! Measures how fast money moves through an account inside the sliding
//! window. High turnover with inflow ≈ outflow is a strong relay-mule
//! indicator.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::store::GraphStore;
use crate::types::{AccountId, EngineResult};

/// Output of the velocity extractor.
#[derive(Debug, Clone, Default)]
pub struct VelocityFeatures {
    pub risk: f64,
    pub sends: usize,
    pub receives: usize,
    pub total_sent: f64,
    pub total_received: f64,
    pub outflow_inflow_ratio: f64,
    pub burst_score: f64,
    pub pass_through_score: f64,
    pub tx_per_min: f64,
    pub single_dominance: bool,
    pub flags: Vec<String>,
}

/// Stateless velocity scorer.
pub struct VelocityExtractor {
    store: Arc<dyn GraphStore>,
    config: Arc<EngineConfig>,
}

impl VelocityExtractor {
    pub fn new(store: Arc<dyn GraphStore>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    pub async fn compute(
        &self,
        account: &AccountId,
        amount: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<VelocityFeatures> {
        let cfg = &self.config;
        let window = self
            .store
            .activity_window(account, cfg.velocity_window_secs, now)
            .await?;

        let activity = window.activity();
        let burst_score = if activity >= cfg.burst_threshold {
            30.0
        } else if activity >= cfg.burst_threshold / 2 {
            15.0
        } else {
            0.0
        };

        let outflow_inflow_ratio = if window.total_received > 0.0 {
            window.total_sent / window.total_received
        } else {
            0.0
        };
        let pass_through_score = if window.total_received > 0.0 {
            if outflow_inflow_ratio > cfg.pass_through_ratio {
                (outflow_inflow_ratio / 1.5).min(1.0) * 35.0
            } else if outflow_inflow_ratio > 0.5 {
                10.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let tx_per_min = activity as f64 / (cfg.velocity_window_secs as f64 / 60.0).max(1.0);
        let velocity_component = (activity as f64 / 10.0).min(1.0) * 20.0;

        let single_dominance = window.total_sent > 0.0 && amount / window.total_sent > 0.80;
        let dominance_score = if single_dominance { 15.0 } else { 0.0 };

        let risk =
            (burst_score + pass_through_score + velocity_component + dominance_score).min(100.0);

        let mut flags = Vec::new();
        if burst_score >= 30.0 {
            flags.push("Transaction burst detected".to_string());
        }
        if pass_through_score > 25.0 {
            flags.push("Rapid pass-through pattern".to_string());
        }
        if tx_per_min > 5.0 {
            flags.push(format!("High velocity: {tx_per_min:.1} tx/min"));
        }

        Ok(VelocityFeatures {
            risk,
            sends: window.sends,
            receives: window.receives,
            total_sent: window.total_sent,
            total_received: window.total_received,
            outflow_inflow_ratio,
            burst_score,
            pass_through_score,
            tx_per_min,
            single_dominance,
            flags,
        })
    }
}
