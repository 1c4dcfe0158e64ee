//! Dormant-account activation detection.
//!
//! A dormant account that suddenly moves money is the classic
//! mule-activation pattern: long inactivity, a volume spike against the
//! stored profile, a first strike after the sleep, and the
//! sleep-and-flash compound.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::store::{AccountProfile, GraphStore};
use crate::types::{AccountId, EngineResult};

/// Output of the dormant-account extractor.
#[derive(Debug, Clone, Default)]
pub struct DormantFeatures {
    pub risk: f64,
    pub is_dormant: bool,
    pub is_first_strike: bool,
    pub days_dormant: f64,
    pub inactivity_score: f64,
    pub spike_score: f64,
    pub first_strike_bonus: f64,
    pub sleep_flash: bool,
    pub sleep_flash_ratio: f64,
    pub low_activity: bool,
    pub flags: Vec<String>,
}

/// Stateless dormancy scorer.
pub struct DormantExtractor {
    store: Arc<dyn GraphStore>,
    config: Arc<EngineConfig>,
}

impl DormantExtractor {
    pub fn new(store: Arc<dyn GraphStore>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    pub async fn compute(
        &self,
        account: &AccountId,
        amount: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<DormantFeatures> {
        let profile = self.store.profile(account).await?.unwrap_or_default();
        Ok(self.score(&profile, amount, now))
    }

    fn score(&self, profile: &AccountProfile, amount: f64, now: DateTime<Utc>) -> DormantFeatures {
        let cfg = &self.config;
        let dormant_days = cfg.dormant_days as f64;

        let days_dormant = profile
            .last_active
            .map(|ts| ((now - ts).num_seconds() as f64 / 86_400.0).max(0.0))
            .unwrap_or(0.0);

        let is_dormant = profile.is_dormant;
        // The dormancy flag is only cleared by the batch analyzer after it
        // sees new activity, so a transaction scored while the flag holds
        // is the account's first strike out of its sleep.
        let is_first_strike = is_dormant;

        // Inactivity, up to 30.
        let inactivity_score = (days_dormant / dormant_days).min(1.0) * 30.0;

        // Spike vs stored profile, up to 30.
        let mean = profile.rolling_mean;
        let ratio = if mean > 0.0 { amount / mean } else { 0.0 };
        let spike_score = if mean > 0.0 {
            (ratio / 10.0).min(1.0) * 30.0
        } else if amount > 5_000.0 {
            25.0
        } else {
            0.0
        };
        let volume_spike = ratio >= 5.0;

        // First-strike bonus: 25 with a volume spike, 20 without.
        let first_strike_bonus = if is_first_strike && volume_spike {
            25.0
        } else if is_first_strike {
            20.0
        } else {
            0.0
        };

        // Sleep-and-flash compound.
        let sleep_flash = ratio >= cfg.signals.sleep_flash_ratio && days_dormant >= dormant_days;

        let low_activity = profile.tx_count <= 3;

        let risk = if is_dormant || is_first_strike || days_dormant > dormant_days {
            let mut r = inactivity_score
                + spike_score
                + first_strike_bonus
                + if low_activity { 10.0 } else { 0.0 };
            if sleep_flash {
                r += 20.0;
            }
            r
        } else {
            // Neither dormant nor a first strike: only the damped spike.
            spike_score * 0.3
        }
        .min(100.0);

        let mut flags = Vec::new();
        if is_first_strike {
            flags.push(format!(
                "First strike: dormant {}d, now active",
                days_dormant as i64
            ));
        }
        if spike_score > 20.0 {
            flags.push("Sudden volume spike on dormant account".to_string());
        }
        if sleep_flash {
            flags.push(format!(
                "Sleep-and-flash: amount {ratio:.0}x historical average after {}d dormant",
                days_dormant as i64
            ));
        }

        DormantFeatures {
            risk,
            is_dormant,
            is_first_strike,
            days_dormant,
            inactivity_score,
            spike_score,
            first_strike_bonus,
            sleep_flash,
            sleep_flash_ratio: ratio,
            low_activity,
            flags,
        }
    }

    /// Pass-through variant retained from an earlier rule set. Unreachable
    /// under the current rules; kept pending an explicit design decision.
    #[allow(dead_code)]
    async fn score_with_pass_through(
        &self,
        account: &AccountId,
        amount: f64,
        now: DateTime<Utc>,
    ) -> EngineResult<DormantFeatures> {
        let cfg = &self.config;
        let profile = self.store.profile(account).await?.unwrap_or_default();
        let mut features = self.score(&profile, amount, now);
        if !features.is_dormant && !features.is_first_strike {
            let window = self
                .store
                .activity_window(account, cfg.velocity_window_secs * 10, now)
                .await?;
            let pass_through = if window.total_received > 0.0 {
                window.total_sent / window.total_received
            } else {
                0.0
            };
            features.risk = (features.spike_score * 0.3
                + (pass_through / cfg.pass_through_ratio).min(1.0) * 30.0 * 0.3)
                .min(100.0);
        }
        Ok(features)
    }
}
