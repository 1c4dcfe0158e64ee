//! Behavioural anomaly extraction.
//!
//! Per-transaction signals from the sender's recent history: amount
//! z-score, burst velocity, impossible travel, night-time activity, IQR
//! outliers, dormant bursts, ASN risk, endpoint rotation, fixed-amount
//! repetition, circadian anomaly and identical-amount structuring.
//!
//! The circadian score is the base penalty here; the new-device compound
//! is resolved in fusion because the two signals originate in different
//! extractors.

use std::sync::Arc;

use crate::asn::AsnAssessment;
use crate::config::EngineConfig;
use crate::store::GraphStore;
use crate::types::{EngineResult, TransactionRecord};

use super::{haversine_km, iqr_outlier, mean_std};

/// Output of the behavioural extractor.
#[derive(Debug, Clone, Default)]
pub struct BehavioralFeatures {
    pub risk: f64,
    pub amount_zscore: f64,
    pub rolling_mean: f64,
    pub rolling_std: f64,
    pub time_since_last_secs: f64,
    pub velocity_score: f64,
    pub geo_distance_km: f64,
    pub impossible_travel: bool,
    pub is_night: bool,
    pub spike: bool,
    pub dormant_burst: bool,
    pub iqr_outlier: bool,
    pub asn: AsnAssessment,
    pub endpoint_rotation_count: usize,
    pub endpoint_rotation: bool,
    pub fixed_amount: bool,
    pub circadian_anomaly: bool,
    pub circadian_score: f64,
    pub identicality_count: usize,
    pub identicality: bool,
    pub flags: Vec<String>,
}

/// Stateless behavioural scorer.
pub struct BehavioralExtractor {
    store: Arc<dyn GraphStore>,
    config: Arc<EngineConfig>,
}

impl BehavioralExtractor {
    pub fn new(store: Arc<dyn GraphStore>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    pub async fn compute(
        &self,
        record: &TransactionRecord,
        asn: &AsnAssessment,
    ) -> EngineResult<BehavioralFeatures> {
        use chrono::Timelike;

        let cfg = &self.config;
        let sender = &record.sender_id;
        let amount = record.amount;
        let now = record.timestamp;

        let profile = self.store.profile(sender).await?.unwrap_or_default();

        // History excluding the record being scored (ingest ran first).
        let mut history = self
            .store
            .recent_outgoing(sender, cfg.behavioral_history + 1)
            .await?;
        history.retain(|t| t.tx_id != record.tx_id);
        history.truncate(cfg.behavioral_history);
        let amounts: Vec<f64> = history.iter().map(|t| t.amount).collect();

        // ----- amount z-score + 3-sigma spike -----
        let (amount_zscore, rolling_mean, rolling_std, spike) = if amounts.len() >= 2 {
            let (mean, std) = mean_std(&amounts);
            let std = if std > 0.0 { std } else { 1.0 };
            (
                (amount - mean) / std,
                mean,
                std,
                amount > mean + 3.0 * std,
            )
        } else if profile.rolling_mean > 0.0 {
            let mean = profile.rolling_mean;
            let std = if profile.rolling_std > 0.0 {
                profile.rolling_std
            } else {
                mean * 0.5
            };
            let std = std.max(mean * 0.5);
            (
                (amount - mean) / std,
                mean,
                std,
                amount > mean + 3.0 * std,
            )
        } else {
            (0.0, amount, 0.0, false)
        };

        let dormant_burst =
            profile.is_dormant && profile.rolling_mean > 0.0 && amount > profile.rolling_mean;

        // ----- velocity burst (sends + receives in the window) -----
        let window = self
            .store
            .activity_window(sender, cfg.velocity_window_secs, now)
            .await?;
        let velocity_score =
            (window.activity() as f64 / cfg.burst_threshold.max(1) as f64).min(1.0);

        // ----- temporal -----
        let hour = now.hour();
        let is_night = hour >= 23 || hour <= 5;
        let time_since_last_secs = history
            .first()
            .map(|t| (now - t.timestamp).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
            .max(0.0);

        // ----- impossible travel vs previous located transaction -----
        let mut geo_distance_km = 0.0;
        let mut impossible_travel = false;
        if let (Some(lat), Some(lon)) = (record.sender_lat, record.sender_lon) {
            if let Some(prev) = history
                .iter()
                .find(|t| t.lat.is_some() && t.lon.is_some())
            {
                let (p_lat, p_lon) = (prev.lat.unwrap_or(0.0), prev.lon.unwrap_or(0.0));
                geo_distance_km = haversine_km(p_lat, p_lon, lat, lon);
                let dt_hours = (now - prev.timestamp).num_milliseconds() as f64 / 3_600_000.0;
                if dt_hours > 0.0 {
                    impossible_travel =
                        geo_distance_km / dt_hours > cfg.impossible_travel_kmh;
                }
            }
        }

        // ----- IQR outlier -----
        let iqr = iqr_outlier(amount, &amounts);

        // ----- endpoint rotation (distinct endpoints in 24h) -----
        let endpoint_rotation_count = self.store.distinct_endpoints(sender, 24, now).await?;
        let endpoint_rotation = endpoint_rotation_count >= cfg.signals.endpoint_rotation_max;

        // ----- fixed-amount repetition -----
        let recent_amounts = self.store.recent_amounts(sender, 24, now).await?;
        let fixed_amount = if recent_amounts.len() >= cfg.signals.fixed_amount_min_count {
            let matching = recent_amounts
                .iter()
                .filter(|a| (*a - amount).abs() / amount.max(1.0) <= cfg.signals.fixed_amount_tolerance)
                .count();
            matching >= cfg.signals.fixed_amount_min_count
        } else {
            false
        };

        // ----- circadian anomaly -----
        let mut hist = self.store.hour_histogram(sender).await?;
        // The in-flight record is already ingested; score it against the
        // history that preceded it.
        let h = hour as usize;
        hist[h] = hist[h].saturating_sub(1);
        let total: u64 = hist.iter().sum();
        let distinct_hours = hist.iter().filter(|&&c| c > 0).count();
        let mut circadian_anomaly = false;
        let mut circadian_score = 0.0;
        if total >= 10 && distinct_hours >= 3 {
            let freq = hist[h] as f64 / total as f64;
            if freq < 0.02 {
                circadian_anomaly = true;
                circadian_score = cfg.signals.circadian_penalty;
            }
        }

        // ----- identical-amount structuring -----
        let identicality_count = self
            .store
            .identical_transfer_count(
                sender,
                &record.receiver_id,
                amount,
                1.0,
                cfg.signals.identicality_window_hours,
                now,
            )
            .await?;
        let identicality = identicality_count >= cfg.signals.identicality_min_count;

        // ----- fuse into [0, 100] -----
        let mut risk = 0.0;
        risk += (amount_zscore.abs() * 10.0).min(30.0);
        risk += velocity_score * 20.0;
        if impossible_travel {
            risk += 20.0;
        }
        if is_night {
            risk += 5.0;
        }
        if iqr {
            risk += 15.0;
        }
        if spike {
            risk += 10.0;
        }
        if dormant_burst {
            risk += 15.0;
        }
        risk += asn.risk_scaled;
        if endpoint_rotation {
            risk += cfg.signals.endpoint_rotation_penalty;
        }
        if fixed_amount {
            risk += cfg.signals.fixed_amount_penalty;
        }
        risk += circadian_score;
        if identicality {
            risk += cfg.signals.identicality_penalty;
        }
        let risk = risk.min(100.0);

        // ----- flags -----
        let mut flags = Vec::new();
        if spike {
            flags.push(format!("Amount spike: {amount_zscore:.1}σ above baseline"));
        }
        if dormant_burst {
            flags.push("Dormant burst: amount exceeds historical average".to_string());
        }
        if impossible_travel {
            flags.push(format!("Impossible travel: {geo_distance_km:.0} km"));
        }
        if is_night {
            flags.push("Night-time transaction".to_string());
        }
        if let Some(info) = &asn.info {
            if asn.risk >= 0.5 {
                flags.push(format!(
                    "ASN risk ({}): score={:.2}",
                    info.class.as_str(),
                    asn.risk
                ));
            }
            if info.foreign {
                flags.push(format!("Foreign IP: {} ({})", info.org_name, info.country));
            }
            if asn.drift {
                flags.push("ASN drift: network differs from usual pattern".to_string());
            }
        }
        if endpoint_rotation {
            flags.push(format!(
                "Endpoint rotation: {endpoint_rotation_count} distinct endpoints in 24h"
            ));
        }
        if fixed_amount {
            flags.push(format!("Fixed-amount pattern: repeated {amount:.2} transfers"));
        }
        if circadian_anomaly {
            flags.push(format!("Circadian anomaly: hour {hour} is unusual for sender"));
        }
        if identicality {
            flags.push(format!(
                "Identical transfers: {identicality_count} same-amount transfers to one receiver within {}h",
                cfg.signals.identicality_window_hours
            ));
        }

        Ok(BehavioralFeatures {
            risk,
            amount_zscore,
            rolling_mean,
            rolling_std,
            time_since_last_secs,
            velocity_score,
            geo_distance_km,
            impossible_travel,
            is_night,
            spike,
            dormant_burst,
            iqr_outlier: iqr,
            asn: asn.clone(),
            endpoint_rotation_count,
            endpoint_rotation,
            fixed_amount,
            circadian_anomaly,
            circadian_score,
            identicality_count,
            identicality,
            flags,
        })
    }
}
