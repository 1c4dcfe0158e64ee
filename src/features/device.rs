//! Device-sharing and device-drift risk extraction.
//!
//! Signals around shared devices, risk propagation from co-located users,
//! multi-user bursts, OS/capability drift, and first-seen devices paired
//! with high amounts over MPIN.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::store::GraphStore;
use crate::types::{CredentialType, EngineResult, TransactionRecord};

/// Output of the device extractor.
#[derive(Debug, Clone, Default)]
pub struct DeviceFeatures {
    pub risk: f64,
    pub account_count: usize,
    pub new_device: bool,
    pub multi_user_count: usize,
    pub multi_user_burst: bool,
    pub cap_mask_hamming: usize,
    pub drift_score: f64,
    pub new_device_high_mpin: bool,
    pub os_anomaly: bool,
    pub max_user_risk: f64,
    pub avg_user_risk: f64,
    pub flags: Vec<String>,
}

/// Count of differing bits between two mask strings, shorter one
/// zero-padded on the left.
fn hamming_distance(a: &str, b: &str) -> usize {
    let width = a.len().max(b.len());
    let pad = |s: &str| -> Vec<u8> {
        let mut v = vec![b'0'; width - s.len()];
        v.extend_from_slice(s.as_bytes());
        v
    };
    pad(a).iter().zip(pad(b).iter()).filter(|(x, y)| x != y).count()
}

fn os_family(os: &str) -> String {
    os.split_whitespace()
        .next()
        .unwrap_or(os)
        .to_ascii_lowercase()
}

/// Stateless device scorer.
pub struct DeviceExtractor {
    store: Arc<dyn GraphStore>,
    config: Arc<EngineConfig>,
}

impl DeviceExtractor {
    pub fn new(store: Arc<dyn GraphStore>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    pub async fn compute(&self, record: &TransactionRecord) -> EngineResult<DeviceFeatures> {
        let cfg = &self.config;
        let device = &record.device_hash;
        let now = record.timestamp;

        let snapshot = self.store.device_snapshot(device, 24, now).await?;
        let use_count = self
            .store
            .device_use_count(&record.sender_id, device)
            .await?;
        // The in-flight record is already ingested; one recorded use means
        // this account has never touched the device before.
        let new_device = use_count <= 1;

        let Some(snapshot) = snapshot else {
            return Ok(self.score_unseen_device(record, new_device));
        };

        let mut flags = Vec::new();

        // 1. Shared-account exposure (up to 40).
        let account_count = snapshot.account_count;
        let multi_account_score = if account_count >= 5 {
            40.0
        } else if account_count >= 3 {
            25.0
        } else if account_count >= 2 {
            10.0
        } else {
            0.0
        };

        // 2. Risk propagation from co-located users (up to 25).
        let propagation_score = (snapshot.derived_risk / 100.0).min(1.0) * 25.0;

        // 3. Multi-user burst inside the 24h window (+25).
        let multi_user_burst =
            snapshot.users_in_window > cfg.signals.device_multi_user_threshold;
        let multi_user_score = if multi_user_burst {
            cfg.signals.device_multi_user_penalty
        } else {
            0.0
        };

        // 4. Device drift: OS family change and capability mask distance,
        //    combined cap 15.
        let mut drift_score = 0.0;
        let mut cap_mask_hamming = 0;
        if let (Some(stored), Some(current)) = (&snapshot.os_family, &record.device_os) {
            if !stored.is_empty()
                && !current.is_empty()
                && os_family(stored) != os_family(current)
            {
                drift_score += 5.0;
                flags.push(format!("OS family changed: {stored} -> {current}"));
            }
        }
        if let (Some(stored), Some(current)) =
            (&snapshot.capability_mask, &record.capability_mask)
        {
            if stored != current {
                cap_mask_hamming = hamming_distance(stored, current);
                drift_score += (cap_mask_hamming as f64 * 0.3).min(5.0);
                flags.push(format!(
                    "Capability mask changed (hamming={cap_mask_hamming})"
                ));
            }
        }
        let drift_score = drift_score.min(15.0);

        // 5. First-seen device + high amount + MPIN (+15).
        let new_device_high_mpin = new_device
            && record.amount >= cfg.signals.new_device_high_amount
            && record.credential_type == CredentialType::Mpin;

        // 6. First-seen device base penalty (+12).
        let new_device_score = if new_device {
            cfg.signals.new_device_penalty
        } else {
            0.0
        };

        // 7. Any co-located user above risk 80 (+10).
        let max_user_risk = snapshot
            .user_risks
            .iter()
            .fold(0.0f64, |acc, &r| acc.max(r));
        let high_risk_bonus = if max_user_risk > 80.0 { 10.0 } else { 0.0 };

        // 8. OS anomaly: neither Android nor iOS (+10).
        let effective_os = record
            .device_os
            .clone()
            .or_else(|| snapshot.os_family.clone());
        let os_anomaly = effective_os
            .as_deref()
            .map(|os| {
                let lc = os.to_ascii_lowercase();
                !(lc.starts_with("android") || lc.starts_with("ios"))
            })
            .unwrap_or(false);

        let avg_user_risk = if snapshot.user_risks.is_empty() {
            0.0
        } else {
            snapshot.user_risks.iter().sum::<f64>() / snapshot.user_risks.len() as f64
        };

        let risk = (multi_account_score
            + propagation_score
            + multi_user_score
            + drift_score
            + if new_device_high_mpin { 15.0 } else { 0.0 }
            + new_device_score
            + high_risk_bonus
            + if os_anomaly { 10.0 } else { 0.0 })
        .min(100.0);

        if account_count >= 5 {
            flags.push(format!("Shared device: {account_count} accounts"));
        }
        if max_user_risk > 80.0 {
            flags.push("Device linked to high-risk user".to_string());
        }
        if os_anomaly {
            flags.push(format!(
                "Unsupported device OS: {}",
                effective_os.as_deref().unwrap_or("?")
            ));
        }
        if new_device {
            flags.push("New device for sender".to_string());
        }
        if new_device_high_mpin {
            flags.push("New device + high amount + MPIN".to_string());
        }
        if multi_user_burst {
            flags.push(format!(
                "Device used by {} accounts within 24h",
                snapshot.users_in_window
            ));
        }

        Ok(DeviceFeatures {
            risk,
            account_count,
            new_device,
            multi_user_count: snapshot.users_in_window,
            multi_user_burst,
            cap_mask_hamming,
            drift_score,
            new_device_high_mpin,
            os_anomaly,
            max_user_risk,
            avg_user_risk,
            flags,
        })
    }

    /// A device absent from the graph entirely. Kept for the synchronous
    /// scoring path where ingest may be skipped by the caller.
    fn score_unseen_device(&self, record: &TransactionRecord, new_device: bool) -> DeviceFeatures {
        let cfg = &self.config;
        let mut flags = vec!["New device (first appearance)".to_string()];
        let new_device_high_mpin = record.amount >= cfg.signals.new_device_high_amount
            && record.credential_type == CredentialType::Mpin;
        if new_device_high_mpin {
            flags.push("New device + high amount + MPIN".to_string());
        }
        let risk = (cfg.signals.new_device_penalty
            + if new_device_high_mpin { 15.0 } else { 0.0 })
        .min(100.0);
        DeviceFeatures {
            risk,
            new_device,
            new_device_high_mpin,
            flags,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GraphStore, MemoryGraphStore};
    use crate::types::{TransactionRecord, TxId};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    fn config() -> Arc<EngineConfig> {
        Arc::new(EngineConfig::default())
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 11, minute, 0).unwrap()
    }

    fn record(tx: &str, sender: &str, device: &str, amount: f64, ts: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            tx_id: TxId(tx.to_string()),
            sender_id: sender.into(),
            receiver_id: "sink".into(),
            amount,
            timestamp: ts,
            device_hash: device.into(),
            device_os: Some("Android 14".into()),
            capability_mask: Some("011001".into()),
            ip_address: None,
            sender_lat: None,
            sender_lon: None,
            channel: Default::default(),
            credential_type: CredentialType::Mpin,
            upi_id_sender: None,
            upi_id_receiver: None,
            extra: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn hamming_pads_shorter_mask() {
        assert_eq!(hamming_distance("011001", "011001"), 0);
        assert_eq!(hamming_distance("011001", "011000"), 1);
        assert_eq!(hamming_distance("1001", "011001"), 2);
    }

    #[tokio::test]
    async fn device_farm_scores_high() {
        let store = Arc::new(MemoryGraphStore::new());
        // Six accounts on one device, then the scored transfer.
        for i in 0..5 {
            store
                .ingest_transaction(&record(&format!("t{i}"), &format!("acct-{i}"), "farm", 100.0, at(i as u32)))
                .await
                .unwrap();
        }
        let current = record("t-now", "acct-new", "farm", 15_000.0, at(30));
        store.ingest_transaction(&current).await.unwrap();
        // The sender carries prior risk.
        store
            .persist_risk(&TxId("t-now".to_string()), &"acct-new".into(), 82.0)
            .await
            .unwrap();

        let extractor = DeviceExtractor::new(store, config());
        let f = extractor.compute(&current).await.unwrap();
        assert_eq!(f.account_count, 6);
        assert!(f.new_device);
        assert!(f.new_device_high_mpin);
        assert!(f.multi_user_burst);
        // 40 shared + 25 propagation + 25 burst + 15 compound + 12 new + 10 high-risk.
        assert!(f.risk >= 77.0, "risk was {}", f.risk);
    }

    #[tokio::test]
    async fn known_device_regular_use_is_quiet() {
        let store = Arc::new(MemoryGraphStore::new());
        let first = record("t1", "a", "dev", 100.0, at(0));
        let second = record("t2", "a", "dev", 120.0, at(5));
        store.ingest_transaction(&first).await.unwrap();
        store.ingest_transaction(&second).await.unwrap();

        let extractor = DeviceExtractor::new(store, config());
        let f = extractor.compute(&second).await.unwrap();
        assert!(!f.new_device);
        assert!(!f.multi_user_burst);
        assert_eq!(f.risk, 0.0);
    }

    #[tokio::test]
    async fn drift_capped_at_fifteen() {
        let store = Arc::new(MemoryGraphStore::new());
        let first = record("t1", "a", "dev", 100.0, at(0));
        store.ingest_transaction(&first).await.unwrap();

        let mut drifted = record("t2", "a", "dev", 100.0, at(5));
        drifted.device_os = Some("Tizen 8".into());
        drifted.capability_mask = Some("111111111111111111110000".into());
        store.ingest_transaction(&drifted).await.unwrap();

        let extractor = DeviceExtractor::new(store, config());
        let f = extractor.compute(&drifted).await.unwrap();
        assert!(f.drift_score <= 15.0);
        assert!(f.drift_score >= 5.0);
        assert!(f.os_anomaly);
    }
}
