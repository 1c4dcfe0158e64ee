//! Transaction traffic simulator.
//!
//! Seeds a small population of accounts and devices and pushes a mix of
//! routine payments and mule-shaped traffic (shared devices, pass-through
//! relays, identical structuring transfers) onto the stream. Used by the
//! demo binary and the integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::types::{Channel, CredentialType, TransactionRecord, TxId};

use super::TxStream;

/// Simulator parameters.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub user_count: usize,
    pub device_count: usize,
    /// Fraction of accounts behaving as mules.
    pub mule_ratio: f64,
    pub tps: u32,
    pub total_transactions: usize,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            user_count: 20,
            device_count: 15,
            mule_ratio: 0.15,
            tps: 100,
            total_transactions: 1_000,
            seed: 7,
        }
    }
}

/// Deterministic traffic generator over a seeded account population.
pub struct TransactionSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    users: Vec<String>,
    mules: Vec<String>,
    devices: Vec<String>,
    /// Mules share a small device pool.
    mule_devices: HashMap<String, String>,
}

impl TransactionSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let users: Vec<String> = (0..config.user_count)
            .map(|i| format!("acct-{i:03}"))
            .collect();
        let mule_count = ((config.user_count as f64) * config.mule_ratio).round() as usize;
        let mules: Vec<String> = users.iter().rev().take(mule_count).cloned().collect();
        let devices: Vec<String> = (0..config.device_count)
            .map(|i| format!("device-{i:03}"))
            .collect();

        let shared_pool: Vec<String> = devices.iter().take(2.max(devices.len() / 5)).cloned().collect();
        let mule_devices = mules
            .iter()
            .map(|m| {
                let device = shared_pool[rng.gen_range(0..shared_pool.len())].clone();
                (m.clone(), device)
            })
            .collect();

        Self {
            config,
            rng,
            users,
            mules,
            devices,
            mule_devices,
        }
    }

    fn pick_user(&mut self) -> String {
        self.users[self.rng.gen_range(0..self.users.len())].clone()
    }

    /// Build the next synthetic record.
    pub fn next_record(&mut self) -> TransactionRecord {
        let sender = self.pick_user();
        let is_mule = self.mules.contains(&sender);

        let mut receiver = self.pick_user();
        while receiver == sender {
            receiver = self.pick_user();
        }

        let (amount, device, credential) = if is_mule && self.rng.gen_bool(0.6) {
            // Structuring-style transfer from a shared device.
            let device = self
                .mule_devices
                .get(&sender)
                .cloned()
                .unwrap_or_else(|| self.devices[0].clone());
            (9_999.0, device, CredentialType::Mpin)
        } else {
            let amount = (self.rng.gen_range(50.0..5_000.0_f64) * 100.0).round() / 100.0;
            let device = self.devices[self.rng.gen_range(0..self.devices.len())].clone();
            (amount, device, CredentialType::Biometric)
        };

        TransactionRecord {
            tx_id: TxId::new(),
            sender_id: sender.as_str().into(),
            receiver_id: receiver.as_str().into(),
            amount,
            timestamp: Utc::now(),
            device_hash: device.as_str().into(),
            device_os: Some("Android 14".to_string()),
            capability_mask: Some("011001".to_string()),
            ip_address: Some(format!(
                "49.37.{}.{}",
                self.rng.gen_range(1..255),
                self.rng.gen_range(1..255)
            )),
            sender_lat: Some(19.0 + self.rng.gen_range(-0.5..0.5)),
            sender_lon: Some(72.8 + self.rng.gen_range(-0.5..0.5)),
            channel: Channel::Upi,
            credential_type: credential,
            upi_id_sender: Some(format!("{sender}@upi")),
            upi_id_receiver: Some(format!("{receiver}@upi")),
            extra: HashMap::new(),
        }
    }

    /// Push `total_transactions` records at roughly `tps`.
    pub async fn run(mut self, stream: Arc<dyn TxStream>) -> crate::types::EngineResult<usize> {
        let delay = Duration::from_secs_f64(1.0 / self.config.tps.max(1) as f64);
        let total = self.config.total_transactions;
        for i in 0..total {
            let record = self.next_record();
            stream.append(&record).await?;
            if (i + 1) % 500 == 0 {
                info!(sent = i + 1, total, "simulator progress");
            }
            tokio::time::sleep(delay).await;
        }
        info!(total, "simulator finished");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_simulator_is_deterministic() {
        let a: Vec<f64> = {
            let mut sim = TransactionSimulator::new(SimulatorConfig::default());
            (0..10).map(|_| sim.next_record().amount).collect()
        };
        let b: Vec<f64> = {
            let mut sim = TransactionSimulator::new(SimulatorConfig::default());
            (0..10).map(|_| sim.next_record().amount).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn records_validate() {
        let mut sim = TransactionSimulator::new(SimulatorConfig::default());
        for _ in 0..50 {
            let rec = sim.next_record();
            assert!(rec.validate().is_ok());
            assert_ne!(rec.sender_id, rec.receiver_id);
        }
    }
}
