//! # Engine Configuration
//!
//! Central configuration with sensible defaults, overridable through
//! `RISKFLOW_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::types::{EngineError, EngineResult};

/// Fusion weights for the five sub-scores. Must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionWeights {
    pub graph: f64,
    pub behavioral: f64,
    pub device: f64,
    pub dead_account: f64,
    pub velocity: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            graph: 0.30,
            behavioral: 0.25,
            device: 0.20,
            dead_account: 0.15,
            velocity: 0.10,
        }
    }
}

impl FusionWeights {
    pub fn sum(&self) -> f64 {
        self.graph + self.behavioral + self.device + self.dead_account + self.velocity
    }

    pub fn validate(&self) -> EngineResult<()> {
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(EngineError::Configuration(format!(
                "fusion weights must sum to 1.0, got {}",
                self.sum()
            )));
        }
        Ok(())
    }
}

/// Tunable signal parameters (v3 feature set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalParams {
    /// Distinct users on a device within 24h before the multi-user penalty fires.
    pub device_multi_user_threshold: usize,
    pub device_multi_user_penalty: f64,
    pub circadian_penalty: f64,
    /// Circadian penalty when the device is also first-seen for the account.
    pub circadian_new_device_penalty: f64,
    pub identicality_min_count: usize,
    pub identicality_penalty: f64,
    pub identicality_window_hours: i64,
    pub sleep_flash_ratio: f64,
    pub new_device_high_amount: f64,
    pub new_device_penalty: f64,
    pub endpoint_rotation_max: usize,
    pub endpoint_rotation_penalty: f64,
    pub fixed_amount_tolerance: f64,
    pub fixed_amount_min_count: usize,
    pub fixed_amount_penalty: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            device_multi_user_threshold: 3,
            device_multi_user_penalty: 25.0,
            circadian_penalty: 20.0,
            circadian_new_device_penalty: 35.0,
            identicality_min_count: 3,
            identicality_penalty: 30.0,
            identicality_window_hours: 1,
            sleep_flash_ratio: 50.0,
            new_device_high_amount: 10_000.0,
            new_device_penalty: 12.0,
            endpoint_rotation_max: 5,
            endpoint_rotation_penalty: 15.0,
            fixed_amount_tolerance: 0.01,
            fixed_amount_min_count: 3,
            fixed_amount_penalty: 10.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Parallel stream consumers.
    pub worker_count: usize,
    /// Max records a worker pulls per poll.
    pub worker_batch_size: usize,
    /// Soft per-record deadline, store-retry budget included.
    pub record_deadline_ms: u64,

    /// Stream key the workers drain.
    pub stream_key: String,
    pub consumer_group: String,
    /// Un-ACKed records are redelivered after this long.
    pub visibility_timeout_ms: u64,
    /// Pending-count high-water mark; above it workers halve their batch.
    pub backpressure_high_water: usize,

    /// Graph store URI (informational for the embedded store).
    pub store_uri: String,
    pub store_pool_size: usize,

    /// Offline ASN database path. Missing file disables ASN risk.
    pub asn_db_path: String,
    /// ISO 3166-1 alpha-2 country treated as domestic.
    pub domestic_country: String,

    pub weights: FusionWeights,
    pub high_threshold: f64,
    pub medium_threshold: f64,
    /// Fused-risk threshold above which the mule classifier fires outright.
    pub mule_risk_threshold: f64,

    pub dormant_days: i64,
    pub velocity_window_secs: i64,
    pub burst_threshold: usize,
    pub impossible_travel_kmh: f64,
    /// Window width for rolling account statistics.
    pub behavioral_history: usize,
    pub pass_through_ratio: f64,

    pub signals: SignalParams,

    /// Batch analyzer cadence.
    pub analyzer_interval_secs: u64,
    /// Betweenness threshold for the money-router detector.
    pub router_betweenness_threshold: f64,

    pub api_bind: String,
    /// Alert fan-out channel capacity; lagging subscribers drop messages.
    pub alert_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            worker_batch_size: 10,
            record_deadline_ms: 200,
            stream_key: "fraud_queue".to_string(),
            consumer_group: "fraud_workers".to_string(),
            visibility_timeout_ms: 30_000,
            backpressure_high_water: 5_000,
            store_uri: "mem://local".to_string(),
            store_pool_size: 50,
            asn_db_path: "asn_ipv4.mmdb".to_string(),
            domestic_country: "IN".to_string(),
            weights: FusionWeights::default(),
            high_threshold: 70.0,
            medium_threshold: 40.0,
            mule_risk_threshold: 65.0,
            dormant_days: 30,
            velocity_window_secs: 60,
            burst_threshold: 10,
            impossible_travel_kmh: 250.0,
            behavioral_history: 25,
            pass_through_ratio: 0.80,
            signals: SignalParams::default(),
            analyzer_interval_secs: 5,
            router_betweenness_threshold: 0.01,
            api_bind: "0.0.0.0:8000".to_string(),
            alert_capacity: 1024,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Build a configuration from the environment on top of the defaults.
    pub fn from_env() -> EngineResult<Self> {
        let d = Self::default();
        let cfg = Self {
            worker_count: env_or("RISKFLOW_WORKER_COUNT", d.worker_count),
            worker_batch_size: env_or("RISKFLOW_WORKER_BATCH_SIZE", d.worker_batch_size),
            record_deadline_ms: env_or("RISKFLOW_RECORD_DEADLINE_MS", d.record_deadline_ms),
            stream_key: env_or("RISKFLOW_STREAM_KEY", d.stream_key),
            consumer_group: env_or("RISKFLOW_CONSUMER_GROUP", d.consumer_group),
            visibility_timeout_ms: env_or("RISKFLOW_VISIBILITY_TIMEOUT_MS", d.visibility_timeout_ms),
            backpressure_high_water: env_or("RISKFLOW_BACKPRESSURE_HIGH_WATER", d.backpressure_high_water),
            store_uri: env_or("RISKFLOW_STORE_URI", d.store_uri),
            store_pool_size: env_or("RISKFLOW_STORE_POOL_SIZE", d.store_pool_size),
            asn_db_path: env_or("RISKFLOW_ASN_DB_PATH", d.asn_db_path),
            domestic_country: env_or("RISKFLOW_DOMESTIC_COUNTRY", d.domestic_country),
            weights: FusionWeights {
                graph: env_or("RISKFLOW_WEIGHT_GRAPH", d.weights.graph),
                behavioral: env_or("RISKFLOW_WEIGHT_BEHAVIORAL", d.weights.behavioral),
                device: env_or("RISKFLOW_WEIGHT_DEVICE", d.weights.device),
                dead_account: env_or("RISKFLOW_WEIGHT_DEAD_ACCOUNT", d.weights.dead_account),
                velocity: env_or("RISKFLOW_WEIGHT_VELOCITY", d.weights.velocity),
            },
            high_threshold: env_or("RISKFLOW_HIGH_THRESHOLD", d.high_threshold),
            medium_threshold: env_or("RISKFLOW_MEDIUM_THRESHOLD", d.medium_threshold),
            mule_risk_threshold: env_or("RISKFLOW_MULE_RISK_THRESHOLD", d.mule_risk_threshold),
            dormant_days: env_or("RISKFLOW_DORMANT_DAYS", d.dormant_days),
            velocity_window_secs: env_or("RISKFLOW_VELOCITY_WINDOW_SECS", d.velocity_window_secs),
            burst_threshold: env_or("RISKFLOW_BURST_THRESHOLD", d.burst_threshold),
            impossible_travel_kmh: env_or("RISKFLOW_IMPOSSIBLE_TRAVEL_KMH", d.impossible_travel_kmh),
            behavioral_history: env_or("RISKFLOW_BEHAVIORAL_HISTORY", d.behavioral_history),
            pass_through_ratio: env_or("RISKFLOW_PASS_THROUGH_RATIO", d.pass_through_ratio),
            signals: SignalParams {
                device_multi_user_threshold: env_or(
                    "RISKFLOW_DEVICE_MULTI_USER_THRESHOLD",
                    d.signals.device_multi_user_threshold,
                ),
                device_multi_user_penalty: env_or(
                    "RISKFLOW_DEVICE_MULTI_USER_PENALTY",
                    d.signals.device_multi_user_penalty,
                ),
                circadian_penalty: env_or("RISKFLOW_CIRCADIAN_PENALTY", d.signals.circadian_penalty),
                circadian_new_device_penalty: env_or(
                    "RISKFLOW_CIRCADIAN_NEW_DEVICE_PENALTY",
                    d.signals.circadian_new_device_penalty,
                ),
                identicality_min_count: env_or(
                    "RISKFLOW_IDENTICALITY_MIN_COUNT",
                    d.signals.identicality_min_count,
                ),
                identicality_penalty: env_or(
                    "RISKFLOW_IDENTICALITY_PENALTY",
                    d.signals.identicality_penalty,
                ),
                identicality_window_hours: env_or(
                    "RISKFLOW_IDENTICALITY_WINDOW_HOURS",
                    d.signals.identicality_window_hours,
                ),
                sleep_flash_ratio: env_or("RISKFLOW_SLEEP_FLASH_RATIO", d.signals.sleep_flash_ratio),
                new_device_high_amount: env_or(
                    "RISKFLOW_NEW_DEVICE_HIGH_AMOUNT",
                    d.signals.new_device_high_amount,
                ),
                new_device_penalty: env_or(
                    "RISKFLOW_NEW_DEVICE_PENALTY",
                    d.signals.new_device_penalty,
                ),
                endpoint_rotation_max: env_or(
                    "RISKFLOW_ENDPOINT_ROTATION_MAX",
                    d.signals.endpoint_rotation_max,
                ),
                endpoint_rotation_penalty: env_or(
                    "RISKFLOW_ENDPOINT_ROTATION_PENALTY",
                    d.signals.endpoint_rotation_penalty,
                ),
                fixed_amount_tolerance: env_or(
                    "RISKFLOW_FIXED_AMOUNT_TOLERANCE",
                    d.signals.fixed_amount_tolerance,
                ),
                fixed_amount_min_count: env_or(
                    "RISKFLOW_FIXED_AMOUNT_MIN_COUNT",
                    d.signals.fixed_amount_min_count,
                ),
                fixed_amount_penalty: env_or(
                    "RISKFLOW_FIXED_AMOUNT_PENALTY",
                    d.signals.fixed_amount_penalty,
                ),
            },
            analyzer_interval_secs: env_or(
                "RISKFLOW_ANALYZER_INTERVAL_SECS",
                d.analyzer_interval_secs,
            ),
            router_betweenness_threshold: env_or(
                "RISKFLOW_ROUTER_BETWEENNESS_THRESHOLD",
                d.router_betweenness_threshold,
            ),
            api_bind: env_or("RISKFLOW_API_BIND", d.api_bind),
            alert_capacity: env_or("RISKFLOW_ALERT_CAPACITY", d.alert_capacity),
        };
        cfg.weights.validate()?;
        Ok(cfg)
    }
}
