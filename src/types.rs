//! # Core Types
//!
//! Fundamental types shared across the scoring engine: identifiers, the
//! stream payload, the scored-record response, and the error taxonomy.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl TxId {
    /// Generate a fresh transaction id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque device fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Payment channel tag carried on the wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Upi,
    Neft,
    Imps,
}

impl Default for Channel {
    fn default() -> Self {
        Self::Upi
    }
}

/// Authentication credential used for the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialType {
    Mpin,
    SmsOtp,
    Biometric,
    Pattern,
    Unknown,
}

impl Default for CredentialType {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Final risk level derived from the fused score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Incoming stream payload (queue record).
///
/// Unknown keys are preserved in `extra` and ignored by scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default)]
    pub tx_id: TxId,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub device_hash: DeviceId,
    #[serde(default)]
    pub device_os: Option<String>,
    #[serde(default)]
    pub capability_mask: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub sender_lat: Option<f64>,
    #[serde(default)]
    pub sender_lon: Option<f64>,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub credential_type: CredentialType,
    #[serde(default)]
    pub upi_id_sender: Option<String>,
    #[serde(default)]
    pub upi_id_receiver: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TransactionRecord {
    /// Structural validation of an inbound record.
    ///
    /// Zero amounts are legal; negative amounts are not.
    pub fn validate(&self) -> EngineResult<()> {
        if self.tx_id.as_str().is_empty() {
            return Err(EngineError::InvalidInput("empty tx_id".into()));
        }
        if self.sender_id.as_str().is_empty() || self.receiver_id.as_str().is_empty() {
            return Err(EngineError::InvalidInput(
                "sender_id and receiver_id are required".into(),
            ));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            )));
        }
        if let (Some(lat), Some(lon)) = (self.sender_lat, self.sender_lon) {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(EngineError::InvalidInput(format!(
                    "coordinates out of range: ({lat}, {lon})"
                )));
            }
        }
        Ok(())
    }
}

/// Per-extractor sub-score breakdown, each in [0, 100].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub graph: f64,
    pub behavioral: f64,
    pub device: f64,
    pub dead_account: f64,
    pub velocity: f64,
}

/// Fully scored transaction, returned by the API and pushed to alert
/// subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub tx_id: TxId,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub breakdown: RiskBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub flags: Vec<String>,
    pub reason: String,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Mule classification produced alongside the fused score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuleAssessment {
    pub is_mule: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Error taxonomy of the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad record shape or out-of-range values. The record is ACKed and
    /// dropped as a poison message.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Retryable graph conflict (deadlock, serialization). Exhausted
    /// retries leave the record un-ACKed for redelivery.
    #[error("transient store conflict: {0}")]
    TransientStore(String),

    /// Non-retryable store failure.
    #[error("store error: {0}")]
    Store(String),

    /// A feature extractor failed.
    #[error("extractor error: {0}")]
    Extractor(String),

    /// The per-record soft deadline elapsed before scoring finished.
    #[error("deadline exceeded after {0} ms")]
    DeadlineExceeded(u64),

    /// An alert subscriber is unreachable; never fails the record.
    #[error("subscriber error: {0}")]
    Subscriber(String),

    /// A batch analyzer cycle failed; the previous snapshot stays live.
    #[error("analyzer error: {0}")]
    Analyzer(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Whether the worker may ACK the record after this error.
    pub fn is_poison(&self) -> bool {
        matches!(self, EngineError::InvalidInput(_))
    }
}

/// Result alias used at library seams.
pub type EngineResult<T> = Result<T, EngineError>;
