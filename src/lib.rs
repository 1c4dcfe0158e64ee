//! # riskflow
//!
//! Real-time fraud-scoring engine for a retail payments network. Each
//! incoming payment is scored within a bounded latency budget by five
//! concurrent feature extractors over a transfer graph, fused into a
//! [0, 100] risk with a human-readable explanation and an optional mule
//! classification, while a background analyzer keeps graph-wide
//! properties and a collusive-cluster cache fresh for the hot path.

pub mod alerts;
pub mod analyzer;
pub mod api;
pub mod asn;
pub mod config;
pub mod engine;
pub mod features;
pub mod metrics;
pub mod store;
pub mod stream;
pub mod types;

// Re-export the types most callers touch.
pub use alerts::AlertBroadcaster;
pub use analyzer::{CollusionCache, GraphAnalyzer};
pub use asn::{AsnClass, AsnResolver};
pub use config::EngineConfig;
pub use engine::{build_engine, RiskEngine, WorkerPool};
pub use metrics::EngineMetrics;
pub use store::{GraphStore, MemoryGraphStore};
pub use stream::{MemoryStream, TxStream};
pub use types::{
    AccountId, DeviceId, EngineError, EngineResult, RiskBreakdown, RiskLevel, ScoredRecord,
    TransactionRecord, TxId,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging for binaries and examples.
pub fn init() {
    tracing_subscriber::fmt::init();
}
