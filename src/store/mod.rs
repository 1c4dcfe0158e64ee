//! # Graph Store Adapter
//!
//! Typed operations over the account/device/endpoint/transaction graph.
//! The hot path performs two writes (ingest, risk write-back) and a set of
//! targeted multi-hop reads used by the feature extractors; the batch
//! analyzer owns every statistics refresh and metric write.
//!
//! [`GraphStore`] is the seam: the embedded [`MemoryGraphStore`] backs
//! production single-process deployments and every test, while transient
//! conflict handling lives in [`retry`] so any backend gets the same
//! truncated-exponential-backoff budget.

mod memory;
mod retry;

pub use memory::MemoryGraphStore;
pub use retry::RetryPolicy;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asn::AsnInfo;
use crate::types::{AccountId, DeviceId, EngineResult, TransactionRecord, TxId};

/// Rolling behavioural profile of an account, advanced only by the batch
/// analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountProfile {
    pub rolling_mean: f64,
    pub rolling_std: f64,
    pub tx_count: u64,
    pub total_outflow: f64,
    pub last_active: Option<DateTime<Utc>>,
    pub is_dormant: bool,
    pub risk_score: f64,
}

/// One outgoing transaction as seen by the extractors.
#[derive(Debug, Clone)]
pub struct OutgoingTx {
    pub tx_id: TxId,
    pub receiver: AccountId,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Send/receive activity inside a sliding window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityWindow {
    pub sends: usize,
    pub receives: usize,
    pub total_sent: f64,
    pub total_received: f64,
}

impl ActivityWindow {
    pub fn activity(&self) -> usize {
        self.sends + self.receives
    }
}

/// Device-level view used by the device extractor.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    pub account_count: usize,
    pub os_family: Option<String>,
    pub capability_mask: Option<String>,
    pub users_in_window: usize,
    pub user_risks: Vec<f64>,
    pub derived_risk: f64,
    /// Total usage events recorded for the device.
    pub total_uses: usize,
}

/// Pre-computed graph metrics read on the hot path.
#[derive(Debug, Clone, Default)]
pub struct GraphFeatures {
    pub in_degree: usize,
    pub out_degree: usize,
    pub betweenness: f64,
    pub pagerank: f64,
    pub clustering_coeff: f64,
    pub community_id: Option<i64>,
    pub avg_neighbor_risk: f64,
}

/// Aggregated statistics of one community, replaced each batch cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster_id: i64,
    pub member_count: usize,
    pub mean_risk: f64,
    pub high_risk_count: usize,
    pub members: Vec<AccountId>,
}

/// Graph metrics written back by the batch analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphMetrics {
    pub community_id: Option<i64>,
    pub pagerank: f64,
    pub betweenness: f64,
    pub clustering_coeff: f64,
    pub component_id: Option<u64>,
}

/// One TRANSFERRED_TO shortcut edge with its aggregates.
#[derive(Debug, Clone)]
pub struct TransferEdge {
    pub from: AccountId,
    pub to: AccountId,
    pub total_amount: f64,
    pub tx_count: u64,
    pub last_timestamp: DateTime<Utc>,
}

/// One raw transfer event, used by the temporal collusion detectors.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Node/edge counts for operational introspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreCounts {
    pub accounts: usize,
    pub devices: usize,
    pub endpoints: usize,
    pub transactions: usize,
    pub clusters: usize,
    pub transfer_edges: usize,
}

/// Raw aggregates behind `GET /dashboard/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardAggregates {
    pub total_transactions: usize,
    pub flagged_transactions: usize,
    pub active_clusters: usize,
    pub avg_risk_score: f64,
    pub total_amount: f64,
}

/// Node in the fraud-network visualisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizNode {
    pub id: AccountId,
    pub risk: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<i64>,
}

/// Edge in the fraud-network visualisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizEdge {
    pub source: AccountId,
    pub target: AccountId,
    pub amount: f64,
    pub tx_count: u64,
}

/// Accounts observed on one shared device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSharingGroup {
    pub device_id: DeviceId,
    pub account_count: usize,
    pub accounts: Vec<AccountId>,
    pub device_risk: f64,
}

/// Outcome of an idempotent ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    /// The tx_id was already present; the graph is unchanged.
    Duplicate,
}

/// Typed graph operations required by the engine.
///
/// All reads are bounded: O(1) neighbour/community lookups on the hot path,
/// multi-hop traversals only through the batch-analyzer entry points.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ----- hot-path writes -----

    /// Idempotent ingest: ensure Account/Device/Endpoint nodes and all
    /// outgoing edges exist and fold the transfer into the
    /// TRANSFERRED_TO aggregate.
    async fn ingest_transaction(&self, record: &TransactionRecord) -> EngineResult<IngestOutcome>;

    /// Attach a resolved network endpoint to the transaction's sender.
    async fn record_endpoint(
        &self,
        account: &AccountId,
        ip: &str,
        info: &AsnInfo,
        at: DateTime<Utc>,
    ) -> EngineResult<()>;

    /// Write the fused risk back to the transaction and account
    /// (last-writer-wins on the account).
    async fn persist_risk(
        &self,
        tx_id: &TxId,
        account: &AccountId,
        risk_score: f64,
    ) -> EngineResult<()>;

    // ----- hot-path reads -----

    async fn profile(&self, account: &AccountId) -> EngineResult<Option<AccountProfile>>;

    /// Most recent outgoing transactions, newest first, capped at `limit`.
    async fn recent_outgoing(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> EngineResult<Vec<OutgoingTx>>;

    async fn activity_window(
        &self,
        account: &AccountId,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<ActivityWindow>;

    /// Distinct endpoints the account used within the window.
    async fn distinct_endpoints(
        &self,
        account: &AccountId,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<usize>;

    /// Outgoing amounts within the window (fixed-amount detection).
    async fn recent_amounts(
        &self,
        account: &AccountId,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<f64>>;

    /// Transfers sender→receiver within the window whose amount differs
    /// from `amount` by less than `tolerance`.
    async fn identical_transfer_count(
        &self,
        sender: &AccountId,
        receiver: &AccountId,
        amount: f64,
        tolerance: f64,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<usize>;

    /// Hour-of-day histogram over the account's outgoing history.
    async fn hour_histogram(&self, account: &AccountId) -> EngineResult<[u64; 24]>;

    async fn device_snapshot(
        &self,
        device: &DeviceId,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<DeviceSnapshot>>;

    /// Usage events of this device by this account, the in-flight record
    /// included (a count of 1 means the device is first-seen for the
    /// account).
    async fn device_use_count(
        &self,
        account: &AccountId,
        device: &DeviceId,
    ) -> EngineResult<usize>;

    async fn graph_features(&self, account: &AccountId) -> EngineResult<GraphFeatures>;

    async fn cluster_stats(&self, cluster_id: i64) -> EngineResult<Option<ClusterRecord>>;

    /// Distinct accounts recently observed on the ASN.
    async fn asn_density(&self, asn: u32) -> EngineResult<usize>;

    /// Per-ASN usage histogram for the account.
    async fn asn_histogram(&self, account: &AccountId) -> EngineResult<HashMap<u32, u64>>;

    // ----- batch analyzer entry points -----

    /// Recompute rolling statistics over the newest `window` outgoing
    /// amounts per account and re-evaluate the dormancy flag.
    async fn refresh_rolling_stats(
        &self,
        window: usize,
        dormant_days: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<usize>;

    /// Refresh device account counts and the derived device risk ladder.
    async fn refresh_device_stats(&self) -> EngineResult<usize>;

    /// Write batch graph metrics onto accounts.
    async fn apply_graph_metrics(
        &self,
        metrics: &[(AccountId, GraphMetrics)],
    ) -> EngineResult<()>;

    /// Replace the cluster set wholesale.
    async fn replace_clusters(&self, clusters: Vec<ClusterRecord>) -> EngineResult<()>;

    /// All TRANSFERRED_TO edges (the analyzer projection input).
    async fn transfer_edges(&self) -> EngineResult<Vec<TransferEdge>>;

    /// Raw transfers within the trailing window, for temporal detectors.
    async fn recent_transfers(
        &self,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<TransferEvent>>;

    /// Latest fused risk per account.
    async fn account_risks(&self) -> EngineResult<HashMap<AccountId, f64>>;

    // ----- introspection / visualisation -----

    async fn counts(&self) -> EngineResult<StoreCounts>;

    async fn dashboard_aggregates(
        &self,
        medium_threshold: f64,
    ) -> EngineResult<DashboardAggregates>;

    async fn fraud_network(
        &self,
        min_risk: f64,
    ) -> EngineResult<(Vec<VizNode>, Vec<VizEdge>)>;

    async fn device_sharing(&self, min_accounts: usize) -> EngineResult<Vec<DeviceSharingGroup>>;
}
