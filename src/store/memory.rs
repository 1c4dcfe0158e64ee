//! Embedded in-process graph store.
//!
//! Holds the full typed graph behind a single `parking_lot::RwLock`.
//! Operations acquire the lock per call and never await while holding it,
//! so the async trait surface stays suspension-free for this backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use parking_lot::RwLock;

use crate::asn::AsnInfo;
use crate::types::{AccountId, DeviceId, EngineError, EngineResult, TransactionRecord, TxId};

use super::{
    AccountProfile, ActivityWindow, ClusterRecord, DashboardAggregates, DeviceSharingGroup,
    DeviceSnapshot, GraphFeatures, GraphMetrics, GraphStore, IngestOutcome, OutgoingTx,
    StoreCounts, TransferEdge, TransferEvent, VizEdge, VizNode,
};

#[derive(Debug, Clone)]
struct AccountNode {
    rolling_mean: f64,
    rolling_std: f64,
    tx_count: u64,
    total_outflow: f64,
    last_active: Option<DateTime<Utc>>,
    is_dormant: bool,
    risk_score: f64,
    community_id: Option<i64>,
    pagerank: f64,
    betweenness: f64,
    clustering_coeff: f64,
    component_id: Option<u64>,
}

impl AccountNode {
    fn new() -> Self {
        Self {
            rolling_mean: 0.0,
            rolling_std: 0.0,
            tx_count: 0,
            total_outflow: 0.0,
            last_active: None,
            is_dormant: false,
            risk_score: 0.0,
            community_id: None,
            pagerank: 0.0,
            betweenness: 0.0,
            clustering_coeff: 0.0,
            component_id: None,
        }
    }
}

#[derive(Debug, Clone)]
struct DeviceNode {
    os: Option<String>,
    capability_mask: Option<String>,
    accounts: HashSet<AccountId>,
    /// (account, seen-at) usage log for the multi-user window.
    usage: Vec<(AccountId, DateTime<Utc>)>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    derived_risk: f64,
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
struct EndpointNode {
    asn: u32,
    org: String,
    country: String,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TxNode {
    tx_id: TxId,
    sender: AccountId,
    receiver: AccountId,
    amount: f64,
    timestamp: DateTime<Utc>,
    lat: Option<f64>,
    lon: Option<f64>,
    risk_score: Option<f64>,
}

#[derive(Debug, Clone)]
struct PairAggregate {
    total_amount: f64,
    tx_count: u64,
    last_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct EndpointUse {
    ip: String,
    asn: u32,
    at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, AccountNode>,
    devices: HashMap<DeviceId, DeviceNode>,
    endpoints: HashMap<String, EndpointNode>,
    tx_index: HashMap<TxId, usize>,
    tx_log: Vec<TxNode>,
    outgoing: HashMap<AccountId, Vec<usize>>,
    incoming: HashMap<AccountId, Vec<usize>>,
    pairs: HashMap<(AccountId, AccountId), PairAggregate>,
    out_neighbors: HashMap<AccountId, HashSet<AccountId>>,
    in_neighbors: HashMap<AccountId, HashSet<AccountId>>,
    endpoint_usage: HashMap<AccountId, Vec<EndpointUse>>,
    asn_accounts: HashMap<u32, HashSet<AccountId>>,
    clusters: HashMap<i64, ClusterRecord>,
}

/// In-memory [`GraphStore`] implementation.
pub struct MemoryGraphStore {
    inner: RwLock<Inner>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Derived device risk ladder from its users' risks.
fn derive_device_risk(user_count: usize, user_risks: &[f64]) -> f64 {
    if user_count >= 5 {
        return 100.0;
    }
    if user_count >= 3 {
        return 70.0;
    }
    if user_risks.iter().any(|&r| r > 80.0) {
        return 60.0;
    }
    if user_risks.is_empty() {
        return 0.0;
    }
    let mean = user_risks.iter().sum::<f64>() / user_risks.len() as f64;
    mean * 0.5
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn ingest_transaction(&self, record: &TransactionRecord) -> EngineResult<IngestOutcome> {
        let mut g = self.inner.write();

        if g.tx_index.contains_key(&record.tx_id) {
            return Ok(IngestOutcome::Duplicate);
        }

        // Lazily create sender and receiver.
        g.accounts
            .entry(record.sender_id.clone())
            .or_insert_with(AccountNode::new);
        g.accounts
            .entry(record.receiver_id.clone())
            .or_insert_with(AccountNode::new);

        // Device node + USES_DEVICE.
        let device = g
            .devices
            .entry(record.device_hash.clone())
            .or_insert_with(|| DeviceNode {
                os: record.device_os.clone(),
                capability_mask: record.capability_mask.clone(),
                accounts: HashSet::new(),
                usage: Vec::new(),
                first_seen: record.timestamp,
                last_seen: record.timestamp,
                derived_risk: 0.0,
            });
        device.accounts.insert(record.sender_id.clone());
        device
            .usage
            .push((record.sender_id.clone(), record.timestamp));
        device.last_seen = record.timestamp;

        // Transaction node with its SENT / RECEIVED_BY edges.
        let idx = g.tx_log.len();
        g.tx_log.push(TxNode {
            tx_id: record.tx_id.clone(),
            sender: record.sender_id.clone(),
            receiver: record.receiver_id.clone(),
            amount: record.amount,
            timestamp: record.timestamp,
            lat: record.sender_lat,
            lon: record.sender_lon,
            risk_score: None,
        });
        g.tx_index.insert(record.tx_id.clone(), idx);
        g.outgoing
            .entry(record.sender_id.clone())
            .or_default()
            .push(idx);
        g.incoming
            .entry(record.receiver_id.clone())
            .or_default()
            .push(idx);

        // TRANSFERRED_TO shortcut aggregate.
        let key = (record.sender_id.clone(), record.receiver_id.clone());
        match g.pairs.get_mut(&key) {
            Some(agg) => {
                agg.total_amount += record.amount;
                agg.tx_count += 1;
                if record.timestamp > agg.last_timestamp {
                    agg.last_timestamp = record.timestamp;
                }
            }
            None => {
                g.pairs.insert(
                    key,
                    PairAggregate {
                        total_amount: record.amount,
                        tx_count: 1,
                        last_timestamp: record.timestamp,
                    },
                );
            }
        }
        g.out_neighbors
            .entry(record.sender_id.clone())
            .or_default()
            .insert(record.receiver_id.clone());
        g.in_neighbors
            .entry(record.receiver_id.clone())
            .or_default()
            .insert(record.sender_id.clone());

        Ok(IngestOutcome::Inserted)
    }

    async fn record_endpoint(
        &self,
        account: &AccountId,
        ip: &str,
        info: &AsnInfo,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut g = self.inner.write();
        match g.endpoints.get_mut(ip) {
            Some(ep) => ep.last_seen = at,
            None => {
                g.endpoints.insert(
                    ip.to_string(),
                    EndpointNode {
                        asn: info.asn,
                        org: info.org_name.clone(),
                        country: info.country.clone(),
                        first_seen: at,
                        last_seen: at,
                    },
                );
            }
        }
        g.endpoint_usage
            .entry(account.clone())
            .or_default()
            .push(EndpointUse {
                ip: ip.to_string(),
                asn: info.asn,
                at,
            });
        if info.asn > 0 {
            g.asn_accounts
                .entry(info.asn)
                .or_default()
                .insert(account.clone());
        }
        Ok(())
    }

    async fn persist_risk(
        &self,
        tx_id: &TxId,
        account: &AccountId,
        risk_score: f64,
    ) -> EngineResult<()> {
        let mut g = self.inner.write();
        let idx = *g
            .tx_index
            .get(tx_id)
            .ok_or_else(|| EngineError::Store(format!("unknown transaction {tx_id}")))?;
        g.tx_log[idx].risk_score = Some(risk_score);
        if let Some(acct) = g.accounts.get_mut(account) {
            acct.risk_score = risk_score;
        }
        Ok(())
    }

    async fn profile(&self, account: &AccountId) -> EngineResult<Option<AccountProfile>> {
        let g = self.inner.read();
        Ok(g.accounts.get(account).map(|a| AccountProfile {
            rolling_mean: a.rolling_mean,
            rolling_std: a.rolling_std,
            tx_count: a.tx_count,
            total_outflow: a.total_outflow,
            last_active: a.last_active,
            is_dormant: a.is_dormant,
            risk_score: a.risk_score,
        }))
    }

    async fn recent_outgoing(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> EngineResult<Vec<OutgoingTx>> {
        let g = self.inner.read();
        let mut txs: Vec<OutgoingTx> = g
            .outgoing
            .get(account)
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| {
                        let t = &g.tx_log[i];
                        OutgoingTx {
                            tx_id: t.tx_id.clone(),
                            receiver: t.receiver.clone(),
                            amount: t.amount,
                            timestamp: t.timestamp,
                            lat: t.lat,
                            lon: t.lon,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        txs.truncate(limit);
        Ok(txs)
    }

    async fn activity_window(
        &self,
        account: &AccountId,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<ActivityWindow> {
        let g = self.inner.read();
        let cutoff = now - Duration::seconds(window_secs);
        let mut window = ActivityWindow::default();
        if let Some(idxs) = g.outgoing.get(account) {
            for &i in idxs {
                let t = &g.tx_log[i];
                if t.timestamp > cutoff && t.timestamp <= now {
                    window.sends += 1;
                    window.total_sent += t.amount;
                }
            }
        }
        if let Some(idxs) = g.incoming.get(account) {
            for &i in idxs {
                let t = &g.tx_log[i];
                if t.timestamp > cutoff && t.timestamp <= now {
                    window.receives += 1;
                    window.total_received += t.amount;
                }
            }
        }
        Ok(window)
    }

    async fn distinct_endpoints(
        &self,
        account: &AccountId,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<usize> {
        let g = self.inner.read();
        let cutoff = now - Duration::hours(window_hours);
        let distinct: HashSet<&str> = g
            .endpoint_usage
            .get(account)
            .map(|uses| {
                uses.iter()
                    .filter(|u| u.at > cutoff && u.at <= now)
                    .map(|u| u.ip.as_str())
                    .collect()
            })
            .unwrap_or_default();
        Ok(distinct.len())
    }

    async fn recent_amounts(
        &self,
        account: &AccountId,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<f64>> {
        let g = self.inner.read();
        let cutoff = now - Duration::hours(window_hours);
        Ok(g.outgoing
            .get(account)
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| &g.tx_log[i])
                    .filter(|t| t.timestamp > cutoff && t.timestamp <= now)
                    .map(|t| t.amount)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn identical_transfer_count(
        &self,
        sender: &AccountId,
        receiver: &AccountId,
        amount: f64,
        tolerance: f64,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<usize> {
        let g = self.inner.read();
        let cutoff = now - Duration::hours(window_hours);
        Ok(g.outgoing
            .get(sender)
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| &g.tx_log[i])
                    .filter(|t| {
                        t.receiver == *receiver
                            && t.timestamp > cutoff
                            && t.timestamp <= now
                            && (t.amount - amount).abs() < tolerance
                    })
                    .count()
            })
            .unwrap_or(0))
    }

    async fn hour_histogram(&self, account: &AccountId) -> EngineResult<[u64; 24]> {
        let g = self.inner.read();
        let mut hist = [0u64; 24];
        if let Some(idxs) = g.outgoing.get(account) {
            for &i in idxs {
                hist[g.tx_log[i].timestamp.hour() as usize] += 1;
            }
        }
        Ok(hist)
    }

    async fn device_snapshot(
        &self,
        device: &DeviceId,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<DeviceSnapshot>> {
        let g = self.inner.read();
        let Some(dev) = g.devices.get(device) else {
            return Ok(None);
        };
        let cutoff = now - Duration::hours(window_hours);
        let users_in_window: HashSet<&AccountId> = dev
            .usage
            .iter()
            .filter(|(_, at)| *at > cutoff && *at <= now)
            .map(|(acct, _)| acct)
            .collect();
        let user_risks: Vec<f64> = dev
            .accounts
            .iter()
            .filter_map(|a| g.accounts.get(a).map(|n| n.risk_score))
            .collect();
        Ok(Some(DeviceSnapshot {
            account_count: dev.accounts.len(),
            os_family: dev.os.clone(),
            capability_mask: dev.capability_mask.clone(),
            users_in_window: users_in_window.len(),
            derived_risk: derive_device_risk(dev.accounts.len(), &user_risks),
            user_risks,
            total_uses: dev.usage.len(),
        }))
    }

    async fn device_use_count(
        &self,
        account: &AccountId,
        device: &DeviceId,
    ) -> EngineResult<usize> {
        let g = self.inner.read();
        Ok(g.devices
            .get(device)
            .map(|d| d.usage.iter().filter(|(a, _)| a == account).count())
            .unwrap_or(0))
    }

    async fn graph_features(&self, account: &AccountId) -> EngineResult<GraphFeatures> {
        let g = self.inner.read();
        let Some(acct) = g.accounts.get(account) else {
            return Ok(GraphFeatures::default());
        };
        let out: Vec<&AccountId> = g
            .out_neighbors
            .get(account)
            .map(|s| s.iter().collect())
            .unwrap_or_default();
        let in_: Vec<&AccountId> = g
            .in_neighbors
            .get(account)
            .map(|s| s.iter().collect())
            .unwrap_or_default();
        let neighbors: HashSet<&AccountId> = out.iter().chain(in_.iter()).copied().collect();
        let neighbor_risks: Vec<f64> = neighbors
            .iter()
            .filter(|n| ***n != *account)
            .filter_map(|n| g.accounts.get(*n).map(|a| a.risk_score))
            .collect();
        let avg_neighbor_risk = if neighbor_risks.is_empty() {
            0.0
        } else {
            neighbor_risks.iter().sum::<f64>() / neighbor_risks.len() as f64
        };
        Ok(GraphFeatures {
            in_degree: in_.len(),
            out_degree: out.len(),
            betweenness: acct.betweenness,
            pagerank: acct.pagerank,
            clustering_coeff: acct.clustering_coeff,
            community_id: acct.community_id,
            avg_neighbor_risk,
        })
    }

    async fn cluster_stats(&self, cluster_id: i64) -> EngineResult<Option<ClusterRecord>> {
        let g = self.inner.read();
        Ok(g.clusters.get(&cluster_id).cloned())
    }

    async fn asn_density(&self, asn: u32) -> EngineResult<usize> {
        let g = self.inner.read();
        Ok(g.asn_accounts.get(&asn).map(|s| s.len()).unwrap_or(0))
    }

    async fn asn_histogram(&self, account: &AccountId) -> EngineResult<HashMap<u32, u64>> {
        let g = self.inner.read();
        let mut hist = HashMap::new();
        if let Some(uses) = g.endpoint_usage.get(account) {
            for u in uses {
                if u.asn > 0 {
                    *hist.entry(u.asn).or_insert(0) += 1;
                }
            }
        }
        Ok(hist)
    }

    async fn refresh_rolling_stats(
        &self,
        window: usize,
        dormant_days: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<usize> {
        let mut g = self.inner.write();
        let mut updates: Vec<(AccountId, f64, f64, u64, f64, Option<DateTime<Utc>>, bool)> =
            Vec::new();

        for (account, idxs) in &g.outgoing {
            let mut txs: Vec<&TxNode> = idxs.iter().map(|&i| &g.tx_log[i]).collect();
            txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            let last_out = txs.first().map(|t| t.timestamp);
            let last_in = g
                .incoming
                .get(account)
                .and_then(|idxs| idxs.iter().map(|&i| g.tx_log[i].timestamp).max());
            let last_active = match (last_out, last_in) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };

            let recent: Vec<f64> = txs.iter().take(window).map(|t| t.amount).collect();
            let (mean, std) = if recent.is_empty() {
                (0.0, 0.0)
            } else {
                let mean = recent.iter().sum::<f64>() / recent.len() as f64;
                let var =
                    recent.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / recent.len() as f64;
                (mean, var.sqrt())
            };
            let total_outflow: f64 = txs.iter().map(|t| t.amount).sum();
            let is_dormant = last_active
                .map(|ts| (now - ts) > Duration::days(dormant_days))
                .unwrap_or(false);

            updates.push((
                account.clone(),
                mean,
                std,
                txs.len() as u64,
                total_outflow,
                last_active,
                is_dormant,
            ));
        }

        // Receive-only accounts still get last-active / dormancy refreshed.
        for (account, idxs) in &g.incoming {
            if g.outgoing.contains_key(account) {
                continue;
            }
            let last_active = idxs.iter().map(|&i| g.tx_log[i].timestamp).max();
            let is_dormant = last_active
                .map(|ts| (now - ts) > Duration::days(dormant_days))
                .unwrap_or(false);
            updates.push((account.clone(), 0.0, 0.0, 0, 0.0, last_active, is_dormant));
        }

        let updated = updates.len();
        for (account, mean, std, count, outflow, last_active, is_dormant) in updates {
            if let Some(acct) = g.accounts.get_mut(&account) {
                acct.rolling_mean = mean;
                acct.rolling_std = std;
                acct.tx_count = count;
                acct.total_outflow = outflow;
                acct.last_active = last_active;
                acct.is_dormant = is_dormant;
            }
        }
        Ok(updated)
    }

    async fn refresh_device_stats(&self) -> EngineResult<usize> {
        let mut g = self.inner.write();
        let risks: HashMap<AccountId, f64> = g
            .accounts
            .iter()
            .map(|(id, a)| (id.clone(), a.risk_score))
            .collect();
        let mut updated = 0;
        for dev in g.devices.values_mut() {
            let user_risks: Vec<f64> = dev
                .accounts
                .iter()
                .filter_map(|a| risks.get(a).copied())
                .collect();
            dev.derived_risk = derive_device_risk(dev.accounts.len(), &user_risks);
            updated += 1;
        }
        Ok(updated)
    }

    async fn apply_graph_metrics(
        &self,
        metrics: &[(AccountId, GraphMetrics)],
    ) -> EngineResult<()> {
        let mut g = self.inner.write();
        for (account, m) in metrics {
            if let Some(acct) = g.accounts.get_mut(account) {
                acct.community_id = m.community_id;
                acct.pagerank = m.pagerank;
                acct.betweenness = m.betweenness;
                acct.clustering_coeff = m.clustering_coeff;
                acct.component_id = m.component_id;
            }
        }
        Ok(())
    }

    async fn replace_clusters(&self, clusters: Vec<ClusterRecord>) -> EngineResult<()> {
        let mut g = self.inner.write();
        g.clusters = clusters
            .into_iter()
            .map(|c| (c.cluster_id, c))
            .collect();
        Ok(())
    }

    async fn transfer_edges(&self) -> EngineResult<Vec<TransferEdge>> {
        let g = self.inner.read();
        Ok(g.pairs
            .iter()
            .map(|((from, to), agg)| TransferEdge {
                from: from.clone(),
                to: to.clone(),
                total_amount: agg.total_amount,
                tx_count: agg.tx_count,
                last_timestamp: agg.last_timestamp,
            })
            .collect())
    }

    async fn recent_transfers(
        &self,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<TransferEvent>> {
        let g = self.inner.read();
        let cutoff = now - Duration::seconds(window_secs);
        Ok(g.tx_log
            .iter()
            .filter(|t| t.timestamp > cutoff && t.timestamp <= now)
            .map(|t| TransferEvent {
                from: t.sender.clone(),
                to: t.receiver.clone(),
                amount: t.amount,
                timestamp: t.timestamp,
            })
            .collect())
    }

    async fn account_risks(&self) -> EngineResult<HashMap<AccountId, f64>> {
        let g = self.inner.read();
        Ok(g.accounts
            .iter()
            .map(|(id, a)| (id.clone(), a.risk_score))
            .collect())
    }

    async fn counts(&self) -> EngineResult<StoreCounts> {
        let g = self.inner.read();
        Ok(StoreCounts {
            accounts: g.accounts.len(),
            devices: g.devices.len(),
            endpoints: g.endpoints.len(),
            transactions: g.tx_log.len(),
            clusters: g.clusters.len(),
            transfer_edges: g.pairs.len(),
        })
    }

    async fn dashboard_aggregates(
        &self,
        medium_threshold: f64,
    ) -> EngineResult<DashboardAggregates> {
        let g = self.inner.read();
        let scored: Vec<f64> = g.tx_log.iter().filter_map(|t| t.risk_score).collect();
        let avg = if scored.is_empty() {
            0.0
        } else {
            scored.iter().sum::<f64>() / scored.len() as f64
        };
        Ok(DashboardAggregates {
            total_transactions: g.tx_log.len(),
            flagged_transactions: scored.iter().filter(|&&r| r >= medium_threshold).count(),
            active_clusters: g.clusters.len(),
            avg_risk_score: avg,
            total_amount: g.tx_log.iter().map(|t| t.amount).sum(),
        })
    }

    async fn fraud_network(
        &self,
        min_risk: f64,
    ) -> EngineResult<(Vec<VizNode>, Vec<VizEdge>)> {
        let g = self.inner.read();
        let mut nodes: HashMap<AccountId, VizNode> = HashMap::new();
        let mut edges = Vec::new();
        for ((from, to), agg) in &g.pairs {
            let from_risk = g.accounts.get(from).map(|a| a.risk_score).unwrap_or(0.0);
            let to_risk = g.accounts.get(to).map(|a| a.risk_score).unwrap_or(0.0);
            if from_risk < min_risk && to_risk < min_risk {
                continue;
            }
            nodes.entry(from.clone()).or_insert_with(|| VizNode {
                id: from.clone(),
                risk: from_risk,
                cluster: g.accounts.get(from).and_then(|a| a.community_id),
            });
            nodes.entry(to.clone()).or_insert_with(|| VizNode {
                id: to.clone(),
                risk: to_risk,
                cluster: g.accounts.get(to).and_then(|a| a.community_id),
            });
            edges.push(VizEdge {
                source: from.clone(),
                target: to.clone(),
                amount: agg.total_amount,
                tx_count: agg.tx_count,
            });
        }
        Ok((nodes.into_values().collect(), edges))
    }

    async fn device_sharing(&self, min_accounts: usize) -> EngineResult<Vec<DeviceSharingGroup>> {
        let g = self.inner.read();
        let mut groups: Vec<DeviceSharingGroup> = g
            .devices
            .iter()
            .filter(|(_, d)| d.accounts.len() >= min_accounts)
            .map(|(id, d)| {
                let mut accounts: Vec<AccountId> = d.accounts.iter().cloned().collect();
                accounts.sort();
                DeviceSharingGroup {
                    device_id: id.clone(),
                    account_count: d.accounts.len(),
                    accounts,
                    device_risk: d.derived_risk,
                }
            })
            .collect();
        groups.sort_by(|a, b| b.account_count.cmp(&a.account_count));
        Ok(groups)
    }
}
