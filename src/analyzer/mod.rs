//! # Batch Graph Analyzer
//!
//! Periodic recomputation of everything the hot path only reads: rolling
//! account statistics, device risk, the graph projection with its five
//! algorithms, and the six collusion detectors feeding the hot-path
//! cache. Runs as a single task on its own cadence, never on worker
//! threads. A failed cycle leaves the previous snapshot in place.

pub mod algorithms;
pub mod collusion;

pub use algorithms::Projection;
pub use collusion::{CollusionCache, CollusionSnapshot};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::metrics::EngineMetrics;
use crate::store::{ClusterRecord, GraphMetrics, GraphStore};
use crate::types::{AccountId, EngineResult};

/// Temporal windows of the collusion detectors.
const CIRCULAR_FLOW_WINDOW_SECS: i64 = 7 * 24 * 3600;
const RAPID_CHAIN_MAX_GAP_SECS: i64 = 300;
const RELAY_WINDOW_SECS: i64 = 600;

/// Result of the most recent analyzer cycle, served by the status API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerStatus {
    pub cycles: u64,
    pub failures: u64,
    pub snapshot_seq: u64,
    pub accounts_refreshed: usize,
    pub devices_refreshed: usize,
    pub projection_nodes: usize,
    pub communities: usize,
    pub fraud_islands: usize,
    pub money_routers: usize,
    pub circular_flows: usize,
    pub rapid_chains: usize,
    pub star_hubs: usize,
    pub relay_mules: usize,
    pub last_cycle_ms: f64,
}

/// Background analyzer task handle.
pub struct GraphAnalyzer {
    store: Arc<dyn GraphStore>,
    cache: Arc<CollusionCache>,
    config: Arc<EngineConfig>,
    metrics: Arc<EngineMetrics>,
    status: Arc<RwLock<AnalyzerStatus>>,
    running: Arc<RwLock<bool>>,
}

impl GraphAnalyzer {
    pub fn new(
        store: Arc<dyn GraphStore>,
        cache: Arc<CollusionCache>,
        config: Arc<EngineConfig>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            metrics,
            status: Arc::new(RwLock::new(AnalyzerStatus::default())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn status_handle(&self) -> Arc<RwLock<AnalyzerStatus>> {
        self.status.clone()
    }

    /// Spawn the periodic loop.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        *self.running.write() = true;
        let analyzer = self.clone();
        info!(
            interval_secs = analyzer.config.analyzer_interval_secs,
            "graph analyzer started"
        );
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(
                analyzer.config.analyzer_interval_secs.max(1),
            ));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; let some data accumulate.
            ticker.tick().await;
            while *analyzer.running.read() {
                ticker.tick().await;
                match analyzer.run_once().await {
                    Ok(status) => {
                        debug!(
                            seq = status.snapshot_seq,
                            elapsed_ms = status.last_cycle_ms,
                            "analyzer cycle complete"
                        );
                    }
                    Err(err) => {
                        analyzer
                            .metrics
                            .analyzer_failures
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        analyzer.status.write().failures += 1;
                        error!(%err, "analyzer cycle failed, previous snapshot kept");
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        *self.running.write() = false;
    }

    /// Execute one full cycle. Public for tests and on-demand refresh.
    pub async fn run_once(&self) -> EngineResult<AnalyzerStatus> {
        let started = Instant::now();
        let now = Utc::now();
        let cfg = &self.config;

        // Phase 1: rolling stats and dormancy, then device risk.
        let accounts_refreshed = self
            .store
            .refresh_rolling_stats(cfg.behavioral_history, cfg.dormant_days, now)
            .await?;
        let devices_refreshed = self.store.refresh_device_stats().await?;

        // Phase 2: projection and the five algorithms.
        let edges = self.store.transfer_edges().await?;
        let projection = Projection::build(&edges);
        let communities = projection.louvain();
        let betweenness = projection.betweenness();
        let pagerank = projection.pagerank(0.85, 30);
        let clustering = projection.clustering_coefficients();
        let components = projection.weakly_connected_components();

        let mut metric_updates: Vec<(AccountId, GraphMetrics)> = Vec::new();
        for (account, &node) in &projection.node_map {
            metric_updates.push((
                account.clone(),
                GraphMetrics {
                    community_id: communities.get(&node).copied(),
                    pagerank: pagerank.get(&node).copied().unwrap_or(0.0),
                    betweenness: betweenness.get(&node).copied().unwrap_or(0.0),
                    clustering_coeff: clustering.get(&node).copied().unwrap_or(0.0),
                    component_id: components.get(&node).copied(),
                },
            ));
        }
        self.store.apply_graph_metrics(&metric_updates).await?;

        // Phase 3: cluster aggregates, fully replaced.
        let risks = self.store.account_risks().await?;
        let clusters = build_clusters(&projection, &communities, &risks, cfg.high_threshold);
        let community_count = clusters.len();
        self.store.replace_clusters(clusters.clone()).await?;

        // Phase 4: the six collusion detectors.
        let ring_events = self
            .store
            .recent_transfers(CIRCULAR_FLOW_WINDOW_SECS, now)
            .await?;
        let relay_events = self.store.recent_transfers(RELAY_WINDOW_SECS, now).await?;

        let betweenness_by_account: HashMap<AccountId, f64> = projection
            .node_map
            .iter()
            .map(|(account, node)| {
                (
                    account.clone(),
                    betweenness.get(node).copied().unwrap_or(0.0),
                )
            })
            .collect();
        let mut out_degree: HashMap<AccountId, usize> = HashMap::new();
        let mut in_degree: HashMap<AccountId, usize> = HashMap::new();
        for edge in &edges {
            *out_degree.entry(edge.from.clone()).or_default() += 1;
            *in_degree.entry(edge.to.clone()).or_default() += 1;
        }

        let snapshot = CollusionSnapshot {
            seq: 0, // assigned on swap
            generated_at: Some(now),
            islands: collusion::detect_fraud_islands(&clusters, 40.0),
            routers: collusion::detect_money_routers(
                &betweenness_by_account,
                cfg.router_betweenness_threshold,
            ),
            rings: collusion::detect_circular_flows(&ring_events),
            chains: collusion::detect_rapid_chains(&ring_events, RAPID_CHAIN_MAX_GAP_SECS),
            hubs: collusion::detect_star_hubs(&out_degree, &in_degree),
            relays: collusion::detect_relay_mules(
                &relay_events,
                ChronoDuration::seconds(RELAY_WINDOW_SECS),
                now,
                0.75,
            ),
            ..Default::default()
        };

        let status_snapshot = {
            let mut status = self.status.write();
            status.cycles += 1;
            status.accounts_refreshed = accounts_refreshed;
            status.devices_refreshed = devices_refreshed;
            status.projection_nodes = projection.node_count();
            status.communities = community_count;
            status.fraud_islands = snapshot.islands.len();
            status.money_routers = snapshot.routers.len();
            status.circular_flows = snapshot.rings.len();
            status.rapid_chains = snapshot.chains.len();
            status.star_hubs = snapshot.hubs.len();
            status.relay_mules = snapshot.relays.len();
            status.last_cycle_ms = started.elapsed().as_secs_f64() * 1000.0;
            status.clone()
        };

        // The swap is the single linearization point for readers.
        self.cache.store(snapshot);
        let seq = self.cache.load().seq;
        self.status.write().snapshot_seq = seq;
        self.metrics
            .analyzer_cycles
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let mut final_status = status_snapshot;
        final_status.snapshot_seq = seq;
        if final_status.cycles == 1 {
            info!(
                nodes = final_status.projection_nodes,
                communities = final_status.communities,
                "first analyzer snapshot published"
            );
        }
        Ok(final_status)
    }
}

/// Group accounts by community and aggregate risk statistics.
fn build_clusters(
    projection: &Projection,
    communities: &HashMap<petgraph::graph::NodeIndex, i64>,
    risks: &HashMap<AccountId, f64>,
    high_threshold: f64,
) -> Vec<ClusterRecord> {
    let mut members: HashMap<i64, Vec<AccountId>> = HashMap::new();
    for (account, node) in &projection.node_map {
        if let Some(&community) = communities.get(node) {
            members.entry(community).or_default().push(account.clone());
        }
    }

    let mut clusters: Vec<ClusterRecord> = members
        .into_iter()
        .map(|(cluster_id, mut members)| {
            members.sort();
            let member_risks: Vec<f64> = members
                .iter()
                .map(|m| risks.get(m).copied().unwrap_or(0.0))
                .collect();
            let mean_risk = if member_risks.is_empty() {
                0.0
            } else {
                member_risks.iter().sum::<f64>() / member_risks.len() as f64
            };
            ClusterRecord {
                cluster_id,
                member_count: members.len(),
                mean_risk,
                high_risk_count: member_risks
                    .iter()
                    .filter(|&&r| r >= high_threshold)
                    .count(),
                members,
            }
        })
        .collect();
    clusters.sort_by_key(|c| c.cluster_id);
    clusters
}
