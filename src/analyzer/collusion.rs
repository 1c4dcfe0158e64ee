//! Collusive-pattern detection and the hot-path collusion cache.
//!
//! The batch analyzer rebuilds a [`CollusionSnapshot`] each cycle and
//! swaps it in atomically; scoring workers take a pointer copy and never
//! hold a lock during traversal. Readers therefore observe either the
//! previous or the next complete snapshot, never a mix, and the snapshot
//! sequence number increases monotonically.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::store::{ClusterRecord, TransferEvent};
use crate::types::AccountId;

/// Community of accounts whose internal risk marks it as a fraud island.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudIsland {
    pub cluster_id: i64,
    pub member_count: usize,
    pub mean_risk: f64,
    pub members: Vec<AccountId>,
}

/// High-betweenness account bridging money flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyRouter {
    pub account: AccountId,
    pub betweenness: f64,
}

/// A -> ... -> A cycle closed within the detection window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircularFlow {
    pub members: Vec<AccountId>,
}

/// Directed 2-4 hop path with consecutive gaps under the chain limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapidChain {
    pub path: Vec<AccountId>,
    pub total_amount: f64,
}

/// Degree-5+ hub with an asymmetric fan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarHub {
    pub account: AccountId,
    pub in_degree: usize,
    pub out_degree: usize,
    pub hub_type: String,
}

/// Account relaying most of its inflow back out within minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMule {
    pub account: AccountId,
    pub inflow: f64,
    pub outflow: f64,
    pub flow_ratio: f64,
}

/// Patterns attached to one account, for O(1) hot-path lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountPatterns {
    pub flags: Vec<String>,
    pub cluster_id: Option<i64>,
}

/// Immutable result of one analyzer cycle.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CollusionSnapshot {
    /// Monotonically increasing cycle counter.
    pub seq: u64,
    pub generated_at: Option<DateTime<Utc>>,
    pub islands: Vec<FraudIsland>,
    pub routers: Vec<MoneyRouter>,
    pub rings: Vec<CircularFlow>,
    pub chains: Vec<RapidChain>,
    pub hubs: Vec<StarHub>,
    pub relays: Vec<RelayMule>,
    pub(crate) by_account: HashMap<AccountId, AccountPatterns>,
}

impl CollusionSnapshot {
    /// Cached flags for an account.
    pub fn account_flags(&self, account: &AccountId) -> &[String] {
        self.by_account
            .get(account)
            .map(|p| p.flags.as_slice())
            .unwrap_or(&[])
    }

    /// Primary fraud cluster the account belongs to, if any.
    pub fn account_cluster(&self, account: &AccountId) -> Option<i64> {
        self.by_account.get(account).and_then(|p| p.cluster_id)
    }

    /// Pattern counts plus top-10 details per pattern.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "snapshot_seq": self.seq,
            "generated_at": self.generated_at,
            "fraud_islands": self.islands.len(),
            "money_routers": self.routers.len(),
            "circular_flows": self.rings.len(),
            "rapid_chains": self.chains.len(),
            "star_hubs": self.hubs.len(),
            "relay_mules": self.relays.len(),
            "details": {
                "islands": self.islands.iter().take(10).collect::<Vec<_>>(),
                "routers": self.routers.iter().take(10).collect::<Vec<_>>(),
                "rings": self.rings.iter().take(10).collect::<Vec<_>>(),
                "chains": self.chains.iter().take(10).collect::<Vec<_>>(),
                "hubs": self.hubs.iter().take(10).collect::<Vec<_>>(),
                "relays": self.relays.iter().take(10).collect::<Vec<_>>(),
            },
        })
    }

    fn index_accounts(&mut self) {
        let mut by_account: HashMap<AccountId, AccountPatterns> = HashMap::new();

        for island in &self.islands {
            for member in &island.members {
                let entry = by_account.entry(member.clone()).or_default();
                entry
                    .flags
                    .push(format!("Part of fraud cluster {}", island.cluster_id));
                entry.cluster_id.get_or_insert(island.cluster_id);
            }
        }
        for router in &self.routers {
            by_account
                .entry(router.account.clone())
                .or_default()
                .flags
                .push("Money router (high betweenness)".to_string());
        }
        let mut ring_members: HashSet<AccountId> = HashSet::new();
        for ring in &self.rings {
            ring_members.extend(ring.members.iter().cloned());
        }
        for member in ring_members {
            by_account
                .entry(member)
                .or_default()
                .flags
                .push("Circular money flow detected".to_string());
        }
        for hub in &self.hubs {
            by_account
                .entry(hub.account.clone())
                .or_default()
                .flags
                .push(format!("Star hub ({})", hub.hub_type));
        }
        for relay in &self.relays {
            by_account
                .entry(relay.account.clone())
                .or_default()
                .flags
                .push("High-velocity relay pattern".to_string());
        }

        self.by_account = by_account;
    }
}

/// Atomically swappable snapshot holder.
pub struct CollusionCache {
    current: RwLock<Arc<CollusionSnapshot>>,
}

impl CollusionCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CollusionSnapshot::default())),
        }
    }

    /// Pointer copy of the live snapshot.
    pub fn load(&self) -> Arc<CollusionSnapshot> {
        self.current.read().clone()
    }

    /// Swap in a fully built snapshot.
    pub fn store(&self, mut snapshot: CollusionSnapshot) {
        snapshot.index_accounts();
        let mut guard = self.current.write();
        snapshot.seq = guard.seq + 1;
        *guard = Arc::new(snapshot);
    }
}

impl Default for CollusionCache {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Detectors =====

/// Fraud islands: communities of >= 3 members with mean risk > 40.
pub fn detect_fraud_islands(clusters: &[ClusterRecord], min_mean_risk: f64) -> Vec<FraudIsland> {
    clusters
        .iter()
        .filter(|c| c.member_count >= 3 && c.mean_risk > min_mean_risk)
        .map(|c| FraudIsland {
            cluster_id: c.cluster_id,
            member_count: c.member_count,
            mean_risk: c.mean_risk,
            members: c.members.clone(),
        })
        .collect()
}

/// Money routers: betweenness at or above the configured threshold.
pub fn detect_money_routers(
    betweenness: &HashMap<AccountId, f64>,
    threshold: f64,
) -> Vec<MoneyRouter> {
    let mut routers: Vec<MoneyRouter> = betweenness
        .iter()
        .filter(|(_, &b)| b >= threshold)
        .map(|(account, &b)| MoneyRouter {
            account: account.clone(),
            betweenness: b,
        })
        .collect();
    routers.sort_by(|a, b| b.betweenness.partial_cmp(&a.betweenness).unwrap());
    routers
}

fn adjacency(events: &[TransferEvent]) -> HashMap<&AccountId, Vec<&TransferEvent>> {
    let mut adj: HashMap<&AccountId, Vec<&TransferEvent>> = HashMap::new();
    for e in events {
        adj.entry(&e.from).or_default().push(e);
    }
    adj
}

/// Circular flows: cycles of length 2-4 closed inside the window.
pub fn detect_circular_flows(events: &[TransferEvent]) -> Vec<CircularFlow> {
    let adj = adjacency(events);
    let mut seen: HashSet<Vec<AccountId>> = HashSet::new();
    let mut rings = Vec::new();

    let mut starts: Vec<&AccountId> = adj.keys().copied().collect();
    starts.sort();
    for start in starts {
        let mut stack = vec![start.clone()];
        dfs_cycles(start, start, &adj, &mut stack, 4, &mut seen, &mut rings);
    }
    rings
}

fn dfs_cycles(
    start: &AccountId,
    current: &AccountId,
    adj: &HashMap<&AccountId, Vec<&TransferEvent>>,
    stack: &mut Vec<AccountId>,
    max_depth: usize,
    seen: &mut HashSet<Vec<AccountId>>,
    rings: &mut Vec<CircularFlow>,
) {
    if stack.len() > max_depth {
        return;
    }
    let Some(nexts) = adj.get(current) else {
        return;
    };
    for e in nexts {
        if e.to == *start && stack.len() >= 2 {
            // Canonical form: rotate so the smallest member leads.
            let mut members = stack.clone();
            let min_pos = members
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.cmp(b))
                .map(|(i, _)| i)
                .unwrap_or(0);
            members.rotate_left(min_pos);
            if seen.insert(members.clone()) {
                rings.push(CircularFlow { members });
            }
            continue;
        }
        if stack.contains(&e.to) {
            continue;
        }
        stack.push(e.to.clone());
        dfs_cycles(start, &e.to, adj, stack, max_depth, seen, rings);
        stack.pop();
    }
}

/// Rapid chains: 2-4 hop paths whose consecutive gaps stay under
/// `max_gap_secs`.
pub fn detect_rapid_chains(events: &[TransferEvent], max_gap_secs: i64) -> Vec<RapidChain> {
    let adj = adjacency(events);
    let mut chains = Vec::new();
    let mut seen: HashSet<Vec<AccountId>> = HashSet::new();

    for e in events {
        let mut path = vec![e.from.clone(), e.to.clone()];
        dfs_chains(
            e,
            &adj,
            &mut path,
            e.amount,
            max_gap_secs,
            &mut seen,
            &mut chains,
        );
    }
    chains
}

fn dfs_chains(
    last: &TransferEvent,
    adj: &HashMap<&AccountId, Vec<&TransferEvent>>,
    path: &mut Vec<AccountId>,
    amount_so_far: f64,
    max_gap_secs: i64,
    seen: &mut HashSet<Vec<AccountId>>,
    chains: &mut Vec<RapidChain>,
) {
    // Hops = path.len() - 1; record once the chain spans 2+ hops.
    if path.len() >= 3 && seen.insert(path.clone()) {
        chains.push(RapidChain {
            path: path.clone(),
            total_amount: amount_so_far,
        });
    }
    if path.len() >= 5 {
        return;
    }
    let Some(nexts) = adj.get(&last.to) else {
        return;
    };
    for e in nexts {
        let gap = (e.timestamp - last.timestamp).num_seconds();
        if gap <= 0 || gap >= max_gap_secs {
            continue;
        }
        if path.contains(&e.to) {
            continue;
        }
        path.push(e.to.clone());
        dfs_chains(e, adj, path, amount_so_far + e.amount, max_gap_secs, seen, chains);
        path.pop();
    }
}

/// Star hubs: degree >= 5 with an asymmetric fan.
pub fn detect_star_hubs(
    out_degree: &HashMap<AccountId, usize>,
    in_degree: &HashMap<AccountId, usize>,
) -> Vec<StarHub> {
    let accounts: HashSet<&AccountId> = out_degree.keys().chain(in_degree.keys()).collect();
    let mut hubs = Vec::new();
    for account in accounts {
        let out = out_degree.get(account).copied().unwrap_or(0);
        let inn = in_degree.get(account).copied().unwrap_or(0);
        let hub_type = if out >= 5 && inn <= 2 {
            "DISTRIBUTOR"
        } else if inn >= 5 && out <= 2 {
            "COLLECTOR"
        } else {
            continue;
        };
        hubs.push(StarHub {
            account: account.clone(),
            in_degree: inn,
            out_degree: out,
            hub_type: hub_type.to_string(),
        });
    }
    hubs.sort_by(|a, b| a.account.cmp(&b.account));
    hubs
}

/// Relay mules: outflow/inflow above the ratio inside the relay window.
pub fn detect_relay_mules(
    events: &[TransferEvent],
    window: Duration,
    now: DateTime<Utc>,
    min_flow_ratio: f64,
) -> Vec<RelayMule> {
    let cutoff = now - window;
    let mut inflow: HashMap<&AccountId, f64> = HashMap::new();
    let mut outflow: HashMap<&AccountId, f64> = HashMap::new();
    for e in events {
        if e.timestamp <= cutoff || e.timestamp > now {
            continue;
        }
        *inflow.entry(&e.to).or_default() += e.amount;
        *outflow.entry(&e.from).or_default() += e.amount;
    }

    let mut relays = Vec::new();
    for (account, &inn) in &inflow {
        if inn <= 0.0 {
            continue;
        }
        let out = outflow.get(account).copied().unwrap_or(0.0);
        let ratio = out / inn;
        if ratio > min_flow_ratio {
            relays.push(RelayMule {
                account: (*account).clone(),
                inflow: inn,
                outflow: out,
                flow_ratio: ratio,
            });
        }
    }
    relays.sort_by(|a, b| b.flow_ratio.partial_cmp(&a.flow_ratio).unwrap());
    relays
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(from: &str, to: &str, amount: f64, second: i64) -> TransferEvent {
        TransferEvent {
            from: from.into(),
            to: to.into(),
            amount,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
                + Duration::seconds(second),
        }
    }

    #[test]
    fn circular_flow_found_once() {
        let events = vec![
            event("a", "b", 100.0, 0),
            event("b", "c", 90.0, 10),
            event("c", "a", 80.0, 20),
        ];
        let rings = detect_circular_flows(&events);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].members.len(), 3);
        assert_eq!(rings[0].members[0], AccountId::from("a"));
    }

    #[test]
    fn no_cycle_no_ring() {
        let events = vec![event("a", "b", 100.0, 0), event("b", "c", 90.0, 10)];
        assert!(detect_circular_flows(&events).is_empty());
    }

    #[test]
    fn rapid_chain_respects_gap_limit() {
        let fast = vec![
            event("a", "b", 100.0, 0),
            event("b", "c", 95.0, 60),
            event("c", "d", 90.0, 120),
        ];
        let chains = detect_rapid_chains(&fast, 300);
        assert!(chains.iter().any(|c| c.path.len() == 4));

        let slow = vec![event("a", "b", 100.0, 0), event("b", "c", 95.0, 600)];
        assert!(detect_rapid_chains(&slow, 300).is_empty());
    }

    #[test]
    fn star_hub_requires_asymmetry() {
        let mut out = HashMap::new();
        let mut inn = HashMap::new();
        out.insert(AccountId::from("spreader"), 6);
        inn.insert(AccountId::from("spreader"), 1);
        out.insert(AccountId::from("balanced"), 6);
        inn.insert(AccountId::from("balanced"), 6);
        let hubs = detect_star_hubs(&out, &inn);
        assert_eq!(hubs.len(), 1);
        assert_eq!(hubs[0].hub_type, "DISTRIBUTOR");
    }

    #[test]
    fn relay_mule_ratio() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 10, 0).unwrap();
        let events = vec![
            event("x", "relay", 1_000.0, 0),
            event("relay", "y", 900.0, 60),
        ];
        let relays = detect_relay_mules(&events, Duration::minutes(10), now, 0.75);
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].account, AccountId::from("relay"));
        assert!((relays[0].flow_ratio - 0.9).abs() < 1e-9);
    }

    #[test]
    fn snapshot_swap_is_monotonic_and_complete() {
        let cache = CollusionCache::new();
        assert_eq!(cache.load().seq, 0);

        let mut snapshot = CollusionSnapshot::default();
        snapshot.routers.push(MoneyRouter {
            account: "r".into(),
            betweenness: 0.4,
        });
        cache.store(snapshot);

        let live = cache.load();
        assert_eq!(live.seq, 1);
        assert_eq!(live.account_flags(&"r".into()).len(), 1);

        cache.store(CollusionSnapshot::default());
        let next = cache.load();
        assert_eq!(next.seq, 2);
        assert!(next.account_flags(&"r".into()).is_empty());
        // The earlier pointer copy still sees the full old snapshot.
        assert_eq!(live.seq, 1);
        assert_eq!(live.account_flags(&"r".into()).len(), 1);
    }

    #[test]
    fn island_membership_flagged() {
        let clusters = vec![ClusterRecord {
            cluster_id: 3,
            member_count: 4,
            mean_risk: 55.0,
            high_risk_count: 2,
            members: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        }];
        let islands = detect_fraud_islands(&clusters, 40.0);
        assert_eq!(islands.len(), 1);

        let mut snapshot = CollusionSnapshot {
            islands,
            ..Default::default()
        };
        snapshot.index_accounts();
        assert_eq!(snapshot.account_cluster(&"a".into()), Some(3));
    }
}
