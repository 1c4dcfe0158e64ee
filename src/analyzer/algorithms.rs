//! Graph algorithms over the account-transfer projection.
//!
//! The projection is rebuilt each cycle from the TRANSFERRED_TO edges;
//! all heavy traversals live here so the scoring path only reads the
//! properties written back afterwards. Louvain and the clustering
//! coefficient treat the projection as undirected and weighted; PageRank
//! and betweenness respect edge direction.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::visit::IntoEdgeReferences;
use petgraph::Direction;

use crate::store::TransferEdge;
use crate::types::AccountId;

/// Directed, weighted projection of accounts and transfer aggregates.
pub struct Projection {
    pub graph: StableGraph<AccountId, f64>,
    pub node_map: HashMap<AccountId, NodeIndex>,
}

impl Projection {
    /// Build the projection from the shortcut edges.
    pub fn build(edges: &[TransferEdge]) -> Self {
        let mut graph = StableGraph::new();
        let mut node_map: HashMap<AccountId, NodeIndex> = HashMap::new();
        for edge in edges {
            let from = *node_map
                .entry(edge.from.clone())
                .or_insert_with(|| graph.add_node(edge.from.clone()));
            let to = *node_map
                .entry(edge.to.clone())
                .or_insert_with(|| graph.add_node(edge.to.clone()));
            graph.add_edge(from, to, edge.total_amount.max(0.0));
        }
        Self { graph, node_map }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Undirected weighted adjacency (parallel edges folded).
    fn undirected_adjacency(&self) -> HashMap<NodeIndex, HashMap<NodeIndex, f64>> {
        let mut adj: HashMap<NodeIndex, HashMap<NodeIndex, f64>> = HashMap::new();
        for node in self.graph.node_indices() {
            adj.entry(node).or_default();
        }
        for edge in self.graph.edge_references() {
            let (a, b) = (edge.source(), edge.target());
            if a == b {
                continue;
            }
            let w = *edge.weight();
            *adj.entry(a).or_default().entry(b).or_insert(0.0) += w;
            *adj.entry(b).or_default().entry(a).or_insert(0.0) += w;
        }
        adj
    }

    /// PageRank with the given damping factor.
    pub fn pagerank(&self, damping: f64, iterations: usize) -> HashMap<NodeIndex, f64> {
        let nodes = self.indices();
        let n = nodes.len();
        if n == 0 {
            return HashMap::new();
        }
        let base = (1.0 - damping) / n as f64;
        let mut rank: HashMap<NodeIndex, f64> =
            nodes.iter().map(|&i| (i, 1.0 / n as f64)).collect();
        let out_degree: HashMap<NodeIndex, usize> = nodes
            .iter()
            .map(|&i| (i, self.graph.edges_directed(i, Direction::Outgoing).count()))
            .collect();

        for _ in 0..iterations {
            let mut next: HashMap<NodeIndex, f64> = nodes.iter().map(|&i| (i, base)).collect();
            let mut dangling = 0.0;
            for &node in &nodes {
                let r = rank[&node];
                let deg = out_degree[&node];
                if deg == 0 {
                    dangling += r;
                    continue;
                }
                let share = damping * r / deg as f64;
                for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                    *next.get_mut(&edge.target()).expect("node exists") += share;
                }
            }
            // Dangling mass is spread uniformly.
            let dangling_share = damping * dangling / n as f64;
            for value in next.values_mut() {
                *value += dangling_share;
            }
            rank = next;
        }
        rank
    }

    /// Brandes betweenness centrality on the directed, unweighted
    /// projection, normalised by (n-1)(n-2).
    pub fn betweenness(&self) -> HashMap<NodeIndex, f64> {
        let nodes = self.indices();
        let n = nodes.len();
        let mut centrality: HashMap<NodeIndex, f64> = nodes.iter().map(|&i| (i, 0.0)).collect();
        if n < 3 {
            return centrality;
        }

        for &source in &nodes {
            let mut stack: Vec<NodeIndex> = Vec::new();
            let mut predecessors: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
            let mut sigma: HashMap<NodeIndex, f64> = nodes.iter().map(|&i| (i, 0.0)).collect();
            let mut dist: HashMap<NodeIndex, i64> = nodes.iter().map(|&i| (i, -1)).collect();
            sigma.insert(source, 1.0);
            dist.insert(source, 0);

            let mut queue = VecDeque::new();
            queue.push_back(source);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for edge in self.graph.edges_directed(v, Direction::Outgoing) {
                    let w = edge.target();
                    if dist[&w] < 0 {
                        dist.insert(w, dist[&v] + 1);
                        queue.push_back(w);
                    }
                    if dist[&w] == dist[&v] + 1 {
                        *sigma.get_mut(&w).expect("node exists") += sigma[&v];
                        predecessors.entry(w).or_default().push(v);
                    }
                }
            }

            let mut delta: HashMap<NodeIndex, f64> = nodes.iter().map(|&i| (i, 0.0)).collect();
            while let Some(w) = stack.pop() {
                if let Some(preds) = predecessors.get(&w) {
                    for &v in preds {
                        let share = sigma[&v] / sigma[&w] * (1.0 + delta[&w]);
                        *delta.get_mut(&v).expect("node exists") += share;
                    }
                }
                if w != source {
                    *centrality.get_mut(&w).expect("node exists") += delta[&w];
                }
            }
        }

        let norm = ((n - 1) * (n - 2)) as f64;
        for value in centrality.values_mut() {
            *value /= norm;
        }
        centrality
    }

    /// Local clustering coefficient on the undirected projection.
    pub fn clustering_coefficients(&self) -> HashMap<NodeIndex, f64> {
        let adj = self.undirected_adjacency();
        let mut coefficients = HashMap::new();
        for (&node, neighbors) in &adj {
            let ns: Vec<NodeIndex> = neighbors.keys().copied().collect();
            let k = ns.len();
            if k < 2 {
                coefficients.insert(node, 0.0);
                continue;
            }
            let mut links = 0usize;
            for i in 0..ns.len() {
                for j in (i + 1)..ns.len() {
                    if adj
                        .get(&ns[i])
                        .map(|m| m.contains_key(&ns[j]))
                        .unwrap_or(false)
                    {
                        links += 1;
                    }
                }
            }
            coefficients.insert(node, 2.0 * links as f64 / (k * (k - 1)) as f64);
        }
        coefficients
    }

    /// Weakly-connected components via union-find.
    pub fn weakly_connected_components(&self) -> HashMap<NodeIndex, u64> {
        let nodes = self.indices();
        let index_of: HashMap<NodeIndex, usize> =
            nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let mut parent: Vec<usize> = (0..nodes.len()).collect();

        fn find(parent: &mut Vec<usize>, i: usize) -> usize {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            let mut cursor = i;
            while parent[cursor] != root {
                let next = parent[cursor];
                parent[cursor] = root;
                cursor = next;
            }
            root
        }

        for edge in self.graph.edge_references() {
            let a = find(&mut parent, index_of[&edge.source()]);
            let b = find(&mut parent, index_of[&edge.target()]);
            if a != b {
                parent[a.max(b)] = a.min(b);
            }
        }

        let mut labels: HashMap<usize, u64> = HashMap::new();
        let mut components = HashMap::new();
        for (&node, &i) in &index_of {
            let root = find(&mut parent, i);
            let next_label = labels.len() as u64;
            let label = *labels.entry(root).or_insert(next_label);
            components.insert(node, label);
        }
        components
    }

    /// Louvain community detection on the undirected weighted projection.
    ///
    /// Local-moving passes followed by graph aggregation, repeated until
    /// no move improves modularity. Community ids are dense from 0.
    pub fn louvain(&self) -> HashMap<NodeIndex, i64> {
        let nodes = self.indices();
        if nodes.is_empty() {
            return HashMap::new();
        }

        // Flatten the undirected adjacency to index-based vectors.
        let index_of: HashMap<NodeIndex, usize> =
            nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); nodes.len()];
        for (node, neighbors) in self.undirected_adjacency() {
            let i = index_of[&node];
            for (neighbor, weight) in neighbors {
                adj[i].push((index_of[&neighbor], weight));
            }
        }

        // `membership[level]` maps that level's nodes to communities.
        let mut memberships: Vec<Vec<usize>> = Vec::new();
        let mut current = adj;
        loop {
            let (membership, improved) = louvain_level(&current);
            let communities = membership.iter().max().map(|m| m + 1).unwrap_or(0);
            memberships.push(membership.clone());
            if !improved || communities == current.len() {
                break;
            }
            current = aggregate(&current, &membership, communities);
        }

        // Collapse levels back to the original nodes.
        let mut assignment: Vec<usize> = (0..nodes.len()).collect();
        for membership in &memberships {
            for slot in assignment.iter_mut() {
                *slot = membership[*slot];
            }
        }

        nodes
            .iter()
            .map(|&node| (node, assignment[index_of[&node]] as i64))
            .collect()
    }
}

/// One Louvain local-moving pass. Returns per-node community (dense ids)
/// and whether any node moved.
fn louvain_level(adj: &[Vec<(usize, f64)>]) -> (Vec<usize>, bool) {
    let n = adj.len();
    let mut community: Vec<usize> = (0..n).collect();

    // k[i]: weighted degree; total graph weight m (undirected halves).
    let k: Vec<f64> = adj
        .iter()
        .map(|edges| edges.iter().map(|(_, w)| w).sum())
        .collect();
    let m: f64 = k.iter().sum::<f64>() / 2.0;
    if m <= 0.0 {
        return (dense_labels(&community), false);
    }
    let mut sigma_tot: Vec<f64> = k.clone();

    let mut any_moved = false;
    loop {
        let mut moved = false;
        for i in 0..n {
            let home = community[i];
            sigma_tot[home] -= k[i];

            // Weight from i into each neighbouring community.
            let mut weights_to: HashMap<usize, f64> = HashMap::new();
            for &(j, w) in &adj[i] {
                if j != i {
                    *weights_to.entry(community[j]).or_insert(0.0) += w;
                }
            }

            let gain = |c: usize| -> f64 {
                let w_in = weights_to.get(&c).copied().unwrap_or(0.0);
                w_in - sigma_tot[c] * k[i] / (2.0 * m)
            };

            let mut best = home;
            let mut best_gain = gain(home);
            let mut candidates: Vec<usize> = weights_to.keys().copied().collect();
            candidates.sort_unstable();
            for c in candidates {
                let g = gain(c);
                if g > best_gain + 1e-12 {
                    best_gain = g;
                    best = c;
                }
            }

            sigma_tot[best] += k[i];
            if best != home {
                community[i] = best;
                moved = true;
                any_moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    (dense_labels(&community), any_moved)
}

fn dense_labels(community: &[usize]) -> Vec<usize> {
    let mut labels: HashMap<usize, usize> = HashMap::new();
    community
        .iter()
        .map(|&c| {
            let next = labels.len();
            *labels.entry(c).or_insert(next)
        })
        .collect()
}

/// Fold nodes of one level into their communities.
fn aggregate(
    adj: &[Vec<(usize, f64)>],
    membership: &[usize],
    communities: usize,
) -> Vec<Vec<(usize, f64)>> {
    let mut folded: Vec<HashMap<usize, f64>> = vec![HashMap::new(); communities];
    for (i, edges) in adj.iter().enumerate() {
        let ci = membership[i];
        for &(j, w) in edges {
            let cj = membership[j];
            *folded[ci].entry(cj).or_insert(0.0) += w;
        }
    }
    folded
        .into_iter()
        .map(|m| m.into_iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn edge(from: &str, to: &str, amount: f64) -> TransferEdge {
        TransferEdge {
            from: from.into(),
            to: to.into(),
            total_amount: amount,
            tx_count: 1,
            last_timestamp: Utc::now(),
        }
    }

    #[test]
    fn pagerank_sums_to_one_and_favours_sinks() {
        let edges = vec![
            edge("a", "hub", 100.0),
            edge("b", "hub", 100.0),
            edge("c", "hub", 100.0),
        ];
        let projection = Projection::build(&edges);
        let ranks = projection.pagerank(0.85, 30);
        let total: f64 = ranks.values().sum();
        assert!((total - 1.0).abs() < 1e-6);

        let hub = projection.node_map[&AccountId::from("hub")];
        let a = projection.node_map[&AccountId::from("a")];
        assert!(ranks[&hub] > ranks[&a]);
    }

    #[test]
    fn betweenness_peaks_on_bridge() {
        // a -> bridge -> b: only the bridge carries shortest paths.
        let edges = vec![edge("a", "bridge", 10.0), edge("bridge", "b", 10.0)];
        let projection = Projection::build(&edges);
        let centrality = projection.betweenness();
        let bridge = projection.node_map[&AccountId::from("bridge")];
        let a = projection.node_map[&AccountId::from("a")];
        assert!(centrality[&bridge] > 0.0);
        assert_eq!(centrality[&a], 0.0);
    }

    #[test]
    fn clustering_coefficient_of_triangle_is_one() {
        let edges = vec![
            edge("a", "b", 1.0),
            edge("b", "c", 1.0),
            edge("c", "a", 1.0),
        ];
        let projection = Projection::build(&edges);
        for (_, &cc) in projection.clustering_coefficients().iter() {
            assert!((cc - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn wcc_separates_disconnected_groups() {
        let edges = vec![edge("a", "b", 1.0), edge("x", "y", 1.0)];
        let projection = Projection::build(&edges);
        let components = projection.weakly_connected_components();
        let a = components[&projection.node_map[&AccountId::from("a")]];
        let b = components[&projection.node_map[&AccountId::from("b")]];
        let x = components[&projection.node_map[&AccountId::from("x")]];
        assert_eq!(a, b);
        assert_ne!(a, x);
    }

    #[test]
    fn louvain_finds_two_dense_groups() {
        // Two internally dense triangles joined by one weak edge.
        let edges = vec![
            edge("a1", "a2", 10.0),
            edge("a2", "a3", 10.0),
            edge("a3", "a1", 10.0),
            edge("b1", "b2", 10.0),
            edge("b2", "b3", 10.0),
            edge("b3", "b1", 10.0),
            edge("a1", "b1", 0.1),
        ];
        let projection = Projection::build(&edges);
        let communities = projection.louvain();

        let c = |name: &str| communities[&projection.node_map[&AccountId::from(name)]];
        assert_eq!(c("a1"), c("a2"));
        assert_eq!(c("a2"), c("a3"));
        assert_eq!(c("b1"), c("b2"));
        assert_eq!(c("b2"), c("b3"));
        assert_ne!(c("a1"), c("b1"));
    }

    #[test]
    fn empty_projection_is_harmless() {
        let projection = Projection::build(&[]);
        assert!(projection.pagerank(0.85, 10).is_empty());
        assert!(projection.betweenness().is_empty());
        assert!(projection.louvain().is_empty());
    }
}
