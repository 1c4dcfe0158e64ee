//! Graph-intelligence extraction.
//!
//! Reads the metrics the batch analyzer pre-computed onto the account
//! (community, betweenness, PageRank, clustering coefficient) and fuses
//! them with O(1) structural features. With no snapshot yet, everything
//! falls back to a zero contribution.

use std::sync::Arc;

use crate::store::GraphStore;
use crate::types::{AccountId, EngineResult};

/// Output of the graph-intelligence extractor.
#[derive(Debug, Clone, Default)]
pub struct GraphIntelFeatures {
    pub risk: f64,
    pub in_degree: usize,
    pub out_degree: usize,
    pub betweenness: f64,
    pub pagerank: f64,
    pub clustering_coeff: f64,
    pub community_id: Option<i64>,
    pub community_risk: f64,
    pub community_contribution: f64,
    pub centrality_score: f64,
    pub pagerank_score: f64,
    pub structural_score: f64,
    pub neighbor_contagion: f64,
    pub avg_neighbor_risk: f64,
    pub flags: Vec<String>,
}

/// Stateless graph scorer over pre-computed batch properties.
pub struct GraphExtractor {
    store: Arc<dyn GraphStore>,
}

impl GraphExtractor {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn compute(&self, account: &AccountId) -> EngineResult<GraphIntelFeatures> {
        let f = self.store.graph_features(account).await?;

        // Community risk: dense high-risk cluster contributes its mean,
        // scaled; a cluster with a couple of hot members adds a flat 40.
        let mut community_risk = 0.0;
        let mut community_contribution = 0.0;
        if let Some(community_id) = f.community_id {
            if let Some(stats) = self.store.cluster_stats(community_id).await? {
                if stats.member_count >= 3 && stats.mean_risk > 50.0 {
                    community_risk = stats.mean_risk.min(100.0);
                    community_contribution = community_risk * 0.30;
                } else if stats.high_risk_count >= 2 {
                    community_risk = 40.0;
                    community_contribution = 40.0;
                }
            }
        }

        let centrality_score = (f.betweenness * 200.0).min(30.0);
        let pagerank_score = (f.pagerank * 500.0).min(15.0);

        let mut structural_score = 0.0;
        let fan_out = f.out_degree >= 5 && f.in_degree <= 2;
        let fan_in = f.in_degree >= 5 && f.out_degree <= 2;
        if fan_out {
            structural_score += 15.0;
        }
        if fan_in {
            structural_score += 15.0;
        }
        let tight_ring = f.clustering_coeff > 0.5 && f.in_degree + f.out_degree > 4;
        if tight_ring {
            structural_score += 10.0;
        }

        let neighbor_contagion = (f.avg_neighbor_risk * 0.3).min(15.0);

        let risk = (community_contribution
            + centrality_score
            + pagerank_score
            + structural_score
            + neighbor_contagion)
            .min(100.0);

        let mut flags = Vec::new();
        if f.betweenness > 0.05 {
            flags.push("High-betweenness node (money router)".to_string());
        }
        if community_risk > 50.0 {
            if let Some(id) = f.community_id {
                flags.push(format!("Member of high-risk cluster {id}"));
            }
        }
        if fan_out {
            flags.push("Fan-out hub (distributor)".to_string());
        }
        if fan_in {
            flags.push("Fan-in hub (collector)".to_string());
        }

        Ok(GraphIntelFeatures {
            risk,
            in_degree: f.in_degree,
            out_degree: f.out_degree,
            betweenness: f.betweenness,
            pagerank: f.pagerank,
            clustering_coeff: f.clustering_coeff,
            community_id: f.community_id,
            community_risk,
            community_contribution,
            centrality_score,
            pagerank_score,
            structural_score,
            neighbor_contagion,
            avg_neighbor_risk: f.avg_neighbor_risk,
            flags,
        })
    }
}
