//! Explanation synthesis.
//!
//! Turns the booleans computed during scoring into a stable,
//! human-readable reason string. Each rule fires at most once, clauses
//! are emitted in a fixed order, and nothing here re-queries the graph,
//! so re-running scoring on an unchanged snapshot reproduces the string
//! byte for byte.

use crate::config::EngineConfig;
use crate::features::{
    BehavioralFeatures, DeviceFeatures, DormantFeatures, GraphIntelFeatures, VelocityFeatures,
};

/// Build the reason string from the fired rule predicates.
pub fn build_reason(
    config: &EngineConfig,
    behavioral: &BehavioralFeatures,
    dormant: &DormantFeatures,
    device: &DeviceFeatures,
    graph: &GraphIntelFeatures,
    velocity: &VelocityFeatures,
    fused: f64,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    // Dormancy rules.
    if dormant.is_dormant || dormant.is_first_strike {
        parts.push(format!(
            "Account activated after {} days of inactivity",
            dormant.days_dormant as i64
        ));
    }
    if dormant.sleep_flash {
        parts.push(format!(
            "Sleep-and-flash mule: amount {:.0}x above historical average, dormant over {} days",
            dormant.sleep_flash_ratio, config.dormant_days
        ));
    }

    // Graph rules.
    if graph.community_risk > 50.0 {
        parts.push(format!(
            "Community #{} has {:.0}% fraud density",
            graph
                .community_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "?".to_string()),
            graph.community_risk
        ));
    }
    if graph.betweenness > config.router_betweenness_threshold {
        parts.push("High betweenness centrality (money router)".to_string());
    }
    if graph.structural_score >= 15.0 {
        parts.push("Asymmetric fan pattern in transfer graph".to_string());
    }

    // Device rules.
    if device.account_count >= 5 {
        parts.push(format!(
            "Shared device with {} other accounts",
            device.account_count
        ));
    }
    if device.new_device {
        parts.push("Transaction from a new, unseen device".to_string());
    }
    if device.cap_mask_hamming > 0 {
        parts.push("Device capability mask changed unexpectedly".to_string());
    }
    if device.new_device_high_mpin {
        parts.push("New device with high amount over MPIN authentication".to_string());
    }
    if device.multi_user_burst {
        parts.push(format!(
            "{} accounts used the same device within 24h",
            device.multi_user_count
        ));
    }

    // Behavioural rules.
    if behavioral.impossible_travel {
        parts.push("Impossible travel between consecutive transactions".to_string());
    }
    if behavioral.amount_zscore > 3.0 {
        parts.push(format!(
            "Amount z-score {:.1} above sender baseline",
            behavioral.amount_zscore
        ));
    }
    if behavioral.is_night {
        parts.push("Unusual night-time transaction".to_string());
    }
    if let Some(info) = &behavioral.asn.info {
        if behavioral.asn.risk >= 0.5 {
            parts.push(format!(
                "High ASN risk: {} network (country: {})",
                info.class.as_str(),
                info.country
            ));
        }
        if info.foreign {
            parts.push(format!("Foreign network origin: {}", info.country));
        }
        if behavioral.asn.drift {
            parts.push("ASN drift: unusual network for this sender".to_string());
        }
    }
    if behavioral.endpoint_rotation {
        parts.push(format!(
            "Endpoint rotation: {} distinct endpoints in 24h",
            behavioral.endpoint_rotation_count
        ));
    }
    if behavioral.fixed_amount {
        parts.push("Fixed-amount pattern: repeated identical transfers".to_string());
    }
    if behavioral.circadian_anomaly {
        parts.push("Circadian anomaly: transaction at an unusual hour for this sender".to_string());
    }
    if behavioral.identicality {
        parts.push(format!(
            "{} identical-amount transfers to the same receiver",
            behavioral.identicality_count
        ));
    }

    // Velocity rules.
    if velocity.tx_per_min > 5.0 {
        parts.push(format!(
            "Velocity: {:.1} tx/min in the last window",
            velocity.tx_per_min
        ));
    }
    if velocity.outflow_inflow_ratio > config.pass_through_ratio {
        parts.push("Rapid fund relay pattern".to_string());
    }

    // Same rule never fires twice; an overlap in wording is removed here.
    parts.dedup();

    if parts.is_empty() {
        return if fused >= config.high_threshold {
            "Multiple minor indicators combined above threshold.".to_string()
        } else {
            "No significant risk indicators".to_string()
        };
    }

    let mut reason = parts.join(". ");
    reason.push('.');
    reason
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn clean_record_has_stable_default() {
        let reason = build_reason(
            &config(),
            &BehavioralFeatures::default(),
            &DormantFeatures::default(),
            &DeviceFeatures::default(),
            &GraphIntelFeatures::default(),
            &VelocityFeatures::default(),
            5.0,
        );
        assert_eq!(reason, "No significant risk indicators");
    }

    #[test]
    fn reason_is_deterministic() {
        let behavioral = BehavioralFeatures {
            impossible_travel: true,
            is_night: true,
            ..Default::default()
        };
        let a = build_reason(
            &config(),
            &behavioral,
            &DormantFeatures::default(),
            &DeviceFeatures::default(),
            &GraphIntelFeatures::default(),
            &VelocityFeatures::default(),
            20.0,
        );
        let b = build_reason(
            &config(),
            &behavioral,
            &DormantFeatures::default(),
            &DeviceFeatures::default(),
            &GraphIntelFeatures::default(),
            &VelocityFeatures::default(),
            20.0,
        );
        assert_eq!(a, b);
        assert!(a.contains("Impossible travel"));
        assert!(a.contains("night-time"));
        assert!(a.ends_with('.'));
    }

    #[test]
    fn high_score_without_rules_gets_generic_clause() {
        let reason = build_reason(
            &config(),
            &BehavioralFeatures::default(),
            &DormantFeatures::default(),
            &DeviceFeatures::default(),
            &GraphIntelFeatures::default(),
            &VelocityFeatures::default(),
            85.0,
        );
        assert!(reason.contains("Multiple minor indicators"));
    }
}
