//! Mule-account classification.
//!
//! Aggregates the five feature vectors through a weighted signal
//! accumulator. A mule typically sleeps, wakes with a burst, relays funds
//! through shared devices, and sits inside a hot cluster. The classifier
//! owns no sub-score of its own; it turns the extractor outputs into an
//! explicit `(is_mule, confidence, reasons)` verdict.

use crate::config::EngineConfig;
use crate::features::{
    BehavioralFeatures, DeviceFeatures, DormantFeatures, GraphIntelFeatures, VelocityFeatures,
};
use crate::types::MuleAssessment;

const DEVICE_SHARE_THRESHOLD: usize = 3;

/// Heuristic mule classifier over the extracted feature vectors.
pub struct MuleClassifier;

impl MuleClassifier {
    pub fn evaluate(
        config: &EngineConfig,
        behavioral: &BehavioralFeatures,
        dormant: &DormantFeatures,
        device: &DeviceFeatures,
        graph: &GraphIntelFeatures,
        velocity: &VelocityFeatures,
        fused_risk: f64,
    ) -> MuleAssessment {
        let mut score: f64 = 0.0;
        let mut reasons: Vec<String> = Vec::new();

        // First strike out of dormancy.
        if dormant.is_first_strike {
            score += 0.30;
            reasons.push(format!(
                "First strike: dormant {}d, suddenly active",
                dormant.days_dormant as i64
            ));
        } else if dormant.is_dormant && dormant.risk > 40.0 {
            score += 0.25;
            reasons.push("Dormant account activated with suspicious inflow".to_string());
        }

        // Sleep-and-flash compound.
        if dormant.sleep_flash {
            score += 0.25;
            reasons.push(format!(
                "Sleep-and-flash: amount {:.0}x historical average after dormancy",
                dormant.sleep_flash_ratio
            ));
        }

        // Relay pass-through.
        if velocity.outflow_inflow_ratio > 0.75 {
            score += 0.20;
            reasons.push(format!(
                "High pass-through ratio ({:.2})",
                velocity.outflow_inflow_ratio
            ));
        }

        // Shared device.
        if device.account_count >= DEVICE_SHARE_THRESHOLD {
            score += 0.15;
            reasons.push(format!(
                "Device shared across {} accounts",
                device.account_count
            ));
        }

        // Multi-user device burst.
        if device.multi_user_burst {
            score += 0.20;
            reasons.push(format!(
                "{} accounts on one device within 24h",
                device.multi_user_count
            ));
        }

        // Hot cluster membership.
        if graph.community_risk > 50.0 {
            score += 0.15;
            reasons.push(format!(
                "Member of high-risk cluster (risk={:.0})",
                graph.community_risk
            ));
        }

        // Fast relay behaviour.
        if velocity.tx_per_min > 5.0 && velocity.outflow_inflow_ratio > 0.6 {
            score += 0.10;
            reasons.push(format!(
                "Relay pattern: {:.1} tx/min, ratio={:.2}",
                velocity.tx_per_min, velocity.outflow_inflow_ratio
            ));
        }

        // Behavioural anomalies.
        if behavioral.impossible_travel {
            score += 0.10;
            reasons.push("Impossible travel detected".to_string());
        }
        if behavioral.spike {
            score += 0.05;
            reasons.push("Amount spike vs historical baseline".to_string());
        }

        // Device compounds.
        if device.new_device_high_mpin {
            score += 0.15;
            reasons.push("New device + high amount + MPIN".to_string());
        }
        if device.cap_mask_hamming >= 2 {
            score += 0.08;
            reasons.push(format!(
                "Device capability mask changed (hamming={})",
                device.cap_mask_hamming
            ));
        }
        if device.new_device && !device.new_device_high_mpin {
            score += 0.05;
            reasons.push("Transaction from new device".to_string());
        }

        // Endpoint and amount patterns.
        if behavioral.endpoint_rotation {
            score += 0.08;
            reasons.push(format!(
                "Endpoint rotation: {} endpoints in 24h",
                behavioral.endpoint_rotation_count
            ));
        }
        if behavioral.fixed_amount {
            score += 0.08;
            reasons.push("Fixed-amount pattern (possible structuring)".to_string());
        }
        if behavioral.circadian_anomaly {
            score += 0.10;
            reasons.push("Transaction at unusual hour for sender".to_string());
        }
        if behavioral.identicality {
            score += 0.15;
            reasons.push(format!(
                "{} identical-amount transfers to one receiver within 1h",
                behavioral.identicality_count
            ));
        }

        let confidence = score.min(1.0);
        let is_mule = confidence >= 0.5 || fused_risk >= config.mule_risk_threshold;

        MuleAssessment {
            is_mule,
            confidence,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn quiet_profile_is_not_a_mule() {
        let m = MuleClassifier::evaluate(
            &config(),
            &BehavioralFeatures::default(),
            &DormantFeatures::default(),
            &DeviceFeatures::default(),
            &GraphIntelFeatures::default(),
            &VelocityFeatures::default(),
            10.0,
        );
        assert!(!m.is_mule);
        assert_eq!(m.confidence, 0.0);
        assert!(m.reasons.is_empty());
    }

    #[test]
    fn first_strike_relay_on_shared_device_is_a_mule() {
        let dormant = DormantFeatures {
            is_first_strike: true,
            days_dormant: 40.0,
            risk: 80.0,
            ..Default::default()
        };
        let velocity = VelocityFeatures {
            outflow_inflow_ratio: 0.95,
            ..Default::default()
        };
        let device = DeviceFeatures {
            account_count: 4,
            ..Default::default()
        };
        let m = MuleClassifier::evaluate(
            &config(),
            &BehavioralFeatures::default(),
            &dormant,
            &device,
            &GraphIntelFeatures::default(),
            &velocity,
            30.0,
        );
        // 0.30 + 0.20 + 0.15 = 0.65.
        assert!(m.is_mule);
        assert!((m.confidence - 0.65).abs() < 1e-9);
        assert_eq!(m.reasons.len(), 3);
    }

    #[test]
    fn high_fused_risk_alone_classifies() {
        let m = MuleClassifier::evaluate(
            &config(),
            &BehavioralFeatures::default(),
            &DormantFeatures::default(),
            &DeviceFeatures::default(),
            &GraphIntelFeatures::default(),
            &VelocityFeatures::default(),
            66.0,
        );
        assert!(m.is_mule);
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let dormant = DormantFeatures {
            is_first_strike: true,
            sleep_flash: true,
            sleep_flash_ratio: 80.0,
            risk: 100.0,
            ..Default::default()
        };
        let behavioral = BehavioralFeatures {
            impossible_travel: true,
            spike: true,
            endpoint_rotation: true,
            fixed_amount: true,
            circadian_anomaly: true,
            identicality: true,
            identicality_count: 5,
            ..Default::default()
        };
        let device = DeviceFeatures {
            account_count: 6,
            multi_user_burst: true,
            multi_user_count: 5,
            new_device: true,
            new_device_high_mpin: true,
            cap_mask_hamming: 4,
            ..Default::default()
        };
        let velocity = VelocityFeatures {
            outflow_inflow_ratio: 0.9,
            tx_per_min: 12.0,
            ..Default::default()
        };
        let graph = GraphIntelFeatures {
            community_risk: 75.0,
            ..Default::default()
        };
        let m = MuleClassifier::evaluate(
            &config(),
            &behavioral,
            &dormant,
            &device,
            &graph,
            &velocity,
            90.0,
        );
        assert!(m.is_mule);
        assert_eq!(m.confidence, 1.0);
    }
}
