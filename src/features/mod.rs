//! # Feature Extractors
//!
//! Five stateless scorers, each producing a sub-score in [0, 100] plus the
//! booleans the explainer consumes. They run concurrently per transaction,
//! read only through the graph store, and mutate nothing.

pub mod behavioral;
pub mod device;
pub mod dormant;
pub mod graph;
pub mod velocity;

pub use behavioral::{BehavioralExtractor, BehavioralFeatures};
pub use device::{DeviceExtractor, DeviceFeatures};
pub use dormant::{DormantExtractor, DormantFeatures};
pub use graph::{GraphExtractor, GraphIntelFeatures};
pub use velocity::{VelocityExtractor, VelocityFeatures};

/// Great-circle distance between two points, in kilometres.
pub(crate) fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Population mean and standard deviation.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, var.sqrt())
}

/// Linear-interpolated quantile over a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// 1.5·IQR fence test. Requires at least 4 samples.
pub(crate) fn iqr_outlier(value: f64, samples: &[f64]) -> bool {
    if samples.len() < 4 {
        return false;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    value < q1 - 1.5 * iqr || value > q3 + 1.5 * iqr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // Mumbai → Delhi is roughly 1150 km.
        let d = haversine_km(19.0760, 72.8777, 28.7041, 77.1025);
        assert!((1100.0..1250.0).contains(&d), "got {d}");
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_km(10.0, 20.0, 10.0, 20.0) < 1e-9);
    }

    #[test]
    fn iqr_flags_extreme_values_only() {
        let samples = [100.0, 110.0, 95.0, 105.0, 98.0, 102.0];
        assert!(iqr_outlier(500.0, &samples));
        assert!(!iqr_outlier(103.0, &samples));
    }

    #[test]
    fn iqr_needs_four_samples() {
        assert!(!iqr_outlier(1_000.0, &[1.0, 2.0, 3.0]));
    }

    #[test]
    fn mean_std_basic() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((std - 2.0).abs() < 1e-9);
    }
}
