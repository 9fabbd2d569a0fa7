//! Probability that price touches a target within a day.
//!
//! Two-sided estimate from a realized hourly volatility figure, scaled to a
//! day with the square-root-of-time rule. The result is an estimate for
//! display, not a guarantee.

use serde::Serialize;

const HOURS_PER_DAY: f64 = 24.0;

// Abramowitz & Stegun 26.2.17 coefficients (|error| < 7.5e-8).
const P: f64 = 0.231_641_9;
const B1: f64 = 0.319_381_530;
const B2: f64 = -0.356_563_782;
const B3: f64 = 1.781_477_937;
const B4: f64 = -1.821_255_978;
const B5: f64 = 1.330_274_429;
const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    if x < 0.0 {
        return 1.0 - normal_cdf(-x);
    }
    let t = 1.0 / (1.0 + P * x);
    let poly = t * (B1 + t * (B2 + t * (B3 + t * (B4 + t * B5))));
    let pdf = INV_SQRT_2PI * (-0.5 * x * x).exp();
    1.0 - pdf * poly
}

/// Touch-probability estimate with its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillEstimate {
    /// Estimated probability, percent in `[0, 100]`.
    pub probability_pct: f64,
    pub distance_pct: f64,
    pub daily_volatility_pct: f64,
    pub z_score: f64,
}

/// Estimate the chance that price moves from `current` to `target`.
///
/// `hourly_volatility_pct` is a percentage. Non-finite or non-positive inputs
/// yield `None`.
pub fn estimate(current: f64, target: f64, hourly_volatility_pct: f64) -> Option<FillEstimate> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(current) || !valid(target) || !valid(hourly_volatility_pct) {
        return None;
    }

    let distance_pct = (target - current).abs() / current * 100.0;
    let daily_volatility_pct = hourly_volatility_pct * HOURS_PER_DAY.sqrt();
    if distance_pct == 0.0 {
        return Some(FillEstimate {
            probability_pct: 100.0,
            distance_pct,
            daily_volatility_pct,
            z_score: 0.0,
        });
    }

    let z_score = distance_pct / daily_volatility_pct;
    let probability_pct = (2.0 * (1.0 - normal_cdf(z_score)) * 100.0).clamp(0.0, 100.0);
    Some(FillEstimate {
        probability_pct,
        distance_pct,
        daily_volatility_pct,
        z_score,
    })
}

/// Probability only, in percent.
pub fn probability(current: f64, target: f64, hourly_volatility_pct: f64) -> Option<f64> {
    estimate(current, target, hourly_volatility_pct).map(|e| e.probability_pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.0) - 0.841_344_746).abs() < 1e-7);
        assert!((normal_cdf(-1.96) - 0.024_997_895).abs() < 1e-7);
        assert!((normal_cdf(3.0) - 0.998_650_102).abs() < 1e-7);
    }

    #[test]
    fn test_two_percent_hourly_five_percent_away() {
        let est = estimate(100.0, 105.0, 2.0).unwrap();
        assert!((est.distance_pct - 5.0).abs() < 1e-12);
        assert!((est.daily_volatility_pct - 9.797_958_97).abs() < 1e-6);
        assert!((est.z_score - 0.510_310_36).abs() < 1e-6);
        assert!((est.probability_pct - 61.0).abs() < 0.5, "{}", est.probability_pct);
    }

    #[test]
    fn test_direction_does_not_matter() {
        let up = probability(100.0, 103.0, 1.5).unwrap();
        let down = probability(100.0, 97.0, 1.5).unwrap();
        assert!((up - down).abs() < 1e-12);
    }

    #[test]
    fn test_at_target_is_certain() {
        assert_eq!(probability(42.5, 42.5, 0.3), Some(100.0));
    }

    #[test]
    fn test_bounded_for_positive_inputs() {
        let prices = [0.0001, 0.5, 1.0, 99.9, 100.0, 1e6];
        let vols = [1e-6, 0.01, 1.0, 5.0, 250.0];
        for &current in &prices {
            for &target in &prices {
                for &vol in &vols {
                    let p = probability(current, target, vol).unwrap();
                    assert!((0.0..=100.0).contains(&p), "{current} {target} {vol} -> {p}");
                }
            }
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(probability(0.0, 1.0, 1.0).is_none());
        assert!(probability(1.0, -1.0, 1.0).is_none());
        assert!(probability(1.0, 1.0, 0.0).is_none());
        assert!(probability(f64::NAN, 1.0, 1.0).is_none());
        assert!(probability(1.0, f64::INFINITY, 1.0).is_none());
    }
}
