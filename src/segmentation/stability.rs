//! Stability test for a fitted window.
//!
//! A window is stable when its power→HR line explains the data well, no
//! sample strays far from the line, HR reacts consistently to power steps,
//! and the residuals show no structure a straight line cannot capture.

use crate::config::SegmentationConfig;
use crate::relationship::LinearRelationship;
use crate::response;
use crate::stats::{self, EPSILON};
use crate::Sample;

/// Residuals smaller than this (bpm) carry no sign information.
const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// Two-sided 5% critical value of the runs statistic.
const RUNS_Z_CRITICAL: f64 = 1.96;

/// Outcome of the stability test with the measurements behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityAssessment {
    pub stable: bool,
    /// Largest |HR − predicted| / predicted in the window
    pub max_deviation: f64,
    /// `None` when fewer than two power steps were found
    pub response_consistency: Option<f64>,
    pub linearity: f64,
}

/// Run the stability test on a window and its fitted relationship.
pub fn assess_stability(
    window: &[Sample],
    relationship: &LinearRelationship,
    config: &SegmentationConfig,
) -> StabilityAssessment {
    let max_deviation = relationship
        .relative_deviations(window)
        .into_iter()
        .fold(0.0, f64::max);

    let changes = response::detect_power_changes(window, config);
    let responses = response::analyze_hr_responses(window, &changes, config);
    let response_consistency = response::response_consistency(&responses);

    let linearity = linearity_score(window, relationship);

    let stable = relationship.r2 >= config.min_r2_threshold
        && max_deviation < config.max_hr_deviation
        && response_consistency.map_or(true, |c| c >= config.min_response_consistency)
        && linearity >= config.min_linearity_score;

    StabilityAssessment {
        stable,
        max_deviation,
        response_consistency,
        linearity,
    }
}

/// `1 − (0.6·pattern + 0.4·nonlinearity)`, floored at 0.
pub fn linearity_score(window: &[Sample], relationship: &LinearRelationship) -> f64 {
    let pattern = residual_pattern_score(&relationship.residuals(window));
    let nonlinearity = nonlinearity_score(window, relationship.r2);
    (1.0 - (0.6 * pattern + 0.4 * nonlinearity)).max(0.0)
}

/// Wald–Wolfowitz runs test on the residual signs.
///
/// Scores 0 while the run count is within the 5% two-sided band of what
/// independent signs would give, rising linearly to 1 at twice the
/// critical |z|. Residuals within tolerance of zero are skipped; with
/// fewer than three signed residuals the score is 0, and residuals that
/// all share a sign score 1.
pub fn residual_pattern_score(residuals: &[f64]) -> f64 {
    let signs: Vec<bool> = residuals
        .iter()
        .filter(|r| r.abs() > RESIDUAL_TOLERANCE)
        .map(|&r| r > 0.0)
        .collect();
    if signs.len() < 3 {
        return 0.0;
    }

    let positive = signs.iter().filter(|&&s| s).count() as f64;
    let negative = signs.len() as f64 - positive;
    if positive == 0.0 || negative == 0.0 {
        return 1.0;
    }

    let n = signs.len() as f64;
    let product = 2.0 * positive * negative;
    let expected = product / n + 1.0;
    let variance = product * (product - n) / (n * n * (n - 1.0));
    if variance < EPSILON {
        return 0.0;
    }

    let runs = 1 + signs.windows(2).filter(|w| w[0] != w[1]).count();
    let z = (runs as f64 - expected) / variance.sqrt();
    ((z.abs() - RUNS_Z_CRITICAL) / RUNS_Z_CRITICAL).clamp(0.0, 1.0)
}

/// Relative r² gained by a quadratic over the straight line, in [0, 1].
pub fn nonlinearity_score(window: &[Sample], linear_r2: f64) -> f64 {
    let power = crate::powers(window);
    let hr = crate::heart_rates(window);
    let Some(quadratic_r2) = stats::quadratic_r_squared(&power, &hr) else {
        return 0.0;
    };
    if linear_r2 < EPSILON {
        return if quadratic_r2 > EPSILON { 1.0 } else { 0.0 };
    }
    ((quadratic_r2 - linear_r2) / linear_r2).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::fit_relationship;

    fn window(mut hr_of: impl FnMut(f64) -> f64) -> Vec<Sample> {
        (0..60)
            .map(|i| {
                let power = 150.0 + 50.0 * (i as f64 / 10.0).sin();
                Sample::new(i as f64, power, hr_of(power))
            })
            .collect()
    }

    #[test]
    fn test_exact_line_is_stable() {
        let config = SegmentationConfig::default();
        let w = window(|p| 0.3 * p + 85.0);
        let rel = fit_relationship(&w, &config).unwrap();
        let assessment = assess_stability(&w, &rel, &config);
        assert!(assessment.stable);
        assert!(assessment.max_deviation < 1e-9);
        assert!(assessment.linearity > 0.9);
        assert_eq!(assessment.response_consistency, None);
    }

    #[test]
    fn test_curved_response_not_stable() {
        let config = SegmentationConfig::default();
        let w = window(|p| 60.0 + 0.002 * p * p);
        let rel = fit_relationship(&w, &config).unwrap();
        let assessment = assess_stability(&w, &rel, &config);
        assert!(!assessment.stable);
        assert!(assessment.linearity < config.min_linearity_score);
    }

    #[test]
    fn test_runs_test_scores() {
        // Perfect alternation: far more runs than expected
        let alternating: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_eq!(residual_pattern_score(&alternating), 1.0);

        // Two long runs: far fewer runs than expected
        let blocks: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { -1.0 }).collect();
        assert_eq!(residual_pattern_score(&blocks), 1.0);

        // Numerical noise only
        assert_eq!(residual_pattern_score(&[1e-12, -1e-12, 0.0, 1e-13]), 0.0);

        // Pairs of signs: 20 runs against 21 expected
        let pairs: Vec<f64> = (0..40).map(|i| if (i / 2) % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_eq!(residual_pattern_score(&pairs), 0.0);

        // All one side of the line
        assert_eq!(residual_pattern_score(&[0.5, 1.0, 2.0, 0.1]), 1.0);
    }

    /// SplitMix64 output mapped to [-1, 1).
    fn white_noise(seed: u64) -> f64 {
        let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        ((z >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }

    #[test]
    fn test_noisy_line_is_stable() {
        let config = SegmentationConfig::default();
        let mut i = 0;
        let w = window(|p| {
            i += 1;
            0.3 * p + 85.0 + 3.0 * white_noise(i - 1)
        });
        let rel = fit_relationship(&w, &config).unwrap();
        let pattern = residual_pattern_score(&rel.residuals(&w));
        assert!(pattern < 0.2, "pattern score {pattern} for white noise");

        let assessment = assess_stability(&w, &rel, &config);
        assert!(assessment.stable, "{assessment:?}");
        assert!(assessment.linearity > 0.9);
    }

    #[test]
    fn test_blocked_residuals_not_stable() {
        let config = SegmentationConfig::default();
        let mut i = 0;
        // HR sits 2 bpm above the line for 10 s, then 2 bpm below
        let w = window(|p| {
            i += 1;
            let offset = if ((i - 1) / 10) % 2 == 0 { 2.0 } else { -2.0 };
            0.3 * p + 85.0 + offset
        });
        let rel = fit_relationship(&w, &config).unwrap();
        assert!(rel.r2 > config.min_r2_threshold);
        assert_eq!(residual_pattern_score(&rel.residuals(&w)), 1.0);

        let assessment = assess_stability(&w, &rel, &config);
        assert!(!assessment.stable);
        assert!(assessment.linearity < config.min_linearity_score);
    }

    #[test]
    fn test_nonlinearity_zero_for_line() {
        let w = window(|p| 0.3 * p + 85.0);
        assert!(nonlinearity_score(&w, 1.0) < 1e-6);
    }
}
