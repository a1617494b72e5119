//! Power→heart-rate regression.
//!
//! Fits `HR ≈ slope·power + intercept` over a window of samples and derives
//! the metrics that describe how well heart rate tracks power: r²,
//! prediction bands, decoupling between the window halves, cardiac
//! efficiency and an aerobic fitness assessment.

use serde::{Deserialize, Serialize};

use crate::config::SegmentationConfig;
use crate::error::{AnalysisError, Result};
use crate::response;
use crate::stats::{self, EPSILON};
use crate::Sample;

/// Number of points in the confidence band grid.
pub const BAND_POINTS: usize = 100;

/// Prediction bands over an evenly spaced power grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBands {
    pub power: Vec<f64>,
    pub predicted: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Aerobic fitness assessment, both fields in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AerobicFitness {
    pub score: f64,
    pub confidence: f64,
}

/// A fitted power→HR line and the metrics derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRelationship {
    /// bpm per watt
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination; may be ≤ 0 for a poor fit
    pub r2: f64,
    /// (min, max) power in watts
    pub power_range: (f64, f64),
    /// (min, max) heart rate in bpm
    pub hr_range: (f64, f64),
    pub confidence_bands: ConfidenceBands,
    /// Relative growth of the fit error from the first to the second half, ≥ 0
    pub decoupling: f64,
    /// Mean watts per beat mapped into [0, 1]
    pub efficiency: f64,
    pub aerobic_fitness: AerobicFitness,
}

impl LinearRelationship {
    /// Predicted heart rate at `power`.
    pub fn predict(&self, power: f64) -> f64 {
        self.slope * power + self.intercept
    }

    /// |actual − predicted| / predicted for each sample.
    pub fn relative_deviations(&self, samples: &[Sample]) -> Vec<f64> {
        samples
            .iter()
            .map(|s| stats::relative_deviation(s.heart_rate, self.predict(s.power)))
            .collect()
    }

    /// HR − predicted for each sample.
    pub fn residuals(&self, samples: &[Sample]) -> Vec<f64> {
        samples
            .iter()
            .map(|s| s.heart_rate - self.predict(s.power))
            .collect()
    }
}

/// Fit the power→HR relationship of a window.
///
/// Fails with `DegenerateWindow` for fewer than two samples or a window
/// whose power does not vary; no metric is ever NaN or infinite.
pub fn fit_relationship(window: &[Sample], config: &SegmentationConfig) -> Result<LinearRelationship> {
    let power = crate::powers(window);
    let hr = crate::heart_rates(window);

    if window.len() < 2 {
        return Err(degenerate(window, "fewer than two samples"));
    }
    if stats::variance(&power) < EPSILON {
        return Err(degenerate(window, "no power variance"));
    }
    let (slope, intercept) = stats::linear_regression(&power, &hr)
        .ok_or_else(|| degenerate(window, "singular regression"))?;

    let r2 = stats::r_squared(&power, &hr, slope, intercept);
    let power_range = stats::min_max(&power).unwrap_or_default();
    let hr_range = stats::min_max(&hr).unwrap_or_default();
    let confidence_bands = confidence_bands(&power, &hr, slope, intercept, config.z_value()?);

    let mut relationship = LinearRelationship {
        slope,
        intercept,
        r2,
        power_range,
        hr_range,
        confidence_bands,
        decoupling: 0.0,
        efficiency: efficiency(window),
        aerobic_fitness: AerobicFitness {
            score: 0.0,
            confidence: 0.0,
        },
    };
    relationship.decoupling = decoupling(window, &relationship);
    relationship.aerobic_fitness = aerobic_fitness(window, &relationship, config);

    Ok(relationship)
}

fn degenerate(window: &[Sample], reason: &str) -> AnalysisError {
    AnalysisError::DegenerateWindow {
        start_time: window.first().map_or(0.0, |s| s.seconds_from_start),
        end_time: window.last().map_or(0.0, |s| s.seconds_from_start),
        sample_count: window.len(),
        reason: reason.to_string(),
    }
}

/// Prediction interval `z·sqrt(MSE·(1 + 1/n + (x − x̄)²/Sxx))` over a grid
/// spanning the observed power range.
fn confidence_bands(power: &[f64], hr: &[f64], slope: f64, intercept: f64, z: f64) -> ConfidenceBands {
    let n = power.len() as f64;
    let mean_power = stats::mean(power).unwrap_or_default();
    let sxx: f64 = power.iter().map(|p| (p - mean_power).powi(2)).sum();
    let ss_res: f64 = power
        .iter()
        .zip(hr)
        .map(|(p, h)| (h - (slope * p + intercept)).powi(2))
        .sum();
    let mse = if power.len() > 2 { ss_res / (n - 2.0) } else { 0.0 };
    let (lo, hi) = stats::min_max(power).unwrap_or_default();
    let step = (hi - lo) / (BAND_POINTS - 1) as f64;

    let mut bands = ConfidenceBands {
        power: Vec::with_capacity(BAND_POINTS),
        predicted: Vec::with_capacity(BAND_POINTS),
        upper: Vec::with_capacity(BAND_POINTS),
        lower: Vec::with_capacity(BAND_POINTS),
    };
    for k in 0..BAND_POINTS {
        let x = lo + step * k as f64;
        let y = slope * x + intercept;
        let half_width = z * (mse * (1.0 + 1.0 / n + (x - mean_power).powi(2) / sxx)).sqrt();
        bands.power.push(x);
        bands.predicted.push(y);
        bands.upper.push(y + half_width);
        bands.lower.push(y - half_width);
    }
    bands
}

/// `max(0, (d₂ − d₁)/d₁)` where dᵢ is the mean relative deviation of each
/// chronological half; 0 when the first half fits exactly.
fn decoupling(window: &[Sample], relationship: &LinearRelationship) -> f64 {
    let (first, second) = window.split_at(window.len() / 2);
    let d1 = stats::mean(&relationship.relative_deviations(first)).unwrap_or_default();
    let d2 = stats::mean(&relationship.relative_deviations(second)).unwrap_or_default();
    if d1 < EPSILON {
        return 0.0;
    }
    ((d2 - d1) / d1).max(0.0)
}

/// Mean power/HR mapped from [0.5, 2.5] W/bpm into [0, 1].
fn efficiency(window: &[Sample]) -> f64 {
    let ratios: Vec<f64> = window
        .iter()
        .filter(|s| s.heart_rate > 0.0)
        .map(|s| s.power / s.heart_rate)
        .collect();
    let mean_ratio = stats::mean(&ratios).unwrap_or_default();
    ((mean_ratio - 0.5) / 2.0).clamp(0.0, 1.0)
}

/// Mean of power and HR stability (each 1 − CV), clamped to [0, 1].
pub fn stability_score(window: &[Sample]) -> f64 {
    let power = stats::stability(&crate::powers(window));
    let hr = stats::stability(&crate::heart_rates(window));
    ((power + hr) / 2.0).clamp(0.0, 1.0)
}

fn aerobic_fitness(
    window: &[Sample],
    relationship: &LinearRelationship,
    config: &SegmentationConfig,
) -> AerobicFitness {
    let slope_score = (1.0 - relationship.slope / 2.0).clamp(0.0, 1.0);
    let decoupling_score = 1.0 - relationship.decoupling;
    let response_score = response::mean_response_time(window, config)
        .map_or(0.0, |rt| (1.0 - rt / config.max_response_lag).clamp(0.0, 1.0));
    let stability = stability_score(window);

    let score = 0.3 * slope_score + 0.3 * decoupling_score + 0.2 * response_score + 0.2 * stability;

    let duration = match (window.first(), window.last()) {
        (Some(first), Some(last)) => last.seconds_from_start - first.seconds_from_start,
        _ => 0.0,
    };
    let span = relationship.power_range.1 - relationship.power_range.0;
    let confidence = 0.4 * (duration / 1800.0).min(1.0) + 0.3 * (span / 300.0).min(1.0) + 0.3 * stability;

    AerobicFitness {
        score: score.clamp(0.0, 1.0),
        confidence: confidence.clamp(0.0, 1.0),
    }
}
