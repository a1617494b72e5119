//! # Stable Window Segmentation
//!
//! Finds intervals where heart rate tracks power along a stable straight
//! line, and labels the recording with coarse physiological regimes.
//!
//! ## Algorithm
//! 1. Slide a `window_size`-second window forward one sample at a time
//! 2. Fit the power→HR line of each window and run the stability test
//! 3. Drive an `Idle | Building` state machine over the results:
//!    consistent stable windows extend the current candidate, anything
//!    else closes it
//! 4. Drop short windows, merge similar neighbours, trim what still
//!    overlaps, sort by quality
//!
//! Window fits are independent and run in parallel with the `parallel`
//! feature; the state machine itself is sequential and deterministic.

mod postprocess;
mod regimes;
mod stability;

use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SegmentationConfig;
use crate::relationship::{self, fit_relationship, LinearRelationship};
use crate::response;
use crate::stats;
use crate::Sample;

pub use postprocess::{filter_short_windows, merge_adjacent_windows, separate_overlapping, sort_by_quality};
pub use regimes::{
    classify_window, detect_transitions, find_exact_transition_point, find_regime_windows,
    merge_regime_windows, transition_confidence, Classification, Regime, RegimeWindow,
    StateTransition,
};
pub use stability::{
    assess_stability, linearity_score, nonlinearity_score, residual_pattern_score,
    StabilityAssessment,
};

// ============================================================================
// Types
// ============================================================================

/// Per-window quality scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Mean of power and HR stability (1 − CV)
    pub stability_score: f64,
    /// 1 − mean relative deviation from the fitted line
    pub coupling_score: f64,
    /// Agreement of slope and r² across the window's quarters
    pub consistency_score: f64,
}

/// A maximal interval with a stable power→HR relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableWindow {
    /// Elapsed seconds of the first sample
    pub start_time: f64,
    /// Elapsed seconds of the last sample
    pub end_time: f64,
    #[serde(flatten)]
    pub relationship: LinearRelationship,
    pub power_stability: f64,
    pub hr_stability: f64,
    /// Mean seconds for HR to cover half its response to a power step,
    /// `None` when the window has no power step
    pub response_time: Option<f64>,
    pub quality_metrics: QualityMetrics,
    /// Regime label of the whole window
    pub regime: Regime,
    pub regime_confidence: f64,
    pub samples: Vec<Sample>,
}

impl StableWindow {
    /// Materialize a window from its samples and fitted relationship.
    pub fn new(samples: Vec<Sample>, relationship: LinearRelationship, config: &SegmentationConfig) -> Self {
        let quality_metrics = QualityMetrics {
            stability_score: relationship::stability_score(&samples),
            coupling_score: coupling_score(&samples, &relationship),
            consistency_score: consistency_score(&samples, &relationship),
        };
        let classification = classify_window(&samples, config);

        Self {
            start_time: samples.first().map_or(0.0, |s| s.seconds_from_start),
            end_time: samples.last().map_or(0.0, |s| s.seconds_from_start),
            power_stability: stats::stability(&crate::powers(&samples)),
            hr_stability: stats::stability(&crate::heart_rates(&samples)),
            response_time: response::mean_response_time(&samples, config),
            quality_metrics,
            regime: classification.regime,
            regime_confidence: classification.confidence,
            relationship,
            samples,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Weighted quality used to rank windows.
    pub fn overall_quality(&self) -> f64 {
        let rel = &self.relationship;
        let q = &self.quality_metrics;
        0.25 * rel.r2
            + 0.2 * rel.efficiency
            + 0.2 * (1.0 - rel.decoupling)
            + 0.15 * q.stability_score
            + 0.1 * q.coupling_score
            + 0.1 * q.consistency_score
    }
}

fn coupling_score(samples: &[Sample], relationship: &LinearRelationship) -> f64 {
    let deviations = relationship.relative_deviations(samples);
    (1.0 - stats::mean(&deviations).unwrap_or_default()).clamp(0.0, 1.0)
}

/// `1 − (σ(slope)/slope·0.6 + σ(r²)·0.4)` over four equal segments.
///
/// Segments without power variance are skipped; fewer than two fitted
/// segments score 0.
fn consistency_score(samples: &[Sample], relationship: &LinearRelationship) -> f64 {
    let segment_len = samples.len() / 4;
    if segment_len < 2 {
        return 0.0;
    }

    let (slopes, r2s): (Vec<f64>, Vec<f64>) = samples
        .chunks_exact(segment_len)
        .take(4)
        .filter_map(|segment| {
            let power = crate::powers(segment);
            let hr = crate::heart_rates(segment);
            let (slope, intercept) = stats::linear_regression(&power, &hr)?;
            Some((slope, stats::r_squared(&power, &hr, slope, intercept)))
        })
        .unzip();
    if slopes.len() < 2 {
        return 0.0;
    }

    let slope_variation = if relationship.slope.abs() < stats::EPSILON {
        1.0
    } else {
        stats::std_dev(&slopes) / relationship.slope.abs()
    };
    (1.0 - (0.6 * slope_variation + 0.4 * stats::std_dev(&r2s))).clamp(0.0, 1.0)
}

// ============================================================================
// Sliding windows
// ============================================================================

/// Index ranges `[start, end)` of every complete `window_size`-second window.
///
/// A window starting at sample `i` holds the samples with
/// `t_i ≤ t < t_i + window_size` and is complete when its last sample
/// reaches `t_i + window_size − 1`.
pub(crate) fn window_bounds(samples: &[Sample], window_size: f64) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut end = 0;
    for (start, first) in samples.iter().enumerate() {
        let limit = first.seconds_from_start + window_size;
        end = end.max(start);
        while end < samples.len() && samples[end].seconds_from_start < limit {
            end += 1;
        }
        let Some(last) = samples.get(end.saturating_sub(1)) else {
            break;
        };
        if end - start >= 2 && last.seconds_from_start >= limit - 1.0 {
            bounds.push((start, end));
        }
    }
    bounds
}

/// Fit result of one sliding window.
struct WindowFit {
    start: usize,
    end: usize,
    /// Relationship when the window passed the stability test
    stable: Option<LinearRelationship>,
}

fn evaluate_window(samples: &[Sample], start: usize, end: usize, config: &SegmentationConfig) -> WindowFit {
    let window = &samples[start..end];
    let stable = match fit_relationship(window, config) {
        Ok(rel) => assess_stability(window, &rel, config).stable.then_some(rel),
        Err(e) => {
            debug!("[Segmentation] Window {}..{} not fitted: {}", start, end, e);
            None
        }
    };
    WindowFit { start, end, stable }
}

fn evaluate_windows(samples: &[Sample], config: &SegmentationConfig) -> Vec<WindowFit> {
    let bounds = window_bounds(samples, config.window_size);

    #[cfg(feature = "parallel")]
    let fits: Vec<WindowFit> = bounds
        .par_iter()
        .map(|&(start, end)| evaluate_window(samples, start, end, config))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let fits: Vec<WindowFit> = bounds
        .iter()
        .map(|&(start, end)| evaluate_window(samples, start, end, config))
        .collect();

    fits
}

// ============================================================================
// State machine
// ============================================================================

/// Candidate stable window under construction.
struct Candidate {
    start: usize,
    end: usize,
    relationship: LinearRelationship,
}

enum SegmentState {
    Idle,
    Building(Candidate),
}

/// Whether a new stable window continues the candidate's relationship.
fn is_consistent(current: &LinearRelationship, next: &LinearRelationship, config: &SegmentationConfig) -> bool {
    stats::relative_change(next.slope, current.slope) < config.max_slope_change
        && stats::relative_change(next.efficiency, current.efficiency) < config.max_efficiency_change
        && next.r2 >= config.min_r2_threshold
        && (next.decoupling - current.decoupling).abs() < config.max_decoupling_change
}

fn close(candidate: Candidate, samples: &[Sample], config: &SegmentationConfig, out: &mut Vec<StableWindow>) {
    let window = StableWindow::new(
        samples[candidate.start..candidate.end].to_vec(),
        candidate.relationship,
        config,
    );
    debug!(
        "[Segmentation] Closed window {:.0}s-{:.0}s (r²={:.3})",
        window.start_time, window.end_time, window.relationship.r2
    );
    out.push(window);
}

/// Run the state machine over evaluated windows, returning raw candidates
/// in chronological order.
fn build_windows(samples: &[Sample], fits: Vec<WindowFit>, config: &SegmentationConfig) -> Vec<StableWindow> {
    let mut windows = Vec::new();
    let mut state = SegmentState::Idle;

    for fit in fits {
        state = match (state, fit.stable) {
            (SegmentState::Idle, None) => SegmentState::Idle,
            (SegmentState::Idle, Some(relationship)) => SegmentState::Building(Candidate {
                start: fit.start,
                end: fit.end,
                relationship,
            }),
            (SegmentState::Building(candidate), None) => {
                close(candidate, samples, config, &mut windows);
                SegmentState::Idle
            }
            (SegmentState::Building(candidate), Some(relationship)) => {
                if is_consistent(&candidate.relationship, &relationship, config) {
                    let end = candidate.end.max(fit.end);
                    match fit_relationship(&samples[candidate.start..end], config) {
                        Ok(extended) => SegmentState::Building(Candidate {
                            start: candidate.start,
                            end,
                            relationship: extended,
                        }),
                        Err(_) => {
                            close(candidate, samples, config, &mut windows);
                            SegmentState::Building(Candidate {
                                start: fit.start,
                                end: fit.end,
                                relationship,
                            })
                        }
                    }
                } else {
                    close(candidate, samples, config, &mut windows);
                    SegmentState::Building(Candidate {
                        start: fit.start,
                        end: fit.end,
                        relationship,
                    })
                }
            }
        };
    }

    if let SegmentState::Building(candidate) = state {
        close(candidate, samples, config, &mut windows);
    }
    windows
}

/// Find stable power→HR windows in a conditioned series.
///
/// Returns non-overlapping windows at least `min_window_size` seconds
/// long, similar neighbours merged, best quality first. Degenerate stretches (no power
/// variance) simply yield no window.
pub fn find_stable_windows(samples: &[Sample], config: &SegmentationConfig) -> Vec<StableWindow> {
    let fits = evaluate_windows(samples, config);
    let evaluated = fits.len();
    let stable_count = fits.iter().filter(|f| f.stable.is_some()).count();

    let raw = build_windows(samples, fits, config);
    let raw_count = raw.len();

    let filtered = filter_short_windows(raw, config.min_window_size);
    let merged = merge_adjacent_windows(filtered, config);
    let separated = separate_overlapping(merged, config);
    let sorted = sort_by_quality(separated);

    info!(
        "[Segmentation] {} windows evaluated, {} stable -> {} candidates -> {} stable windows",
        evaluated,
        stable_count,
        raw_count,
        sorted.len()
    );
    sorted
}
