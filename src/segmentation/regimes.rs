//! Coarse physiological regime classification and transition detection.
//!
//! Every sliding window gets one of four labels:
//! - `Stable`: passes the stability test
//! - `LactateThreshold`: HR response accelerates within the window
//! - `CvDrift`: HR climbs while power holds steady
//! - `Unknown`: none of the above
//!
//! Runs of equal labels form regime windows; label changes become state
//! transitions, located at the split that best separates power variance.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{assess_stability, window_bounds};
use crate::config::SegmentationConfig;
use crate::relationship::{fit_relationship, LinearRelationship};
use crate::stats;
use crate::Sample;

/// Physiological regime label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Stable,
    LactateThreshold,
    CvDrift,
    Unknown,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Regime::Stable => "stable",
            Regime::LactateThreshold => "lactate_threshold",
            Regime::CvDrift => "cv_drift",
            Regime::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A regime label with its confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub regime: Regime,
    pub confidence: f64,
}

/// A change of regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Elapsed seconds of the change
    pub time: f64,
    pub from_state: Regime,
    pub to_state: Regime,
    pub confidence: f64,
}

/// A contiguous interval carrying one regime label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeWindow {
    pub start_time: f64,
    pub end_time: f64,
    pub regime: Regime,
    /// Mean confidence of the labelled windows
    pub confidence: f64,
    pub power_mean: f64,
    pub hr_mean: f64,
    pub samples: Vec<Sample>,
    /// Transition out of this window, when another regime follows
    pub transition: Option<StateTransition>,
}

// ============================================================================
// Classification
// ============================================================================

/// Label one window.
pub fn classify_window(window: &[Sample], config: &SegmentationConfig) -> Classification {
    let relationship = fit_relationship(window, config).ok();

    if let Some(rel) = &relationship {
        if assess_stability(window, rel, config).stable {
            return Classification {
                regime: Regime::Stable,
                confidence: rel.r2.clamp(0.0, 1.0),
            };
        }
        if let Some(confidence) = lactate_threshold(window, rel, config) {
            return Classification {
                regime: Regime::LactateThreshold,
                confidence,
            };
        }
    }

    if let Some(confidence) = cardiovascular_drift(window, config) {
        return Classification {
            regime: Regime::CvDrift,
            confidence,
        };
    }

    Classification {
        regime: Regime::Unknown,
        confidence: 0.0,
    }
}

/// Look for a `lactate_subwindow` span whose slope exceeds the window slope
/// by more than `max_slope_change`.
///
/// Confidence is the mean signed relative deviation of that span above the
/// window line, scaled by `max_hr_deviation`.
fn lactate_threshold(window: &[Sample], rel: &LinearRelationship, config: &SegmentationConfig) -> Option<f64> {
    let limit = rel.slope * (1.0 + config.max_slope_change);

    window_bounds(window, config.lactate_subwindow)
        .into_iter()
        .find_map(|(start, end)| {
            let sub = &window[start..end];
            let (slope, _) = stats::linear_regression(&crate::powers(sub), &crate::heart_rates(sub))?;
            if slope <= limit {
                return None;
            }
            let signed: Vec<f64> = sub
                .iter()
                .map(|s| {
                    let predicted = rel.predict(s.power);
                    (s.heart_rate - predicted) / predicted.abs().max(stats::EPSILON)
                })
                .collect();
            let mean = stats::mean(&signed).unwrap_or_default();
            Some((mean / config.max_hr_deviation).clamp(0.0, 1.0))
        })
}

/// First vs last quarter: power within `drift_max_power_change` watts while
/// HR rises more than `drift_min_hr_rise` bpm.
///
/// Confidence is `min(1, power stability across quarters · relative HR rise · 5)`.
fn cardiovascular_drift(window: &[Sample], config: &SegmentationConfig) -> Option<f64> {
    let quarter = window.len() / 4;
    if quarter == 0 {
        return None;
    }

    let quarters: Vec<(f64, f64)> = window
        .chunks_exact(quarter)
        .take(4)
        .map(|q| {
            (
                stats::mean(&crate::powers(q)).unwrap_or_default(),
                stats::mean(&crate::heart_rates(q)).unwrap_or_default(),
            )
        })
        .collect();
    let (first_power, first_hr) = *quarters.first()?;

    let last = &window[window.len() - quarter..];
    let last_power = stats::mean(&crate::powers(last)).unwrap_or_default();
    let last_hr = stats::mean(&crate::heart_rates(last)).unwrap_or_default();

    let steady_power = (last_power - first_power).abs() < config.drift_max_power_change;
    let rising_hr = last_hr - first_hr > config.drift_min_hr_rise;
    if !(steady_power && rising_hr) {
        return None;
    }

    let quarter_powers: Vec<f64> = quarters.iter().map(|q| q.0).collect();
    let power_stability = match stats::coefficient_of_variation(&quarter_powers) {
        Some(cv) => 1.0 - cv.abs(),
        None => 1.0,
    };
    let hr_trend = (last_hr - first_hr) / first_hr.max(stats::EPSILON);
    Some((power_stability * hr_trend * 5.0).clamp(0.0, 1.0))
}

// ============================================================================
// Regime windows
// ============================================================================

struct OpenRegime {
    start: usize,
    end: usize,
    regime: Regime,
    confidence_sum: f64,
    labelled: usize,
}

impl OpenRegime {
    fn finish(self, samples: &[Sample]) -> RegimeWindow {
        let members = &samples[self.start..self.end];
        RegimeWindow {
            start_time: members.first().map_or(0.0, |s| s.seconds_from_start),
            end_time: members.last().map_or(0.0, |s| s.seconds_from_start),
            regime: self.regime,
            confidence: self.confidence_sum / self.labelled.max(1) as f64,
            power_mean: stats::mean(&crate::powers(members)).unwrap_or_default(),
            hr_mean: stats::mean(&crate::heart_rates(members)).unwrap_or_default(),
            samples: members.to_vec(),
            transition: None,
        }
    }
}

/// Label every sliding window and group runs of equal labels.
///
/// Each window followed by a different regime records its outgoing
/// transition, placed exactly as [`detect_transitions`] places it.
pub fn find_regime_windows(samples: &[Sample], config: &SegmentationConfig) -> Vec<RegimeWindow> {
    let mut windows = Vec::new();
    let mut open: Option<OpenRegime> = None;

    for (start, end) in window_bounds(samples, config.window_size) {
        let label = classify_window(&samples[start..end], config);

        match open.as_mut().filter(|current| current.regime == label.regime) {
            Some(current) => {
                current.end = current.end.max(end);
                current.confidence_sum += label.confidence;
                current.labelled += 1;
            }
            None => {
                if let Some(current) = open.take() {
                    windows.push(current.finish(samples));
                }
                open = Some(OpenRegime {
                    start,
                    end,
                    regime: label.regime,
                    confidence_sum: label.confidence,
                    labelled: 1,
                });
            }
        }
    }

    if let Some(current) = open {
        windows.push(current.finish(samples));
    }

    let mut merged = merge_regime_windows(windows, config.regime_merge_gap);
    for i in 1..merged.len() {
        if merged[i - 1].regime != merged[i].regime {
            let transition = transition_between(samples, &merged[i - 1], &merged[i], config);
            debug!(
                "[Regimes] {} -> {} at {:.0}s",
                transition.from_state, transition.to_state, transition.time
            );
            merged[i - 1].transition = Some(transition);
        }
    }
    info!("[Regimes] {} regime windows", merged.len());
    merged
}

/// Merge consecutive windows of the same regime separated by less than
/// `max_gap` seconds. Confidence is averaged and the later window's
/// transition is kept.
pub fn merge_regime_windows(windows: Vec<RegimeWindow>, max_gap: f64) -> Vec<RegimeWindow> {
    let mut merged: Vec<RegimeWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(last) if last.regime == window.regime && window.start_time - last.end_time < max_gap => {
                let last_time = last.end_time;
                last.end_time = last.end_time.max(window.end_time);
                last.samples
                    .extend(window.samples.into_iter().filter(|s| s.seconds_from_start > last_time));
                last.confidence = (last.confidence + window.confidence) / 2.0;
                last.power_mean = stats::mean(&crate::powers(&last.samples)).unwrap_or_default();
                last.hr_mean = stats::mean(&crate::heart_rates(&last.samples)).unwrap_or_default();
                last.transition = window.transition;
            }
            _ => merged.push(window),
        }
    }
    merged
}

// ============================================================================
// Transitions
// ============================================================================

/// Transitions between consecutive regime windows with different labels.
///
/// Each change is placed at the variance-minimizing split of power over the
/// span between the two windows' boundaries.
pub fn detect_transitions(
    samples: &[Sample],
    regime_windows: &[RegimeWindow],
    config: &SegmentationConfig,
) -> Vec<StateTransition> {
    regime_windows
        .windows(2)
        .filter(|pair| pair[0].regime != pair[1].regime)
        .map(|pair| transition_between(samples, &pair[0], &pair[1], config))
        .collect()
}

fn transition_between(
    samples: &[Sample],
    prev: &RegimeWindow,
    next: &RegimeWindow,
    config: &SegmentationConfig,
) -> StateTransition {
    let from = prev.end_time.min(next.start_time);
    let to = prev.end_time.max(next.start_time);
    let time = find_exact_transition_point(samples, from, to);
    StateTransition {
        time,
        from_state: prev.regime,
        to_state: next.regime,
        confidence: transition_confidence(samples, time, config.transition_window),
    }
}

/// Split second within `[start, end]` minimizing the pooled power variance
/// of the two sides. Returns `start` when the span holds fewer than two
/// samples.
pub fn find_exact_transition_point(samples: &[Sample], start: f64, end: f64) -> f64 {
    let span: Vec<&Sample> = samples
        .iter()
        .filter(|s| s.seconds_from_start >= start && s.seconds_from_start <= end)
        .collect();
    if span.len() < 2 {
        return start;
    }

    // Prefix sums of power and power² give each side's variance in O(1)
    let n = span.len();
    let mut sum = vec![0.0; n + 1];
    let mut sum_sq = vec![0.0; n + 1];
    for (i, s) in span.iter().enumerate() {
        sum[i + 1] = sum[i] + s.power;
        sum_sq[i + 1] = sum_sq[i] + s.power * s.power;
    }
    let scatter = |from: usize, to: usize| {
        let count = (to - from) as f64;
        let total = sum[to] - sum[from];
        ((sum_sq[to] - sum_sq[from]) - total * total / count).max(0.0)
    };

    let mut best_cost = f64::INFINITY;
    let mut best_time = start;
    for split in 1..n {
        let cost = (scatter(0, split) + scatter(split, n)) / n as f64;
        if cost < best_cost {
            best_cost = cost;
            best_time = span[split].seconds_from_start;
        }
    }
    best_time
}

/// `min(1, mean of the relative power and HR mean changes)` between the
/// `span` seconds before and after `time`. Zero when either side is empty.
pub fn transition_confidence(samples: &[Sample], time: f64, span: f64) -> f64 {
    let before: Vec<Sample> = samples
        .iter()
        .filter(|s| s.seconds_from_start >= time - span && s.seconds_from_start < time)
        .cloned()
        .collect();
    let after: Vec<Sample> = samples
        .iter()
        .filter(|s| s.seconds_from_start >= time && s.seconds_from_start < time + span)
        .cloned()
        .collect();

    let means = |side: &[Sample]| {
        Some((
            stats::mean(&crate::powers(side))?,
            stats::mean(&crate::heart_rates(side))?,
        ))
    };
    let (Some((p0, h0)), Some((p1, h1))) = (means(&before), means(&after)) else {
        return 0.0;
    };

    let power_change = stats::relative_change(p1, p0);
    let hr_change = stats::relative_change(h1, h0);
    ((power_change + hr_change) / 2.0).clamp(0.0, 1.0)
}
