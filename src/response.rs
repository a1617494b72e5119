//! Power-step detection and heart rate response analysis.
//!
//! A power step is a jump in the smoothed power of a window that exceeds a
//! dynamic threshold. Each step is paired with the heart rate response that
//! follows it: how far HR moves and how long it takes to cover a fraction of
//! that move.

use serde::{Deserialize, Serialize};

use crate::config::SegmentationConfig;
use crate::stats;
use crate::Sample;

/// A detected step in smoothed power.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerChange {
    /// Index of the first sample after the step
    pub index: usize,
    /// Elapsed seconds of that sample
    pub time: f64,
    /// Signed change in smoothed power (watts per sample)
    pub magnitude: f64,
}

/// Heart rate reaction to one power step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrResponse {
    /// Seconds from the step until HR covers `response_fraction` of its move
    pub response_time: f64,
    /// Absolute HR move (bpm) from the pre-step baseline to the extreme
    pub magnitude: f64,
}

/// Detect power steps within a window.
///
/// Power is smoothed with a centered average of radius
/// `smoothing_window_size`; a step is a sample-to-sample change larger than
/// `max(power_change_threshold, power_change_sigma·σ)`. Steps closer than
/// `min_gap_between_changes` seconds to the previous one are dropped.
pub fn detect_power_changes(window: &[Sample], config: &SegmentationConfig) -> Vec<PowerChange> {
    if window.len() < 2 {
        return Vec::new();
    }

    let smoothed = stats::centered_moving_average(&crate::powers(window), config.smoothing_window_size);
    let threshold = config
        .power_change_threshold
        .max(config.power_change_sigma * stats::std_dev(&smoothed));

    let mut changes: Vec<PowerChange> = Vec::new();
    for i in 1..smoothed.len() {
        let delta = smoothed[i] - smoothed[i - 1];
        if delta.abs() <= threshold {
            continue;
        }
        let time = window[i].seconds_from_start;
        let far_enough = changes
            .last()
            .map_or(true, |last| time - last.time > config.min_gap_between_changes);
        if far_enough {
            changes.push(PowerChange {
                index: i,
                time,
                magnitude: delta,
            });
        }
    }
    changes
}

/// Measure the heart rate response to each power step.
///
/// The baseline is the mean HR over `response_baseline` seconds before the
/// step (the step sample itself when nothing precedes it). The extreme is
/// the maximum HR within `response_lookahead` seconds for a power increase
/// and the minimum for a decrease.
pub fn analyze_hr_responses(
    window: &[Sample],
    changes: &[PowerChange],
    config: &SegmentationConfig,
) -> Vec<HrResponse> {
    changes
        .iter()
        .filter_map(|change| hr_response(window, change, config))
        .collect()
}

fn hr_response(window: &[Sample], change: &PowerChange, config: &SegmentationConfig) -> Option<HrResponse> {
    let step = window.get(change.index)?;
    let t0 = step.seconds_from_start;

    let before: Vec<f64> = window[..change.index]
        .iter()
        .filter(|s| s.seconds_from_start >= t0 - config.response_baseline)
        .map(|s| s.heart_rate)
        .collect();
    let baseline = stats::mean(&before).unwrap_or(step.heart_rate);

    let after: Vec<&Sample> = window[change.index..]
        .iter()
        .take_while(|s| s.seconds_from_start < t0 + config.response_lookahead)
        .collect();

    let rising = change.magnitude > 0.0;
    let extreme = after
        .iter()
        .map(|s| s.heart_rate)
        .fold(step.heart_rate, |acc, hr| if rising { acc.max(hr) } else { acc.min(hr) });

    let target = baseline + config.response_fraction * (extreme - baseline);
    let crossed = |hr: f64| if rising { hr >= target } else { hr <= target };

    let response_time = after
        .iter()
        .find(|s| crossed(s.heart_rate))
        .map_or(config.response_lookahead, |s| s.seconds_from_start - t0);

    Some(HrResponse {
        response_time,
        magnitude: (extreme - baseline).abs(),
    })
}

/// Mean response time over all detected steps, `None` without steps.
pub fn mean_response_time(window: &[Sample], config: &SegmentationConfig) -> Option<f64> {
    let changes = detect_power_changes(window, config);
    let responses = analyze_hr_responses(window, &changes, config);
    let times: Vec<f64> = responses.iter().map(|r| r.response_time).collect();
    stats::mean(&times)
}

/// Consistency of responses across steps: the mean of `1 − CV` of the
/// response times and of the magnitudes, floored at 0.
///
/// `None` with fewer than two responses, where consistency is undefined.
pub fn response_consistency(responses: &[HrResponse]) -> Option<f64> {
    if responses.len() < 2 {
        return None;
    }
    let times: Vec<f64> = responses.iter().map(|r| r.response_time).collect();
    let magnitudes: Vec<f64> = responses.iter().map(|r| r.magnitude).collect();
    Some(((agreement(&times) + agreement(&magnitudes)) / 2.0).max(0.0))
}

/// 1 − CV; identical values agree fully even when their mean is zero.
fn agreement(values: &[f64]) -> f64 {
    match stats::coefficient_of_variation(values) {
        Some(cv) => 1.0 - cv.abs(),
        None if stats::std_dev(values) < stats::EPSILON => 1.0,
        None => 0.0,
    }
}
