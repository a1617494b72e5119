//! Whole-activity summary: normalized power, variability, intensity, zones,
//! peaks, energy and workload, together with the segmentation results.
//!
//! ## Example
//! ```rust
//! use physio_analyzer::{analyze_activity, AnalysisConfig, Sample};
//!
//! let samples: Vec<Sample> = (0..2400).map(|t| Sample::new(t as f64, 200.0, 140.0)).collect();
//! let summary = analyze_activity(&samples, &AnalysisConfig::default()).unwrap();
//! assert!((summary.normalized_power.unwrap() - 200.0).abs() < 1e-6);
//! ```

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, SummaryConfig};
use crate::curves::{best_average_power, compute_power_peaks, power_per_second, PowerPeak};
use crate::error::{OptionExt, Result};
use crate::segmentation::{
    detect_transitions, find_regime_windows, find_stable_windows, RegimeWindow, StableWindow,
    StateTransition,
};
use crate::stats;
use crate::zones::{calculate_hr_zones, calculate_power_zones, HRZones, PowerZones};
use crate::Sample;

/// kcal per kJ of mechanical work.
const KCAL_PER_KJ: f64 = 0.239;

/// Default window (samples) of [`rolling_statistics`].
pub const ROLLING_WINDOW: usize = 10;

// ============================================================================
// Types
// ============================================================================

/// Coefficient of variation of power and heart rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariabilityIndex {
    /// `None` when mean power is zero
    pub power: Option<f64>,
    pub hr: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyExpenditure {
    pub kjoules: f64,
    pub kcal: f64,
    /// `None` for a zero-length recording
    pub kj_per_hour: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMetrics {
    /// NP / FTP
    pub intensity_factor: Option<f64>,
    /// hours · 100 · IF²
    pub training_stress_score: Option<f64>,
    /// kJ per hour at normalized power
    pub work_per_hour: Option<f64>,
}

/// Everything known about one activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Seconds from the first to the last sample
    pub duration: f64,
    /// Meters, when the recording carries distance
    pub total_distance: Option<f64>,
    pub average_power: f64,
    /// `None` for recordings shorter than the NP window
    pub normalized_power: Option<f64>,
    pub variability_index: VariabilityIndex,
    /// NP · NP/FTP
    pub intensity_score: Option<f64>,
    /// FTP estimated from the best `ftp_duration` effort
    pub estimated_ftp: Option<f64>,
    pub power_zones: PowerZones,
    pub hr_zones: HRZones,
    pub peaks: Vec<PowerPeak>,
    pub stable_windows: Vec<StableWindow>,
    pub regime_windows: Vec<RegimeWindow>,
    pub transitions: Vec<StateTransition>,
    pub energy_expenditure: EnergyExpenditure,
    pub workload_metrics: WorkloadMetrics,
}

/// Rolling power/HR statistics over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStat {
    /// Elapsed seconds of the window's last sample
    pub time: f64,
    pub power_mean: f64,
    pub power_std: f64,
    pub hr_mean: f64,
    pub hr_std: f64,
    /// Pearson power/HR correlation, `None` when either is constant
    pub correlation: Option<f64>,
}

// ============================================================================
// Metrics
// ============================================================================

/// 4th root of the mean 4th power of the `window`-value rolling mean.
///
/// `power` is one value per second; see [`power_per_second`].
pub fn normalized_power(power: &[f64], window: usize) -> Option<f64> {
    let rolling = stats::trailing_rolling_mean(power, window);
    let fourth: Vec<f64> = rolling.iter().map(|p| p.powi(4)).collect();
    stats::mean(&fourth).map(|m| m.powf(0.25))
}

/// `ftp_fraction` of the best `ftp_duration` average power.
pub fn estimated_ftp(power: &[f64], config: &SummaryConfig) -> Option<f64> {
    best_average_power(power, config.ftp_duration as usize).map(|p| p * config.ftp_fraction)
}

fn energy(power: &[f64], duration: f64) -> EnergyExpenditure {
    let mean_dt = if power.len() > 1 && duration > 0.0 {
        duration / (power.len() - 1) as f64
    } else {
        1.0
    };
    let kjoules = power.iter().sum::<f64>() * mean_dt / 1000.0;
    EnergyExpenditure {
        kjoules,
        kcal: kjoules * KCAL_PER_KJ,
        kj_per_hour: (duration > 0.0).then(|| kjoules / (duration / 3600.0)),
    }
}

fn workload(np: Option<f64>, ftp: Option<f64>, duration: f64) -> WorkloadMetrics {
    let intensity_factor = match (np, ftp) {
        (Some(np), Some(ftp)) if ftp > 0.0 => Some(np / ftp),
        _ => None,
    };
    WorkloadMetrics {
        intensity_factor,
        training_stress_score: intensity_factor.map(|f| duration / 3600.0 * 100.0 * f * f),
        work_per_hour: np.map(|np| np * 3.6),
    }
}

/// Rolling statistics over trailing windows of `window` samples, one entry
/// per complete window.
pub fn rolling_statistics(samples: &[Sample], window: usize) -> Vec<RollingStat> {
    if window < 2 {
        return Vec::new();
    }
    samples
        .windows(window)
        .map(|w| {
            let power = crate::powers(w);
            let hr = crate::heart_rates(w);
            RollingStat {
                time: w[w.len() - 1].seconds_from_start,
                power_mean: stats::mean(&power).unwrap_or_default(),
                power_std: stats::std_dev(&power),
                hr_mean: stats::mean(&hr).unwrap_or_default(),
                hr_std: stats::std_dev(&hr),
                correlation: stats::correlation(&power, &hr),
            }
        })
        .collect()
}

// ============================================================================
// Summaries
// ============================================================================

/// Summarize a conditioned series together with its stable windows.
///
/// Regime windows and transitions are left empty; [`analyze_activity`]
/// fills them in.
pub fn summarize(samples: &[Sample], windows: Vec<StableWindow>, config: &SummaryConfig) -> Result<ActivitySummary> {
    let first = samples.first().ok_or_insufficient("summary", 0, 1)?;
    let last = samples.last().ok_or_insufficient("summary", 0, 1)?;
    let duration = last.seconds_from_start - first.seconds_from_start;

    let power = crate::powers(samples);
    let hr = crate::heart_rates(samples);
    let average_power = stats::mean(&power).ok_or_insufficient("summary", 0, 1)?;

    let per_second: Vec<f64> = power_per_second(samples).into_iter().map(|(_, p)| p).collect();
    let np = normalized_power(&per_second, config.np_window);
    let estimated = estimated_ftp(&per_second, config);
    let ftp = config.ftp.or(estimated).filter(|&f| f > 0.0);

    let intensity_score = match (np, ftp) {
        (Some(np), Some(ftp)) => Some(np * np / ftp),
        _ => None,
    };

    let zone_reference = ftp.unwrap_or(average_power);
    let observed_max_hr = stats::min_max(&hr).map_or(0.0, |(_, max)| max);
    let max_hr = config.max_hr.unwrap_or(observed_max_hr);

    Ok(ActivitySummary {
        duration,
        total_distance: samples.iter().rev().find_map(|s| s.distance),
        average_power,
        normalized_power: np,
        variability_index: VariabilityIndex {
            power: stats::coefficient_of_variation(&power),
            hr: stats::coefficient_of_variation(&hr),
        },
        intensity_score,
        estimated_ftp: estimated,
        power_zones: calculate_power_zones(&power, zone_reference, &config.power_zone_thresholds),
        hr_zones: calculate_hr_zones(&hr, max_hr, &config.hr_zone_thresholds),
        peaks: compute_power_peaks(samples, &config.peak_durations),
        stable_windows: windows,
        regime_windows: Vec::new(),
        transitions: Vec::new(),
        energy_expenditure: energy(&power, duration),
        workload_metrics: workload(np, ftp, duration),
    })
}

/// Segment and summarize a conditioned series.
pub fn analyze_activity(samples: &[Sample], config: &AnalysisConfig) -> Result<ActivitySummary> {
    if samples.is_empty() {
        return None.ok_or_insufficient("activity analysis", 0, 1);
    }

    let windows = find_stable_windows(samples, &config.segmentation);
    let regime_windows = find_regime_windows(samples, &config.segmentation);
    let transitions = detect_transitions(samples, &regime_windows, &config.segmentation);

    let mut summary = summarize(samples, windows, &config.summary)?;
    summary.regime_windows = regime_windows;
    summary.transitions = transitions;

    info!(
        "[Summary] {:.0}s, avg {:.0}W, NP {}, {} stable windows, {} transitions",
        summary.duration,
        summary.average_power,
        summary
            .normalized_power
            .map_or_else(|| "n/a".to_string(), |np| format!("{np:.0}W")),
        summary.stable_windows.len(),
        summary.transitions.len()
    );
    Ok(summary)
}
