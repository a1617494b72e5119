//! Configuration for every pipeline stage.
//!
//! Each stage has its own config struct with sensible defaults. All numeric
//! thresholds are exposed here rather than hard-wired, and the whole set can
//! be loaded from JSON with missing fields falling back to defaults.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{AnalysisError, Result};

/// Data Conditioner validity and gap-interpolation bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    /// Minimum valid power in watts. Default: 0.0
    pub min_power: f64,
    /// Maximum valid power in watts. Default: 3000.0
    pub max_power: f64,
    /// Minimum valid heart rate in bpm. Default: 30.0
    pub min_hr: f64,
    /// Maximum valid heart rate in bpm. Default: 250.0
    pub max_hr: f64,
    /// Largest gap (seconds) that is still interpolated.
    /// Longer gaps are treated as recording breaks. Default: 5.0
    pub max_gap: f64,
    /// Power jump (watts) against both neighbours flagged as suspicious. Default: 100.0
    pub power_jump_threshold: f64,
    /// Heart rate jump (bpm) against both neighbours flagged as suspicious. Default: 20.0
    pub hr_jump_threshold: f64,
    /// Radius (samples) of the centered moving average. Default: 5
    pub smoothing_radius: usize,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            min_power: 0.0,
            max_power: 3000.0,
            min_hr: 30.0,
            max_hr: 250.0,
            max_gap: 5.0,
            power_jump_threshold: 100.0,
            hr_jump_threshold: 20.0,
            smoothing_radius: 5,
        }
    }
}

/// Window segmentation, stability test and regime classification tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Sliding window length in seconds. Default: 60.0
    pub window_size: f64,
    /// Minimum duration (seconds) of a retained stable window. Default: 60.0
    pub min_window_size: f64,
    /// Maximum relative HR deviation from the fitted line. Default: 0.15
    pub max_hr_deviation: f64,
    /// Minimum r² for a window to count as stable. Default: 0.8
    pub min_r2_threshold: f64,
    /// Maximum relative slope change to extend rather than split. Default: 0.2
    pub max_slope_change: f64,
    /// Maximum relative efficiency change to extend rather than split. Default: 0.15
    pub max_efficiency_change: f64,
    /// Maximum absolute decoupling change to extend rather than split. Default: 0.1
    pub max_decoupling_change: f64,
    /// Confidence level of the regression bands. Default: 0.95
    pub confidence_level: f64,
    /// Fixed floor (watts) of the power-step threshold. Default: 15.0
    pub power_change_threshold: f64,
    /// Multiple of the window's power σ used as the dynamic step threshold. Default: 1.5
    pub power_change_sigma: f64,
    /// Radius (samples) of the smoothing applied before step detection. Default: 5
    pub smoothing_window_size: usize,
    /// Power steps closer than this (seconds) are one event. Default: 10.0
    pub min_gap_between_changes: f64,
    /// Look-ahead (seconds) for the HR response to a power step. Default: 30.0
    pub response_lookahead: f64,
    /// Baseline (seconds) averaged before a power step. Default: 5.0
    pub response_baseline: f64,
    /// Fraction of the HR rise that defines the response time. Default: 0.5
    pub response_fraction: f64,
    /// Response time (seconds) that scores zero. Default: 15.0
    pub max_response_lag: f64,
    /// Minimum consistency of HR responses across power steps. Default: 0.7
    pub min_response_consistency: f64,
    /// Minimum residual linearity score. Default: 0.7
    pub min_linearity_score: f64,
    /// Largest gap (seconds) between windows that may be merged. Default: 5.0
    pub merge_gap: f64,
    /// Maximum relative slope/efficiency difference for merging. Default: 0.15
    pub merge_similarity: f64,
    /// Sub-window (seconds) used to look for accelerating HR response. Default: 30.0
    pub lactate_subwindow: f64,
    /// Maximum first-vs-last quarter power change (watts) for drift. Default: 10.0
    pub drift_max_power_change: f64,
    /// Minimum first-vs-last quarter HR rise (bpm) for drift. Default: 5.0
    pub drift_min_hr_rise: f64,
    /// Regime windows of the same label closer than this (seconds) merge. Default: 30.0
    pub regime_merge_gap: f64,
    /// Span (seconds) of the before/after slices scoring a transition. Default: 30.0
    pub transition_window: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            window_size: 60.0,
            min_window_size: 60.0,
            max_hr_deviation: 0.15,
            min_r2_threshold: 0.8,
            max_slope_change: 0.2,
            max_efficiency_change: 0.15,
            max_decoupling_change: 0.1,
            confidence_level: 0.95,
            power_change_threshold: 15.0,
            power_change_sigma: 1.5,
            smoothing_window_size: 5,
            min_gap_between_changes: 10.0,
            response_lookahead: 30.0,
            response_baseline: 5.0,
            response_fraction: 0.5,
            max_response_lag: 15.0,
            min_response_consistency: 0.7,
            min_linearity_score: 0.7,
            merge_gap: 5.0,
            merge_similarity: 0.15,
            lactate_subwindow: 30.0,
            drift_max_power_change: 10.0,
            drift_min_hr_rise: 5.0,
            regime_merge_gap: 30.0,
            transition_window: 30.0,
        }
    }
}

impl SegmentationConfig {
    /// Two-sided standard-normal quantile for `confidence_level`
    /// (0.95 gives ≈1.96).
    pub fn z_value(&self) -> Result<f64> {
        let normal = Normal::new(0.0, 1.0).map_err(|e| AnalysisError::Config {
            message: e.to_string(),
        })?;
        Ok(normal.inverse_cdf(0.5 + self.confidence_level / 2.0))
    }
}

/// Whole-activity summary settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Known FTP in watts. When unset it is estimated from the best 20 minutes.
    pub ftp: Option<f64>,
    /// Known maximum HR. When unset the recording's maximum is used.
    pub max_hr: Option<f64>,
    /// Durations (seconds) of the best-effort peaks.
    pub peak_durations: Vec<u32>,
    /// Power zone upper bounds as fractions of FTP [Z1..Z5]; Z6 is above.
    pub power_zone_thresholds: [f64; 5],
    /// HR zone upper bounds as fractions of max HR [Z1..Z4]; Z5 is above.
    pub hr_zone_thresholds: [f64; 4],
    /// Rolling window (seconds) for normalized power. Default: 30
    pub np_window: usize,
    /// Duration (seconds) whose best average estimates FTP. Default: 1200
    pub ftp_duration: u32,
    /// Fraction of the best `ftp_duration` power taken as FTP. Default: 0.95
    pub ftp_fraction: f64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            ftp: None,
            max_hr: None,
            peak_durations: crate::curves::PEAK_DURATIONS.to_vec(),
            power_zone_thresholds: [0.55, 0.75, 0.90, 1.05, 1.20],
            hr_zone_thresholds: [0.60, 0.70, 0.80, 0.90],
            np_window: 30,
            ftp_duration: 1200,
            ftp_fraction: 0.95,
        }
    }
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub conditioner: ConditionerConfig,
    pub segmentation: SegmentationConfig,
    pub summary: SummaryConfig,
}

impl AnalysisConfig {
    /// Parse a configuration from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalysisConfig =
            serde_json::from_str(json).map_err(|e| AnalysisError::Config {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        let c = &self.conditioner;
        if c.min_power > c.max_power || c.min_hr > c.max_hr {
            return Err(config_error("valid power/HR range is inverted"));
        }
        if c.max_gap < 1.0 {
            return Err(config_error("max_gap must be at least 1 second"));
        }

        let s = &self.segmentation;
        if s.window_size < 2.0 {
            return Err(config_error("window_size must be at least 2 seconds"));
        }
        if !(s.confidence_level > 0.0 && s.confidence_level < 1.0) {
            return Err(config_error("confidence_level must lie in (0, 1)"));
        }
        if !(s.response_fraction > 0.0 && s.response_fraction <= 1.0) {
            return Err(config_error("response_fraction must lie in (0, 1]"));
        }

        let m = &self.summary;
        if m.np_window == 0 || m.ftp_duration == 0 {
            return Err(config_error("np_window and ftp_duration must be positive"));
        }
        if m.ftp.is_some_and(|ftp| ftp <= 0.0) || m.max_hr.is_some_and(|hr| hr <= 0.0) {
            return Err(config_error("ftp and max_hr must be positive when set"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> AnalysisError {
    AnalysisError::Config {
        message: message.to_string(),
    }
}
