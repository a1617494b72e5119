//! # Physio Analyzer
//!
//! Power/heart-rate physiological analysis for cycling and endurance
//! recordings.
//!
//! This library provides:
//! - Conditioning of raw sensor records (validation, gap interpolation, smoothing)
//! - Linear power→heart-rate relationship fitting with confidence bands
//! - Segmentation into stable windows and coarse physiological regimes
//! - Whole-activity training metrics (NP, TSS, zones, peaks, energy)
//!
//! ## Features
//!
//! - **`parallel`** - Fit candidate windows in parallel with rayon
//! - **`fit`** - Decode FIT files into raw records with fitparser
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use physio_analyzer::{analyze_records, AnalysisConfig, RawRecord};
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let records: Vec<RawRecord> = (0..600)
//!     .map(|i| {
//!         let power = 180.0 + 40.0 * ((i as f64) / 20.0).sin();
//!         RawRecord::new(start + Duration::seconds(i))
//!             .with_power(power)
//!             .with_heart_rate(0.3 * power + 85.0)
//!     })
//!     .collect();
//!
//! let report = analyze_records(&records, &AnalysisConfig::default()).unwrap();
//! println!("Average power: {:.0}W", report.summary.average_power);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{AnalysisError, OptionExt, Result};

// Per-stage configuration
pub mod config;
pub use config::{AnalysisConfig, ConditionerConfig, SegmentationConfig, SummaryConfig};

// Shared numeric helpers (means, deviations, regressions)
pub mod stats;

// Raw record conditioning (validation, interpolation, smoothing)
pub mod conditioning;
pub use conditioning::{
    condition_samples, ActivityMetadata, ConditionedActivity, ConditioningWarning,
};

// Power-step detection and heart rate response analysis
pub mod response;
pub use response::{detect_power_changes, PowerChange};

// Power→heart-rate regression
pub mod relationship;
pub use relationship::{
    fit_relationship, AerobicFitness, ConfidenceBands, LinearRelationship,
};

// Stable window segmentation and regime classification
pub mod segmentation;
pub use segmentation::{
    detect_transitions, find_regime_windows, find_stable_windows, QualityMetrics, Regime,
    RegimeWindow, StableWindow, StateTransition,
};

// Zone distribution calculations (power/HR zones)
pub mod zones;
pub use zones::{calculate_hr_zones, calculate_power_zones, HRZones, PowerZones};

// Best-effort power peaks
pub mod curves;
pub use curves::{best_average_power, compute_power_peaks, power_per_second, PowerPeak, PEAK_DURATIONS};

// Whole-activity summary
pub mod summary;
pub use summary::{
    analyze_activity, rolling_statistics, summarize, ActivitySummary, EnergyExpenditure,
    RollingStat, VariabilityIndex, WorkloadMetrics,
};

// FIT decoding into raw records
#[cfg(feature = "fit")]
pub mod fit;
#[cfg(feature = "fit")]
pub use fit::decode_fit;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// One decoded record, as produced by an activity file decoder.
///
/// Every sensor channel is optional; conditioning drops records without
/// power or heart rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: DateTime<Utc>,
    /// Power in watts
    pub power: Option<f64>,
    /// Heart rate in bpm
    pub heart_rate: Option<f64>,
    /// Cadence in rpm
    pub cadence: Option<f64>,
    /// Speed in m/s
    pub speed: Option<f64>,
    /// Cumulative distance in meters
    pub distance: Option<f64>,
    /// Temperature in °C
    pub temperature: Option<f64>,
    /// Altitude in meters
    pub altitude: Option<f64>,
    pub position: Option<Position>,
}

impl RawRecord {
    /// Create a record with only a timestamp.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            power: None,
            heart_rate: None,
            cadence: None,
            speed: None,
            distance: None,
            temperature: None,
            altitude: None,
            position: None,
        }
    }

    pub fn with_power(mut self, power: f64) -> Self {
        self.power = Some(power);
        self
    }

    pub fn with_heart_rate(mut self, heart_rate: f64) -> Self {
        self.heart_rate = Some(heart_rate);
        self
    }

    pub fn with_cadence(mut self, cadence: f64) -> Self {
        self.cadence = Some(cadence);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
}

/// One instant of conditioned sensor data.
///
/// Power and heart rate are always present; conditioning guarantees
/// `seconds_from_start` is non-decreasing across a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Elapsed seconds since the first kept record
    pub seconds_from_start: f64,
    /// Power in watts
    pub power: f64,
    /// Heart rate in bpm
    pub heart_rate: f64,
    pub cadence: Option<f64>,
    pub speed: Option<f64>,
    pub distance: Option<f64>,
    pub temperature: Option<f64>,
    pub altitude: Option<f64>,
    pub position: Option<Position>,
}

impl Sample {
    /// Create a sample `seconds` after the Unix epoch, without optional channels.
    ///
    /// Mostly useful for synthetic series; real data goes through
    /// [`condition_samples`].
    pub fn new(seconds_from_start: f64, power: f64, heart_rate: f64) -> Self {
        let millis = (seconds_from_start * 1000.0).round() as i64;
        Self {
            timestamp: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
            seconds_from_start,
            power,
            heart_rate,
            cadence: None,
            speed: None,
            distance: None,
            temperature: None,
            altitude: None,
            position: None,
        }
    }
}

/// Power column of a sample slice.
pub(crate) fn powers(samples: &[Sample]) -> Vec<f64> {
    samples.iter().map(|s| s.power).collect()
}

/// Heart rate column of a sample slice.
pub(crate) fn heart_rates(samples: &[Sample]) -> Vec<f64> {
    samples.iter().map(|s| s.heart_rate).collect()
}

// ============================================================================
// Pipeline
// ============================================================================

/// Everything one pipeline run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: ActivitySummary,
    pub metadata: ActivityMetadata,
    pub warnings: Vec<ConditioningWarning>,
}

/// Condition raw records and analyze the result in one call.
///
/// Conditioning warnings are returned alongside the summary; only an empty
/// conditioned series is an error.
pub fn analyze_records(records: &[RawRecord], config: &AnalysisConfig) -> Result<AnalysisReport> {
    let conditioned = condition_samples(records, &config.conditioner)?;
    let summary = analyze_activity(&conditioned.samples, config)?;
    Ok(AnalysisReport {
        summary,
        metadata: conditioned.metadata,
        warnings: conditioned.warnings,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_sample_new_timestamp() {
        let s = Sample::new(90.0, 200.0, 140.0);
        assert_eq!(s.timestamp.timestamp(), 90);
        assert_eq!(s.seconds_from_start, 90.0);
    }

    #[test]
    fn test_raw_record_builder() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let r = RawRecord::new(ts).with_power(200.0).with_heart_rate(140.0);
        assert_eq!(r.power, Some(200.0));
        assert_eq!(r.heart_rate, Some(140.0));
        assert_eq!(r.cadence, None);
    }

    #[test]
    fn test_analyze_records_end_to_end() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let records: Vec<RawRecord> = (0..300)
            .map(|i| {
                RawRecord::new(start + Duration::seconds(i))
                    .with_power(200.0)
                    .with_heart_rate(140.0)
            })
            .collect();

        let report = analyze_records(&records, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.metadata.sample_count, 300);
        assert!((report.summary.average_power - 200.0).abs() < 1e-9);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_analyze_records_without_usable_data() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let records = vec![RawRecord::new(start).with_power(200.0)];
        let result = analyze_records(&records, &AnalysisConfig::default());
        assert!(matches!(result, Err(AnalysisError::InsufficientData { .. })));
    }
}
