//! Raw record conditioning.
//!
//! Turns decoder output into an ordered, gap-filled, smoothed series of
//! samples that all carry both power and heart rate:
//!
//! 1. Drop records without power or heart rate, sort by timestamp
//! 2. Collect validation warnings (ranges, gaps, abnormal jumps)
//! 3. Hard-filter out-of-range samples
//! 4. Linearly interpolate short gaps at 1 s resolution
//! 5. Centered moving average of power and heart rate
//!
//! Validation never aborts; only an empty result is an error.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ConditionerConfig;
use crate::error::{OptionExt, Result};
use crate::stats;
use crate::{RawRecord, Sample};

/// A non-fatal data quality problem found during conditioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditioningWarning {
    /// The decoder produced nothing
    NoRecords,
    /// No record had both power and heart rate
    NoUsableRecords { dropped: usize },
    PowerOutOfRange { time: f64, power: f64 },
    HeartRateOutOfRange { time: f64, heart_rate: f64 },
    /// Spacing between consecutive samples larger than the interpolation limit
    TimeGap { time: f64, gap: f64 },
    /// Power differs from both neighbours by more than the jump threshold
    AbnormalPowerJump { time: f64, power: f64 },
    /// Heart rate differs from both neighbours by more than the jump threshold
    AbnormalHeartRateJump { time: f64, heart_rate: f64 },
    /// Gap left as-is by interpolation
    UnfilledGap { time: f64, gap: f64 },
}

impl fmt::Display for ConditioningWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecords => write!(f, "no records found"),
            Self::NoUsableRecords { dropped } => {
                write!(f, "no record had power and heart rate ({dropped} dropped)")
            }
            Self::PowerOutOfRange { time, power } => {
                write!(f, "power {power:.0}W out of range at {time:.0}s")
            }
            Self::HeartRateOutOfRange { time, heart_rate } => {
                write!(f, "heart rate {heart_rate:.0}bpm out of range at {time:.0}s")
            }
            Self::TimeGap { time, gap } => write!(f, "{gap:.1}s gap after {time:.0}s"),
            Self::AbnormalPowerJump { time, power } => {
                write!(f, "abnormal power jump to {power:.0}W at {time:.0}s")
            }
            Self::AbnormalHeartRateJump { time, heart_rate } => {
                write!(f, "abnormal heart rate jump to {heart_rate:.0}bpm at {time:.0}s")
            }
            Self::UnfilledGap { time, gap } => {
                write!(f, "{gap:.1}s gap after {time:.0}s left unfilled")
            }
        }
    }
}

/// Recording-level facts derived from the conditioned series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetadata {
    pub start_time: DateTime<Utc>,
    /// Distance of the last sample in meters, when recorded
    pub total_distance: Option<f64>,
    /// Seconds from the first to the last sample
    pub duration: f64,
    pub sample_count: usize,
    /// Samples per second (1 / mean spacing), `None` below two samples
    pub sampling_rate: Option<f64>,
}

/// Conditioner output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionedActivity {
    pub samples: Vec<Sample>,
    pub metadata: ActivityMetadata,
    pub warnings: Vec<ConditioningWarning>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Condition raw decoder records into analysis-ready samples.
///
/// Returns `InsufficientData` when no sample survives filtering; all other
/// problems are reported in `warnings`.
pub fn condition_samples(
    records: &[RawRecord],
    config: &ConditionerConfig,
) -> Result<ConditionedActivity> {
    let mut warnings = Vec::new();

    if records.is_empty() {
        warnings.push(ConditioningWarning::NoRecords);
    }

    let mut samples = to_samples(records);
    if samples.is_empty() && !records.is_empty() {
        warnings.push(ConditioningWarning::NoUsableRecords {
            dropped: records.len(),
        });
    }

    warnings.extend(validate(&samples, config));

    let before = samples.len();
    samples.retain(|s| in_range(s, config));
    if samples.len() < before {
        debug!(
            "[Conditioner] Dropped {} out-of-range samples",
            before - samples.len()
        );
    }

    if samples.is_empty() {
        for w in &warnings {
            warn!("[Conditioner] {}", w);
        }
        return None.ok_or_insufficient("conditioning", 0, 1);
    }

    let (samples, gap_warnings) = interpolate_gaps(&samples, config.max_gap);
    warnings.extend(gap_warnings);

    let samples = smooth(samples, config.smoothing_radius);
    let metadata = build_metadata(&samples)
        .ok_or_insufficient("conditioning metadata", samples.len(), 1)?;

    if !warnings.is_empty() {
        warn!(
            "[Conditioner] {} validation warnings ({} raw records)",
            warnings.len(),
            records.len()
        );
    }
    info!(
        "[Conditioner] {} raw records -> {} samples over {:.0}s",
        records.len(),
        metadata.sample_count,
        metadata.duration
    );

    Ok(ConditionedActivity {
        samples,
        metadata,
        warnings,
    })
}

/// Keep records with both power and heart rate, sorted, with elapsed time.
fn to_samples(records: &[RawRecord]) -> Vec<Sample> {
    let mut usable: Vec<&RawRecord> = records
        .iter()
        .filter(|r| r.power.is_some() && r.heart_rate.is_some())
        .collect();

    if !usable.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
        usable.sort_by_key(|r| r.timestamp);
    }

    let Some(first) = usable.first().map(|r| r.timestamp) else {
        return Vec::new();
    };

    usable
        .into_iter()
        .filter_map(|r| {
            Some(Sample {
                timestamp: r.timestamp,
                seconds_from_start: (r.timestamp - first).num_milliseconds() as f64 / 1000.0,
                power: r.power?,
                heart_rate: r.heart_rate?,
                cadence: r.cadence,
                speed: r.speed,
                distance: r.distance,
                temperature: r.temperature,
                altitude: r.altitude,
                position: r.position,
            })
        })
        .collect()
}

fn in_range(sample: &Sample, config: &ConditionerConfig) -> bool {
    (config.min_power..=config.max_power).contains(&sample.power)
        && (config.min_hr..=config.max_hr).contains(&sample.heart_rate)
}

// ============================================================================
// Validation
// ============================================================================

/// Collect range, gap and abnormal-jump warnings without modifying anything.
pub fn validate(samples: &[Sample], config: &ConditionerConfig) -> Vec<ConditioningWarning> {
    let mut warnings = Vec::new();

    for s in samples {
        let time = s.seconds_from_start;
        if !(config.min_power..=config.max_power).contains(&s.power) {
            warnings.push(ConditioningWarning::PowerOutOfRange {
                time,
                power: s.power,
            });
        }
        if !(config.min_hr..=config.max_hr).contains(&s.heart_rate) {
            warnings.push(ConditioningWarning::HeartRateOutOfRange {
                time,
                heart_rate: s.heart_rate,
            });
        }
    }

    for pair in samples.windows(2) {
        let gap = pair[1].seconds_from_start - pair[0].seconds_from_start;
        if gap > config.max_gap {
            warnings.push(ConditioningWarning::TimeGap {
                time: pair[0].seconds_from_start,
                gap,
            });
        }
    }

    for w in samples.windows(3) {
        let (prev, cur, next) = (&w[0], &w[1], &w[2]);
        let time = cur.seconds_from_start;
        if (cur.power - prev.power).abs() > config.power_jump_threshold
            && (cur.power - next.power).abs() > config.power_jump_threshold
        {
            warnings.push(ConditioningWarning::AbnormalPowerJump {
                time,
                power: cur.power,
            });
        }
        if (cur.heart_rate - prev.heart_rate).abs() > config.hr_jump_threshold
            && (cur.heart_rate - next.heart_rate).abs() > config.hr_jump_threshold
        {
            warnings.push(ConditioningWarning::AbnormalHeartRateJump {
                time,
                heart_rate: cur.heart_rate,
            });
        }
    }

    warnings
}

// ============================================================================
// Interpolation and smoothing
// ============================================================================

/// Fill gaps of more than 1 s and at most `max_gap` s with 1 s linearly
/// interpolated samples.
///
/// Longer gaps are left as they are and reported. A series without gaps is
/// returned unchanged.
pub fn interpolate_gaps(samples: &[Sample], max_gap: f64) -> (Vec<Sample>, Vec<ConditioningWarning>) {
    let mut out = Vec::with_capacity(samples.len());
    let mut warnings = Vec::new();

    for (i, current) in samples.iter().enumerate() {
        out.push(current.clone());
        let Some(next) = samples.get(i + 1) else {
            break;
        };

        let gap = next.seconds_from_start - current.seconds_from_start;
        if gap <= 1.0 {
            continue;
        }
        if gap > max_gap {
            warnings.push(ConditioningWarning::UnfilledGap {
                time: current.seconds_from_start,
                gap,
            });
            continue;
        }

        let mut offset = 1.0;
        while offset < gap - 1e-9 {
            out.push(interpolate(current, next, offset, gap));
            offset += 1.0;
        }
    }

    (out, warnings)
}

fn interpolate(a: &Sample, b: &Sample, offset: f64, gap: f64) -> Sample {
    let frac = offset / gap;
    let lerp = |x: f64, y: f64| x + (y - x) * frac;
    let lerp_opt = |x: Option<f64>, y: Option<f64>| Some(lerp(x?, y?));

    Sample {
        timestamp: a.timestamp + Duration::milliseconds((offset * 1000.0).round() as i64),
        seconds_from_start: a.seconds_from_start + offset,
        power: lerp(a.power, b.power),
        heart_rate: lerp(a.heart_rate, b.heart_rate),
        cadence: lerp_opt(a.cadence, b.cadence),
        speed: lerp_opt(a.speed, b.speed),
        distance: lerp_opt(a.distance, b.distance),
        temperature: a.temperature,
        altitude: lerp_opt(a.altitude, b.altitude),
        position: a.position,
    }
}

/// Centered moving average of power and heart rate.
fn smooth(mut samples: Vec<Sample>, radius: usize) -> Vec<Sample> {
    if radius == 0 {
        return samples;
    }
    let power = stats::centered_moving_average(&crate::powers(&samples), radius);
    let hr = stats::centered_moving_average(&crate::heart_rates(&samples), radius);
    for ((s, p), h) in samples.iter_mut().zip(power).zip(hr) {
        s.power = p;
        s.heart_rate = h;
    }
    samples
}

fn build_metadata(samples: &[Sample]) -> Option<ActivityMetadata> {
    let first = samples.first()?;
    let last = samples.last()?;
    let duration = last.seconds_from_start - first.seconds_from_start;

    let sampling_rate = if samples.len() >= 2 && duration > 0.0 {
        Some((samples.len() - 1) as f64 / duration)
    } else {
        None
    };

    Some(ActivityMetadata {
        start_time: first.timestamp,
        total_distance: last.distance,
        duration: last.seconds_from_start,
        sample_count: samples.len(),
        sampling_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnalysisError;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap()
    }

    fn record(second: i64, power: f64, hr: f64) -> RawRecord {
        RawRecord::new(start() + Duration::seconds(second))
            .with_power(power)
            .with_heart_rate(hr)
    }

    fn unsmoothed() -> ConditionerConfig {
        ConditionerConfig {
            smoothing_radius: 0,
            ..ConditionerConfig::default()
        }
    }

    #[test]
    fn test_drops_incomplete_records_and_sorts() {
        let records = vec![
            record(2, 200.0, 140.0),
            RawRecord::new(start() + Duration::seconds(1)).with_power(210.0),
            record(0, 190.0, 138.0),
            record(1, 195.0, 139.0),
        ];
        let result = condition_samples(&records, &unsmoothed()).unwrap();
        let times: Vec<f64> = result.samples.iter().map(|s| s.seconds_from_start).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(result.samples[1].power, 195.0);
        assert_eq!(result.metadata.start_time, start());
    }

    #[test]
    fn test_short_gap_interpolated() {
        let records: Vec<RawRecord> = (0..=10)
            .map(|i| record(i, 200.0, 140.0))
            .chain((13..=20).map(|i| record(i, 230.0, 143.0)))
            .collect();
        let result = condition_samples(&records, &unsmoothed()).unwrap();

        let at = |t: f64| {
            result
                .samples
                .iter()
                .find(|s| (s.seconds_from_start - t).abs() < 1e-9)
                .unwrap()
        };
        assert!((at(11.0).power - 210.0).abs() < 1e-9);
        assert!((at(12.0).power - 220.0).abs() < 1e-9);
        assert!((at(11.0).heart_rate - 141.0).abs() < 1e-9);
        assert_eq!(at(12.0).timestamp, start() + Duration::seconds(12));
        assert_eq!(result.samples.len(), 21);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_long_gap_left_unfilled() {
        let records = vec![
            record(0, 200.0, 140.0),
            record(1, 200.0, 140.0),
            record(20, 200.0, 140.0),
        ];
        let result = condition_samples(&records, &unsmoothed()).unwrap();
        assert_eq!(result.samples.len(), 3);
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, ConditioningWarning::TimeGap { .. })));
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, ConditioningWarning::UnfilledGap { gap, .. } if *gap == 19.0)));
    }

    #[test]
    fn test_interpolation_idempotent() {
        let samples: Vec<Sample> = (0..30)
            .map(|i| Sample::new(i as f64, 150.0 + i as f64, 120.0))
            .collect();
        let (once, _) = interpolate_gaps(&samples, 5.0);
        assert_eq!(once, samples);
        let (twice, _) = interpolate_gaps(&once, 5.0);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_out_of_range_warned_and_removed() {
        let records = vec![
            record(0, 200.0, 140.0),
            record(1, 5000.0, 140.0),
            record(2, 200.0, 300.0),
            record(3, 200.0, 140.0),
        ];
        let result = condition_samples(&records, &unsmoothed()).unwrap();

        assert!(result.samples.iter().all(|s| s.power <= 3000.0 && s.heart_rate <= 250.0));
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, ConditioningWarning::PowerOutOfRange { power, .. } if *power == 5000.0)));
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, ConditioningWarning::HeartRateOutOfRange { .. })));
    }

    #[test]
    fn test_abnormal_jump_warning() {
        let records = vec![
            record(0, 200.0, 140.0),
            record(1, 450.0, 140.0),
            record(2, 205.0, 140.0),
        ];
        let result = condition_samples(&records, &unsmoothed()).unwrap();
        assert_eq!(
            result.warnings,
            vec![ConditioningWarning::AbnormalPowerJump {
                time: 1.0,
                power: 450.0
            }]
        );
        assert!(result.warnings[0].to_string().contains("450W"));
    }

    #[test]
    fn test_smoothing_applied() {
        let records: Vec<RawRecord> = (0..11)
            .map(|i| record(i, if i == 5 { 310.0 } else { 200.0 }, 140.0))
            .collect();
        let config = ConditionerConfig {
            smoothing_radius: 5,
            power_jump_threshold: 1000.0,
            ..ConditionerConfig::default()
        };
        let result = condition_samples(&records, &config).unwrap();
        // Centre sample averages all 11 values
        assert!((result.samples[5].power - 210.0).abs() < 1e-9);
    }

    #[test]
    fn test_metadata() {
        let records: Vec<RawRecord> = (0..61)
            .map(|i| record(i, 200.0, 140.0).with_distance(i as f64 * 8.0))
            .collect();
        let result = condition_samples(&records, &unsmoothed()).unwrap();
        let meta = &result.metadata;
        assert_eq!(meta.sample_count, 61);
        assert_eq!(meta.duration, 60.0);
        assert_eq!(meta.total_distance, Some(480.0));
        assert!((meta.sampling_rate.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input_is_insufficient() {
        let result = condition_samples(&[], &ConditionerConfig::default());
        assert!(matches!(result, Err(AnalysisError::InsufficientData { .. })));

        let records = vec![record(0, 5000.0, 140.0)];
        let result = condition_samples(&records, &ConditionerConfig::default());
        assert!(matches!(result, Err(AnalysisError::InsufficientData { .. })));
    }
}
