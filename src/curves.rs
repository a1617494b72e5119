//! Best-effort power peaks.
//!
//! Peaks are the best average power over fixed durations, computed with a
//! sliding window in O(n) per duration. Recordings may be sampled faster
//! than 1 Hz, so samples are first averaged into whole-second bins and a
//! duration of `d` seconds is a window of `d` bins.
//!
//! ## Example
//! ```rust
//! use physio_analyzer::curves::best_average_power;
//!
//! let power = vec![200.0, 250.0, 300.0, 280.0, 260.0, 240.0];
//! assert_eq!(best_average_power(&power, 2), Some(290.0));
//! assert_eq!(best_average_power(&power, 10), None);
//! ```

use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::Sample;

/// Default peak durations in seconds
pub const PEAK_DURATIONS: &[u32] = &[5, 30, 60, 300, 600, 1200, 3600];

/// Best average power for one duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerPeak {
    /// Duration in seconds
    pub duration: u32,
    /// Best average power in watts, `None` when the recording is shorter
    pub power: Option<f64>,
    /// Elapsed seconds at which the best effort starts
    pub start_time: Option<f64>,
}

/// Best average power over `window` consecutive values.
///
/// Returns `None` for an empty window or a series shorter than the window.
pub fn best_average_power(power: &[f64], window: usize) -> Option<f64> {
    best_window(power, window).map(|(_, avg)| avg)
}

/// Start index and average of the best window.
fn best_window(power: &[f64], window: usize) -> Option<(usize, f64)> {
    if window == 0 || power.len() < window {
        return None;
    }

    let mut window_sum: f64 = power[..window].iter().sum();
    let mut best_sum = window_sum;
    let mut best_start = 0;

    for i in window..power.len() {
        window_sum += power[i] - power[i - window];
        if window_sum > best_sum {
            best_sum = window_sum;
            best_start = i + 1 - window;
        }
    }

    Some((best_start, best_sum / window as f64))
}

/// Average power per elapsed second as `(second, watts)` pairs.
///
/// Each sample falls in the bin `floor(t − t₀)`; seconds with no sample
/// are left out.
pub fn power_per_second(samples: &[Sample]) -> Vec<(f64, f64)> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let origin = first.seconds_from_start;

    let mut bins: Vec<(f64, f64, usize)> = Vec::new();
    for s in samples {
        let second = origin + (s.seconds_from_start - origin).max(0.0).floor();
        match bins.last_mut() {
            Some((t, sum, count)) if *t == second => {
                *sum += s.power;
                *count += 1;
            }
            _ => bins.push((second, s.power, 1)),
        }
    }
    bins.into_iter()
        .map(|(t, sum, count)| (t, sum / count as f64))
        .collect()
}

/// Compute peaks for each requested duration.
pub fn compute_power_peaks(samples: &[Sample], durations: &[u32]) -> Vec<PowerPeak> {
    let bins = power_per_second(samples);
    let power: Vec<f64> = bins.iter().map(|&(_, p)| p).collect();

    let peak_for = |&duration: &u32| {
        let best = best_window(&power, duration as usize);
        PowerPeak {
            duration,
            power: best.map(|(_, avg)| avg),
            start_time: best.map(|(start, _)| bins[start].0),
        }
    };

    #[cfg(feature = "parallel")]
    let peaks: Vec<PowerPeak> = durations.par_iter().map(peak_for).collect();

    #[cfg(not(feature = "parallel"))]
    let peaks: Vec<PowerPeak> = durations.iter().map(peak_for).collect();

    peaks
}

/// Look up the peak for a duration in a computed set.
pub fn peak_at(peaks: &[PowerPeak], duration: u32) -> Option<f64> {
    peaks
        .iter()
        .find(|p| p.duration == duration)
        .and_then(|p| p.power)
}
