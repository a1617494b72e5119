//! Post-processing for stable windows: length filtering, merging of similar
//! neighbours, overlap trimming and quality ranking.

use log::{debug, info};

use super::StableWindow;
use crate::config::SegmentationConfig;
use crate::relationship::fit_relationship;
use crate::stats;
use crate::Sample;

/// Drop windows shorter than `min_duration` seconds.
pub fn filter_short_windows(windows: Vec<StableWindow>, min_duration: f64) -> Vec<StableWindow> {
    let before = windows.len();
    let kept: Vec<StableWindow> = windows
        .into_iter()
        .filter(|w| w.duration() >= min_duration)
        .collect();
    if kept.len() < before {
        debug!(
            "[Segmentation] Dropped {} windows shorter than {:.0}s",
            before - kept.len(),
            min_duration
        );
    }
    kept
}

fn should_merge(current: &StableWindow, next: &StableWindow, config: &SegmentationConfig) -> bool {
    let a = &current.relationship;
    let b = &next.relationship;
    current.end_time >= next.start_time - config.merge_gap
        && stats::relative_change(b.slope, a.slope) < config.merge_similarity
        && stats::relative_change(b.efficiency, a.efficiency) < config.merge_similarity
}

/// Combine two windows into one over the union of their samples.
///
/// Returns `None` when the combined samples cannot be fitted.
fn merge_pair(current: &StableWindow, next: &StableWindow, config: &SegmentationConfig) -> Option<StableWindow> {
    let mut samples = current.samples.clone();
    samples.extend(next.samples.iter().cloned());
    samples.sort_by(|a, b| a.seconds_from_start.total_cmp(&b.seconds_from_start));
    samples.dedup_by(|a, b| a.seconds_from_start == b.seconds_from_start);

    let relationship = fit_relationship(&samples, config).ok()?;
    Some(StableWindow::new(samples, relationship, config))
}

/// Merge chronologically adjacent windows with similar slope and efficiency.
///
/// Windows are visited in start-time order; the result never has more
/// windows than the input.
pub fn merge_adjacent_windows(mut windows: Vec<StableWindow>, config: &SegmentationConfig) -> Vec<StableWindow> {
    if windows.len() <= 1 {
        return windows;
    }
    windows.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let before = windows.len();
    let mut iter = windows.into_iter();
    let mut merged = Vec::with_capacity(before);
    let Some(mut current) = iter.next() else {
        return merged;
    };

    for next in iter {
        let combined = if should_merge(&current, &next, config) {
            merge_pair(&current, &next, config)
        } else {
            None
        };
        match combined {
            Some(window) => current = window,
            None => {
                merged.push(current);
                current = next;
            }
        }
    }
    merged.push(current);

    if merged.len() < before {
        info!(
            "[Segmentation] Merged {} windows into {}",
            before,
            merged.len()
        );
    }
    merged
}

/// Trim windows so that no two share a sample, earliest window first.
///
/// A window starting at or before the end of the previous one loses its
/// leading samples and is refitted on the rest; it is dropped when what
/// remains is shorter than `min_window_size` seconds or cannot be fitted.
pub fn separate_overlapping(mut windows: Vec<StableWindow>, config: &SegmentationConfig) -> Vec<StableWindow> {
    windows.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut separated: Vec<StableWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        let previous_end = match separated.last() {
            Some(previous) if window.start_time <= previous.end_time => previous.end_time,
            _ => {
                separated.push(window);
                continue;
            }
        };

        let samples: Vec<Sample> = window
            .samples
            .into_iter()
            .filter(|s| s.seconds_from_start > previous_end)
            .collect();
        let duration = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => last.seconds_from_start - first.seconds_from_start,
            _ => 0.0,
        };
        if samples.is_empty() || duration < config.min_window_size {
            debug!(
                "[Segmentation] Dropped window overlapping up to {:.0}s ({:.0}s left)",
                previous_end, duration
            );
            continue;
        }

        match fit_relationship(&samples, config) {
            Ok(relationship) => separated.push(StableWindow::new(samples, relationship, config)),
            Err(e) => debug!("[Segmentation] Dropped trimmed window: {}", e),
        }
    }
    separated
}

/// Sort windows by overall quality, best first.
pub fn sort_by_quality(mut windows: Vec<StableWindow>) -> Vec<StableWindow> {
    windows.sort_by(|a, b| b.overall_quality().total_cmp(&a.overall_quality()));
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(range: std::ops::Range<usize>, offset: f64) -> StableWindow {
        let config = SegmentationConfig::default();
        let samples: Vec<Sample> = range
            .map(|i| {
                let power = 150.0 + 50.0 * (i as f64 / 10.0).sin();
                Sample::new(i as f64, power, 0.3 * power + offset)
            })
            .collect();
        let rel = fit_relationship(&samples, &config).unwrap();
        StableWindow::new(samples, rel, &config)
    }

    #[test]
    fn test_filter_short() {
        let windows = vec![window(0..40, 85.0), window(100..200, 85.0)];
        let kept = filter_short_windows(windows, 60.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].start_time, 100.0);
    }

    #[test]
    fn test_merge_touching_similar_windows() {
        let config = SegmentationConfig::default();
        let windows = vec![window(63..126, 85.0), window(0..66, 85.0)];
        let merged = merge_adjacent_windows(windows, &config);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start_time, 0.0);
        assert_eq!(merged[0].end_time, 125.0);
        // Overlapping samples appear once
        assert_eq!(merged[0].samples.len(), 126);
    }

    #[test]
    fn test_no_merge_across_large_gap() {
        let config = SegmentationConfig::default();
        let windows = vec![window(0..63, 85.0), window(126..189, 85.0)];
        let merged = merge_adjacent_windows(windows, &config);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_no_merge_when_efficiency_differs() {
        let config = SegmentationConfig::default();
        // Same slope, HR 40 bpm higher: efficiency drops well beyond 15%
        let windows = vec![window(0..63, 85.0), window(64..127, 125.0)];
        let merged = merge_adjacent_windows(windows, &config);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_separate_overlapping_trims_later_window() {
        let config = SegmentationConfig::default();
        // HR offsets differ too much to merge, but the samples overlap
        let windows = vec![window(70..170, 125.0), window(0..100, 85.0)];
        let separated = separate_overlapping(windows, &config);

        assert_eq!(separated.len(), 2);
        assert_eq!(separated[0].end_time, 99.0);
        assert_eq!(separated[1].start_time, 100.0);
        assert_eq!(separated[1].end_time, 169.0);
        assert_eq!(separated[1].samples.len(), 70);
        assert!((separated[1].relationship.slope - 0.3).abs() < 1e-6);
        assert!((separated[1].relationship.intercept - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_separate_overlapping_drops_short_remainder() {
        let config = SegmentationConfig::default();
        let windows = vec![window(0..100, 85.0), window(50..140, 125.0), window(90..130, 125.0)];
        let separated = separate_overlapping(windows, &config);
        assert_eq!(separated.len(), 1);
        assert_eq!(separated[0].start_time, 0.0);

        let apart = vec![window(0..70, 85.0), window(70..140, 125.0)];
        assert_eq!(separate_overlapping(apart, &config).len(), 2);
    }

    #[test]
    fn test_sort_by_quality() {
        let config = SegmentationConfig::default();
        let good = window(0..120, 85.0);
        let mut noisy_samples = good.samples.clone();
        for (i, s) in noisy_samples.iter_mut().enumerate() {
            s.heart_rate += if i % 2 == 0 { 6.0 } else { -6.0 };
        }
        let rel = fit_relationship(&noisy_samples, &config).unwrap();
        let noisy = StableWindow::new(noisy_samples, rel, &config);

        let sorted = sort_by_quality(vec![noisy, good]);
        assert!(sorted[0].overall_quality() >= sorted[1].overall_quality());
        assert!((sorted[0].relationship.r2 - 1.0).abs() < 1e-9);
    }
}
