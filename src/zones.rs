//! Zone distribution calculations for power and heart rate data.
//!
//! Zones are fractions of time, not percentages: for a non-empty series the
//! six power fractions and the five heart rate fractions each sum to 1.
//!
//! ## Example
//! ```rust
//! use physio_analyzer::zones::calculate_power_zones;
//!
//! let power = vec![100.0, 150.0, 200.0, 250.0, 300.0];
//! let zones = calculate_power_zones(&power, 200.0, &[0.55, 0.75, 0.90, 1.05, 1.20]);
//! println!("Time in Z4: {:.0}%", zones.zone_fraction(4) * 100.0);
//! ```

use serde::{Deserialize, Serialize};

/// Time-in-zone distribution for power.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerZones {
    /// Watts the zone thresholds are relative to (FTP or a fallback)
    pub reference_power: f64,
    /// Fraction of samples in each zone (indexed 0-5 for zones 1-6)
    pub fractions: [f64; 6],
}

impl PowerZones {
    /// Fraction for a zone (1-6), 0 for anything else.
    pub fn zone_fraction(&self, zone: u8) -> f64 {
        if (1..=6).contains(&zone) {
            self.fractions[(zone - 1) as usize]
        } else {
            0.0
        }
    }
}

/// Time-in-zone distribution for heart rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HRZones {
    /// Maximum heart rate the thresholds are relative to
    pub max_hr: f64,
    /// Fraction of samples in each zone (indexed 0-4 for zones 1-5)
    pub fractions: [f64; 5],
}

impl HRZones {
    /// Fraction for a zone (1-5), 0 for anything else.
    pub fn zone_fraction(&self, zone: u8) -> f64 {
        if (1..=5).contains(&zone) {
            self.fractions[(zone - 1) as usize]
        } else {
            0.0
        }
    }
}

/// Zone index (0-based) of `value` given upper bounds as fractions of `reference`.
///
/// A non-positive reference puts everything in the first zone.
fn zone_index(value: f64, reference: f64, thresholds: &[f64]) -> usize {
    if reference <= 0.0 {
        return 0;
    }
    thresholds
        .iter()
        .position(|&t| value <= reference * t)
        .unwrap_or(thresholds.len())
}

fn distribution<const N: usize>(values: &[f64], reference: f64, thresholds: &[f64]) -> [f64; N] {
    let mut counts = [0usize; N];
    for &v in values {
        let zone = zone_index(v, reference, thresholds).min(N - 1);
        counts[zone] += 1;
    }

    let mut fractions = [0.0f64; N];
    if values.is_empty() {
        return fractions;
    }
    let total = values.len() as f64;
    for (fraction, count) in fractions.iter_mut().zip(counts) {
        *fraction = count as f64 / total;
    }
    fractions
}

/// Power zone distribution.
///
/// # Arguments
/// * `power` - Power values in watts
/// * `reference_power` - FTP (or fallback) in watts
/// * `thresholds` - Upper bounds of Z1..Z5 as fractions of the reference; Z6 is above
pub fn calculate_power_zones(power: &[f64], reference_power: f64, thresholds: &[f64; 5]) -> PowerZones {
    PowerZones {
        reference_power,
        fractions: distribution::<6>(power, reference_power, thresholds),
    }
}

/// Heart rate zone distribution.
///
/// # Arguments
/// * `heart_rate` - Heart rate values in bpm
/// * `max_hr` - Maximum heart rate
/// * `thresholds` - Upper bounds of Z1..Z4 as fractions of max HR; Z5 is above
pub fn calculate_hr_zones(heart_rate: &[f64], max_hr: f64, thresholds: &[f64; 4]) -> HRZones {
    HRZones {
        max_hr,
        fractions: distribution::<5>(heart_rate, max_hr, thresholds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POWER_THRESHOLDS: [f64; 5] = [0.55, 0.75, 0.90, 1.05, 1.20];
    const HR_THRESHOLDS: [f64; 4] = [0.60, 0.70, 0.80, 0.90];

    #[test]
    fn test_power_zone_boundaries() {
        // FTP 200: Z1 ≤110, Z2 ≤150, Z3 ≤180, Z4 ≤210, Z5 ≤240, Z6 above
        let power = vec![100.0, 140.0, 170.0, 200.0, 230.0, 260.0];
        let zones = calculate_power_zones(&power, 200.0, &POWER_THRESHOLDS);
        for zone in 1..=6 {
            assert!((zones.zone_fraction(zone) - 1.0 / 6.0).abs() < 1e-12);
        }
        assert_eq!(zones.zone_fraction(7), 0.0);
    }

    #[test]
    fn test_zone_sums() {
        let power: Vec<f64> = (0..500).map(|i| (i * 7 % 400) as f64).collect();
        let hr: Vec<f64> = (0..500).map(|i| 90.0 + (i % 100) as f64).collect();

        let pz = calculate_power_zones(&power, 250.0, &POWER_THRESHOLDS);
        let hz = calculate_hr_zones(&hr, 190.0, &HR_THRESHOLDS);
        assert!((pz.fractions.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((hz.fractions.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_reference() {
        let zones = calculate_power_zones(&[0.0, 0.0, 0.0], 0.0, &POWER_THRESHOLDS);
        assert_eq!(zones.zone_fraction(1), 1.0);
    }

    #[test]
    fn test_empty_series() {
        let zones = calculate_hr_zones(&[], 190.0, &HR_THRESHOLDS);
        assert_eq!(zones.fractions, [0.0; 5]);
    }

    #[test]
    fn test_hr_zones() {
        // Max 200: Z1 ≤120, Z2 ≤140, Z3 ≤160, Z4 ≤180, Z5 above
        let hr = vec![100.0, 130.0, 130.0, 185.0];
        let zones = calculate_hr_zones(&hr, 200.0, &HR_THRESHOLDS);
        assert_eq!(zones.fractions, [0.25, 0.5, 0.0, 0.0, 0.25]);
    }
}
