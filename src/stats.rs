//! Numeric building blocks shared by every stage.
//!
//! Standard deviations are sample deviations (n − 1), matching how the
//! variability and stability metrics are conventionally reported.

use statrs::statistics::Statistics;

/// Values below this are treated as zero when used as a divisor.
pub const EPSILON: f64 = 1e-9;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.mean())
}

/// Sample variance (n − 1). Zero for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.variance()
}

/// Sample standard deviation (n − 1).
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Minimum and maximum, `None` for an empty slice.
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    }))
}

/// Coefficient of variation (σ / mean). `None` when the mean is ~0.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m.abs() < EPSILON {
        return None;
    }
    Some(std_dev(values) / m)
}

/// 1 − coefficient of variation, clamped to [0, 1].
pub fn stability(values: &[f64]) -> f64 {
    match coefficient_of_variation(values) {
        Some(cv) => (1.0 - cv).clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// |new − reference| / |reference|, infinite when the reference is ~0
/// and the values differ.
pub fn relative_change(new: f64, reference: f64) -> f64 {
    let diff = (new - reference).abs();
    if reference.abs() < EPSILON {
        if diff < EPSILON {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        diff / reference.abs()
    }
}

/// |actual − predicted| / |predicted|.
pub fn relative_deviation(actual: f64, predicted: f64) -> f64 {
    (actual - predicted).abs() / predicted.abs().max(EPSILON)
}

/// Centered moving average with the given radius. Windows are truncated at
/// the series ends so the output has the input's length.
pub fn centered_moving_average(values: &[f64], radius: usize) -> Vec<f64> {
    if radius == 0 || values.is_empty() {
        return values.to_vec();
    }
    let n = values.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(radius);
            let end = (i + radius + 1).min(n);
            (prefix[end] - prefix[start]) / (end - start) as f64
        })
        .collect()
}

/// Trailing rolling mean: one value per complete window of `window` samples.
pub fn trailing_rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    out.push(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / window as f64);
    }
    out
}

/// Pearson correlation coefficient, `None` when either series is constant.
pub fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    let denom = (sxx * syy).sqrt();
    if denom < EPSILON {
        return None;
    }
    Some(sxy / denom)
}

/// Ordinary least squares `y = slope·x + intercept`.
/// `None` when x has no variance.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
    }
    if sxx < EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, my - slope * mx))
}

/// Coefficient of determination `1 − SS_res/SS_tot` of a given line.
/// Zero when y has no variance. May be negative.
pub fn r_squared(xs: &[f64], ys: &[f64], slope: f64, intercept: f64) -> f64 {
    let Some(my) = mean(ys) else {
        return 0.0;
    };
    let ss_tot: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
    if ss_tot < EPSILON {
        return 0.0;
    }
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// r² of the least-squares quadratic `y = a + b·x + c·x²`.
///
/// x is standardized before solving the normal equations to keep them well
/// conditioned. `None` when the system is singular (fewer than three
/// distinct x values) or y is constant.
pub fn quadratic_r_squared(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 3 {
        return None;
    }
    let mx = mean(xs)?;
    let sx = std_dev(xs);
    if sx < EPSILON {
        return None;
    }
    let us: Vec<f64> = xs.iter().map(|x| (x - mx) / sx).collect();

    let mut s = [0.0f64; 5];
    let mut t = [0.0f64; 3];
    for (u, y) in us.iter().zip(ys) {
        let mut p = 1.0;
        for (k, sk) in s.iter_mut().enumerate() {
            *sk += p;
            if k < 3 {
                t[k] += p * y;
            }
            p *= u;
        }
    }
    let matrix = [[s[0], s[1], s[2]], [s[1], s[2], s[3]], [s[2], s[3], s[4]]];
    let [a, b, c] = solve3(matrix, t)?;

    let my = mean(ys)?;
    let ss_tot: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
    if ss_tot < EPSILON {
        return None;
    }
    let ss_res: f64 = us
        .iter()
        .zip(ys)
        .map(|(u, y)| (y - (a + b * u + c * u * u)).powi(2))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}

/// Gaussian elimination with partial pivoting on a 3×3 system.
fn solve3(mut m: [[f64; 3]; 3], mut rhs: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < EPSILON {
            return None;
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut out = [0.0f64; 3];
    for row in (0..3).rev() {
        let tail: f64 = ((row + 1)..3).map(|k| m[row][k] * out[k]).sum();
        out[row] = (rhs[row] - tail) / m[row][row];
    }
    Some(out)
}
