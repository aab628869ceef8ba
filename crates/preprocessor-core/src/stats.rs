//! NaN-aware numeric helpers shared by the strategies
//!
//! Missing values are NaN throughout. Aggregates skip them; a series with
//! no usable values aggregates to NaN.

/// Iterator over the non-NaN values
fn valid(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

/// Mean of the non-NaN values
pub fn mean(values: &[f64]) -> f64 {
    let (sum, count) = valid(values).fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

/// Sample standard deviation (n - 1) of the non-NaN values
pub fn std_dev(values: &[f64]) -> f64 {
    let count = valid(values).count();
    if count < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = valid(values).map(|v| (v - m).powi(2)).sum();
    (ss / (count - 1) as f64).sqrt()
}

/// Smallest non-NaN value
pub fn min(values: &[f64]) -> f64 {
    valid(values).fold(f64::NAN, f64::min)
}

/// Largest non-NaN value
pub fn max(values: &[f64]) -> f64 {
    valid(values).fold(f64::NAN, f64::max)
}

/// Coefficient of variation, `std / |mean|`
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 { f64::NAN } else { std_dev(values) / m.abs() }
}

/// Fill NaNs with the previous valid value, then leading NaNs with the next one
pub fn fill_forward_backward(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }
    let mut next = f64::NAN;
    for v in values.iter_mut().rev() {
        if v.is_nan() {
            *v = next;
        } else {
            next = *v;
        }
    }
}

/// Linear interpolation over row position.
///
/// Interior gaps are interpolated, trailing gaps take the last valid value,
/// leading gaps stay NaN.
pub fn interpolate_linear(values: &mut [f64]) {
    let mut prev: Option<usize> = None;
    for i in 0..values.len() {
        if values[i].is_nan() {
            continue;
        }
        if let Some(p) = prev {
            let span = (i - p) as f64;
            for j in p + 1..i {
                let t = (j - p) as f64 / span;
                values[j] = values[p] + t * (values[i] - values[p]);
            }
        }
        prev = Some(i);
    }
    if let Some(p) = prev {
        let last = values[p];
        values[p + 1..].iter_mut().for_each(|v| *v = last);
    }
}

/// Trailing mean over up to `window` values, partial at the start
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| mean(&values[(i + 1).saturating_sub(window)..=i]))
        .collect()
}

/// Trailing sample std over exactly `window` values, NaN until the window fills
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                f64::NAN
            } else {
                let slice = &values[i + 1 - window..=i];
                if slice.iter().any(|v| v.is_nan()) { f64::NAN } else { std_dev(slice) }
            }
        })
        .collect()
}

/// Adjusted exponentially weighted mean.
///
/// Each output is `Σ (1-α)^k x_{t-k} / Σ (1-α)^k` over the valid values seen
/// so far; NaN inputs are skipped but still age the weights.
pub fn ewma(values: &[f64], alpha: f64) -> Vec<f64> {
    let decay = 1.0 - alpha;
    let mut num = 0.0;
    let mut den = 0.0;
    values
        .iter()
        .map(|&x| {
            num *= decay;
            den *= decay;
            if !x.is_nan() {
                num += x;
                den += 1.0;
            }
            if den == 0.0 { f64::NAN } else { num / den }
        })
        .collect()
}

/// Autocorrelation at lags `1..=max_lag` of the non-NaN values
pub fn autocorrelation(values: &[f64], max_lag: usize) -> Vec<f64> {
    let xs: Vec<f64> = valid(values).collect();
    let m = mean(&xs);
    let denom: f64 = xs.iter().map(|v| (v - m).powi(2)).sum();
    (1..=max_lag)
        .map(|lag| {
            if denom == 0.0 || lag >= xs.len() {
                return 0.0;
            }
            let num: f64 = xs
                .iter()
                .zip(&xs[lag..])
                .map(|(a, b)| (a - m) * (b - m))
                .sum();
            num / denom
        })
        .collect()
}

/// Partial autocorrelation at lags `1..=max_lag` (Durbin-Levinson)
pub fn partial_autocorrelation(values: &[f64], max_lag: usize) -> Vec<f64> {
    let rho = autocorrelation(values, max_lag);
    let mut pacf = Vec::with_capacity(max_lag);
    let mut phi: Vec<f64> = Vec::new();

    for k in 0..max_lag {
        let (num, den) = phi.iter().enumerate().fold((rho[k], 1.0), |(n, d), (j, p)| {
            (n - p * rho[k - 1 - j], d - p * rho[j])
        });
        let phi_kk = if den.abs() < f64::EPSILON { 0.0 } else { num / den };
        let next: Vec<f64> = phi
            .iter()
            .enumerate()
            .map(|(j, p)| p - phi_kk * phi[k - 1 - j])
            .chain(std::iter::once(phi_kk))
            .collect();
        phi = next;
        pacf.push(phi_kk);
    }
    pacf
}
