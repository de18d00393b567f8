use std::f64::consts::PI;

use num_complex::Complex64;

use crate::config::FrequencySweep;

/// Linearly spaced sweep frequencies, endpoints included.
pub fn frequency_grid(sweep: &FrequencySweep) -> Vec<f64> {
    let n = sweep.points;
    if n < 2 {
        return vec![sweep.start; n];
    }
    let step = (sweep.stop - sweep.start) / (n - 1) as f64;
    (0..n)
        .map(|k| {
            if k == n - 1 {
                sweep.stop
            } else {
                sweep.start + step * k as f64
            }
        })
        .collect()
}

/// Trapezoidal integration weights for a possibly nonuniform time axis.
fn weights(time: &[f64]) -> Vec<f64> {
    let n = time.len();
    (0..n)
        .map(|k| {
            let left = if k > 0 { time[k] - time[k - 1] } else { 0.0 };
            let right = if k + 1 < n { time[k + 1] - time[k] } else { 0.0 };
            (left + right) / 2.0
        })
        .collect()
}

/// Fourier transform `X(f) = ∫ x(t)·e^(−j2πft) dt` of a sampled signal,
/// evaluated at each of `frequencies`.
pub fn dft(time: &[f64], values: &[f64], frequencies: &[f64]) -> Vec<Complex64> {
    let w = weights(time);
    frequencies
        .iter()
        .map(|f| {
            let omega = 2.0 * PI * f;
            time.iter()
                .zip(values)
                .zip(&w)
                .map(|((t, x), w)| Complex64::from_polar(x * w, -omega * t))
                .sum()
        })
        .collect()
}
