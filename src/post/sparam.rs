//! Scattering parameters from per-excitation port voltages and currents.

use std::f64::consts::PI;

use grid::Grid;
use num_complex::Complex64;

use crate::error::{EmsError, Result};
use crate::post::dft::dft;
use crate::results::RawResult;

/// Incident and reflected power waves at one port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortWaves {
    pub a: Vec<Complex64>,
    pub b: Vec<Complex64>,
}

/// `a = (V + Z0·I) / (2√Z0)` and `b = (V − Z0·I) / (2√Z0)`.
pub fn waves(v: &[Complex64], i: &[Complex64], z0: f64) -> PortWaves {
    let k = 2.0 * z0.sqrt();
    let (a, b): (Vec<_>, Vec<_>) = v
        .iter()
        .zip(i)
        .map(|(v, i)| ((v + i * z0) / k, (v - i * z0) / k))
        .unzip();
    PortWaves { a, b }
}

/// S-matrix over a frequency sweep. Entry `(i, j)` is measured at port `i`
/// while port `j` is excited; a column exists once port `j` has been run.
#[derive(Debug, Clone)]
pub struct SParameters {
    frequencies: Vec<f64>,
    impedances: Vec<f64>,
    table: Grid<Option<Vec<Complex64>>>,
}

impl SParameters {
    /// `impedances[i]` is the reference impedance of port `i`.
    pub fn new(frequencies: Vec<f64>, impedances: Vec<f64>) -> Self {
        let n = impedances.len();
        Self {
            frequencies,
            impedances,
            table: Grid::new(n, n),
        }
    }

    #[inline]
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    #[inline]
    pub fn port_count(&self) -> usize {
        self.impedances.len()
    }

    #[inline]
    pub fn impedance(&self, port: usize) -> Option<f64> {
        self.impedances.get(port).copied()
    }

    /// Fills column `j` from the run in which port `j` was excited.
    pub fn add_excitation(&mut self, raw: &RawResult) -> Result<()> {
        let j = raw.excited_port;
        let n = self.port_count();
        if raw.port_count() != n || j >= n {
            return Err(EmsError::corrupted(
                format!("port_{j}"),
                format!(
                    "result covers {} ports with port {j} excited, expected {n} ports",
                    raw.port_count()
                ),
            ));
        }

        let port_waves: Vec<PortWaves> = (0..n)
            .map(|i| {
                let v = dft(&raw.time, &raw.voltage[i], &self.frequencies);
                let c = dft(&raw.current_time, &raw.current[i], &self.frequencies);
                waves(&v, &c, self.impedances[i])
            })
            .collect();

        let incident = &port_waves[j].a;
        for (i, w) in port_waves.iter().enumerate() {
            let column = w.b.iter().zip(incident).map(|(b, a)| b / a).collect();
            if let Some(entry) = self.table.get_mut(i, j) {
                *entry = Some(column);
            }
        }
        Ok(())
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&[Complex64]> {
        self.table.get(i, j)?.as_deref()
    }

    pub fn is_excited(&self, j: usize) -> bool {
        j < self.port_count() && (0..self.port_count()).all(|i| self.get(i, j).is_some())
    }

    pub fn excited(&self) -> Vec<usize> {
        (0..self.port_count()).filter(|&j| self.is_excited(j)).collect()
    }

    /// Whether every column of the matrix is known.
    pub fn is_complete(&self) -> bool {
        self.excited().len() == self.port_count()
    }
}

/// Removes 2π jumps between consecutive phase samples.
pub fn unwrap_phase(phase: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phase.len());
    let mut offset = 0.0;
    for (k, &p) in phase.iter().enumerate() {
        if k > 0 {
            let delta = p - phase[k - 1];
            if delta > PI {
                offset -= 2.0 * PI;
            } else if delta < -PI {
                offset += 2.0 * PI;
            }
        }
        out.push(p + offset);
    }
    out
}

/// Group delay `−d∠S/dω`, in seconds. The last value is repeated so the
/// output has one entry per frequency.
pub fn group_delay(frequencies: &[f64], s: &[Complex64]) -> Vec<f64> {
    let phase = unwrap_phase(&s.iter().map(|s| s.arg()).collect::<Vec<_>>());
    let mut delay: Vec<f64> = phase
        .windows(2)
        .zip(frequencies.windows(2))
        .map(|(p, f)| -(p[1] - p[0]) / (2.0 * PI * (f[1] - f[0])))
        .collect();
    if let Some(&last) = delay.last() {
        delay.push(last);
    } else if !s.is_empty() {
        delay.push(0.0);
    }
    delay
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::results::{assemble, ProbeSeries};
    use crate::tests::matched_line;

    #[test]
    fn test_waves() {
        let z0 = 50.0;
        let v = [Complex64::new(1.0, 0.0)];
        let i = [Complex64::new(1.0 / z0, 0.0)];
        let w = waves(&v, &i, z0);
        assert_abs_diff_eq!(w.a[0].re, 1.0 / z0.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(w.b[0].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_matched_line() {
        let freqs: Vec<f64> = (1..=10).map(|k| k as f64 * 1e8).collect();
        let mut s = SParameters::new(freqs.clone(), vec![50.0, 50.0]);
        s.add_excitation(&matched_line(0, 2, 50.0, 200)).unwrap();
        assert_eq!(s.excited(), vec![0]);
        assert!(!s.is_complete());
        assert!(s.get(0, 1).is_none());

        let s11 = s.get(0, 0).unwrap();
        let s21 = s.get(1, 0).unwrap();
        for k in 0..freqs.len() {
            assert!(s11[k].norm() < 1e-6, "S11 = {}", s11[k]);
            assert_abs_diff_eq!(s21[k].norm(), 1.0, epsilon = 1e-6);
        }

        s.add_excitation(&matched_line(1, 2, 50.0, 200)).unwrap();
        assert!(s.is_complete());
    }

    #[test]
    fn test_current_on_half_step_axis_is_matched() {
        let raw = matched_line(0, 2, 50.0, 200);
        assert!(raw.current_time[0] > raw.time[0]);
        let channels = (0..2)
            .map(|p| {
                let v = ProbeSeries {
                    time: raw.time.clone(),
                    values: raw.voltage[p].clone(),
                };
                let i = ProbeSeries {
                    time: raw.current_time.clone(),
                    values: raw.current[p].clone(),
                };
                (v, i)
            })
            .collect();
        let assembled = assemble("sim", 0, channels).unwrap();

        let freqs: Vec<f64> = (1..=10).map(|k| k as f64 * 1e8).collect();
        let mut s = SParameters::new(freqs, vec![50.0, 50.0]);
        s.add_excitation(&assembled).unwrap();
        for v in s.get(0, 0).unwrap() {
            assert!(v.norm() < 1e-6, "S11 = {v}");
        }
    }

    #[test]
    fn test_reflection_is_passive() {
        let freqs: Vec<f64> = (1..=20).map(|k| k as f64 * 5e7).collect();
        let mut s = SParameters::new(freqs, vec![50.0, 50.0]);
        s.add_excitation(&matched_line(0, 2, 50.0, 120)).unwrap();
        for v in s.get(0, 0).unwrap() {
            assert!(v.norm() <= 1.0);
        }
    }

    #[test]
    fn test_port_count_mismatch() {
        let mut s = SParameters::new(vec![1e9], vec![50.0, 50.0, 50.0]);
        assert!(s.add_excitation(&matched_line(0, 2, 50.0, 10)).is_err());
    }

    #[test]
    fn test_group_delay_of_matched_line() {
        // 200 samples of 1 ps each
        let freqs: Vec<f64> = (1..=10).map(|k| k as f64 * 1e8).collect();
        let mut s = SParameters::new(freqs.clone(), vec![50.0, 50.0]);
        s.add_excitation(&matched_line(0, 2, 50.0, 200)).unwrap();
        let delay = group_delay(&freqs, s.get(1, 0).unwrap());
        assert_eq!(delay.len(), freqs.len());
        for d in delay {
            assert_abs_diff_eq!(d, 200e-12, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_unwrap_phase() {
        let wrapped = [3.0, -3.0, 2.9];
        let unwrapped = unwrap_phase(&wrapped);
        assert_abs_diff_eq!(unwrapped[1], -3.0 + 2.0 * PI);
        assert_abs_diff_eq!(unwrapped[2], 2.9);
    }
}
