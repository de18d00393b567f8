//! openEMS time-domain probe files.
//!
//! Lines starting with `%` are comments; every other line holds a time and a
//! probe value separated by whitespace.

use std::fs;
use std::path::Path;

use approx::relative_eq;

use crate::error::{EmsError, Result};
use crate::results::RawResult;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeSeries {
    pub time: Vec<f64>,
    pub values: Vec<f64>,
}

pub fn parse_probe(path: impl AsRef<Path>, contents: &str) -> Result<ProbeSeries> {
    let path = path.as_ref();
    let mut series = ProbeSeries::default();
    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        let mut split = line.split_whitespace();
        let mut next = || -> Result<f64> {
            let value = split
                .next()
                .ok_or_else(|| EmsError::corrupted(path, format!("line {}: missing column", i + 1)))?
                .parse::<f64>()
                .map_err(|_| EmsError::corrupted(path, format!("line {}: unparsable value", i + 1)))?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(EmsError::corrupted(path, format!("line {}: non-finite value", i + 1)))
            }
        };
        let (t, v) = (next()?, next()?);
        series.time.push(t);
        series.values.push(v);
    }
    if series.time.is_empty() {
        return Err(EmsError::corrupted(path, "probe holds no samples"));
    }
    Ok(series)
}

pub fn read_probe(path: impl AsRef<Path>) -> Result<ProbeSeries> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EmsError::corrupted(path, "solver did not write this probe"));
    }
    parse_probe(path, &fs::read_to_string(path)?)
}

fn axis_increases(time: &[f64]) -> bool {
    time.windows(2).all(|w| w[1] > w[0])
}

/// Merges the voltage and current probes of every port, in port order, into
/// one raw result.
///
/// Voltage and current probes keep separate time axes, since openEMS samples
/// currents half a step after voltages. Probes of one kind must agree with
/// each other and every probe must hold the same number of samples.
pub fn assemble(
    path: impl AsRef<Path>,
    excited_port: usize,
    probes: Vec<(ProbeSeries, ProbeSeries)>,
) -> Result<RawResult> {
    let path = path.as_ref();
    let (time, current_time) = match probes.first() {
        Some((v, i)) => (v.time.clone(), i.time.clone()),
        None => return Err(EmsError::corrupted(path, "no probes to merge")),
    };
    for (kind, axis) in [("voltage", &time), ("current", &current_time)] {
        if !axis_increases(axis) {
            return Err(EmsError::corrupted(
                path,
                format!("{kind} probe time axis does not increase"),
            ));
        }
    }

    let mut voltage = Vec::with_capacity(probes.len());
    let mut current = Vec::with_capacity(probes.len());
    for (port, (v, i)) in probes.into_iter().enumerate() {
        for (kind, series, axis) in [("voltage", &v, &time), ("current", &i, &current_time)] {
            if series.time.len() != time.len() || series.values.len() != time.len() {
                return Err(EmsError::corrupted(
                    path,
                    format!(
                        "port {port} {kind} probe has {} samples, expected {}",
                        series.time.len(),
                        time.len()
                    ),
                ));
            }
            let aligned = series
                .time
                .iter()
                .zip(axis)
                .all(|(a, b)| relative_eq!(*a, *b, epsilon = 1e-18, max_relative = 1e-9));
            if !aligned {
                return Err(EmsError::corrupted(
                    path,
                    format!("port {port} {kind} probe disagrees with the port 0 {kind} axis"),
                ));
            }
        }
        voltage.push(v.values);
        current.push(i.values);
    }

    Ok(RawResult {
        excited_port,
        time,
        current_time,
        voltage,
        current,
        geometry_digest: None,
    })
}
