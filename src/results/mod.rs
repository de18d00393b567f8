//! Raw per-excitation solver output.
//!
//! One artifact is stored per excited port. It starts with `#` header lines
//! declaring the excited port, the port count, the sample count and the
//! digest of the geometry that was simulated, followed by one row per time
//! step: `t t_i v0 i0 v1 i1 ...`. Currents are sampled on their own time axis
//! `t_i`, which for openEMS lies half a step after the voltage axis.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::error::{EmsError, Result};
use crate::paths::write_atomic;

pub mod probe;

pub use probe::{assemble, parse_probe, read_probe, ProbeSeries};

#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub excited_port: usize,
    /// Voltage sample times.
    pub time: Vec<f64>,
    /// Current sample times.
    pub current_time: Vec<f64>,
    /// Indexed by port, then by sample.
    pub voltage: Vec<Vec<f64>>,
    pub current: Vec<Vec<f64>>,
    /// Digest of the geometry this result was simulated from, if recorded.
    pub geometry_digest: Option<u64>,
}

impl RawResult {
    #[inline]
    pub fn port_count(&self) -> usize {
        self.voltage.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// `(t, v, i)` of one port at sample `k`. The current belongs to
    /// `current_time[k]`.
    pub fn sample(&self, port: usize, k: usize) -> Option<(f64, f64, f64)> {
        Some((
            *self.time.get(k)?,
            *self.voltage.get(port)?.get(k)?,
            *self.current.get(port)?.get(k)?,
        ))
    }

    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        let ports = self.port_count();
        writeln!(w, "# excited port: {}", self.excited_port)?;
        writeln!(w, "# ports: {ports}")?;
        writeln!(w, "# samples: {}", self.len())?;
        if let Some(digest) = self.geometry_digest {
            writeln!(w, "# geometry digest: {digest}")?;
        }
        write!(w, "# t t_i")?;
        for p in 0..ports {
            write!(w, " v{p} i{p}")?;
        }
        writeln!(w)?;
        for (k, (t, ti)) in self.time.iter().zip(&self.current_time).enumerate() {
            write!(w, "{t:e} {ti:e}")?;
            for p in 0..ports {
                write!(w, " {:e} {:e}", self.voltage[p][k], self.current[p][k])?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    /// Writes the artifact through a staging file so that a reader never
    /// sees a partial result.
    pub fn write_atomic(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut buf = Vec::new();
        self.save(&mut buf)?;
        write_atomic(path, &buf)
    }
}

fn header_value<T: std::str::FromStr>(path: &Path, line: &str, key: &str) -> Result<Option<T>> {
    let Some(rest) = line.strip_prefix(key) else {
        return Ok(None);
    };
    rest.trim()
        .parse()
        .map(Some)
        .map_err(|_| EmsError::corrupted(path, format!("invalid header `{line}`")))
}

fn empty_result(excited_port: usize, ports: usize, geometry_digest: Option<u64>) -> RawResult {
    RawResult {
        excited_port,
        time: Vec::new(),
        current_time: Vec::new(),
        voltage: vec![Vec::new(); ports],
        current: vec![Vec::new(); ports],
        geometry_digest,
    }
}

/// Parses a raw result. `path` is only used in error messages.
pub fn parse_result<R: Read>(path: impl AsRef<Path>, r: R) -> Result<RawResult> {
    let path = path.as_ref();
    let reader = BufReader::new(r);

    let mut excited: Option<usize> = None;
    let mut ports: Option<usize> = None;
    let mut samples: Option<usize> = None;
    let mut digest: Option<u64> = None;
    let mut result: Option<RawResult> = None;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let header = header.trim();
            if let Some(v) = header_value(path, header, "excited port:")? {
                excited = Some(v);
            } else if let Some(v) = header_value(path, header, "ports:")? {
                ports = Some(v);
            } else if let Some(v) = header_value(path, header, "samples:")? {
                samples = Some(v);
            } else if let Some(v) = header_value(path, header, "geometry digest:")? {
                digest = Some(v);
            }
            continue;
        }

        let (Some(excited), Some(ports)) = (excited, ports) else {
            return Err(EmsError::corrupted(path, "data before the header"));
        };
        let result = result.get_or_insert_with(|| empty_result(excited, ports, digest));

        let values = line
            .split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| EmsError::corrupted(path, format!("line {}: unparsable value", i + 1)))?;
        let columns = 2 + 2 * ports;
        if values.len() != columns {
            return Err(EmsError::corrupted(
                path,
                format!(
                    "line {}: expected {columns} columns, found {}",
                    i + 1,
                    values.len()
                ),
            ));
        }
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(EmsError::corrupted(
                path,
                format!("line {}: non-finite value {v}", i + 1),
            ));
        }
        for (axis, t) in [(&mut result.time, values[0]), (&mut result.current_time, values[1])] {
            if let Some(&prev) = axis.last() {
                if t <= prev {
                    return Err(EmsError::corrupted(
                        path,
                        format!("line {}: time {t} does not increase (previous {prev})", i + 1),
                    ));
                }
            }
            axis.push(t);
        }
        for p in 0..ports {
            result.voltage[p].push(values[2 + 2 * p]);
            result.current[p].push(values[3 + 2 * p]);
        }
    }

    let (Some(excited), Some(ports), Some(samples)) = (excited, ports, samples) else {
        return Err(EmsError::corrupted(path, "incomplete header"));
    };
    let result = result.unwrap_or_else(|| empty_result(excited, ports, digest));
    if result.len() != samples {
        return Err(EmsError::corrupted(
            path,
            format!("header declares {samples} samples, found {}", result.len()),
        ));
    }
    Ok(result)
}

/// Loads the artifact for `excited_port`, checking that it belongs to that
/// port.
pub fn load_result(path: impl AsRef<Path>, excited_port: usize) -> Result<RawResult> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EmsError::MissingArtifact {
            path: path.to_path_buf(),
            stage: "simulate",
        });
    }
    let result = parse_result(path, File::open(path)?)?;
    if result.excited_port != excited_port {
        return Err(EmsError::corrupted(
            path,
            format!(
                "expected a result for port {excited_port}, found port {}",
                result.excited_port
            ),
        ));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> RawResult {
        RawResult {
            excited_port: 1,
            time: vec![0.0, 1e-12, 2e-12],
            current_time: vec![0.5e-12, 1.5e-12, 2.5e-12],
            voltage: vec![vec![0.0, 0.5, 0.25], vec![1.0, 0.1, -0.3]],
            current: vec![vec![0.0, 0.01, 0.005], vec![0.02, 0.002, -1e-9]],
            geometry_digest: Some(42),
        }
    }

    fn saved() -> String {
        let mut buf = Vec::new();
        result().save(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulation/port_1.dat");
        result().write_atomic(&path).unwrap();
        let loaded = load_result(&path, 1).unwrap();
        assert_eq!(loaded, result());
        assert_eq!(loaded.sample(1, 2), Some((2e-12, -0.3, -1e-9)));
        assert_eq!(loaded.sample(2, 0), None);
        assert_eq!(loaded.current_time[2], 2.5e-12);
        assert_eq!(loaded.geometry_digest, Some(42));
    }

    #[test]
    fn test_wrong_excitation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port_0.dat");
        result().write_atomic(&path).unwrap();
        assert!(matches!(
            load_result(&path, 0),
            Err(EmsError::CorruptedResult { .. })
        ));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_result(dir.path().join("port_0.dat"), 0),
            Err(EmsError::MissingArtifact { .. })
        ));
    }

    fn corrupted(text: &str) -> String {
        match parse_result("port.dat", text.as_bytes()) {
            Err(EmsError::CorruptedResult { detail, .. }) => detail,
            other => panic!("expected a corrupted result, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_row() {
        let mut text = saved();
        text.push_str("3e-12 3.5e-12 0.1 0.1 0.1\n");
        assert!(corrupted(&text).contains("columns"));
    }

    #[test]
    fn test_sample_count_mismatch() {
        let text = saved().replace("# samples: 3", "# samples: 4");
        assert!(corrupted(&text).contains("declares 4 samples"));
    }

    #[test]
    fn test_non_finite() {
        let text = saved().replace(" 5e-1 ", " NaN ");
        assert!(corrupted(&text).contains("non-finite"));
    }

    #[test]
    fn test_time_not_increasing() {
        let text = saved().replace("2e-12", "1e-12");
        assert!(corrupted(&text).contains("does not increase"));
    }

    #[test]
    fn test_current_axis_not_increasing() {
        let text = saved().replace("2.5e-12", "1.5e-12");
        assert!(corrupted(&text).contains("does not increase"));
    }

    #[test]
    fn test_digest_is_optional() {
        let text = saved().replace("# geometry digest: 42\n", "");
        let parsed = parse_result("port.dat", text.as_bytes()).unwrap();
        assert_eq!(parsed.geometry_digest, None);
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn test_incomplete_header() {
        let text = saved().replace("# ports: 2\n", "");
        assert!(corrupted(&text).contains("header"));
    }
}
