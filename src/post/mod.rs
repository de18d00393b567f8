//! Frequency-domain post-processing of the raw solver output.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::config::SimConfig;
use crate::error::Result;
use crate::paths::{
    out_diffpair_csv, out_port_csv, out_raw_result, out_touchstone, out_trace_csv, write_atomic,
};
use crate::results::load_result;

pub mod dft;
pub mod export;
pub mod impedance;
pub mod sparam;

use dft::frequency_grid;
use impedance::{differential, port_impedance};
use sparam::SParameters;

/// What a post-processing run produced and what it had to skip.
#[derive(Debug, Clone, Default)]
pub struct PostprocessReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<String>,
}

/// Renders an output in memory and moves it into place in one step.
fn write_output<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut buf = Vec::new();
    write(&mut buf)?;
    write_atomic(path, &buf)
}

/// Loads every excitation's raw result and writes the derived outputs.
///
/// A missing or corrupted result only removes the outputs that depend on it.
pub fn postprocess(config: &SimConfig, work_dir: impl AsRef<Path>) -> Result<PostprocessReport> {
    let work_dir = work_dir.as_ref();
    let mut report = PostprocessReport::default();

    let freqs = frequency_grid(&config.frequency);
    let impedances = config.ports.iter().map(|p| p.impedance).collect();
    let mut s = SParameters::new(freqs, impedances);

    for port in config.excited_ports() {
        let path = out_raw_result(work_dir, port);
        let loaded = load_result(&path, port).and_then(|raw| s.add_excitation(&raw));
        if let Err(e) = loaded {
            error!("skipping excitation of port {port}: {e}");
            report.failures.push(format!("port {port}: {e}"));
        }
    }

    for j in s.excited() {
        let Some(z) = port_impedance(&s, j) else {
            continue;
        };
        let path = out_port_csv(work_dir, j);
        write_output(&path, |w| export::write_port_csv(w, &s, &z))?;
        report.written.push(path);
    }

    for (k, pair) in config.differential_pairs.iter().enumerate() {
        match differential(&s, pair) {
            Ok(mm) => {
                let path = out_diffpair_csv(work_dir, k, &pair.name);
                write_output(&path, |w| export::write_diffpair_csv(w, s.frequencies(), &mm))?;
                report.written.push(path);
            }
            Err(e) => {
                warn!("skipping differential pair `{}`: {e}", pair.name);
                report.failures.push(format!("pair {}: {e}", pair.name));
            }
        }
    }

    for trace in &config.traces {
        match s.get(trace.stop, trace.start) {
            Some(s21) => {
                let path = out_trace_csv(work_dir, &trace.name);
                write_output(&path, |w| export::write_trace_csv(w, s.frequencies(), s21))?;
                report.written.push(path);
            }
            None => {
                warn!(
                    "skipping trace `{}`: port {} was not excited",
                    trace.name, trace.start
                );
                report
                    .failures
                    .push(format!("trace {}: port {} not excited", trace.name, trace.start));
            }
        }
    }

    if s.is_complete() {
        let path = out_touchstone(work_dir, s.port_count());
        write_output(&path, |w| export::write_touchstone(w, &s))?;
        report.written.push(path);
    } else {
        info!(
            "S-matrix has {} of {} columns; not writing a touchstone file",
            s.excited().len(),
            s.port_count()
        );
    }

    info!("wrote {} result files", report.written.len());
    Ok(report)
}
