//! CSV and Touchstone writers for the post-processed results.

use std::io::Write;

use log::warn;
use num_complex::Complex64;

use crate::error::Result;
use crate::post::impedance::{MixedMode, PortImpedance};
use crate::post::sparam::{group_delay, SParameters};

fn write_complex<W: Write>(w: &mut W, z: Complex64) -> Result<()> {
    write!(w, ",{},{}", z.re, z.im)?;
    Ok(())
}

/// One row per frequency with every `S_ij`, its group delay and the input
/// impedance of the excited port `j`.
pub fn write_port_csv<W: Write>(w: &mut W, s: &SParameters, z: &PortImpedance) -> Result<()> {
    let j = z.port;
    let n = s.port_count();
    let freqs = s.frequencies();

    let columns: Vec<(&[Complex64], Vec<f64>)> = (0..n)
        .filter_map(|i| s.get(i, j))
        .map(|sij| (sij, group_delay(freqs, sij)))
        .collect();

    write!(w, "frequency_hz")?;
    for i in 0..columns.len() {
        write!(w, ",s{i}_{j}_re,s{i}_{j}_im,delay{i}_{j}_s")?;
    }
    writeln!(w, ",z{j}_re,z{j}_im,smith_re,smith_im")?;

    for (k, f) in freqs.iter().enumerate() {
        write!(w, "{f}")?;
        for (sij, delay) in &columns {
            write_complex(w, sij[k])?;
            write!(w, ",{}", delay[k])?;
        }
        write_complex(w, z.z[k])?;
        let (x, y) = z.smith[k];
        writeln!(w, ",{x},{y}")?;
    }
    Ok(())
}

pub fn write_diffpair_csv<W: Write>(w: &mut W, freqs: &[f64], mm: &MixedMode) -> Result<()> {
    writeln!(
        w,
        "frequency_hz,sdd11_re,sdd11_im,sdd21_re,sdd21_im,scc11_re,scc11_im,zdiff_re,zdiff_im,zcomm_re,zcomm_im"
    )?;
    for (k, f) in freqs.iter().enumerate() {
        write!(w, "{f}")?;
        for column in [&mm.sdd11, &mm.sdd21, &mm.scc11, &mm.zdiff, &mm.zcomm] {
            write_complex(w, column[k])?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Transmission and delay from `start` to `stop` along a trace.
pub fn write_trace_csv<W: Write>(w: &mut W, freqs: &[f64], s21: &[Complex64]) -> Result<()> {
    let delay = group_delay(freqs, s21);
    writeln!(w, "frequency_hz,s21_re,s21_im,s21_db,delay_s")?;
    for (k, f) in freqs.iter().enumerate() {
        write!(w, "{f}")?;
        write_complex(w, s21[k])?;
        writeln!(w, ",{},{}", 20.0 * s21[k].norm().log10(), delay[k])?;
    }
    Ok(())
}

/// Touchstone 1.0, real/imaginary pairs, frequencies in hertz.
///
/// Two-port files use the `S11 S21 S12 S22` order the format prescribes;
/// larger matrices are written row by row, each row starting on a new line
/// and wrapping after four entries.
pub fn write_touchstone<W: Write>(w: &mut W, s: &SParameters) -> Result<()> {
    let n = s.port_count();
    let z0 = s.impedance(0).unwrap_or(50.0);
    if (0..n).any(|i| s.impedance(i) != Some(z0)) {
        warn!("ports use different reference impedances; the touchstone file declares {z0} ohms");
    }

    writeln!(w, "! S-parameters for {n} ports")?;
    writeln!(w, "# HZ S RI R {z0}")?;

    let entry = |i: usize, j: usize, k: usize| {
        s.get(i, j)
            .map(|sij| sij[k])
            .unwrap_or(Complex64::new(f64::NAN, f64::NAN))
    };

    for (k, f) in s.frequencies().iter().enumerate() {
        write!(w, "{f}")?;
        if n == 2 {
            for (i, j) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let v = entry(i, j, k);
                write!(w, " {} {}", v.re, v.im)?;
            }
            writeln!(w)?;
            continue;
        }
        // every matrix row starts on a new line
        for i in 0..n {
            for j in 0..n {
                if j > 0 && j % 4 == 0 {
                    writeln!(w)?;
                }
                let v = entry(i, j, k);
                write!(w, " {} {}", v.re, v.im)?;
            }
            writeln!(w)?;
        }
    }
    Ok(())
}
