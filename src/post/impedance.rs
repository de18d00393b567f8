//! Port and differential impedance from S-parameters.

use approx::relative_eq;
use log::warn;
use num_complex::Complex64;

use crate::config::DifferentialPair;
use crate::error::{EmsError, Result};
use crate::post::sparam::SParameters;

/// `Z = Z0·(1 + Γ) / (1 − Γ)`.
#[inline]
pub fn impedance_from_reflection(gamma: Complex64, z0: f64) -> Complex64 {
    (gamma + 1.0) / (Complex64::new(1.0, 0.0) - gamma) * z0
}

/// Smith chart coordinates of a reflection coefficient.
#[inline]
pub fn smith_point(gamma: Complex64) -> (f64, f64) {
    (gamma.re, gamma.im)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortImpedance {
    pub port: usize,
    pub z: Vec<Complex64>,
    pub smith: Vec<(f64, f64)>,
}

/// Input impedance seen at `port`. `None` if the port was not excited.
pub fn port_impedance(s: &SParameters, port: usize) -> Option<PortImpedance> {
    let z0 = s.impedance(port)?;
    let sii = s.get(port, port)?;
    Some(PortImpedance {
        port,
        z: sii.iter().map(|g| impedance_from_reflection(*g, z0)).collect(),
        smith: sii.iter().map(|g| smith_point(*g)).collect(),
    })
}

/// Mixed-mode parameters of one differential pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedMode {
    pub name: String,
    pub sdd11: Vec<Complex64>,
    pub sdd21: Vec<Complex64>,
    pub scc11: Vec<Complex64>,
    pub zdiff: Vec<Complex64>,
    pub zcomm: Vec<Complex64>,
}

fn entry<'a>(
    s: &'a SParameters,
    pair: &DifferentialPair,
    i: usize,
    j: usize,
) -> Result<&'a [Complex64]> {
    s.get(i, j).ok_or_else(|| EmsError::MissingExcitation {
        pair: pair.name.clone(),
        port: j,
    })
}

pub fn differential(s: &SParameters, pair: &DifferentialPair) -> Result<MixedMode> {
    for port in [pair.start_p, pair.start_n] {
        if !s.is_excited(port) {
            return Err(EmsError::MissingExcitation {
                pair: pair.name.clone(),
                port,
            });
        }
    }

    let [p, big_p, n, big_n] = pair.ports();
    let z = pair.ports().map(|i| s.impedance(i).unwrap_or(f64::NAN));
    if !z
        .iter()
        .all(|zi| relative_eq!(*zi, z[0], max_relative = 1e-9))
    {
        warn!(
            "differential pair `{}` mixes reference impedances {:?}; its impedance uses {} ohms",
            pair.name, z, z[0]
        );
    }
    let z0 = z[0];

    let entry = |i: usize, j: usize| entry(s, pair, i, j);
    let combine = |a: &[Complex64], b: &[Complex64], c: &[Complex64], d: &[Complex64], sign: f64| {
        (0..a.len())
            .map(|k| (a[k] + (b[k] + c[k]) * sign + d[k]) * 0.5)
            .collect::<Vec<_>>()
    };

    let (s_pp, s_np, s_pn, s_nn) = (entry(p, p)?, entry(n, p)?, entry(p, n)?, entry(n, n)?);
    let sdd11 = combine(s_pp, s_np, s_pn, s_nn, -1.0);
    let scc11 = combine(s_pp, s_np, s_pn, s_nn, 1.0);

    let (s_bp_p, s_bp_n, s_bn_p, s_bn_n) = (
        entry(big_p, p)?,
        entry(big_p, n)?,
        entry(big_n, p)?,
        entry(big_n, n)?,
    );
    let sdd21 = combine(s_bp_p, s_bp_n, s_bn_p, s_bn_n, -1.0);

    let zdiff = sdd11
        .iter()
        .map(|g| impedance_from_reflection(*g, 2.0 * z0))
        .collect();
    let zcomm = scc11
        .iter()
        .map(|g| impedance_from_reflection(*g, z0 / 2.0))
        .collect();

    Ok(MixedMode {
        name: pair.name.clone(),
        sdd11,
        sdd21,
        scc11,
        zdiff,
        zcomm,
    })
}
