use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::error::{EmsError, Result};
use crate::geometry::coords::Rotation;
use crate::units::mm_to_um;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Top,
    Bottom,
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" | "front" => Ok(Side::Top),
            "bottom" | "back" => Ok(Side::Bottom),
            other => Err(format!("unknown side `{other}`")),
        }
    }
}

/// A port entry as written in the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortDoc {
    pub name: Option<String>,
    /// Trace width in millimetres.
    pub width: Option<f64>,
    /// Port length in millimetres.
    pub length: Option<f64>,
    pub impedance: Option<f64>,
    pub layer: Option<usize>,
    pub plane: Option<usize>,
    pub excite: bool,
    /// Manual placement in place-file millimetres, bypassing the place file.
    pub position: Option<[f64; 2]>,
    pub rotation: Option<f64>,
    pub side: Option<Side>,
}

/// Raw port placement, in place-file coordinates (millimetres).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub rotation: Rotation,
    pub side: Side,
}

/// A validated port. Lengths are in micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    pub index: usize,
    pub name: ArcStr,
    pub width: f64,
    pub length: f64,
    pub impedance: f64,
    /// Ordinal index into the copper layers.
    pub layer: usize,
    /// Ordinal index of the reference plane among the copper layers.
    pub plane: usize,
    pub excite: bool,
    pub placement: Option<Placement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferentialPair {
    #[serde(default)]
    pub name: String,
    pub start_p: usize,
    pub stop_p: usize,
    pub start_n: usize,
    pub stop_n: usize,
}

impl DifferentialPair {
    pub fn ports(&self) -> [usize; 4] {
        [self.start_p, self.stop_p, self.start_n, self.stop_n]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

fn positive(field: String, value: Option<f64>, default: Option<f64>) -> Result<f64> {
    match value.or(default) {
        Some(v) if v > 0.0 && v.is_finite() => Ok(v),
        Some(v) => Err(EmsError::config(field, format!("must be positive, got {v}"))),
        None => Err(EmsError::config(field, "missing value")),
    }
}

pub(crate) fn validate_ports(docs: &[PortDoc]) -> Result<Vec<PortConfig>> {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| {
            let width = positive(format!("ports[{i}].width"), doc.width, None)?;
            let length = positive(format!("ports[{i}].length"), doc.length, Some(1.0))?;
            let impedance = positive(format!("ports[{i}].impedance"), doc.impedance, Some(50.0))?;
            let layer = doc
                .layer
                .ok_or_else(|| EmsError::config(format!("ports[{i}].layer"), "missing value"))?;
            let plane = doc
                .plane
                .ok_or_else(|| EmsError::config(format!("ports[{i}].plane"), "missing value"))?;

            let rotation = doc
                .rotation
                .map(Rotation::from_degrees)
                .transpose()
                .map_err(|e| EmsError::config(format!("ports[{i}].rotation"), e.to_string()))?;

            let placement = match (doc.position, rotation) {
                (Some([x, y]), rotation) => Some(Placement {
                    x,
                    y,
                    rotation: rotation.unwrap_or(Rotation::R0),
                    side: doc.side.unwrap_or_default(),
                }),
                (None, Some(_)) => {
                    return Err(EmsError::config(
                        format!("ports[{i}].position"),
                        "a rotation override requires a position",
                    ))
                }
                (None, None) => None,
            };

            Ok(PortConfig {
                index: i,
                name: ArcStr::from(doc.name.clone().unwrap_or_else(|| format!("port{i}"))),
                width: mm_to_um(width),
                length: mm_to_um(length),
                impedance,
                layer,
                plane,
                excite: doc.excite,
                placement,
            })
        })
        .collect()
}

pub(crate) fn validate_pairs(pairs: &mut [DifferentialPair], num_ports: usize) -> Result<()> {
    for (i, pair) in pairs.iter_mut().enumerate() {
        if pair.name.is_empty() {
            pair.name = format!("pair{i}");
        }
        let ports = pair.ports();
        for (j, port) in ports.iter().enumerate() {
            if *port >= num_ports {
                return Err(EmsError::config(
                    format!("differential_pairs[{i}]"),
                    format!("port index {port} out of range ({num_ports} ports configured)"),
                ));
            }
            if ports[..j].contains(port) {
                return Err(EmsError::config(
                    format!("differential_pairs[{i}]"),
                    format!("port index {port} used more than once"),
                ));
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_traces(traces: &mut [TraceConfig], num_ports: usize) -> Result<()> {
    for (i, trace) in traces.iter_mut().enumerate() {
        if trace.name.is_empty() {
            trace.name = format!("trace{i}");
        }
        for port in [trace.start, trace.stop] {
            if port >= num_ports {
                return Err(EmsError::config(
                    format!("traces[{i}]"),
                    format!("port index {port} out of range ({num_ports} ports configured)"),
                ));
            }
        }
    }
    Ok(())
}
