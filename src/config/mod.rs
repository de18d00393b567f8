//! Simulation configuration.
//!
//! [`parse_config`] reads a JSON or TOML document and validates it into an
//! immutable [`SimConfig`]. Nothing downstream mutates the configuration;
//! every stage receives it by reference.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{EmsError, Result};
use crate::paths::stable_digest;
use crate::units::mm_to_um;
use crate::FORMAT_VERSION;

pub mod layer;
pub mod port;

pub use layer::{LayerDoc, LayerKind, StackupLayer};
pub use port::{DifferentialPair, Placement, PortConfig, PortDoc, Side, TraceConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencySweep {
    /// Start frequency in hertz.
    pub start: f64,
    /// Stop frequency in hertz.
    pub stop: f64,
    /// Number of points in the post-processing sweep.
    pub points: usize,
}

impl Default for FrequencySweep {
    fn default() -> Self {
        Self {
            start: 500e3,
            stop: 10e6,
            points: 1001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViaConfig {
    /// Plating thickness in micrometres.
    pub plating_thickness: f64,
    pub filling_epsilon: f64,
}

impl Default for ViaConfig {
    fn default() -> Self {
        Self {
            plating_thickness: 50.0,
            filling_epsilon: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XyZ {
    pub xy: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshDoc {
    pub xy: f64,
    pub inter_layers: usize,
    pub smoothing_ratio: f64,
    pub margin: MeshMargin,
}

/// Largest mesh step outside the board, in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshMargin {
    pub xy: f64,
    pub z: f64,
}

impl Default for MeshMargin {
    fn default() -> Self {
        Self { xy: 0.2, z: 0.2 }
    }
}

impl Default for MeshDoc {
    fn default() -> Self {
        Self {
            xy: 0.05,
            inter_layers: 5,
            smoothing_ratio: 2.0,
            margin: MeshMargin::default(),
        }
    }
}

impl Default for XyZ {
    fn default() -> Self {
        Self { xy: 3.0, z: 3.0 }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

/// An external command with `{placeholder}` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub solver: CommandTemplate,
    pub rasterizer: Option<CommandTemplate>,
    pub mesher: Option<CommandTemplate>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            solver: CommandTemplate {
                program: "openEMS".to_string(),
                args: vec!["{input}".to_string(), "--numThreads={threads}".to_string()],
            },
            rasterizer: Some(CommandTemplate {
                program: "gerbv".to_string(),
                args: [
                    "{gerber}",
                    "{edge}",
                    "--background=#000000",
                    "--foreground=#ffffffff",
                    "--foreground=#0000ff",
                    "-o",
                    "{output}",
                    "--dpi={dpi}",
                    "--export=png",
                    "-a",
                ]
                .into_iter()
                .map(String::from)
                .collect(),
            }),
            mesher: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum solver invocations per excitation.
    pub max_attempts: usize,
    /// Energy decay at which the solver stops, in dB below the peak.
    pub end_criteria_db: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            end_criteria_db: -50.0,
        }
    }
}

/// The configuration document as written on disk, in millimetres.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDoc {
    pub format_version: Option<String>,
    pub frequency: FrequencySweep,
    pub max_steps: Option<u64>,
    pub via: ViaConfig,
    pub mesh: MeshDoc,
    pub margin: XyZ,
    pub offset: Offset,
    pub ports: Vec<PortDoc>,
    pub differential_pairs: Vec<DifferentialPair>,
    pub traces: Vec<TraceConfig>,
    pub layers: Vec<LayerDoc>,
    pub tools: ToolsConfig,
    pub simulation: SolverConfig,
}

/// Mesh parameters in micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Uniform pitch over the board area.
    pub xy: f64,
    pub inter_layers: usize,
    pub smoothing_ratio: f64,
    /// Largest mesh step allowed outside the board area.
    pub max_res_xy: f64,
    pub max_res_z: f64,
    pub margin_xy: f64,
    pub margin_z: f64,
}

/// A validated simulation configuration. Lengths are in micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub frequency: FrequencySweep,
    pub max_steps: u64,
    pub via: ViaConfig,
    pub mesh: MeshConfig,
    /// Place-file to simulation translation, in millimetres.
    pub offset: Offset,
    pub ports: Vec<PortConfig>,
    pub differential_pairs: Vec<DifferentialPair>,
    pub traces: Vec<TraceConfig>,
    pub layers: Vec<StackupLayer>,
    pub tools: ToolsConfig,
    pub simulation: SolverConfig,
}

pub fn parse_config(path: impl AsRef<Path>) -> Result<SimConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let doc: ConfigDoc = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)?,
        _ => toml::from_str(&contents)?,
    };
    SimConfig::from_doc(doc)
}

fn check_format_version(version: Option<&str>) -> Result<()> {
    let Some(version) = version else {
        warn!(
            "configuration has no format_version, assuming {}.{}",
            FORMAT_VERSION.0, FORMAT_VERSION.1
        );
        return Ok(());
    };
    let parsed = version
        .split_once('.')
        .and_then(|(major, minor)| Some((major.parse::<u32>().ok()?, minor.parse::<u32>().ok()?)));
    match parsed {
        Some((major, minor)) if major == FORMAT_VERSION.0 && minor <= FORMAT_VERSION.1 => Ok(()),
        _ => Err(EmsError::config(
            "format_version",
            format!(
                "unsupported version `{version}` (supported: {}.{})",
                FORMAT_VERSION.0, FORMAT_VERSION.1
            ),
        )),
    }
}

fn non_negative(field: &str, value: f64) -> Result<f64> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(EmsError::config(field, format!("must be non-negative, got {value}")))
    }
}

fn strictly_positive(field: &str, value: f64) -> Result<f64> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(EmsError::config(field, format!("must be positive, got {value}")))
    }
}

impl SimConfig {
    pub fn from_doc(doc: ConfigDoc) -> Result<Self> {
        check_format_version(doc.format_version.as_deref())?;

        let frequency = doc.frequency;
        non_negative("frequency.start", frequency.start)?;
        if frequency.stop <= frequency.start || !frequency.stop.is_finite() {
            return Err(EmsError::config(
                "frequency",
                format!(
                    "stop frequency ({}) must exceed start frequency ({})",
                    frequency.stop, frequency.start
                ),
            ));
        }
        if frequency.points < 2 {
            return Err(EmsError::config("frequency.points", "at least 2 points are required"));
        }

        let max_steps = doc
            .max_steps
            .ok_or_else(|| EmsError::config("max_steps", "missing value"))?;

        non_negative("via.plating_thickness", doc.via.plating_thickness)?;
        strictly_positive("via.filling_epsilon", doc.via.filling_epsilon)?;

        let mesh = MeshConfig {
            xy: mm_to_um(strictly_positive("mesh.xy", doc.mesh.xy)?),
            inter_layers: doc.mesh.inter_layers,
            smoothing_ratio: {
                let ratio = doc.mesh.smoothing_ratio;
                if ratio <= 1.0 || !ratio.is_finite() {
                    return Err(EmsError::config(
                        "mesh.smoothing_ratio",
                        format!("must be greater than 1, got {ratio}"),
                    ));
                }
                ratio
            },
            max_res_xy: mm_to_um(strictly_positive("mesh.margin.xy", doc.mesh.margin.xy)?),
            max_res_z: mm_to_um(strictly_positive("mesh.margin.z", doc.mesh.margin.z)?),
            margin_xy: mm_to_um(non_negative("margin.xy", doc.margin.xy)?),
            margin_z: mm_to_um(non_negative("margin.z", doc.margin.z)?),
        };

        let layers = layer::validate_layers(&doc.layers)?;
        let ports = port::validate_ports(&doc.ports)?;
        let mut differential_pairs = doc.differential_pairs;
        port::validate_pairs(&mut differential_pairs, ports.len())?;
        let mut traces = doc.traces;
        port::validate_traces(&mut traces, ports.len())?;

        if doc.simulation.max_attempts == 0 {
            return Err(EmsError::config("simulation.max_attempts", "must be at least 1"));
        }

        Ok(Self {
            frequency,
            max_steps,
            via: doc.via,
            mesh,
            offset: doc.offset,
            ports,
            differential_pairs,
            traces,
            layers,
            tools: doc.tools,
            simulation: doc.simulation,
        })
    }

    /// Copper layers in stackup order.
    pub fn copper_layers(&self) -> impl Iterator<Item = &StackupLayer> {
        self.layers.iter().filter(|l| l.is_copper())
    }

    /// Indices of ports that get their own solver run.
    pub fn excited_ports(&self) -> Vec<usize> {
        self.ports
            .iter()
            .filter(|p| p.excite)
            .map(|p| p.index)
            .collect()
    }

    /// Fingerprint of the validated configuration, recorded in derived artifacts.
    pub fn digest(&self) -> u64 {
        stable_digest(&serde_json::to_vec(self).unwrap_or_default())
    }
}
