//! The derived simulation geometry.
//!
//! A [`GeometryModel`] is always rebuilt in full from the configuration and
//! the imported board artifacts, then persisted as JSON so that later stages
//! can run without the inputs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use arcstr::ArcStr;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{Placement, SimConfig};
use crate::error::Result;
use crate::import::drill::DrillHit;
use crate::import::raster::TraceMesh;
use crate::mesh::{MeshLines, MeshPlanner};
use crate::paths::{stable_digest, write_atomic};

pub mod coords;
pub mod port;
pub mod stackup;
pub mod via;

use port::{generate_ports, PortBox};
use stackup::Stackup;
use via::ViaBarrel;

/// Board extents in micrometres. The board occupies `[0, width] × [0, height]`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub width: f64,
    pub height: f64,
}

/// Copper on one layer, as triangles in board coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopperShape {
    pub layer: ArcStr,
    pub copper_index: usize,
    pub z: f64,
    pub z_top: f64,
    pub z_bottom: f64,
    pub triangles: Vec<[[f64; 2]; 3]>,
}

impl CopperShape {
    pub fn is_sheet(&self) -> bool {
        self.z_top == self.z_bottom
    }
}

/// A plane over the whole board on which the electric field is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpPlane {
    pub name: String,
    pub start: [f64; 3],
    pub stop: [f64; 3],
}

#[derive(Debug, Clone, Default)]
pub struct GeometryInputs {
    pub board: Option<Board>,
    pub placements: HashMap<usize, Placement>,
    pub drill_hits: Vec<DrillHit>,
    pub traces: Vec<TraceMesh>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryModel {
    /// Digest of the configuration this model was built from.
    pub config_digest: u64,
    pub board: Board,
    pub stackup: Stackup,
    pub ports: Vec<PortBox>,
    pub vias: Vec<ViaBarrel>,
    pub copper: Vec<CopperShape>,
    pub dumps: Vec<DumpPlane>,
    pub mesh: MeshLines,
    pub caveats: Vec<String>,
}

impl GeometryModel {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &contents)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Fingerprint of the whole model, stamped into every solver result
    /// simulated from it.
    pub fn digest(&self) -> u64 {
        stable_digest(&serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn is_current(&self, config: &SimConfig) -> bool {
        self.config_digest == config.digest()
    }
}

/// Bounding box of everything that is placed on the board, used when no
/// raster is available to size the board.
fn fallback_board(ports: &[PortBox], vias: &[ViaBarrel]) -> Board {
    let mut board = Board {
        width: 0.0,
        height: 0.0,
    };
    for port in ports {
        let max = port.max();
        board.width = board.width.max(max[0]);
        board.height = board.height.max(max[1]);
    }
    for via in vias {
        let (xs, ys) = via.boundaries();
        board.width = board.width.max(xs[1]);
        board.height = board.height.max(ys[1]);
    }
    board
}

pub fn build_geometry(
    config: &SimConfig,
    inputs: &GeometryInputs,
    export_field: bool,
) -> Result<GeometryModel> {
    let stackup = Stackup::build(&config.layers);
    debug!(
        "stackup spans z = {} to {} over {} layers",
        stackup.top(),
        stackup.bottom(),
        stackup.layers.len()
    );

    let port_geometry = generate_ports(&config.ports, &inputs.placements, &stackup, config.offset)?;

    let z_span = (stackup.top(), stackup.bottom());
    let vias: Vec<_> = inputs
        .drill_hits
        .iter()
        .map(|hit| ViaBarrel::from_hit(hit, &config.via, config.offset, z_span))
        .collect();

    let board = match inputs.board {
        Some(board) => board,
        None => {
            let board = fallback_board(&port_geometry.ports, &vias);
            warn!(
                "no board raster available; sizing the board from ports and vias ({} x {} um)",
                board.width, board.height
            );
            board
        }
    };

    let mut copper = Vec::new();
    for trace in &inputs.traces {
        let layer = stackup.copper_layers().find(|l| {
            l.file.as_deref() == Some(trace.layer.as_str()) || l.name.as_str() == trace.layer
        });
        match layer {
            Some(layer) => copper.push(CopperShape {
                layer: layer.name.clone(),
                copper_index: layer.copper_index.unwrap_or_default(),
                z: layer.z,
                z_top: layer.z_top,
                z_bottom: layer.z_bottom,
                triangles: trace.triangles.clone(),
            }),
            None => warn!(
                "trace mesh for `{}` does not match any copper layer; ignoring it",
                trace.layer
            ),
        }
    }

    let dumps = stackup
        .dielectrics()
        .filter(|l| export_field || l.export_field)
        .map(|l| DumpPlane {
            name: format!("e_field_{}", l.name),
            start: [0.0, 0.0, l.z],
            stop: [board.width, board.height, l.z],
        })
        .collect();

    let mesh = MeshPlanner {
        config: &config.mesh,
        board,
        stackup: &stackup,
        ports: &port_geometry.ports,
        vias: &vias,
        traces: &inputs.traces,
        export_field,
    }
    .plan();

    info!(
        "geometry: {} ports, {} vias, mesh {} x {} x {} ({} cells)",
        port_geometry.ports.len(),
        vias.len(),
        mesh.x.len(),
        mesh.y.len(),
        mesh.z.len(),
        mesh.cell_count()
    );

    Ok(GeometryModel {
        config_digest: config.digest(),
        board,
        stackup,
        ports: port_geometry.ports,
        vias,
        copper,
        dumps,
        mesh,
        caveats: port_geometry.caveats,
    })
}
