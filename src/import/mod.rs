//! Readers for the board artifacts the geometry is built from.

use std::path::Path;

use log::{info, warn};

use crate::config::SimConfig;
use crate::error::Result;
use crate::geometry::GeometryInputs;
use crate::paths::{out_raster, out_trace_mesh};

pub mod drill;
pub mod place;
pub mod raster;

/// Collects placements and drill hits from `input_dir`, and the board size
/// and trace meshes produced by the convert stage in `work_dir`.
pub fn load_inputs(
    config: &SimConfig,
    input_dir: impl AsRef<Path>,
    work_dir: impl AsRef<Path>,
) -> Result<GeometryInputs> {
    let input_dir = input_dir.as_ref();
    let work_dir = work_dir.as_ref();

    let placements = place::read_placements(input_dir)?;
    info!("read {} port placements from {:?}", placements.len(), input_dir);
    let drill_hits = drill::read_drill(input_dir)?;

    let stems: Vec<&str> = config
        .copper_layers()
        .filter_map(|l| l.file.as_deref())
        .collect();

    let board = match stems.first() {
        Some(stem) => {
            let path = out_raster(work_dir, stem);
            if path.exists() {
                Some(raster::read_board(&path)?)
            } else {
                warn!("raster {:?} not found; run the convert stage to size the board", path);
                None
            }
        }
        None => None,
    };

    let mut traces = Vec::new();
    for stem in stems {
        let path = out_trace_mesh(work_dir, stem);
        if path.exists() {
            traces.push(raster::read_trace_mesh(&path, stem)?);
        } else {
            warn!("trace mesh {:?} not found; layer `{stem}` will have no copper", path);
        }
    }

    Ok(GeometryInputs {
        board,
        placements,
        drill_hits,
        traces,
    })
}
