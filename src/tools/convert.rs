//! The convert stage: Gerber layers to rasters, rasters to trace meshes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{CommandTemplate, SimConfig};
use crate::error::{EmsError, Result};
use crate::paths::{out_raster, out_trace_mesh};
use crate::tools::{ProcessOutcome, ProcessRunner};
use crate::units::PIXEL_SIZE;

const MICRONS_PER_INCH: f64 = 25_400.0;

/// Rasterization resolution matching [`PIXEL_SIZE`].
pub fn raster_dpi() -> f64 {
    MICRONS_PER_INCH / PIXEL_SIZE
}

/// Finds the first file in `dir` whose name ends with `suffix`.
fn find_file(dir: &Path, suffix: &str) -> Result<Option<PathBuf>> {
    let mut files: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(suffix))
        })
        .collect();
    files.sort();
    Ok(files.into_iter().next())
}

fn run_tool(
    runner: &dyn ProcessRunner,
    tool: &str,
    template: &CommandTemplate,
    vars: &HashMap<&str, String>,
) -> Result<()> {
    let cmd = template.instantiate(vars);
    match runner.run(&cmd)? {
        ProcessOutcome::Success => Ok(()),
        outcome => Err(EmsError::ToolFailed {
            tool: tool.to_string(),
            detail: format!("`{}` ended with {outcome:?}", cmd.command_line()),
        }),
    }
}

/// Summary of a convert run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertReport {
    pub rasters: Vec<PathBuf>,
    pub meshes: Vec<PathBuf>,
}

/// Rasterizes the Gerber file of every copper layer that names one and, when
/// a mesher is configured, meshes each raster.
pub fn convert(
    config: &SimConfig,
    input_dir: impl AsRef<Path>,
    work_dir: impl AsRef<Path>,
    runner: &dyn ProcessRunner,
) -> Result<ConvertReport> {
    let input_dir = input_dir.as_ref();
    let work_dir = work_dir.as_ref();
    let mut report = ConvertReport::default();

    let Some(rasterizer) = &config.tools.rasterizer else {
        warn!("no rasterizer configured; skipping Gerber conversion");
        return Ok(report);
    };

    let edge = find_file(input_dir, "Edge_Cuts.gbr")?.ok_or_else(|| EmsError::MissingArtifact {
        path: input_dir.join("*-Edge_Cuts.gbr"),
        stage: "board export",
    })?;

    for layer in config.copper_layers() {
        let Some(stem) = layer.file.as_deref() else {
            continue;
        };
        let gerber = find_file(input_dir, &format!("{stem}.gbr"))?.ok_or_else(|| {
            EmsError::MissingArtifact {
                path: input_dir.join(format!("*-{stem}.gbr")),
                stage: "board export",
            }
        })?;

        let raster = out_raster(work_dir, stem);
        if let Some(parent) = raster.parent() {
            fs::create_dir_all(parent)?;
        }
        info!("rasterizing {:?}", gerber);
        let vars = HashMap::from([
            ("gerber", gerber.display().to_string()),
            ("edge", edge.display().to_string()),
            ("output", raster.display().to_string()),
            ("dpi", format!("{}", raster_dpi())),
        ]);
        run_tool(runner, "rasterizer", rasterizer, &vars)?;
        report.rasters.push(raster.clone());

        if let Some(mesher) = &config.tools.mesher {
            let mesh = out_trace_mesh(work_dir, stem);
            if let Some(parent) = mesh.parent() {
                fs::create_dir_all(parent)?;
            }
            info!("meshing {:?}", raster);
            let vars = HashMap::from([
                ("input", raster.display().to_string()),
                ("output", mesh.display().to_string()),
                ("layer", stem.to_string()),
                ("pixel_size", format!("{PIXEL_SIZE}")),
            ]);
            run_tool(runner, "mesher", mesher, &vars)?;
            report.meshes.push(mesh);
        }
    }

    Ok(report)
}
