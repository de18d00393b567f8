use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, bail};
use log::{error, info, warn};

use crate::cli::progress::StepContext;
use crate::config::SimConfig;
use crate::error::EmsError;
use crate::geometry::{build_geometry, GeometryModel};
use crate::import::load_inputs;
use crate::paths::{out_csx, out_geometry};
use crate::post::postprocess;
use crate::sim::openems::save_csx;
use crate::sim::{OrchestratorOpts, SimulationOrchestrator, Solver};
use crate::tools::convert::convert;
use crate::tools::ProcessRunner;
use crate::Result;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    LoadConfig,
    Convert,
    BuildGeometry,
    Simulate,
    Postprocess,
}

impl TaskKey {
    /// Stages run when none is selected explicitly.
    pub fn defaults() -> HashSet<TaskKey> {
        HashSet::from([TaskKey::BuildGeometry, TaskKey::Simulate, TaskKey::Postprocess])
    }

    pub fn all() -> HashSet<TaskKey> {
        HashSet::from([
            TaskKey::Convert,
            TaskKey::BuildGeometry,
            TaskKey::Simulate,
            TaskKey::Postprocess,
        ])
    }
}

pub struct ExecutePlanParams<'a> {
    pub config: &'a SimConfig,
    /// Directory holding the Gerber, drill and place files.
    pub input_dir: &'a Path,
    pub work_dir: &'a Path,
    pub tasks: &'a HashSet<TaskKey>,
    pub export_field: bool,
    /// Runs the rasterizer and mesher.
    pub runner: &'a dyn ProcessRunner,
    pub solver: &'a dyn Solver,
    pub opts: OrchestratorOpts,
    pub ctx: Option<&'a mut StepContext>,
}

macro_rules! try_finish_task {
    ( $ctx:expr, $task:expr ) => {
        if let Some(ctx) = $ctx.as_mut() {
            ctx.finish($task);
        }
    };
}

macro_rules! try_execute_task {
    ( $tasks:expr, $task:expr, $body:expr, $ctx:expr) => {
        if $tasks.contains(&$task) {
            $body;
            try_finish_task!($ctx, $task);
        }
    };
}

/// Loads the persisted geometry and checks that it matches `config`.
pub fn load_geometry(config: &SimConfig, work_dir: &Path) -> Result<GeometryModel> {
    let path = out_geometry(work_dir);
    if !path.exists() {
        return Err(EmsError::MissingArtifact {
            path,
            stage: "geometry",
        }
        .into());
    }
    let geometry = GeometryModel::load(&path)?;
    if !geometry.is_current(config) {
        return Err(EmsError::StaleGeometry.into());
    }
    Ok(geometry)
}

pub fn execute_plan(params: ExecutePlanParams) -> Result<()> {
    let ExecutePlanParams {
        config,
        input_dir,
        work_dir,
        tasks,
        export_field,
        runner,
        solver,
        opts,
        mut ctx,
    } = params;

    std::fs::create_dir_all(work_dir)?;

    try_execute_task!(
        tasks,
        TaskKey::Convert,
        {
            let report = convert(config, input_dir, work_dir, runner)?;
            info!(
                "converted {} layers ({} trace meshes)",
                report.rasters.len(),
                report.meshes.len()
            );
        },
        ctx
    );

    try_execute_task!(
        tasks,
        TaskKey::BuildGeometry,
        {
            let inputs = load_inputs(config, input_dir, work_dir)?;
            let model = build_geometry(config, &inputs, export_field)?;
            for caveat in &model.caveats {
                warn!("{caveat}");
            }
            model.save(out_geometry(work_dir))?;
            save_csx(out_csx(work_dir), &model, config, None)?;
            info!(
                "geometry: {} ports, {} vias, {} mesh cells",
                model.ports.len(),
                model.vias.len(),
                model.mesh.cell_count()
            );
        },
        ctx
    );

    try_execute_task!(
        tasks,
        TaskKey::Simulate,
        {
            // always the persisted model, so result digests match across runs
            let geometry = load_geometry(config, work_dir)?;
            let ports = config.excited_ports();
            if ports.is_empty() {
                bail!("no port is marked for excitation");
            }
            let orchestrator =
                SimulationOrchestrator::new(solver, config, &geometry, work_dir, opts);
            let failures: Vec<String> = orchestrator
                .run(&ports)
                .into_iter()
                .filter_map(|res| res.err())
                .map(|e| {
                    error!("{e}");
                    e.to_string()
                })
                .collect();
            if !failures.is_empty() {
                return Err(anyhow!(
                    "{} of {} excitations failed:\n  {}",
                    failures.len(),
                    ports.len(),
                    failures.join("\n  ")
                ));
            }
        },
        ctx
    );

    try_execute_task!(
        tasks,
        TaskKey::Postprocess,
        {
            let report = postprocess(config, work_dir)?;
            for failure in &report.failures {
                warn!("not exported: {failure}");
            }
            if report.written.is_empty() {
                bail!("no results could be computed; run the simulate stage first");
            }
        },
        ctx
    );

    Ok(())
}
