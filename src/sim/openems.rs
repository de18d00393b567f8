//! openEMS adapter: renders the geometry to an openEMS XML description, runs
//! the solver and collects its probe files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;
use tera::Context;

use crate::config::SimConfig;
use crate::error::{EmsError, Result};
use crate::geometry::port::PortBox;
use crate::geometry::GeometryModel;
use crate::paths::write_atomic;
use crate::results::{assemble, read_probe, RawResult};
use crate::sim::{Solver, SolverInvocation};
use crate::tools::{CommandSpec, ProcessOutcome, ProcessRunner};
use crate::units::UNIT;
use crate::TEMPLATES;

pub const TEMPLATE: &str = "openems.xml.tera";

/// File name of the per-excitation solver input.
pub const INPUT_FILE: &str = "sim.xml";

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
struct Point {
    x: f64,
    y: f64,
    z: f64,
}

impl From<[f64; 3]> for Point {
    fn from(p: [f64; 3]) -> Self {
        Self {
            x: p[0],
            y: p[1],
            z: p[2],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
struct Vertex {
    x: f64,
    y: f64,
}

impl From<[f64; 2]> for Vertex {
    fn from(p: [f64; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

#[derive(Debug, Clone, Serialize)]
struct DielectricParams {
    name: String,
    epsilon: f64,
    priority: i64,
    start: Point,
    stop: Point,
}

#[derive(Debug, Clone, Serialize)]
struct CopperParams {
    name: String,
    volumetric: bool,
    elevation: f64,
    length: f64,
    polygons: Vec<Vec<Vertex>>,
}

#[derive(Debug, Clone, Serialize)]
struct ViaParams {
    elevation: f64,
    length: f64,
    plating: Vec<Vertex>,
    filling: Option<Vec<Vertex>>,
}

#[derive(Debug, Clone, Serialize)]
struct PortParams {
    index: usize,
    strip_start: Point,
    strip_stop: Point,
    feed_start: Point,
    feed_stop: Point,
    resistance: f64,
    excite: bool,
    excite_sign: i32,
    v_start: Point,
    v_stop: Point,
    i_start: Point,
    i_stop: Point,
    i_weight: i32,
    axis: usize,
}

impl PortParams {
    fn new(port: &PortBox, excited: bool) -> Self {
        let z_layer = port.start[2];
        let z_plane = port.stop[2];
        let [cx, cy] = port.feed_center();
        let axis = port.direction.index();

        // Current is integrated over a cross-section that encloses the strip.
        let dz = ((z_plane - z_layer) / 2.0).abs();
        let [f0, f1] = port.feed;
        let i_start = [f0[0], f0[1], z_layer - dz];
        let i_stop = [f1[0], f1[1], z_layer + dz];

        let sign = |d: f64| if d < 0.0 { -1 } else { 1 };
        Self {
            index: port.index,
            strip_start: port.start.into(),
            strip_stop: [port.stop[0], port.stop[1], z_layer].into(),
            feed_start: f0.into(),
            feed_stop: f1.into(),
            resistance: port.impedance,
            excite: excited,
            excite_sign: sign(z_plane - z_layer),
            v_start: [cx, cy, z_layer].into(),
            v_stop: [cx, cy, z_plane].into(),
            i_start: i_start.into(),
            i_stop: i_stop.into(),
            i_weight: sign(port.stop[axis] - port.start[axis]),
            axis,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct DumpParams {
    name: String,
    start: Point,
    stop: Point,
}

#[derive(Debug, Clone, Serialize)]
struct CsxParams {
    max_steps: u64,
    end_criteria: f64,
    f0: f64,
    fc: f64,
    f_max: f64,
    delta_unit: String,
    dielectrics: Vec<DielectricParams>,
    copper: Vec<CopperParams>,
    vias: Vec<ViaParams>,
    via_filling_epsilon: f64,
    ports: Vec<PortParams>,
    dumps: Vec<DumpParams>,
    x_lines: String,
    y_lines: String,
    z_lines: String,
}

fn join_lines(lines: &[f64]) -> String {
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders the solver input. `excited` selects the port that is driven; with
/// `None` every port is passive.
pub fn render_csx(
    geometry: &GeometryModel,
    config: &SimConfig,
    excited: Option<usize>,
) -> Result<String> {
    let board = geometry.board;
    let dielectrics = geometry
        .stackup
        .dielectrics()
        .enumerate()
        .map(|(i, l)| DielectricParams {
            name: l.name.to_string(),
            epsilon: l.epsilon.unwrap_or(1.0),
            priority: -(i as i64),
            start: [0.0, 0.0, l.z_top].into(),
            stop: [board.width, board.height, l.z_bottom].into(),
        })
        .collect();

    let copper = geometry
        .copper
        .iter()
        .map(|c| CopperParams {
            name: c.layer.to_string(),
            volumetric: !c.is_sheet(),
            elevation: if c.is_sheet() { c.z } else { c.z_bottom },
            length: c.z_top - c.z_bottom,
            polygons: c
                .triangles
                .iter()
                .map(|t| t.iter().copied().map(Vertex::from).collect())
                .collect(),
        })
        .collect();

    let vias = geometry
        .vias
        .iter()
        .map(|v| ViaParams {
            elevation: v.z_bottom,
            length: v.z_top - v.z_bottom,
            plating: v.outline(v.radius).into_iter().map(Vertex::from).collect(),
            filling: (v.inner_radius > 0.0)
                .then(|| v.outline(v.inner_radius).into_iter().map(Vertex::from).collect()),
        })
        .collect();

    let ports = geometry
        .ports
        .iter()
        .map(|p| PortParams::new(p, Some(p.index) == excited))
        .collect();

    let dumps = geometry
        .dumps
        .iter()
        .map(|d| DumpParams {
            name: d.name.clone(),
            start: d.start.into(),
            stop: d.stop.into(),
        })
        .collect();

    let f = &config.frequency;
    let params = CsxParams {
        max_steps: config.max_steps,
        end_criteria: 10f64.powf(config.simulation.end_criteria_db / 10.0),
        f0: (f.start + f.stop) / 2.0,
        fc: (f.stop - f.start) / 2.0,
        f_max: f.stop,
        delta_unit: UNIT.to_string(),
        dielectrics,
        copper,
        vias,
        via_filling_epsilon: config.via.filling_epsilon,
        ports,
        dumps,
        x_lines: join_lines(&geometry.mesh.x),
        y_lines: join_lines(&geometry.mesh.y),
        z_lines: join_lines(&geometry.mesh.z),
    };

    Ok(TEMPLATES.render(TEMPLATE, &Context::from_serialize(params)?)?)
}

pub fn save_csx(
    path: impl AsRef<Path>,
    geometry: &GeometryModel,
    config: &SimConfig,
    excited: Option<usize>,
) -> Result<()> {
    let xml = render_csx(geometry, config, excited)?;
    write_atomic(path, xml.as_bytes())
}

/// Runs openEMS through a [`ProcessRunner`].
pub struct OpenEms<R> {
    runner: R,
    threads: Option<usize>,
}

impl<R: ProcessRunner> OpenEms<R> {
    pub fn new(runner: R, threads: Option<usize>) -> Self {
        Self { runner, threads }
    }

    fn command(&self, config: &SimConfig, run_dir: &Path) -> CommandSpec {
        let threads = self.threads.map(|t| t.to_string()).unwrap_or_default();
        let vars = HashMap::from([
            ("input", INPUT_FILE.to_string()),
            ("threads", threads),
            ("dir", run_dir.display().to_string()),
        ]);
        let mut cmd = config.tools.solver.instantiate(&vars);
        if self.threads.is_none() {
            cmd.args.retain(|a| !a.starts_with("--numThreads="));
        }
        cmd.cwd(run_dir)
            .logs(run_dir.join("solver.out"), run_dir.join("solver.err"))
    }
}

impl<R: ProcessRunner> Solver for OpenEms<R> {
    fn solve(&self, inv: &SolverInvocation) -> Result<RawResult> {
        let run_dir = inv.run_dir.as_path();
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        fs::create_dir_all(run_dir)?;
        save_csx(
            run_dir.join(INPUT_FILE),
            inv.geometry,
            inv.config,
            Some(inv.port),
        )?;

        let cmd = self.command(inv.config, run_dir);
        info!(
            "exciting port {} (attempt {}): {}",
            inv.port,
            inv.attempt,
            cmd.command_line()
        );
        match self.runner.run(&cmd)? {
            ProcessOutcome::Success => {}
            ProcessOutcome::Crashed { signal } => {
                return Err(EmsError::TransientSolverFailure {
                    port: inv.port,
                    attempt: inv.attempt,
                    detail: match signal {
                        Some(s) => format!("terminated by signal {s}"),
                        None => "terminated abnormally".to_string(),
                    },
                })
            }
            ProcessOutcome::Failed { code } => {
                return Err(EmsError::SolverFailed {
                    port: inv.port,
                    detail: format!("exited with status {code}"),
                })
            }
        }

        let probes = inv
            .geometry
            .ports
            .iter()
            .map(|p| {
                let v = read_probe(run_dir.join(format!("port_ut_{}", p.index)))?;
                let i = read_probe(run_dir.join(format!("port_it_{}", p.index)))?;
                Ok((v, i))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("collected {} probe pairs from {:?}", probes.len(), run_dir);
        assemble(run_dir, inv.port, probes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::tests::{sample_geometry, write_matched_probes};

    #[test]
    fn test_render_csx() {
        let (config, geometry) = sample_geometry();
        let xml = render_csx(&geometry, &config, Some(0)).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<Excitation Name=\"port_excite_0\""));
        assert!(!xml.contains("port_excite_1"));
        assert!(xml.contains("port_ut_1"));
        assert!(xml.contains("port_it_1"));
        assert!(xml.contains("<LinPoly Priority=\"100\""));
        assert!(xml.contains("<Material Name=\"core\">"));
        assert!(xml.contains("DeltaUnit=\"0.000001\""));

        let passive = render_csx(&geometry, &config, None).unwrap();
        assert!(!passive.contains("<Excitation Name"));
    }

    struct FakeOpenEms {
        outcome: ProcessOutcome,
        commands: Mutex<Vec<CommandSpec>>,
    }

    impl ProcessRunner for FakeOpenEms {
        fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutcome> {
            if let Ok(mut commands) = self.commands.lock() {
                commands.push(cmd.clone());
            }
            if self.outcome == ProcessOutcome::Success {
                if let Some(dir) = &cmd.cwd {
                    write_matched_probes(dir, 0, 2);
                }
            }
            Ok(self.outcome)
        }
    }

    fn solve(outcome: ProcessOutcome) -> (Result<RawResult>, Vec<CommandSpec>) {
        let dir = tempfile::tempdir().unwrap();
        let (config, geometry) = sample_geometry();
        let solver = OpenEms::new(
            FakeOpenEms {
                outcome,
                commands: Mutex::new(Vec::new()),
            },
            Some(4),
        );
        let inv = SolverInvocation {
            port: 0,
            attempt: 1,
            geometry: &geometry,
            config: &config,
            run_dir: dir.path().join("simulation/port_0"),
        };
        let res = solver.solve(&inv);
        assert!(dir.path().join("simulation/port_0/sim.xml").exists());
        let commands = solver.runner.commands.lock().unwrap().clone();
        (res, commands)
    }

    #[test]
    fn test_solve_collects_probes() {
        let (res, commands) = solve(ProcessOutcome::Success);
        let raw = res.unwrap();
        assert_eq!(raw.excited_port, 0);
        assert_eq!(raw.port_count(), 2);
        assert_eq!(raw.current_time[0], crate::tests::DT / 2.0);
        assert_eq!(commands[0].args, vec!["sim.xml", "--numThreads=4"]);
    }

    #[test]
    fn test_save_csx_replaces_in_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let (config, geometry) = sample_geometry();
        let path = dir.path().join("geometry/geometry.xml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "<old/>").unwrap();

        save_csx(&path, &geometry, &config, None).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("<?xml"));
        assert!(!dir.path().join("geometry/geometry.xml.partial").exists());
    }

    #[test]
    fn test_crash_is_transient() {
        let (res, _) = solve(ProcessOutcome::Crashed { signal: Some(11) });
        let err = res.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_failure_is_not_transient() {
        let (res, _) = solve(ProcessOutcome::Failed { code: 2 });
        assert!(matches!(res, Err(EmsError::SolverFailed { port: 0, .. })));
    }
}
