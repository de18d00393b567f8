use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use derive_builder::Builder;
use log::{info, warn};

use crate::config::SimConfig;
use crate::error::{EmsError, Result};
use crate::geometry::GeometryModel;
use crate::paths::{out_raw_result, out_solver_dir};
use crate::results::load_result;
use crate::sim::{Solver, SolverInvocation};

/// Shared flag that stops the orchestrator before its next solver attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EmsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(derive(Debug))]
pub struct OrchestratorOpts {
    /// Solver attempts per excitation, including the first.
    #[builder(default = "3")]
    pub max_attempts: usize,
    /// Excitations simulated concurrently.
    #[builder(default = "1")]
    pub jobs: usize,
    /// Reuse raw results left by an earlier run.
    #[builder(default = "true")]
    pub resume: bool,
    #[builder(default)]
    pub cancel: CancelToken,
}

impl OrchestratorOpts {
    #[inline]
    pub fn builder() -> OrchestratorOptsBuilder {
        OrchestratorOptsBuilder::default()
    }
}

impl Default for OrchestratorOpts {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            jobs: 1,
            resume: true,
            cancel: CancelToken::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcitationReport {
    pub port: usize,
    /// Solver attempts made. Zero when an existing artifact was reused.
    pub attempts: usize,
    pub artifact: PathBuf,
    pub resumed: bool,
}

/// Runs one solver invocation per excited port.
pub struct SimulationOrchestrator<'a, S: ?Sized> {
    solver: &'a S,
    config: &'a SimConfig,
    geometry: &'a GeometryModel,
    work_dir: PathBuf,
    opts: OrchestratorOpts,
}

impl<'a, S: Solver + ?Sized> SimulationOrchestrator<'a, S> {
    pub fn new(
        solver: &'a S,
        config: &'a SimConfig,
        geometry: &'a GeometryModel,
        work_dir: impl AsRef<Path>,
        opts: OrchestratorOpts,
    ) -> Self {
        Self {
            solver,
            config,
            geometry,
            work_dir: work_dir.as_ref().to_path_buf(),
            opts,
        }
    }

    /// Simulates every port in `ports`. Results are returned in the same
    /// order; a failed excitation does not stop the others.
    pub fn run(&self, ports: &[usize]) -> Vec<Result<ExcitationReport>> {
        let jobs = self.opts.jobs.clamp(1, ports.len().max(1));
        if jobs == 1 {
            return ports.iter().map(|&p| self.run_excitation(p)).collect();
        }

        info!("simulating {} excitations on {jobs} workers", ports.len());
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<Result<ExcitationReport>>>> =
            Mutex::new((0..ports.len()).map(|_| None).collect());

        std::thread::scope(|scope| {
            for _ in 0..jobs {
                scope.spawn(|| loop {
                    let k = next.fetch_add(1, Ordering::SeqCst);
                    let Some(&port) = ports.get(k) else {
                        break;
                    };
                    let res = self.run_excitation(port);
                    if let Ok(mut slots) = slots.lock() {
                        slots[k] = Some(res);
                    }
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(EmsError::Cancelled)))
            .collect()
    }

    /// Runs a single excitation, retrying crashes up to the attempt limit.
    pub fn run_excitation(&self, port: usize) -> Result<ExcitationReport> {
        let artifact = out_raw_result(&self.work_dir, port);
        let digest = self.geometry.digest();

        if self.opts.resume && artifact.exists() {
            match load_result(&artifact, port) {
                Ok(raw) if raw.geometry_digest != Some(digest) => {
                    warn!("port {port}: previous result was simulated from another geometry");
                }
                Ok(_) => {
                    info!("port {port}: reusing {:?}", artifact);
                    return Ok(ExcitationReport {
                        port,
                        attempts: 0,
                        artifact,
                        resumed: true,
                    });
                }
                Err(e) => warn!("port {port}: discarding previous result: {e}"),
            }
        }

        for attempt in 1..=self.opts.max_attempts {
            self.opts.cancel.check()?;

            let inv = SolverInvocation {
                port,
                attempt,
                geometry: self.geometry,
                config: self.config,
                run_dir: out_solver_dir(&self.work_dir, port),
            };
            match self.solver.solve(&inv) {
                Ok(mut raw) => {
                    raw.geometry_digest = Some(digest);
                    raw.write_atomic(&artifact)?;
                    info!("port {port}: finished after {attempt} attempt(s)");
                    return Ok(ExcitationReport {
                        port,
                        attempts: attempt,
                        artifact,
                        resumed: false,
                    });
                }
                Err(e) if e.is_transient() => {
                    warn!("{e}");
                }
                Err(e) => return Err(e),
            }
        }

        Err(EmsError::SolverExhausted {
            port,
            attempts: self.opts.max_attempts,
        })
    }
}
