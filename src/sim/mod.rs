//! Per-port solver runs.

use std::path::PathBuf;

use crate::config::SimConfig;
use crate::error::Result;
use crate::geometry::GeometryModel;
use crate::results::RawResult;

pub mod openems;
pub mod orchestrator;

pub use openems::OpenEms;
pub use orchestrator::{
    CancelToken, ExcitationReport, OrchestratorOpts, OrchestratorOptsBuilder,
    SimulationOrchestrator,
};

/// One attempt at simulating a single excitation.
#[derive(Debug, Clone)]
pub struct SolverInvocation<'a> {
    /// The excited port; every other port is passive.
    pub port: usize,
    /// Attempt number, starting at 1.
    pub attempt: usize,
    pub geometry: &'a GeometryModel,
    pub config: &'a SimConfig,
    /// Scratch directory owned by this excitation.
    pub run_dir: PathBuf,
}

/// A field solver.
///
/// A crash must surface as [`EmsError::TransientSolverFailure`] so that it is
/// retried; any other error ends the excitation.
///
/// [`EmsError::TransientSolverFailure`]: crate::error::EmsError::TransientSolverFailure
pub trait Solver: Send + Sync {
    fn solve(&self, inv: &SolverInvocation) -> Result<RawResult>;
}
