use std::path::PathBuf;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, EmsError>;

#[derive(Debug, ThisError)]
pub enum EmsError {
    #[error("invalid configuration field `{field}`: {message}")]
    ConfigValidation { field: String, message: String },

    #[error("unsupported rotation {rotation} (expected one of 0, 90, 180, 270)")]
    UnsupportedRotation { rotation: f64 },

    #[error("port {port} references {role} copper layer {index}, but only {available} copper layers exist")]
    PortLayerReference {
        port: usize,
        role: &'static str,
        index: usize,
        available: usize,
    },

    #[error("port {port} has no placement (not found in the place file and no position override)")]
    PortPlacement { port: usize },

    #[error("solver crashed while exciting port {port} (attempt {attempt}): {detail}")]
    TransientSolverFailure {
        port: usize,
        attempt: usize,
        detail: String,
    },

    #[error("solver failed for port {port} after {attempts} attempts")]
    SolverExhausted { port: usize, attempts: usize },

    #[error("solver failed for port {port}: {detail}")]
    SolverFailed { port: usize, detail: String },

    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    #[error("corrupted result in {path:?}: {detail}")]
    CorruptedResult { path: PathBuf, detail: String },

    #[error("malformed {kind} file {path:?} at line {line}: {detail}")]
    ImportFormat {
        kind: &'static str,
        path: PathBuf,
        line: usize,
        detail: String,
    },

    #[error("missing artifact {path:?}; run the {stage} stage first")]
    MissingArtifact { path: PathBuf, stage: &'static str },

    #[error("geometry was built from a different configuration; rerun the geometry stage")]
    StaleGeometry,

    #[error("differential pair `{pair}` needs port {port} to be excited")]
    MissingExcitation { pair: String, port: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

impl EmsError {
    pub(crate) fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn corrupted(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::CorruptedResult {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Whether the failure should go through the solver retry path.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientSolverFailure { .. })
    }
}
