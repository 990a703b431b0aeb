//! Error types for bake orchestration.

use thiserror::Error;
use xbake_spec::{BackendError, MapType, ValidationError};

use crate::session::BakePass;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A failed scene operation.
#[derive(Debug, Error)]
pub enum HostError {
    /// A referenced object does not exist.
    #[error("object '{0}' not found")]
    ObjectNotFound(String),

    /// A referenced material does not exist.
    #[error("material '{0}' not found")]
    MaterialNotFound(String),

    /// A referenced image does not exist.
    #[error("image '{0}' not found")]
    ImageNotFound(String),

    /// The host rejected an operation.
    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// The host backend failed (process, protocol, I/O).
    #[error("[{code}] {message}")]
    Backend { code: &'static str, message: String },

    /// Local I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Creates an operation failure.
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// The renderer failed to execute a bake pass.
#[derive(Debug, Clone, Error)]
#[error("{pass} bake failed: {message}")]
pub struct RenderError {
    pub pass: BakePass,
    pub message: String,
}

impl RenderError {
    /// Creates a render error.
    pub fn new(pass: BakePass, message: impl Into<String>) -> Self {
        Self {
            pass,
            message: message.into(),
        }
    }
}

/// Errors reported by a bake run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration validation failed; nothing was touched.
    #[error("invalid configuration: {}", join(.0))]
    InvalidConfiguration(Vec<ValidationError>),

    /// A configured object does not exist in the scene.
    #[error("{role} object '{name}' not found in scene")]
    ObjectNotFound { role: &'static str, name: String },

    /// No active object after selection.
    #[error("no active object after selecting bake objects")]
    MissingActiveObject,

    /// The renderer failed a pass.
    #[error(transparent)]
    RenderFailed(#[from] RenderError),

    /// A scene operation failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A job failed; the remaining queue was abandoned.
    #[error("{map_type} bake (job {} of {total}) failed: {source}{}", .index + 1, teardown_suffix(.teardown))]
    JobFailed {
        map_type: MapType,
        index: usize,
        total: usize,
        #[source]
        source: Box<EngineError>,
        /// Restore steps that also failed while unwinding.
        teardown: Vec<HostError>,
    },

    /// Every job succeeded but restoring the scene afterwards did not.
    #[error("scene restore failed: {}", join(.0))]
    RestoreFailed(Vec<HostError>),
}

impl EngineError {
    /// Returns the error that stopped the run, unwrapping [`EngineError::JobFailed`].
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::JobFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn teardown_suffix(teardown: &[HostError]) -> String {
    if teardown.is_empty() {
        String::new()
    } else {
        format!(" (restore also failed: {})", join(teardown))
    }
}

impl BackendError for EngineError {
    fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidConfiguration(_) => "ENGINE_001",
            EngineError::ObjectNotFound { .. } => "ENGINE_002",
            EngineError::MissingActiveObject => "ENGINE_003",
            EngineError::RenderFailed(_) => "ENGINE_004",
            EngineError::Host(_) => "ENGINE_005",
            EngineError::JobFailed { .. } => "ENGINE_006",
            EngineError::RestoreFailed(_) => "ENGINE_007",
        }
    }

    fn category(&self) -> &'static str {
        "engine"
    }
}
