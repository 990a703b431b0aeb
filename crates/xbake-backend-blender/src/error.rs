//! Blender backend errors.

use std::path::PathBuf;

use thiserror::Error;
use xbake_engine::HostError;
use xbake_spec::BackendError;

pub type BlenderResult<T> = Result<T, BlenderError>;

/// Errors that can occur while driving a Blender session.
#[derive(Debug, Error)]
pub enum BlenderError {
    #[error("no Blender executable found; install Blender, add it to PATH, set BLENDER_PATH or pass --blender")]
    BlenderNotFound,

    #[error("could not start Blender: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// No response within the request timeout.
    #[error("Blender did not respond to '{op}' within {timeout_secs} seconds")]
    Timeout { op: String, timeout_secs: u64 },

    /// Blender exited while a request was outstanding.
    #[error("Blender exited with code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    /// The session was already closed.
    #[error("Blender session is closed")]
    SessionClosed,

    /// Bridge script override does not exist.
    #[error("Python bridge script not found at: {path}")]
    BridgeNotFound { path: PathBuf },

    /// Failed to encode a request.
    #[error("Failed to encode request: {0}")]
    EncodeRequest(#[source] serde_json::Error),

    /// Failed to parse a bridge response.
    #[error("Failed to parse bridge response: {0}")]
    ParseResponse(#[source] serde_json::Error),

    /// The bridge rejected a request.
    #[error("{op} failed: {message}")]
    Bridge {
        op: String,
        kind: Option<String>,
        message: String,
    },

    /// A mesh file could not be imported.
    #[error("Failed to import mesh from {path}: {message}")]
    ImportFailed { path: PathBuf, message: String },

    /// IO error during file or pipe operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlenderError {
    pub fn process_failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::ProcessFailed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Creates a bridge error.
    pub fn bridge(op: impl Into<String>, kind: Option<String>, message: impl Into<String>) -> Self {
        Self::Bridge {
            op: op.into(),
            kind,
            message: message.into(),
        }
    }
}

impl BackendError for BlenderError {
    fn code(&self) -> &'static str {
        match self {
            BlenderError::BlenderNotFound => "BLENDER_001",
            BlenderError::SpawnFailed(_) => "BLENDER_002",
            BlenderError::Timeout { .. } => "BLENDER_003",
            BlenderError::ProcessFailed { .. } => "BLENDER_004",
            BlenderError::SessionClosed => "BLENDER_005",
            BlenderError::BridgeNotFound { .. } => "BLENDER_006",
            BlenderError::EncodeRequest(_) => "BLENDER_007",
            BlenderError::ParseResponse(_) => "BLENDER_008",
            BlenderError::Bridge { .. } => "BLENDER_009",
            BlenderError::ImportFailed { .. } => "BLENDER_010",
            BlenderError::Io(_) => "BLENDER_011",
        }
    }

    fn category(&self) -> &'static str {
        "blender"
    }
}

impl From<BlenderError> for HostError {
    fn from(err: BlenderError) -> Self {
        match err {
            BlenderError::Bridge { kind, message, op } => match kind.as_deref() {
                Some("object_not_found") => HostError::ObjectNotFound(message),
                Some("material_not_found") => HostError::MaterialNotFound(message),
                Some("image_not_found") => HostError::ImageNotFound(message),
                _ => HostError::operation(op, message),
            },
            other => HostError::Backend {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BlenderError::BlenderNotFound;
        assert!(err.to_string().contains("BLENDER_PATH"));

        let err = BlenderError::Timeout {
            op: "bake".to_string(),
            timeout_secs: 300,
        };
        assert_eq!(err.to_string(), "Blender did not respond to 'bake' within 300 seconds");

        let err = BlenderError::process_failed(1, "segfault");
        assert!(err.to_string().contains("segfault"));
    }

    #[test]
    fn test_bridge_errors_map_to_host_errors() {
        let err: HostError =
            BlenderError::bridge("find", Some("object_not_found".into()), "Rock").into();
        assert!(matches!(err, HostError::ObjectNotFound(ref name) if name == "Rock"));

        let err: HostError = BlenderError::bridge("select", None, "context is wrong").into();
        assert_eq!(err.to_string(), "select failed: context is wrong");
    }

    #[test]
    fn test_process_errors_keep_code() {
        let err: HostError = BlenderError::SessionClosed.into();
        match err {
            HostError::Backend { code, .. } => assert_eq!(code, "BLENDER_005"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
