//! Error types for bake configuration validation.

use thiserror::Error;

/// Error codes for configuration validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// E001: No target object configured or resolvable
    MissingTargetObject,
    /// E002: Selected-to-active mode without a source object
    MissingSourceObject,
    /// E003: No map type enabled
    NoMapTypeSelected,
    /// E004: Custom output path enabled with an empty directory
    EmptyOutputPath,
    /// E005: Numeric setting outside its documented range
    ValueOutOfRange,
    /// E006: Cage enabled without a cage object
    MissingCageObject,
}

impl ErrorCode {
    /// Stable code, `E001` onwards.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::MissingTargetObject => "E001",
            ErrorCode::MissingSourceObject => "E002",
            ErrorCode::NoMapTypeSelected => "E003",
            ErrorCode::EmptyOutputPath => "E004",
            ErrorCode::ValueOutOfRange => "E005",
            ErrorCode::MissingCageObject => "E006",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Warning codes for configuration validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// W001: Forward and up axes share a physical axis
    DegenerateAxisConfiguration,
}

impl WarningCode {
    /// Stable code, `W001` onwards.
    pub fn code(&self) -> &'static str {
        match self {
            WarningCode::DegenerateAxisConfiguration => "W001",
        }
    }
}

impl std::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A configuration problem that blocks the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
    /// Dotted field name, e.g. `output.directory`.
    pub path: Option<String>,
}

impl ValidationError {
    /// Creates an error not tied to one field.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    /// Creates an error for the field at `path`.
    pub fn with_path(code: ErrorCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

fn write_diagnostic(
    f: &mut std::fmt::Formatter<'_>,
    code: &str,
    message: &str,
    path: Option<&str>,
) -> std::fmt::Result {
    match path {
        Some(path) => write!(f, "{code}: {message} (at {path})"),
        None => write!(f, "{code}: {message}"),
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_diagnostic(f, self.code.code(), &self.message, self.path.as_deref())
    }
}

impl std::error::Error for ValidationError {}

/// A configuration oddity the run works around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: WarningCode,
    pub message: String,
    pub path: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    /// Creates a warning for the field at `path`.
    pub fn with_path(
        code: WarningCode,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_diagnostic(f, self.code.code(), &self.message, self.path.as_deref())
    }
}

/// Failure to load or accept a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bake configuration invalid: {}", join_errors(.0))]
    ValidationFailed(Vec<ValidationError>),

    /// Malformed JSON, unknown field or wrong value type.
    #[error("bake configuration is not valid: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("cannot read bake configuration: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Everything `validate()` found. Validation never stops at the first
/// problem.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// False as soon as one error is recorded.
    pub ok: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// An empty, passing result.
    pub fn success() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Records an error and marks the result failed.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
        self.ok = false;
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Returns true if an error with the given code was recorded.
    pub fn has_error(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Returns true if a warning with the given code was recorded.
    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    /// Splits into the warnings of a passing result or the errors of a
    /// failing one.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        if self.ok {
            Ok(self.warnings)
        } else {
            Err(self.errors)
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::success()
    }
}

/// Coded errors raised by the engine and the host backends.
///
/// Codes look like `ENGINE_004` or `BLENDER_003` and do not change between
/// releases, so reports and scripts can match on them.
pub trait BackendError: std::error::Error {
    fn code(&self) -> &'static str;

    /// Message shown to users; the `Display` text unless overridden.
    fn message(&self) -> String {
        self.to_string()
    }

    /// `"engine"` or `"blender"`.
    fn category(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ErrorCode::MissingTargetObject.code(), "E001");
        assert_eq!(ErrorCode::MissingSourceObject.code(), "E002");
        assert_eq!(ErrorCode::NoMapTypeSelected.code(), "E003");
        assert_eq!(ErrorCode::EmptyOutputPath.code(), "E004");
        assert_eq!(WarningCode::DegenerateAxisConfiguration.code(), "W001");
    }

    #[test]
    fn test_error_display_includes_field() {
        let err = ValidationError::with_path(
            ErrorCode::EmptyOutputPath,
            "custom output directory is empty",
            "output.directory",
        );
        assert_eq!(
            err.to_string(),
            "E004: custom output directory is empty (at output.directory)"
        );
    }

    #[test]
    fn test_validation_result_tracks_ok() {
        let mut result = ValidationResult::success();
        result.add_warning(ValidationWarning::new(
            WarningCode::DegenerateAxisConfiguration,
            "axes collide",
        ));
        assert!(result.is_ok());

        result.add_error(ValidationError::new(ErrorCode::NoMapTypeSelected, "none"));
        assert!(!result.is_ok());
        assert!(result.has_error(ErrorCode::NoMapTypeSelected));
        assert!(result.has_warning(WarningCode::DegenerateAxisConfiguration));
        assert_eq!(result.into_result().unwrap_err().len(), 1);
    }

    #[test]
    fn test_config_error_lists_every_validation_error() {
        let err = ConfigError::ValidationFailed(vec![
            ValidationError::new(ErrorCode::MissingTargetObject, "no target"),
            ValidationError::new(ErrorCode::NoMapTypeSelected, "no maps"),
        ]);
        let text = err.to_string();
        assert!(text.contains("E001: no target"));
        assert!(text.contains("E003: no maps"));
    }
}
