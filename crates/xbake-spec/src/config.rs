//! Bake configuration.
//!
//! A [`BakeConfiguration`] is supplied once per run and is read-only for the
//! duration of that run. Every field has a default, so a configuration file
//! only needs to name what differs:
//!
//! ```
//! use xbake_spec::{BakeConfiguration, MapType};
//!
//! let config = BakeConfiguration::from_json(r#"{
//!     "target_object": "Rock_Low",
//!     "source_object": "Rock_High",
//!     "maps": ["normal", "ambient_occlusion"]
//! }"#).unwrap();
//!
//! assert_eq!(config.resolution, 1024);
//! assert!(config.maps.contains(&MapType::Normal));
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::axis::{self, SignedAxis};
use crate::error::{
    ConfigError, ErrorCode, ValidationError, ValidationResult, ValidationWarning, WarningCode,
};
use crate::map_type::MapType;

/// Minimum square bake resolution in pixels.
pub const MIN_RESOLUTION: u32 = 64;
/// Maximum square bake resolution in pixels.
pub const MAX_RESOLUTION: u32 = 4096;
/// Maximum ray distance accepted for selected-to-active projection.
pub const MAX_RAY_DISTANCE: f64 = 10.0;

/// How detail is transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BakeMode {
    /// Project a source surface onto a separate active target.
    #[default]
    SelectedToActive,
    /// Bake the target from itself.
    SingleObject,
}

/// How bake margins are filled past UV island borders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    /// Extend edge colors outward.
    #[default]
    Extend,
    /// Blend from faces adjacent across UV seams.
    AdjacentFaces,
}

impl MarginMode {
    /// Returns the renderer identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginMode::Extend => "EXTEND",
            MarginMode::AdjacentFaces => "ADJACENT_FACES",
        }
    }
}

/// Tangent-space normal map green channel convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalFormat {
    /// Green channel points +Y.
    #[default]
    #[serde(alias = "OPENGL")]
    OpenGl,
    /// Green channel points -Y.
    #[serde(alias = "DIRECTX")]
    DirectX,
}

impl NormalFormat {
    /// Returns the axis the green channel encodes.
    pub fn green_axis(&self) -> SignedAxis {
        match self {
            NormalFormat::OpenGl => SignedAxis::PosY,
            NormalFormat::DirectX => SignedAxis::NegY,
        }
    }
}

impl std::str::FromStr for NormalFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opengl" | "gl" => Ok(NormalFormat::OpenGl),
            "directx" | "dx" => Ok(NormalFormat::DirectX),
            _ => Err(format!("unknown normal format: {}", s)),
        }
    }
}

/// Letter case applied to map labels in file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingCase {
    #[default]
    Lower,
    Upper,
    Pascal,
}

/// Where baked maps are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// `<project>/Resources/<stem>/baked_maps/<stem>_<label>.png`.
    #[default]
    Automatic,
    /// Layout driven by [`OutputSettings`].
    Custom,
}

/// Light contributions for lit passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LightingContributions {
    #[serde(default = "default_true")]
    pub direct: bool,
    #[serde(default = "default_true")]
    pub indirect: bool,
    #[serde(default = "default_true")]
    pub color: bool,
}

impl LightingContributions {
    /// Color only; used for derived-channel passes.
    pub fn color_only() -> Self {
        Self {
            direct: false,
            indirect: false,
            color: true,
        }
    }
}

impl Default for LightingContributions {
    fn default() -> Self {
        Self {
            direct: true,
            indirect: true,
            color: true,
        }
    }
}

/// Cage projection settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CageSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Name of the cage object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

/// File naming settings (custom output mode only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamingSettings {
    #[serde(default)]
    pub case: NamingCase,
    /// Separator between the name stem and the map label.
    #[serde(default = "default_separator")]
    pub name_separator: String,
    /// Separator between words of a map label.
    #[serde(default = "default_separator")]
    pub label_separator: String,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            case: NamingCase::Lower,
            name_separator: default_separator(),
            label_separator: default_separator(),
        }
    }
}

/// Output location settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default)]
    pub mode: OutputMode,
    /// Root custom layouts at `directory` instead of `<project>/Resources/`.
    #[serde(default)]
    pub use_custom_path: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub use_object_folder: bool,
    #[serde(default = "default_true")]
    pub use_subfolder: bool,
    #[serde(default = "default_subfolder")]
    pub subfolder_name: String,
    #[serde(default)]
    pub use_custom_name: bool,
    #[serde(default = "default_custom_name")]
    pub custom_name: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            mode: OutputMode::Automatic,
            use_custom_path: false,
            directory: None,
            use_object_folder: true,
            use_subfolder: true,
            subfolder_name: default_subfolder(),
            use_custom_name: false,
            custom_name: default_custom_name(),
        }
    }
}

/// Full configuration for one bake run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BakeConfiguration {
    /// Square image size in pixels (64-4096).
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    /// Margin as a percentage of resolution (0-100).
    #[serde(default = "default_margin_percentage")]
    pub margin_percentage: f64,
    #[serde(default)]
    pub margin_mode: MarginMode,
    #[serde(default)]
    pub lighting: LightingContributions,
    #[serde(default)]
    pub mode: BakeMode,
    #[serde(default)]
    pub cage: CageSettings,
    /// Ray origin offset along the target normal (0-1).
    #[serde(default = "default_extrusion")]
    pub extrusion: f64,
    /// Maximum projection distance (0-10, 0 = unlimited).
    #[serde(default)]
    pub max_ray_distance: f64,
    #[serde(default = "default_forward_axis")]
    pub forward_axis: SignedAxis,
    #[serde(default = "default_up_axis")]
    pub up_axis: SignedAxis,
    #[serde(default)]
    pub normal_format: NormalFormat,
    /// Curvature contrast (0-1).
    #[serde(default = "default_half")]
    pub curvature_contrast: f64,
    /// UV layout fill opacity (0-1).
    #[serde(default = "default_one")]
    pub uv_opacity: f64,
    /// Enabled maps; jobs always run in [`MapType`] order.
    #[serde(default)]
    pub maps: BTreeSet<MapType>,
    #[serde(default)]
    pub naming: NamingSettings,
    #[serde(default)]
    pub output: OutputSettings,
    /// High-detail object name (selected-to-active only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_object: Option<String>,
    /// Object receiving the bake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_object: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_separator() -> String {
    "_".to_string()
}

fn default_subfolder() -> String {
    "baked_maps".to_string()
}

fn default_custom_name() -> String {
    "custom_name".to_string()
}

fn default_resolution() -> u32 {
    1024
}

fn default_margin_percentage() -> f64 {
    10.0
}

fn default_extrusion() -> f64 {
    0.5
}

fn default_forward_axis() -> SignedAxis {
    SignedAxis::PosY
}

fn default_up_axis() -> SignedAxis {
    SignedAxis::PosZ
}

fn default_half() -> f64 {
    0.5
}

fn default_one() -> f64 {
    1.0
}

impl Default for BakeConfiguration {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            margin_percentage: default_margin_percentage(),
            margin_mode: MarginMode::default(),
            lighting: LightingContributions::default(),
            mode: BakeMode::default(),
            cage: CageSettings::default(),
            extrusion: default_extrusion(),
            max_ray_distance: 0.0,
            forward_axis: default_forward_axis(),
            up_axis: default_up_axis(),
            normal_format: NormalFormat::default(),
            curvature_contrast: default_half(),
            uv_opacity: default_one(),
            maps: BTreeSet::new(),
            naming: NamingSettings::default(),
            output: OutputSettings::default(),
            source_object: None,
            target_object: None,
        }
    }
}

impl BakeConfiguration {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> BakeConfigurationBuilder {
        BakeConfigurationBuilder::new()
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serializes the configuration to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Margin in pixels: `round(resolution × pct / 100)`.
    pub fn margin_pixels(&self) -> u32 {
        (self.resolution as f64 * self.margin_percentage / 100.0).round() as u32
    }

    /// Returns true when a separate source object is projected onto the target.
    pub fn is_selected_to_active(&self) -> bool {
        self.mode == BakeMode::SelectedToActive
    }

    /// Returns the source name when it takes part in the bake.
    pub fn active_source(&self) -> Option<&str> {
        match self.mode {
            BakeMode::SelectedToActive => self.source_object.as_deref(),
            BakeMode::SingleObject => None,
        }
    }

    /// Returns the enabled maps in job order.
    pub fn enabled_maps(&self) -> impl Iterator<Item = MapType> + '_ {
        self.maps.iter().copied()
    }

    /// Validates the configuration.
    ///
    /// Only checks what can be known without a scene: object names must be
    /// present, not that the objects exist.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::success();

        if self.target_object.as_deref().map_or(true, str::is_empty) {
            result.add_error(ValidationError::with_path(
                ErrorCode::MissingTargetObject,
                "a target object is required",
                "target_object",
            ));
        }

        if self.mode == BakeMode::SelectedToActive
            && self.source_object.as_deref().map_or(true, str::is_empty)
        {
            result.add_error(ValidationError::with_path(
                ErrorCode::MissingSourceObject,
                "selected-to-active mode requires a source object; use single_object mode to bake the target from itself",
                "source_object",
            ));
        }

        if self.maps.is_empty() {
            result.add_error(ValidationError::with_path(
                ErrorCode::NoMapTypeSelected,
                "select at least one map to bake",
                "maps",
            ));
        }

        if self.output.mode == OutputMode::Custom
            && self.output.use_custom_path
            && self
                .output
                .directory
                .as_ref()
                .map_or(true, |d| d.as_os_str().is_empty())
        {
            result.add_error(ValidationError::with_path(
                ErrorCode::EmptyOutputPath,
                "custom output path is enabled but no directory is configured",
                "output.directory",
            ));
        }

        if self.cage.enabled
            && self.mode == BakeMode::SelectedToActive
            && self.cage.object.as_deref().map_or(true, str::is_empty)
        {
            result.add_error(ValidationError::with_path(
                ErrorCode::MissingCageObject,
                "cage is enabled but no cage object is configured",
                "cage.object",
            ));
        }

        self.validate_ranges(&mut result);

        if self.maps.iter().any(|m| m.is_axis_dependent()) {
            if let Err(err) = axis::resolve(self.forward_axis, self.up_axis) {
                result.add_warning(ValidationWarning::with_path(
                    WarningCode::DegenerateAxisConfiguration,
                    format!("{}; the identity convention (+X, +Y, +Z) is used", err),
                    "up_axis",
                ));
            }
        }

        result
    }

    fn validate_ranges(&self, result: &mut ValidationResult) {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&self.resolution) {
            result.add_error(ValidationError::with_path(
                ErrorCode::ValueOutOfRange,
                format!(
                    "resolution {} outside {}-{}",
                    self.resolution, MIN_RESOLUTION, MAX_RESOLUTION
                ),
                "resolution",
            ));
        }

        let ranges = [
            ("margin_percentage", self.margin_percentage, 100.0),
            ("extrusion", self.extrusion, 1.0),
            ("max_ray_distance", self.max_ray_distance, MAX_RAY_DISTANCE),
            ("curvature_contrast", self.curvature_contrast, 1.0),
            ("uv_opacity", self.uv_opacity, 1.0),
        ];
        for (field, value, max) in ranges {
            if !(0.0..=max).contains(&value) {
                result.add_error(ValidationError::with_path(
                    ErrorCode::ValueOutOfRange,
                    format!("{} {} outside 0-{}", field, value, max),
                    field,
                ));
            }
        }
    }
}

/// Builder for [`BakeConfiguration`].
#[derive(Debug, Clone, Default)]
pub struct BakeConfigurationBuilder {
    config: BakeConfiguration,
}

impl BakeConfigurationBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target object.
    pub fn target(mut self, name: impl Into<String>) -> Self {
        self.config.target_object = Some(name.into());
        self
    }

    /// Sets the source object and switches to selected-to-active mode.
    pub fn source(mut self, name: impl Into<String>) -> Self {
        self.config.source_object = Some(name.into());
        self.config.mode = BakeMode::SelectedToActive;
        self
    }

    /// Sets the bake mode.
    pub fn mode(mut self, mode: BakeMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Enables a map.
    pub fn map(mut self, map: MapType) -> Self {
        self.config.maps.insert(map);
        self
    }

    /// Enables several maps.
    pub fn maps(mut self, maps: impl IntoIterator<Item = MapType>) -> Self {
        self.config.maps.extend(maps);
        self
    }

    /// Sets the resolution.
    pub fn resolution(mut self, resolution: u32) -> Self {
        self.config.resolution = resolution;
        self
    }

    /// Sets the margin percentage.
    pub fn margin_percentage(mut self, pct: f64) -> Self {
        self.config.margin_percentage = pct;
        self
    }

    /// Sets the extrusion.
    pub fn extrusion(mut self, extrusion: f64) -> Self {
        self.config.extrusion = extrusion;
        self
    }

    /// Sets the forward/up convention.
    pub fn axes(mut self, forward: SignedAxis, up: SignedAxis) -> Self {
        self.config.forward_axis = forward;
        self.config.up_axis = up;
        self
    }

    /// Sets the normal map format.
    pub fn normal_format(mut self, format: NormalFormat) -> Self {
        self.config.normal_format = format;
        self
    }

    /// Sets the curvature contrast.
    pub fn curvature_contrast(mut self, contrast: f64) -> Self {
        self.config.curvature_contrast = contrast;
        self
    }

    /// Sets the naming settings.
    pub fn naming(mut self, naming: NamingSettings) -> Self {
        self.config.naming = naming;
        self
    }

    /// Sets the output settings.
    pub fn output(mut self, output: OutputSettings) -> Self {
        self.config.output = output;
        self
    }

    /// Switches to custom output rooted at `directory`.
    pub fn custom_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.output.mode = OutputMode::Custom;
        self.config.output.use_custom_path = true;
        self.config.output.directory = Some(directory.into());
        self
    }

    /// Enables a cage object.
    pub fn cage(mut self, name: impl Into<String>) -> Self {
        self.config.cage = CageSettings {
            enabled: true,
            object: Some(name.into()),
        };
        self
    }

    /// Sets the light contributions.
    pub fn lighting(mut self, lighting: LightingContributions) -> Self {
        self.config.lighting = lighting;
        self
    }

    /// Builds the configuration without validating it.
    pub fn build(self) -> BakeConfiguration {
        self.config
    }

    /// Builds and validates the configuration.
    pub fn build_validated(self) -> Result<BakeConfiguration, ConfigError> {
        match self.config.validate().into_result() {
            Ok(_) => Ok(self.config),
            Err(errors) => Err(ConfigError::ValidationFailed(errors)),
        }
    }
}
