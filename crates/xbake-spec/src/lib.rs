//! xBake Bake Configuration Library
//!
//! This crate provides the data model shared by every part of xBake: the bake
//! configuration and its validation, the closed set of bakeable map types,
//! coordinate-convention remapping, and output path resolution.
//!
//! # Example
//!
//! ```
//! use xbake_spec::{BakeConfiguration, MapType, ObjectNames, OutputPathResolver};
//!
//! let config = BakeConfiguration::builder()
//!     .target("Rock_Low")
//!     .source("Rock_High")
//!     .map(MapType::Normal)
//!     .map(MapType::AmbientOcclusion)
//!     .build();
//!
//! assert!(config.validate().is_ok());
//!
//! let resolver = OutputPathResolver::new(&config, "/project");
//! let out = resolver.resolve(MapType::Normal, &ObjectNames::pair("Rock_High", "Rock_Low"));
//! assert_eq!(out.file_name, "Rock_normal.png");
//! ```
//!
//! # Modules
//!
//! - [`axis`]: Signed axes and forward/up convention resolution
//! - [`config`]: Bake configuration, builder and validation
//! - [`error`]: Error and warning types for validation
//! - [`map_type`]: Bakeable map types and their classification
//! - [`naming`]: Output directory and file name resolution

pub mod axis;
pub mod config;
pub mod error;
pub mod map_type;
pub mod naming;

// Re-export commonly used types at the crate root
pub use axis::{resolve, resolve_or_fallback, AxisAssignment, AxisError, Component, SignedAxis};
pub use config::{
    BakeConfiguration, BakeConfigurationBuilder, BakeMode, CageSettings, LightingContributions,
    MarginMode, NamingCase, NamingSettings, NormalFormat, OutputMode, OutputSettings,
    MAX_RAY_DISTANCE, MAX_RESOLUTION, MIN_RESOLUTION,
};
pub use error::{
    BackendError, ConfigError, ErrorCode, ValidationError, ValidationResult, ValidationWarning,
    WarningCode,
};
pub use map_type::{BitDepth, DerivedChannel, MapType};
pub use naming::{ObjectNames, OutputPathResolver, ResolvedOutput};
