//! xBake bake orchestration.
//!
//! This crate turns a validated [`xbake_spec::BakeConfiguration`] into a
//! sequence of bake jobs and runs them against a host application through
//! an explicit session handle. It owns everything a bake does to the scene
//! and puts it all back afterwards.
//!
//! # Example
//!
//! ```
//! use xbake_engine::memory::MemoryScene;
//! use xbake_engine::{run_bake, RunOptions};
//! use xbake_spec::{BakeConfiguration, MapType};
//!
//! let mut scene = MemoryScene::new();
//! scene.add_object("Rock_High");
//! scene.add_object("Rock_Low");
//!
//! let config = BakeConfiguration::builder()
//!     .target("Rock_Low")
//!     .source("Rock_High")
//!     .map(MapType::Normal)
//!     .build();
//!
//! let report = run_bake(&config, RunOptions::new("/project").without_directories(), &mut scene)
//!     .unwrap();
//! assert!(report.ok);
//! assert_eq!(scene.object_names(), vec!["Rock_High", "Rock_Low"]);
//! ```
//!
//! # Modules
//!
//! - [`session`]: Scene and renderer traits a host implements
//! - [`runner`]: Job state machine and scene restoration
//! - [`selection`]: Object selection and lit-phase duplicates
//! - [`graph`]: Derived-channel shading graphs
//! - [`normalize`]: Unit-cube normalization for position bakes
//! - [`plan`]: Job planning
//! - [`report`]: Run report
//! - [`memory`]: In-memory host for dry runs and tests

pub mod error;
pub mod graph;
pub mod memory;
pub mod normalize;
pub mod plan;
pub mod report;
pub mod runner;
pub mod selection;
pub mod session;

pub use error::{EngineError, EngineResult, HostError, RenderError};
pub use graph::{DerivedChannelGraph, GeometrySample, GraphError};
pub use normalize::{unit_cube_transform, TransformLedger};
pub use plan::{plan_jobs, BakeJob};
pub use report::{BakeReport, BakedMap};
pub use runner::{run_bake, BakeJobRunner, RunOptions, RunnerState};
pub use selection::{SceneObjects, SelectionManager};
pub use session::{
    Aabb, BakeEngine, BakePass, BakeSession, ImageId, ImageSpec, MaterialId, NodeId, ObjectId,
    PassSettings, SceneHost, Selection, Transform, PATH_TRACING_ENGINE,
};
