//! xBake Blender Backend
//!
//! This crate runs bakes in a real Blender. It implements the engine's
//! [`SceneHost`](xbake_engine::SceneHost) and
//! [`BakeEngine`](xbake_engine::BakeEngine) traits for a Blender process
//! started in background mode.
//!
//! # Architecture
//!
//! 1. **Rust side** - finds Blender, starts it, and turns every trait call
//!    into one request
//! 2. **Python bridge** - runs inside Blender, executes requests against
//!    `bpy` and answers each with one response line
//!
//! Requests and responses are line-delimited JSON over the child's
//! stdin/stdout (see [`protocol`]). Anything else Blender prints is logged
//! at `debug` level under the `blender` target.
//!
//! # Example
//!
//! ```ignore
//! use xbake_backend_blender::Orchestrator;
//! use xbake_engine::{run_bake, RunOptions};
//!
//! let mut session = Orchestrator::new().launch(None)?;
//! let low = session.import_mesh(Path::new("rock_low.fbx"))?;
//! let high = session.import_mesh(Path::new("rock_high.fbx"))?;
//! let report = run_bake(&config, RunOptions::new("."), &mut session)?;
//! session.quit()?;
//! ```
//!
//! # Blender Requirements
//!
//! The orchestrator searches for Blender in:
//!
//! 1. The configured path
//! 2. `BLENDER_PATH` environment variable
//! 3. System PATH
//! 4. Common installation locations (platform-specific)
//!
//! The bridge script is embedded in the crate; set `XBAKE_BLENDER_BRIDGE`
//! to use a different copy. Recommended Blender version: 3.6 LTS or 4.x.

pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod session;

pub use error::{BlenderError, BlenderResult};
pub use orchestrator::{Orchestrator, OrchestratorConfig, DEFAULT_TIMEOUT_SECS};
pub use session::BlenderSession;
