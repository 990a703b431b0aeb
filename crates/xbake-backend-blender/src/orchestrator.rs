//! Blender discovery and process launch.
//!
//! This module finds the Blender executable, resolves the Python bridge
//! script and starts a background Blender process running it.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::{BlenderError, BlenderResult};
use crate::session::BlenderSession;

const EMBEDDED_BRIDGE_PY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../blender/xbake_bridge.py"
));

/// Environment variable overriding the bridge script.
pub const BRIDGE_ENV: &str = "XBAKE_BLENDER_BRIDGE";

/// Default timeout for a single bridge request (5 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default timeout for a single bake call (1 hour).
pub const DEFAULT_BAKE_TIMEOUT_SECS: u64 = 3600;

#[cfg(windows)]
const INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Blender Foundation\Blender 4.4\blender.exe",
    r"C:\Program Files\Blender Foundation\Blender 4.2\blender.exe",
    r"C:\Program Files\Blender Foundation\Blender 3.6\blender.exe",
];

#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &["/Applications/Blender.app/Contents/MacOS/Blender"];

#[cfg(all(unix, not(target_os = "macos")))]
const INSTALL_PATHS: &[&str] = &[
    "/usr/bin/blender",
    "/usr/local/bin/blender",
    "/snap/bin/blender",
    "/opt/blender/blender",
];

#[cfg(not(any(windows, unix)))]
const INSTALL_PATHS: &[&str] = &[];

/// Configuration for launching Blender.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Path to the Blender executable.
    pub blender_path: Option<PathBuf>,
    /// Path to the Python bridge script.
    pub bridge_path: Option<PathBuf>,
    /// Timeout for ordinary requests.
    pub timeout: Duration,
    /// Timeout for bake requests.
    pub bake_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            blender_path: None,
            bridge_path: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            bake_timeout: Duration::from_secs(DEFAULT_BAKE_TIMEOUT_SECS),
        }
    }
}

impl OrchestratorConfig {
    /// Sets the Blender executable path.
    pub fn blender_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blender_path = Some(path.into());
        self
    }

    /// Sets the bridge script path.
    pub fn bridge_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bridge_path = Some(path.into());
        self
    }

    /// Sets the request timeout in seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Sets the bake timeout in seconds.
    pub fn bake_timeout_secs(mut self, secs: u64) -> Self {
        self.bake_timeout = Duration::from_secs(secs);
        self
    }
}

/// The bridge script on disk. Holds the temp file alive when the embedded
/// copy is used.
#[derive(Debug)]
pub(crate) struct ResolvedBridge {
    pub(crate) path: PathBuf,
    _tempfile: Option<tempfile::NamedTempFile>,
}

/// Launches Blender sessions.
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator with default configuration.
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
        }
    }

    /// Creates an orchestrator with the given configuration.
    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Locates Blender: configured path, `BLENDER_PATH`, `PATH`, then the
    /// usual install locations.
    pub fn find_blender(&self) -> BlenderResult<PathBuf> {
        let from_env = std::env::var_os("BLENDER_PATH").map(PathBuf::from);
        if let Some(path) = self
            .config
            .blender_path
            .iter()
            .cloned()
            .chain(from_env)
            .find(|p| p.exists())
        {
            return Ok(path);
        }

        if let Ok(path) = which::which("blender") {
            return Ok(path);
        }

        INSTALL_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or(BlenderError::BlenderNotFound)
    }

    pub(crate) fn resolve_bridge(&self) -> BlenderResult<ResolvedBridge> {
        if let Some(ref path) = self.config.bridge_path {
            if path.exists() {
                return Ok(ResolvedBridge {
                    path: path.clone(),
                    _tempfile: None,
                });
            }
            return Err(BlenderError::BridgeNotFound { path: path.clone() });
        }

        if let Ok(path) = std::env::var(BRIDGE_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(ResolvedBridge {
                    path,
                    _tempfile: None,
                });
            }
            return Err(BlenderError::BridgeNotFound { path });
        }

        let mut file = tempfile::Builder::new()
            .prefix("xbake_bridge_")
            .suffix(".py")
            .tempfile()?;
        file.write_all(EMBEDDED_BRIDGE_PY.as_bytes())?;
        file.flush()?;

        Ok(ResolvedBridge {
            path: file.path().to_path_buf(),
            _tempfile: Some(file),
        })
    }

    /// Starts Blender in background mode with the bridge loaded.
    ///
    /// When `blend_file` is given it is opened first; otherwise Blender
    /// starts from factory settings with an empty scene.
    pub fn launch(&self, blend_file: Option<&Path>) -> BlenderResult<BlenderSession> {
        let blender_path = self.find_blender()?;
        let bridge = self.resolve_bridge()?;

        // blender --background [file.blend] --factory-startup --python xbake_bridge.py
        let mut cmd = Command::new(&blender_path);
        cmd.arg("--background");
        if let Some(file) = blend_file {
            cmd.arg(file);
        }
        cmd.arg("--factory-startup")
            .arg("--python-exit-code")
            .arg("1")
            .arg("--python")
            .arg(&bridge.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::info!("starting {}", blender_path.display());
        let child = cmd.spawn().map_err(BlenderError::SpawnFailed)?;
        BlenderSession::start(child, bridge, self.config.timeout, self.config.bake_timeout)
    }

    /// Returns the first line of `blender --version`.
    pub fn blender_version(&self) -> BlenderResult<String> {
        let mut cmd = Command::new(self.find_blender()?);
        cmd.arg("--version");
        let (status, stdout) = run_captured(cmd, "version", Duration::from_secs(30))?;
        if !status.success() {
            return Err(BlenderError::process_failed(status.code().unwrap_or(-1), stdout));
        }
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a short-lived command, polling until it exits or `timeout` passes,
/// and returns its stdout.
fn run_captured(
    mut cmd: Command,
    op: &str,
    timeout: Duration,
) -> BlenderResult<(ExitStatus, String)> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(BlenderError::SpawnFailed)?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            kill(&mut child);
            return Err(BlenderError::Timeout {
                op: op.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let mut stdout = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_string(&mut stdout)?;
    }
    Ok((status, stdout))
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
