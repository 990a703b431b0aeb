//! A live Blender process implementing the bake session traits.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use xbake_engine::{
    Aabb, BakeEngine, BakePass, DerivedChannelGraph, HostError, ImageId, ImageSpec, MaterialId,
    NodeId, ObjectId, PassSettings, RenderError, SceneHost, Selection, Transform,
};
use xbake_spec::BitDepth;

use crate::error::{BlenderError, BlenderResult};
use crate::orchestrator::ResolvedBridge;
use crate::protocol::{self, Response};

/// Number of stderr lines kept for error messages.
const STDERR_TAIL: usize = 40;

/// A Blender process driven over the bridge protocol.
///
/// Every request blocks until Blender answers. Dropping the session kills
/// the process if it is still running.
pub struct BlenderSession {
    child: Child,
    stdin: Option<ChildStdin>,
    responses: Receiver<BlenderResult<Response>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    next_id: u64,
    timeout: Duration,
    bake_timeout: Duration,
    _bridge: ResolvedBridge,
}

impl BlenderSession {
    pub(crate) fn start(
        mut child: Child,
        bridge: ResolvedBridge,
        timeout: Duration,
        bake_timeout: Duration,
    ) -> BlenderResult<Self> {
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| {
                BlenderError::SpawnFailed(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "stdout not piped",
                ))
            })?;
        let stderr = child.stderr.take();

        let (tx, responses) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                match protocol::parse_line(&line) {
                    Some(response) => {
                        if tx.send(response).is_err() {
                            break;
                        }
                    }
                    None => log::debug!(target: "blender", "{}", line),
                }
            }
        });

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL)));
        if let Some(stderr) = stderr {
            let tail = Arc::clone(&stderr_tail);
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { break };
                    log::debug!(target: "blender", "{}", line);
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            });
        }

        let mut session = Self {
            child,
            stdin,
            responses,
            stderr_tail,
            next_id: 1,
            timeout,
            bake_timeout,
            _bridge: bridge,
        };

        let version: String = session.call("hello", Value::Null)?;
        log::info!("bridge ready ({})", version);
        Ok(session)
    }

    fn call<T: DeserializeOwned>(&mut self, op: &str, args: Value) -> BlenderResult<T> {
        let timeout = self.timeout;
        self.call_with_timeout(op, args, timeout)
    }

    fn call_with_timeout<T: DeserializeOwned>(
        &mut self,
        op: &str,
        args: Value,
        timeout: Duration,
    ) -> BlenderResult<T> {
        let id = self.next_id;
        self.next_id += 1;
        let line = protocol::encode_request(id, op, args)?;
        log::debug!("-> {}", line);

        let stdin = self.stdin.as_mut().ok_or(BlenderError::SessionClosed)?;
        if let Err(e) = writeln!(stdin, "{}", line).and_then(|_| stdin.flush()) {
            log::debug!("write to bridge failed: {}", e);
            return Err(self.exited());
        }

        loop {
            let response = match self.responses.recv_timeout(timeout) {
                Ok(response) => response?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(BlenderError::Timeout {
                        op: op.to_string(),
                        timeout_secs: timeout.as_secs(),
                    })
                }
                Err(RecvTimeoutError::Disconnected) => return Err(self.exited()),
            };
            if response.id != id {
                log::warn!("discarding response {} while waiting for {}", response.id, id);
                continue;
            }
            log::debug!("<- {} ok={}", response.id, response.ok);
            let value = response.into_result(op)?;
            return serde_json::from_value(value).map_err(BlenderError::ParseResponse);
        }
    }

    /// Error for a process that went away.
    fn exited(&mut self) -> BlenderError {
        self.stdin = None;
        let exit_code = match self.child.wait() {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        };
        let stderr = self
            .stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        BlenderError::process_failed(exit_code, stderr)
    }

    /// Imports a mesh file and returns its first mesh object, descending
    /// into empties. Everything else the file brought in is removed.
    pub fn import_mesh(&mut self, path: &Path) -> BlenderResult<ObjectId> {
        if !path.exists() {
            return Err(BlenderError::ImportFailed {
                path: path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }
        let found: Option<String> = self
            .call("import_mesh", json!({ "path": path.to_string_lossy() }))
            .map_err(|e| BlenderError::ImportFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        found.map(ObjectId::new).ok_or_else(|| BlenderError::ImportFailed {
            path: path.to_path_buf(),
            message: "no mesh object in file".to_string(),
        })
    }

    /// Returns the Blender version string reported by the bridge.
    pub fn version(&mut self) -> BlenderResult<String> {
        self.call("hello", Value::Null)
    }

    /// Asks Blender to exit and waits for it.
    pub fn quit(mut self) -> BlenderResult<()> {
        let _: Value = self.call("quit", Value::Null)?;
        self.stdin = None;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for BlenderSession {
    fn drop(&mut self) {
        self.stdin = None;
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn object_args(object: &ObjectId) -> Value {
    json!({ "object": object })
}

impl SceneHost for BlenderSession {
    fn find_object(&mut self, name: &str) -> Result<Option<ObjectId>, HostError> {
        Ok(self.call("find_object", json!({ "name": name }))?)
    }

    fn duplicate_object(&mut self, object: &ObjectId) -> Result<ObjectId, HostError> {
        Ok(self.call("duplicate_object", object_args(object))?)
    }

    fn remove_object(&mut self, object: &ObjectId) -> Result<(), HostError> {
        Ok(self.call("remove_object", object_args(object))?)
    }

    fn hide_render(&mut self, object: &ObjectId) -> Result<bool, HostError> {
        Ok(self.call("hide_render", object_args(object))?)
    }

    fn set_hide_render(&mut self, object: &ObjectId, hidden: bool) -> Result<(), HostError> {
        Ok(self.call(
            "set_hide_render",
            json!({ "object": object, "hidden": hidden }),
        )?)
    }

    fn selection(&mut self) -> Result<Selection, HostError> {
        Ok(self.call("selection", Value::Null)?)
    }

    fn select(&mut self, selection: &Selection) -> Result<(), HostError> {
        Ok(self.call(
            "select",
            json!({ "selected": selection.selected, "active": selection.active }),
        )?)
    }

    fn material_slots(&mut self, object: &ObjectId) -> Result<Vec<Option<MaterialId>>, HostError> {
        Ok(self.call("material_slots", object_args(object))?)
    }

    fn set_material_slot(
        &mut self,
        object: &ObjectId,
        slot: usize,
        material: Option<&MaterialId>,
    ) -> Result<(), HostError> {
        Ok(self.call(
            "set_material_slot",
            json!({ "object": object, "slot": slot, "material": material }),
        )?)
    }

    fn clear_material_slots(&mut self, object: &ObjectId) -> Result<(), HostError> {
        Ok(self.call("clear_material_slots", object_args(object))?)
    }

    fn create_material(&mut self, name: &str) -> Result<MaterialId, HostError> {
        Ok(self.call("create_material", json!({ "name": name }))?)
    }

    fn copy_material(&mut self, material: &MaterialId) -> Result<MaterialId, HostError> {
        Ok(self.call("copy_material", json!({ "material": material }))?)
    }

    fn create_graph_material(
        &mut self,
        name: &str,
        graph: &DerivedChannelGraph,
    ) -> Result<MaterialId, HostError> {
        graph
            .validate()
            .map_err(|e| HostError::operation("create_graph_material", e.to_string()))?;
        Ok(self.call(
            "create_graph_material",
            json!({ "name": name, "graph": graph }),
        )?)
    }

    fn remove_material(&mut self, material: &MaterialId) -> Result<(), HostError> {
        Ok(self.call("remove_material", json!({ "material": material }))?)
    }

    fn create_image(&mut self, spec: &ImageSpec) -> Result<ImageId, HostError> {
        Ok(self.call("create_image", json!({ "spec": spec }))?)
    }

    fn fill_image(&mut self, image: &ImageId, rgba: [f32; 4]) -> Result<(), HostError> {
        Ok(self.call("fill_image", json!({ "image": image, "rgba": rgba }))?)
    }

    fn save_image(&mut self, image: &ImageId, path: &Path, depth: BitDepth) -> Result<(), HostError> {
        Ok(self.call(
            "save_image",
            json!({ "image": image, "path": path.to_string_lossy(), "depth": depth.bits() }),
        )?)
    }

    fn remove_image(&mut self, image: &ImageId) -> Result<(), HostError> {
        Ok(self.call("remove_image", json!({ "image": image }))?)
    }

    fn attach_bake_target(
        &mut self,
        material: &MaterialId,
        image: &ImageId,
    ) -> Result<NodeId, HostError> {
        Ok(self.call(
            "attach_bake_target",
            json!({ "material": material, "image": image }),
        )?)
    }

    fn detach_bake_target(&mut self, material: &MaterialId, node: &NodeId) -> Result<(), HostError> {
        Ok(self.call(
            "detach_bake_target",
            json!({ "material": material, "node": node }),
        )?)
    }

    fn transform(&mut self, object: &ObjectId) -> Result<Transform, HostError> {
        Ok(self.call("transform", object_args(object))?)
    }

    fn set_transform(&mut self, object: &ObjectId, transform: &Transform) -> Result<(), HostError> {
        Ok(self.call(
            "set_transform",
            json!({ "object": object, "transform": transform }),
        )?)
    }

    fn world_bounds(&mut self, object: &ObjectId) -> Result<Aabb, HostError> {
        Ok(self.call("world_bounds", object_args(object))?)
    }

    fn export_uv_layout(
        &mut self,
        object: &ObjectId,
        path: &Path,
        size: u32,
        opacity: f64,
    ) -> Result<(), HostError> {
        Ok(self.call(
            "export_uv_layout",
            json!({ "object": object, "path": path.to_string_lossy(), "size": size, "opacity": opacity }),
        )?)
    }

    fn purge_orphans(&mut self) -> Result<usize, HostError> {
        Ok(self.call("purge_orphans", Value::Null)?)
    }
}

impl BakeEngine for BlenderSession {
    fn render_engine(&mut self) -> Result<String, HostError> {
        Ok(self.call("render_engine", Value::Null)?)
    }

    fn set_render_engine(&mut self, engine: &str) -> Result<(), HostError> {
        Ok(self.call("set_render_engine", json!({ "engine": engine }))?)
    }

    fn configure_pass(&mut self, settings: &PassSettings) -> Result<(), HostError> {
        Ok(self.call(
            "configure_pass",
            json!({
                "settings": settings,
                "margin_type": settings.margin_mode.as_str(),
            }),
        )?)
    }

    fn execute_bake(&mut self, pass: BakePass, target: &ImageId) -> Result<(), RenderError> {
        let timeout = self.bake_timeout;
        self.call_with_timeout::<Value>(
            "bake",
            json!({ "pass": pass.as_str(), "image": target }),
            timeout,
        )
        .map(|_| ())
        .map_err(|e| match e {
            BlenderError::Bridge { message, .. } => RenderError::new(pass, message),
            other => RenderError::new(pass, other.to_string()),
        })
    }
}
