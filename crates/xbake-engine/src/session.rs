//! Renderer session interface.
//!
//! A bake run talks to the host application through an explicit session
//! handle implementing [`SceneHost`] (scene data: objects, materials,
//! images, selection) and [`BakeEngine`] (pass configuration and the
//! blocking bake call). The runner never reaches for ambient global state.

use std::path::Path;

use serde::{Deserialize, Serialize};
use xbake_spec::{BitDepth, LightingContributions, MapType, MarginMode, SignedAxis};

use crate::error::{HostError, RenderError};
use crate::graph::DerivedChannelGraph;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Creates a handle from a host identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the host identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

handle!(
    /// A scene object. The identifier is the object's unique name.
    ObjectId
);
handle!(
    /// A material data block.
    MaterialId
);
handle!(
    /// An image data block.
    ImageId
);
handle!(
    /// An image-texture node attached to a material as the bake target.
    NodeId
);

/// Name of the path-tracing render engine baking requires.
pub const PATH_TRACING_ENGINE: &str = "CYCLES";

/// Object location and scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

/// World-space axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb {
    /// Creates a bounding box.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Returns the size along each axis.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Selected objects and the active object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub selected: Vec<ObjectId>,
    pub active: Option<ObjectId>,
}

impl Selection {
    /// Selects `objects` and makes `active` the active object.
    pub fn new(objects: impl IntoIterator<Item = ObjectId>, active: ObjectId) -> Self {
        let mut selected: Vec<ObjectId> = objects.into_iter().collect();
        if !selected.contains(&active) {
            selected.push(active.clone());
        }
        Self {
            selected,
            active: Some(active),
        }
    }
}

/// Parameters for a new bake image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub float_buffer: bool,
    /// Store raw data values instead of display colors.
    pub non_color: bool,
}

impl ImageSpec {
    /// A square float, Non-Color image.
    pub fn square(name: impl Into<String>, resolution: u32) -> Self {
        Self {
            name: name.into(),
            width: resolution,
            height: resolution,
            float_buffer: true,
            non_color: true,
        }
    }
}

/// Renderer bake pass type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BakePass {
    Normal,
    Ao,
    Diffuse,
    Combined,
    Shadow,
    Roughness,
    Emit,
    Environment,
    Glossy,
    Transmission,
}

impl BakePass {
    /// Returns the pass used to produce a map, or `None` for the UV layout,
    /// which is exported rather than baked.
    ///
    /// Derived channels are written through a flat diffuse-color pass.
    pub fn for_map(map_type: MapType) -> Option<Self> {
        match map_type {
            MapType::Normal => Some(BakePass::Normal),
            MapType::AmbientOcclusion => Some(BakePass::Ao),
            MapType::Uv => None,
            MapType::Curvature | MapType::Position | MapType::WorldSpaceNormal => {
                Some(BakePass::Diffuse)
            }
            MapType::Combined => Some(BakePass::Combined),
            MapType::Shadow => Some(BakePass::Shadow),
            MapType::Roughness => Some(BakePass::Roughness),
            MapType::Emit => Some(BakePass::Emit),
            MapType::Environment => Some(BakePass::Environment),
            MapType::Diffuse => Some(BakePass::Diffuse),
            MapType::Glossy => Some(BakePass::Glossy),
            MapType::Transmission => Some(BakePass::Transmission),
        }
    }

    /// Returns the renderer identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            BakePass::Normal => "NORMAL",
            BakePass::Ao => "AO",
            BakePass::Diffuse => "DIFFUSE",
            BakePass::Combined => "COMBINED",
            BakePass::Shadow => "SHADOW",
            BakePass::Roughness => "ROUGHNESS",
            BakePass::Emit => "EMIT",
            BakePass::Environment => "ENVIRONMENT",
            BakePass::Glossy => "GLOSSY",
            BakePass::Transmission => "TRANSMISSION",
        }
    }
}

impl std::fmt::Display for BakePass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scene-level bake settings applied before a pass executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSettings {
    pub resolution: u32,
    /// Margin in pixels.
    pub margin: u32,
    pub margin_mode: MarginMode,
    pub selected_to_active: bool,
    /// Cage object; `None` disables the cage.
    pub cage: Option<ObjectId>,
    pub extrusion: f64,
    pub max_ray_distance: f64,
    pub lighting: LightingContributions,
    /// Green channel swizzle for tangent-space normals.
    pub normal_green: SignedAxis,
    /// Clear the target image before baking.
    pub clear_image: bool,
}

/// Scene access required by a bake run.
///
/// Every call is synchronous. Methods that create resources return the
/// handle the caller must later pass back for removal.
pub trait SceneHost {
    /// Looks up an object by name.
    fn find_object(&mut self, name: &str) -> Result<Option<ObjectId>, HostError>;

    /// Duplicates an object with independent mesh data, keeping its transform.
    fn duplicate_object(&mut self, object: &ObjectId) -> Result<ObjectId, HostError>;

    /// Deletes an object.
    fn remove_object(&mut self, object: &ObjectId) -> Result<(), HostError>;

    /// Returns whether the object is hidden from the renderer.
    fn hide_render(&mut self, object: &ObjectId) -> Result<bool, HostError>;

    /// Hides or shows the object to the renderer.
    fn set_hide_render(&mut self, object: &ObjectId, hidden: bool) -> Result<(), HostError>;

    /// Returns the current selection.
    fn selection(&mut self) -> Result<Selection, HostError>;

    /// Replaces the selection. Objects not listed are deselected.
    fn select(&mut self, selection: &Selection) -> Result<(), HostError>;

    /// Returns the object's material slots.
    fn material_slots(&mut self, object: &ObjectId) -> Result<Vec<Option<MaterialId>>, HostError>;

    /// Assigns a material to a slot. `slot == len` appends a slot.
    fn set_material_slot(
        &mut self,
        object: &ObjectId,
        slot: usize,
        material: Option<&MaterialId>,
    ) -> Result<(), HostError>;

    /// Removes every material slot from the object's mesh.
    fn clear_material_slots(&mut self, object: &ObjectId) -> Result<(), HostError>;

    /// Creates an empty node-based material.
    fn create_material(&mut self, name: &str) -> Result<MaterialId, HostError>;

    /// Creates an independent copy of a material.
    fn copy_material(&mut self, material: &MaterialId) -> Result<MaterialId, HostError>;

    /// Creates a material whose node tree realizes `graph`.
    fn create_graph_material(
        &mut self,
        name: &str,
        graph: &DerivedChannelGraph,
    ) -> Result<MaterialId, HostError>;

    /// Deletes a material.
    fn remove_material(&mut self, material: &MaterialId) -> Result<(), HostError>;

    /// Creates an image.
    fn create_image(&mut self, spec: &ImageSpec) -> Result<ImageId, HostError>;

    /// Fills every pixel of an image with one RGBA value.
    fn fill_image(&mut self, image: &ImageId, rgba: [f32; 4]) -> Result<(), HostError>;

    /// Writes an image to disk as PNG.
    fn save_image(&mut self, image: &ImageId, path: &Path, depth: BitDepth)
        -> Result<(), HostError>;

    /// Deletes an image.
    fn remove_image(&mut self, image: &ImageId) -> Result<(), HostError>;

    /// Adds an image-texture node for `image` to `material` and makes it
    /// the active node, so the next bake writes into `image`.
    fn attach_bake_target(
        &mut self,
        material: &MaterialId,
        image: &ImageId,
    ) -> Result<NodeId, HostError>;

    /// Removes a node added by [`SceneHost::attach_bake_target`].
    fn detach_bake_target(&mut self, material: &MaterialId, node: &NodeId)
        -> Result<(), HostError>;

    /// Returns the object's location and scale.
    fn transform(&mut self, object: &ObjectId) -> Result<Transform, HostError>;

    /// Sets the object's location and scale.
    fn set_transform(&mut self, object: &ObjectId, transform: &Transform)
        -> Result<(), HostError>;

    /// Returns the object's world-space bounding box.
    fn world_bounds(&mut self, object: &ObjectId) -> Result<Aabb, HostError>;

    /// Exports the object's UV layout as a square image.
    fn export_uv_layout(
        &mut self,
        object: &ObjectId,
        path: &Path,
        size: u32,
        opacity: f64,
    ) -> Result<(), HostError>;

    /// Deletes data blocks that this session created and that no longer
    /// have users. Data the scene held before the session is never touched.
    /// Returns how many blocks were removed.
    fn purge_orphans(&mut self) -> Result<usize, HostError>;
}

/// Renderer access required by a bake run.
pub trait BakeEngine {
    /// Returns the active render engine identifier.
    fn render_engine(&mut self) -> Result<String, HostError>;

    /// Switches the render engine.
    fn set_render_engine(&mut self, engine: &str) -> Result<(), HostError>;

    /// Applies scene-level bake settings.
    fn configure_pass(&mut self, settings: &PassSettings) -> Result<(), HostError>;

    /// Bakes `pass` for the active object into `target`. Blocks until done.
    fn execute_bake(&mut self, pass: BakePass, target: &ImageId) -> Result<(), RenderError>;
}

/// A session handle providing both scene and renderer access.
pub trait BakeSession: SceneHost + BakeEngine {}

impl<T: SceneHost + BakeEngine> BakeSession for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_map_but_uv_has_a_pass() {
        for &map in MapType::all() {
            assert_eq!(BakePass::for_map(map).is_none(), map == MapType::Uv, "{map}");
        }
        assert_eq!(
            BakePass::for_map(MapType::Curvature),
            Some(BakePass::Diffuse)
        );
    }

    #[test]
    fn test_selection_includes_active() {
        let sel = Selection::new([ObjectId::from("High")], ObjectId::from("Low"));
        assert_eq!(sel.selected.len(), 2);
        assert_eq!(sel.active, Some(ObjectId::from("Low")));
    }

    #[test]
    fn test_handles_serialize_as_strings() {
        let json = serde_json::to_string(&ObjectId::from("Rock_Low")).unwrap();
        assert_eq!(json, "\"Rock_Low\"");
    }
}
