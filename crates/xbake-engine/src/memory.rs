//! In-memory scene host.
//!
//! [`MemoryScene`] implements [`SceneHost`] and [`BakeEngine`] without a
//! renderer. Bakes only record what would have happened, and saved images
//! are recorded instead of written. It backs dry runs and lets tests inject
//! failures and inspect every scene mutation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use xbake_spec::BitDepth;

use crate::error::{HostError, RenderError};
use crate::graph::DerivedChannelGraph;
use crate::session::{
    Aabb, BakeEngine, BakePass, ImageId, ImageSpec, MaterialId, NodeId, ObjectId, PassSettings,
    SceneHost, Selection, Transform,
};

/// Render engine a new scene starts with.
pub const DEFAULT_RENDER_ENGINE: &str = "BLENDER_EEVEE";

#[derive(Debug, Clone)]
struct MemObject {
    transform: Transform,
    local_bounds: Aabb,
    hide_render: bool,
    selectable: bool,
    slots: Vec<Option<MaterialId>>,
}

#[derive(Debug, Clone, Default)]
struct MemMaterial {
    nodes: Vec<(NodeId, ImageId)>,
    graph: Option<DerivedChannelGraph>,
}

#[derive(Debug, Clone)]
struct MemImage {
    spec: ImageSpec,
    fill: Option<[f32; 4]>,
}

/// A recorded bake call.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeRecord {
    pub pass: BakePass,
    pub image: ImageId,
    pub image_fill: Option<[f32; 4]>,
    pub settings: Option<PassSettings>,
    pub selection: Selection,
    /// Materials in the active object's slots at bake time.
    pub active_materials: Vec<Option<MaterialId>>,
    /// Materials whose active node writes into `image`.
    pub target_materials: Vec<MaterialId>,
    /// Graph of the material carrying the bake target node, if any.
    pub graph: Option<DerivedChannelGraph>,
    /// Every material in the scene at bake time, sorted.
    pub materials: Vec<String>,
    /// Every image in the scene at bake time, sorted.
    pub images: Vec<String>,
}

/// A recorded file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    /// Image name, or the object name for UV layouts.
    pub source: String,
    pub bit_depth: BitDepth,
}

/// Scene mutations, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    Duplicated { original: ObjectId, copy: ObjectId },
    ObjectRemoved(ObjectId),
    MaterialCreated(MaterialId),
    MaterialRemoved(MaterialId),
    ImageCreated(ImageId),
    ImageRemoved(ImageId),
    RenderEngine(String),
    Purged(usize),
}

/// An in-memory scene.
#[derive(Debug, Clone)]
pub struct MemoryScene {
    objects: BTreeMap<String, MemObject>,
    materials: BTreeMap<String, MemMaterial>,
    images: BTreeMap<String, MemImage>,
    created_materials: BTreeSet<String>,
    created_images: BTreeSet<String>,
    selection: Selection,
    render_engine: String,
    pass: Option<PassSettings>,
    next_node: usize,
    bake_calls: usize,
    fail_bake_at: Option<usize>,
    fail_duplicate_after: Option<usize>,
    duplicates_made: usize,
    bakes: Vec<BakeRecord>,
    saved: Vec<SavedFile>,
    events: Vec<SceneEvent>,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScene {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            materials: BTreeMap::new(),
            images: BTreeMap::new(),
            created_materials: BTreeSet::new(),
            created_images: BTreeSet::new(),
            selection: Selection::default(),
            render_engine: DEFAULT_RENDER_ENGINE.to_string(),
            pass: None,
            next_node: 0,
            bake_calls: 0,
            fail_bake_at: None,
            fail_duplicate_after: None,
            duplicates_made: 0,
            bakes: Vec::new(),
            saved: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Adds a unit cube centered at the origin.
    pub fn add_object(&mut self, name: &str) -> ObjectId {
        self.add_object_with(
            name,
            Transform::default(),
            Aabb::new([-0.5; 3], [0.5; 3]),
        )
    }

    /// Adds an object with a transform and object-space bounds.
    pub fn add_object_with(&mut self, name: &str, transform: Transform, local_bounds: Aabb) -> ObjectId {
        self.objects.insert(
            name.to_string(),
            MemObject {
                transform,
                local_bounds,
                hide_render: false,
                selectable: true,
                slots: Vec::new(),
            },
        );
        ObjectId::from(name)
    }

    /// Adds a material.
    pub fn add_material(&mut self, name: &str) -> MaterialId {
        self.materials
            .insert(name.to_string(), MemMaterial::default());
        MaterialId::from(name)
    }

    /// Appends a material slot holding `material`.
    pub fn assign_material(&mut self, object: &ObjectId, material: &MaterialId) {
        if let Some(obj) = self.objects.get_mut(object.as_str()) {
            obj.slots.push(Some(material.clone()));
        }
    }

    /// Makes an object ignore selection requests.
    pub fn set_selectable(&mut self, object: &ObjectId, selectable: bool) {
        if let Some(obj) = self.objects.get_mut(object.as_str()) {
            obj.selectable = selectable;
        }
    }

    /// Fails the `n`-th bake call (1-based).
    pub fn fail_bake_at(&mut self, n: usize) {
        self.fail_bake_at = Some(n);
    }

    /// Fails every duplication after `n` successful ones.
    pub fn fail_duplicate_after(&mut self, n: usize) {
        self.fail_duplicate_after = Some(n);
    }

    /// Names of all objects, sorted.
    pub fn object_names(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    /// Number of materials.
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Number of images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Names of all materials, sorted.
    pub fn material_names(&self) -> Vec<String> {
        self.materials.keys().cloned().collect()
    }

    /// Number of bake nodes attached across all materials.
    pub fn node_count(&self) -> usize {
        self.materials.values().map(|m| m.nodes.len()).sum()
    }

    /// Current render engine.
    pub fn current_render_engine(&self) -> &str {
        &self.render_engine
    }

    /// Last applied pass settings.
    pub fn pass_settings(&self) -> Option<&PassSettings> {
        self.pass.as_ref()
    }

    /// Recorded bake calls.
    pub fn bakes(&self) -> &[BakeRecord] {
        &self.bakes
    }

    /// Recorded file writes.
    pub fn saved(&self) -> &[SavedFile] {
        &self.saved
    }

    /// Recorded mutations.
    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    /// Number of duplicates created.
    pub fn duplicates_made(&self) -> usize {
        self.duplicates_made
    }

    /// Number of objects removed.
    pub fn objects_removed(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SceneEvent::ObjectRemoved(_)))
            .count()
    }

    fn object(&self, id: &ObjectId) -> Result<&MemObject, HostError> {
        self.objects
            .get(id.as_str())
            .ok_or_else(|| HostError::ObjectNotFound(id.to_string()))
    }

    fn object_mut(&mut self, id: &ObjectId) -> Result<&mut MemObject, HostError> {
        self.objects
            .get_mut(id.as_str())
            .ok_or_else(|| HostError::ObjectNotFound(id.to_string()))
    }

    fn material_mut(&mut self, id: &MaterialId) -> Result<&mut MemMaterial, HostError> {
        self.materials
            .get_mut(id.as_str())
            .ok_or_else(|| HostError::MaterialNotFound(id.to_string()))
    }

    fn check_image(&self, id: &ImageId) -> Result<&MemImage, HostError> {
        self.images
            .get(id.as_str())
            .ok_or_else(|| HostError::ImageNotFound(id.to_string()))
    }

    fn check_material(&self, id: &MaterialId) -> Result<(), HostError> {
        if self.materials.contains_key(id.as_str()) {
            Ok(())
        } else {
            Err(HostError::MaterialNotFound(id.to_string()))
        }
    }

    fn material_users(&self, id: &str) -> usize {
        self.objects
            .values()
            .flat_map(|o| o.slots.iter())
            .filter(|s| s.as_ref().map(MaterialId::as_str) == Some(id))
            .count()
    }

    fn image_users(&self, id: &str) -> usize {
        self.materials
            .values()
            .flat_map(|m| m.nodes.iter())
            .filter(|(_, image)| image.as_str() == id)
            .count()
    }

    fn new_material(&mut self, name: &str, material: MemMaterial) -> MaterialId {
        let name = unique_name(name, |n| self.materials.contains_key(n));
        self.materials.insert(name.clone(), material);
        self.created_materials.insert(name.clone());
        let id = MaterialId::new(name);
        self.events.push(SceneEvent::MaterialCreated(id.clone()));
        id
    }
}

/// Host-style unique naming: `name`, `name.001`, `name.002`, ...
fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}.{:03}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

impl SceneHost for MemoryScene {
    fn find_object(&mut self, name: &str) -> Result<Option<ObjectId>, HostError> {
        Ok(self
            .objects
            .contains_key(name)
            .then(|| ObjectId::from(name)))
    }

    fn duplicate_object(&mut self, object: &ObjectId) -> Result<ObjectId, HostError> {
        if let Some(limit) = self.fail_duplicate_after {
            if self.duplicates_made >= limit {
                return Err(HostError::operation(
                    "duplicate",
                    format!("cannot duplicate {}", object),
                ));
            }
        }
        let original = self.object(object)?.clone();
        let name = unique_name(object.as_str(), |n| self.objects.contains_key(n));
        self.objects.insert(name.clone(), original);
        self.duplicates_made += 1;
        let copy = ObjectId::new(name);
        self.events.push(SceneEvent::Duplicated {
            original: object.clone(),
            copy: copy.clone(),
        });
        Ok(copy)
    }

    fn remove_object(&mut self, object: &ObjectId) -> Result<(), HostError> {
        self.objects
            .remove(object.as_str())
            .ok_or_else(|| HostError::ObjectNotFound(object.to_string()))?;
        self.selection.selected.retain(|o| o != object);
        if self.selection.active.as_ref() == Some(object) {
            self.selection.active = None;
        }
        self.events.push(SceneEvent::ObjectRemoved(object.clone()));
        Ok(())
    }

    fn hide_render(&mut self, object: &ObjectId) -> Result<bool, HostError> {
        Ok(self.object(object)?.hide_render)
    }

    fn set_hide_render(&mut self, object: &ObjectId, hidden: bool) -> Result<(), HostError> {
        self.object_mut(object)?.hide_render = hidden;
        Ok(())
    }

    fn selection(&mut self) -> Result<Selection, HostError> {
        Ok(self.selection.clone())
    }

    fn select(&mut self, selection: &Selection) -> Result<(), HostError> {
        let mut selected = Vec::new();
        for id in &selection.selected {
            if self.object(id)?.selectable {
                selected.push(id.clone());
            }
        }
        let active = match &selection.active {
            Some(id) if self.object(id)?.selectable => Some(id.clone()),
            _ => None,
        };
        self.selection = Selection { selected, active };
        Ok(())
    }

    fn material_slots(&mut self, object: &ObjectId) -> Result<Vec<Option<MaterialId>>, HostError> {
        Ok(self.object(object)?.slots.clone())
    }

    fn set_material_slot(
        &mut self,
        object: &ObjectId,
        slot: usize,
        material: Option<&MaterialId>,
    ) -> Result<(), HostError> {
        if let Some(material) = material {
            self.check_material(material)?;
        }
        let obj = self.object_mut(object)?;
        match slot.cmp(&obj.slots.len()) {
            std::cmp::Ordering::Less => obj.slots[slot] = material.cloned(),
            std::cmp::Ordering::Equal => obj.slots.push(material.cloned()),
            std::cmp::Ordering::Greater => {
                return Err(HostError::operation(
                    "set_material_slot",
                    format!("{} has no slot {}", object, slot),
                ))
            }
        }
        Ok(())
    }

    fn clear_material_slots(&mut self, object: &ObjectId) -> Result<(), HostError> {
        self.object_mut(object)?.slots.clear();
        Ok(())
    }

    fn create_material(&mut self, name: &str) -> Result<MaterialId, HostError> {
        Ok(self.new_material(name, MemMaterial::default()))
    }

    fn copy_material(&mut self, material: &MaterialId) -> Result<MaterialId, HostError> {
        let copy = self.material_mut(material)?.clone();
        Ok(self.new_material(material.as_str(), copy))
    }

    fn create_graph_material(
        &mut self,
        name: &str,
        graph: &DerivedChannelGraph,
    ) -> Result<MaterialId, HostError> {
        graph
            .validate()
            .map_err(|e| HostError::operation("create_graph_material", e.to_string()))?;
        Ok(self.new_material(
            name,
            MemMaterial {
                nodes: Vec::new(),
                graph: Some(graph.clone()),
            },
        ))
    }

    fn remove_material(&mut self, material: &MaterialId) -> Result<(), HostError> {
        self.materials
            .remove(material.as_str())
            .ok_or_else(|| HostError::MaterialNotFound(material.to_string()))?;
        self.events.push(SceneEvent::MaterialRemoved(material.clone()));
        Ok(())
    }

    fn create_image(&mut self, spec: &ImageSpec) -> Result<ImageId, HostError> {
        let name = unique_name(&spec.name, |n| self.images.contains_key(n));
        self.images.insert(
            name.clone(),
            MemImage {
                spec: spec.clone(),
                fill: None,
            },
        );
        self.created_images.insert(name.clone());
        let id = ImageId::new(name);
        self.events.push(SceneEvent::ImageCreated(id.clone()));
        Ok(id)
    }

    fn fill_image(&mut self, image: &ImageId, rgba: [f32; 4]) -> Result<(), HostError> {
        self.images
            .get_mut(image.as_str())
            .ok_or_else(|| HostError::ImageNotFound(image.to_string()))?
            .fill = Some(rgba);
        Ok(())
    }

    fn save_image(&mut self, image: &ImageId, path: &Path, depth: BitDepth) -> Result<(), HostError> {
        self.check_image(image)?;
        self.saved.push(SavedFile {
            path: path.to_path_buf(),
            source: image.to_string(),
            bit_depth: depth,
        });
        Ok(())
    }

    fn remove_image(&mut self, image: &ImageId) -> Result<(), HostError> {
        self.images
            .remove(image.as_str())
            .ok_or_else(|| HostError::ImageNotFound(image.to_string()))?;
        self.events.push(SceneEvent::ImageRemoved(image.clone()));
        Ok(())
    }

    fn attach_bake_target(
        &mut self,
        material: &MaterialId,
        image: &ImageId,
    ) -> Result<NodeId, HostError> {
        self.check_image(image)?;
        self.next_node += 1;
        let node = NodeId::new(format!("xbake_target.{:03}", self.next_node));
        // the active node is the last one attached
        self.material_mut(material)?
            .nodes
            .push((node.clone(), image.clone()));
        Ok(node)
    }

    fn detach_bake_target(&mut self, material: &MaterialId, node: &NodeId) -> Result<(), HostError> {
        let mat = self.material_mut(material)?;
        let before = mat.nodes.len();
        mat.nodes.retain(|(n, _)| n != node);
        if mat.nodes.len() == before {
            return Err(HostError::operation(
                "detach_bake_target",
                format!("{} has no node {}", material, node),
            ));
        }
        Ok(())
    }

    fn transform(&mut self, object: &ObjectId) -> Result<Transform, HostError> {
        Ok(self.object(object)?.transform)
    }

    fn set_transform(&mut self, object: &ObjectId, transform: &Transform) -> Result<(), HostError> {
        self.object_mut(object)?.transform = *transform;
        Ok(())
    }

    fn world_bounds(&mut self, object: &ObjectId) -> Result<Aabb, HostError> {
        let obj = self.object(object)?;
        let t = &obj.transform;
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for i in 0..3 {
            let a = t.location[i] + t.scale[i] * obj.local_bounds.min[i];
            let b = t.location[i] + t.scale[i] * obj.local_bounds.max[i];
            min[i] = a.min(b);
            max[i] = a.max(b);
        }
        Ok(Aabb::new(min, max))
    }

    fn export_uv_layout(
        &mut self,
        object: &ObjectId,
        path: &Path,
        _size: u32,
        _opacity: f64,
    ) -> Result<(), HostError> {
        self.object(object)?;
        self.saved.push(SavedFile {
            path: path.to_path_buf(),
            source: object.to_string(),
            bit_depth: BitDepth::Eight,
        });
        Ok(())
    }

    fn purge_orphans(&mut self) -> Result<usize, HostError> {
        let orphan_materials: Vec<String> = self
            .created_materials
            .iter()
            .filter(|name| self.materials.contains_key(*name) && self.material_users(name) == 0)
            .cloned()
            .collect();
        for name in &orphan_materials {
            self.materials.remove(name);
            self.created_materials.remove(name);
        }
        let orphan_images: Vec<String> = self
            .created_images
            .iter()
            .filter(|name| self.images.contains_key(*name) && self.image_users(name) == 0)
            .cloned()
            .collect();
        for name in &orphan_images {
            self.images.remove(name);
            self.created_images.remove(name);
        }
        let purged = orphan_materials.len() + orphan_images.len();
        self.events.push(SceneEvent::Purged(purged));
        Ok(purged)
    }
}

impl BakeEngine for MemoryScene {
    fn render_engine(&mut self) -> Result<String, HostError> {
        Ok(self.render_engine.clone())
    }

    fn set_render_engine(&mut self, engine: &str) -> Result<(), HostError> {
        self.render_engine = engine.to_string();
        self.events.push(SceneEvent::RenderEngine(engine.to_string()));
        Ok(())
    }

    fn configure_pass(&mut self, settings: &PassSettings) -> Result<(), HostError> {
        self.pass = Some(settings.clone());
        Ok(())
    }

    fn execute_bake(&mut self, pass: BakePass, target: &ImageId) -> Result<(), RenderError> {
        self.bake_calls += 1;
        if self.fail_bake_at == Some(self.bake_calls) {
            return Err(RenderError::new(pass, "injected failure"));
        }

        let image = self
            .images
            .get(target.as_str())
            .ok_or_else(|| RenderError::new(pass, format!("image '{}' not found", target)))?;
        if image.spec.width == 0 || image.spec.height == 0 {
            return Err(RenderError::new(pass, "image has no pixels"));
        }
        let image_fill = image.fill;

        let active = self
            .selection
            .active
            .clone()
            .ok_or_else(|| RenderError::new(pass, "no active object"))?;
        let active_materials = self
            .objects
            .get(active.as_str())
            .map(|o| o.slots.clone())
            .unwrap_or_default();

        // materials whose active node targets this image
        let targeting: Vec<(&String, &MemMaterial)> = self
            .materials
            .iter()
            .filter(|(_, m)| m.nodes.last().map(|(_, img)| img) == Some(target))
            .collect();
        let graph = targeting.iter().find_map(|(_, m)| m.graph.clone());
        let target_materials = targeting
            .iter()
            .map(|(name, _)| MaterialId::from(name.as_str()))
            .collect();
        let materials = self.material_names();
        let images = self.images.keys().cloned().collect();

        self.bakes.push(BakeRecord {
            pass,
            image: target.clone(),
            image_fill,
            settings: self.pass.clone(),
            selection: self.selection.clone(),
            active_materials,
            target_materials,
            graph,
            materials,
            images,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_duplicate_names() {
        let mut scene = MemoryScene::new();
        let cube = scene.add_object("Cube");
        let a = scene.duplicate_object(&cube).unwrap();
        let b = scene.duplicate_object(&cube).unwrap();
        assert_eq!(a.as_str(), "Cube.001");
        assert_eq!(b.as_str(), "Cube.002");
    }

    #[test]
    fn test_world_bounds_follow_transform() {
        let mut scene = MemoryScene::new();
        let id = scene.add_object_with(
            "Box",
            Transform {
                location: [1.0, 0.0, 0.0],
                scale: [2.0, 1.0, 1.0],
            },
            Aabb::new([-0.5; 3], [0.5; 3]),
        );
        let bounds = scene.world_bounds(&id).unwrap();
        assert_eq!(bounds.min, [0.0, -0.5, -0.5]);
        assert_eq!(bounds.max, [2.0, 0.5, 0.5]);
    }

    #[test]
    fn test_purge_removes_only_created_orphans() {
        let mut scene = MemoryScene::new();
        let obj = scene.add_object("Cube");
        let used = scene.add_material("Used");
        scene.add_material("Spare");
        scene.assign_material(&obj, &used);
        scene.create_material("Scratch").unwrap();
        let kept = scene.create_material("Kept").unwrap();
        scene.set_material_slot(&obj, 1, Some(&kept)).unwrap();
        scene.create_image(&ImageSpec::square("img", 64)).unwrap();

        assert_eq!(scene.purge_orphans().unwrap(), 2);
        assert_eq!(
            scene.material_names(),
            vec!["Kept".to_string(), "Spare".to_string(), "Used".to_string()]
        );
        assert_eq!(scene.image_count(), 0);
    }

    #[test]
    fn test_injected_bake_failure() {
        let mut scene = MemoryScene::new();
        let obj = scene.add_object("Cube");
        scene
            .select(&Selection::new(Vec::new(), obj))
            .unwrap();
        let image = scene.create_image(&ImageSpec::square("img", 64)).unwrap();
        scene.fail_bake_at(2);
        assert!(scene.execute_bake(BakePass::Normal, &image).is_ok());
        assert!(scene.execute_bake(BakePass::Normal, &image).is_err());
        assert_eq!(scene.bakes().len(), 1);
    }
}
