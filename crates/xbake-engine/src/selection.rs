//! Object selection and lit-phase isolation.
//!
//! Unlit maps bake the user's objects directly. Lit maps shade with the
//! user's materials and lights, so they run on duplicates whose material
//! slots hold independent material copies: nothing the bake attaches ever
//! lands on a user material. The duplicates are made once, on the first lit
//! job, and destroyed once, when the lit phase ends.

use crate::error::{EngineError, HostError};
use crate::session::{MaterialId, ObjectId, SceneHost, Selection};

/// The objects a job bakes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneObjects {
    /// High-detail object, selected-to-active mode only.
    pub source: Option<ObjectId>,
    /// Object receiving the bake.
    pub target: ObjectId,
    pub cage: Option<ObjectId>,
    /// True when `source`/`target` are lit-phase duplicates.
    pub duplicated: bool,
}

#[derive(Debug)]
struct LitPhase {
    source: Option<ObjectId>,
    target: ObjectId,
    material_copies: Vec<MaterialId>,
    hidden: Vec<(ObjectId, bool)>,
}

impl LitPhase {
    fn objects(&self) -> Vec<ObjectId> {
        self.source
            .iter()
            .cloned()
            .chain(std::iter::once(self.target.clone()))
            .collect()
    }
}

/// Decides which objects each job bakes and owns the lit-phase duplicates.
#[derive(Debug)]
pub struct SelectionManager {
    originals: SceneObjects,
    initial_selection: Option<Selection>,
    lit: Option<LitPhase>,
    phases_started: usize,
}

impl SelectionManager {
    /// Creates a manager for resolved objects, recording the current
    /// selection so it can be restored by [`SelectionManager::finish`].
    pub fn new<H: SceneHost + ?Sized>(
        host: &mut H,
        source: Option<ObjectId>,
        target: ObjectId,
        cage: Option<ObjectId>,
    ) -> Result<Self, HostError> {
        let initial_selection = Some(host.selection()?);
        Ok(Self {
            originals: SceneObjects {
                source,
                target,
                cage,
                duplicated: false,
            },
            initial_selection,
            lit: None,
            phases_started: 0,
        })
    }

    /// Returns true while lit-phase duplicates exist.
    pub fn in_lit_phase(&self) -> bool {
        self.lit.is_some()
    }

    /// Number of times duplicates were created during this run.
    pub fn phases_started(&self) -> usize {
        self.phases_started
    }

    /// Prepares the objects for a job and selects them.
    ///
    /// The source is selected and the target made active; in single-object
    /// mode only the target is selected.
    pub fn prepare_for_phase<H: SceneHost + ?Sized>(
        &mut self,
        host: &mut H,
        lit: bool,
    ) -> Result<SceneObjects, EngineError> {
        if lit {
            if self.lit.is_none() {
                self.begin_lit_phase(host)?;
            }
        } else if self.lit.is_some() {
            let errors = self.end_lit_phase(host);
            if let Some(err) = errors.into_iter().next() {
                return Err(err.into());
            }
        }

        let objects = self.current();
        let selection = Selection::new(objects.source.iter().cloned(), objects.target.clone());
        host.select(&selection)?;

        if host.selection()?.active.is_none() {
            if self.lit.is_some() {
                for err in self.end_lit_phase(host) {
                    log::error!("lit phase teardown failed: {}", err);
                }
            }
            return Err(EngineError::MissingActiveObject);
        }

        Ok(objects)
    }

    fn current(&self) -> SceneObjects {
        match &self.lit {
            Some(phase) => SceneObjects {
                source: phase.source.clone(),
                target: phase.target.clone(),
                cage: self.originals.cage.clone(),
                duplicated: true,
            },
            None => self.originals.clone(),
        }
    }

    fn begin_lit_phase<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> Result<(), HostError> {
        let mut phase = LitPhase {
            source: None,
            target: self.originals.target.clone(),
            material_copies: Vec::new(),
            hidden: Vec::new(),
        };
        let mut created: Vec<ObjectId> = Vec::new();
        let result = duplicate_originals(host, &self.originals, &mut created, &mut phase);

        if let Err(err) = result {
            // leave no partial duplicates behind
            for object in created.iter().rev() {
                if let Err(e) = host.remove_object(object) {
                    log::error!("failed to remove duplicate {}: {}", object, e);
                }
            }
            for material in &phase.material_copies {
                if let Err(e) = host.remove_material(material) {
                    log::error!("failed to remove material copy {}: {}", material, e);
                }
            }
            for (object, hidden) in &phase.hidden {
                if let Err(e) = host.set_hide_render(object, *hidden) {
                    log::error!("failed to restore visibility of {}: {}", object, e);
                }
            }
            return Err(err);
        }

        log::info!("lit phase: working on duplicates {:?}", phase.objects());
        self.lit = Some(phase);
        self.phases_started += 1;
        Ok(())
    }

    /// Destroys the lit-phase duplicates and their material copies and
    /// restores the originals' render visibility.
    ///
    /// Every step is attempted; failures are returned, not short-circuited.
    pub fn end_lit_phase<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> Vec<HostError> {
        let Some(phase) = self.lit.take() else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        for object in phase.objects() {
            log::debug!("removing duplicate {}", object);
            if let Err(e) = host.remove_object(&object) {
                errors.push(e);
            }
        }
        for material in &phase.material_copies {
            if let Err(e) = host.remove_material(material) {
                errors.push(e);
            }
        }
        for (object, hidden) in &phase.hidden {
            if let Err(e) = host.set_hide_render(object, *hidden) {
                errors.push(e);
            }
        }
        for e in &errors {
            log::error!("lit phase teardown: {}", e);
        }
        errors
    }

    /// Ends the lit phase if active and restores the recorded selection.
    pub fn finish<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> Vec<HostError> {
        let mut errors = self.end_lit_phase(host);
        if let Some(selection) = self.initial_selection.take() {
            if let Err(e) = host.select(&selection) {
                log::error!("failed to restore selection: {}", e);
                errors.push(e);
            }
        }
        errors
    }
}

fn duplicate_originals<H: SceneHost + ?Sized>(
    host: &mut H,
    originals: &SceneObjects,
    created: &mut Vec<ObjectId>,
    phase: &mut LitPhase,
) -> Result<(), HostError> {
    if let Some(source) = &originals.source {
        phase.source = Some(isolate(host, source, created, phase)?);
    }
    phase.target = isolate(host, &originals.target, created, phase)?;
    Ok(())
}

/// Duplicates `original`, swaps the copy's materials for independent
/// copies and hides the original from the renderer.
fn isolate<H: SceneHost + ?Sized>(
    host: &mut H,
    original: &ObjectId,
    created: &mut Vec<ObjectId>,
    phase: &mut LitPhase,
) -> Result<ObjectId, HostError> {
    let slots = host.material_slots(original)?;
    let copy = host.duplicate_object(original)?;
    created.push(copy.clone());
    log::debug!("duplicated {} as {}", original, copy);

    host.clear_material_slots(&copy)?;
    for (index, material) in slots.iter().enumerate() {
        let copied = match material {
            Some(material) => {
                let copied = host.copy_material(material)?;
                phase.material_copies.push(copied.clone());
                Some(copied)
            }
            None => None,
        };
        host.set_material_slot(&copy, index, copied.as_ref())?;
    }

    let hidden = host.hide_render(original)?;
    phase.hidden.push((original.clone(), hidden));
    host.set_hide_render(original, true)?;
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use pretty_assertions::assert_eq;

    fn scene() -> (MemoryScene, ObjectId, ObjectId) {
        let mut scene = MemoryScene::new();
        let high = scene.add_object("Rock_High");
        let low = scene.add_object("Rock_Low");
        let mat = scene.add_material("RockMat");
        scene.assign_material(&high, &mat);
        scene.assign_material(&low, &mat);
        (scene, high, low)
    }

    #[test]
    fn test_unlit_uses_originals() {
        let (mut scene, high, low) = scene();
        let mut manager =
            SelectionManager::new(&mut scene, Some(high.clone()), low.clone(), None).unwrap();
        let objects = manager.prepare_for_phase(&mut scene, false).unwrap();
        assert_eq!(objects.source, Some(high.clone()));
        assert_eq!(objects.target, low.clone());
        assert!(!objects.duplicated);

        let selection = scene.selection().unwrap();
        assert_eq!(selection.active, Some(low));
        assert!(selection.selected.contains(&high));
    }

    #[test]
    fn test_lit_phase_duplicates_once() {
        let (mut scene, high, low) = scene();
        let mut manager =
            SelectionManager::new(&mut scene, Some(high.clone()), low.clone(), None).unwrap();

        let first = manager.prepare_for_phase(&mut scene, true).unwrap();
        let second = manager.prepare_for_phase(&mut scene, true).unwrap();
        assert_eq!(first, second);
        assert!(first.duplicated);
        assert_ne!(first.target, low);
        assert_eq!(manager.phases_started(), 1);
        assert!(scene.hide_render(&low).unwrap());
        assert!(scene.hide_render(&high).unwrap());

        // copies, not the user's material
        let slots = scene.material_slots(&first.target).unwrap();
        assert_eq!(slots.len(), 1);
        assert_ne!(slots[0], Some(MaterialId::from("RockMat")));

        assert!(manager.finish(&mut scene).is_empty());
        assert!(!scene.hide_render(&low).unwrap());
        assert_eq!(scene.find_object(first.target.as_str()).unwrap(), None);
        assert_eq!(scene.material_count(), 1);
    }

    #[test]
    fn test_failed_duplication_leaves_nothing() {
        let (mut scene, high, low) = scene();
        scene.fail_duplicate_after(1);
        let before = scene.object_names();

        let mut manager = SelectionManager::new(&mut scene, Some(high.clone()), low, None).unwrap();
        assert!(manager.prepare_for_phase(&mut scene, true).is_err());
        assert!(!manager.in_lit_phase());
        assert_eq!(scene.object_names(), before);
        assert_eq!(scene.material_count(), 1);
        assert!(!scene.hide_render(&high).unwrap());
    }

    #[test]
    fn test_missing_active_object() {
        let (mut scene, high, low) = scene();
        scene.set_selectable(&low, false);
        let mut manager = SelectionManager::new(&mut scene, Some(high), low, None).unwrap();
        let err = manager.prepare_for_phase(&mut scene, false).unwrap_err();
        assert!(matches!(err, EngineError::MissingActiveObject));
    }

    #[test]
    fn test_finish_restores_selection() {
        let (mut scene, high, low) = scene();
        scene
            .select(&Selection {
                selected: vec![high.clone()],
                active: Some(high.clone()),
            })
            .unwrap();
        let mut manager = SelectionManager::new(&mut scene, Some(high.clone()), low, None).unwrap();
        manager.prepare_for_phase(&mut scene, false).unwrap();
        manager.finish(&mut scene);
        assert_eq!(scene.selection().unwrap().active, Some(high));
    }
}
