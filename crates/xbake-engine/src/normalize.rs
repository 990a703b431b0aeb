//! Unit-cube normalization for position bakes.
//!
//! Position maps encode location as color, so the baked object is first
//! squeezed into the unit cube. The original transform is recorded and put
//! back verbatim afterwards; it is never recomputed from the normalized one.

use std::collections::HashMap;

use crate::error::HostError;
use crate::session::{Aabb, ObjectId, SceneHost, Transform};

/// Smallest extent used when scaling a flat axis.
pub const MIN_EXTENT: f64 = 1e-6;

/// Computes the transform that maps `bounds` onto `[0, 1]³`.
///
/// Each axis is scaled by `1 / max(extent, 1e-6)` and the object is then
/// moved so the box's minimum corner sits at the origin. Rotation is not
/// taken into account.
pub fn unit_cube_transform(current: &Transform, bounds: &Aabb) -> Transform {
    let extent = bounds.extent();
    let mut normalized = *current;
    for axis in 0..3 {
        let factor = 1.0 / extent[axis].max(MIN_EXTENT);
        normalized.scale[axis] = current.scale[axis] * factor;
        // world = location + scale * local, so scaling about the location
        // moves the minimum corner to location + factor * (min - location)
        normalized.location[axis] = factor * (current.location[axis] - bounds.min[axis]);
    }
    normalized
}

/// Original transforms of normalized objects, owned by one run.
#[derive(Debug, Default)]
pub struct TransformLedger {
    saved: HashMap<ObjectId, Transform>,
}

impl TransformLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `object` into the unit cube and records its transform.
    ///
    /// Normalizing an object that is already recorded keeps the first
    /// recorded transform.
    pub fn normalize<H: SceneHost + ?Sized>(
        &mut self,
        host: &mut H,
        object: &ObjectId,
    ) -> Result<Transform, HostError> {
        let current = host.transform(object)?;
        let bounds = host.world_bounds(object)?;
        let normalized = unit_cube_transform(&current, &bounds);

        self.saved.entry(object.clone()).or_insert(current);
        host.set_transform(object, &normalized)?;
        log::debug!("{} normalized to unit cube", object);
        Ok(normalized)
    }

    /// Restores the recorded transform of `object` and forgets it.
    ///
    /// Returns `false` if nothing was recorded for the object.
    pub fn revert<H: SceneHost + ?Sized>(
        &mut self,
        host: &mut H,
        object: &ObjectId,
    ) -> Result<bool, HostError> {
        let Some(original) = self.saved.get(object).copied() else {
            log::debug!("no recorded transform for {}", object);
            return Ok(false);
        };
        host.set_transform(object, &original)?;
        self.saved.remove(object);
        log::debug!("{} reverted to original transform", object);
        Ok(true)
    }

    /// Returns true if no transform is recorded.
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use proptest::prelude::*;

    fn world_bounds_after(local: &Aabb, t: &Transform) -> Aabb {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for i in 0..3 {
            let a = t.location[i] + t.scale[i] * local.min[i];
            let b = t.location[i] + t.scale[i] * local.max[i];
            min[i] = a.min(b);
            max[i] = a.max(b);
        }
        Aabb::new(min, max)
    }

    #[test]
    fn test_unit_cube_transform_fits_box() {
        let local = Aabb::new([-1.0, -2.0, 0.0], [1.0, 2.0, 0.5]);
        let t = Transform {
            location: [3.0, -4.0, 10.0],
            scale: [2.0, 0.5, 1.0],
        };
        let world = world_bounds_after(&local, &t);
        let normalized = unit_cube_transform(&t, &world);
        let fitted = world_bounds_after(&local, &normalized);
        for i in 0..3 {
            assert!(fitted.min[i].abs() < 1e-9, "{fitted:?}");
            assert!((fitted.max[i] - 1.0).abs() < 1e-9, "{fitted:?}");
        }
    }

    #[test]
    fn test_flat_axis_uses_min_extent() {
        let bounds = Aabb::new([0.0, 0.0, 2.0], [1.0, 1.0, 2.0]);
        let normalized = unit_cube_transform(&Transform::default(), &bounds);
        assert_eq!(normalized.scale[2], 1.0 / MIN_EXTENT);
        assert!(normalized.scale[2].is_finite());
    }

    #[test]
    fn test_revert_restores_exact_transform() {
        let mut scene = MemoryScene::new();
        let original = Transform {
            location: [0.1, 0.2, 0.3],
            scale: [1.7, 0.3, 2.9],
        };
        let id = scene.add_object_with(
            "Prop01",
            original,
            Aabb::new([-0.5, -0.5, -0.5], [0.5, 0.5, 0.5]),
        );

        let mut ledger = TransformLedger::new();
        ledger.normalize(&mut scene, &id).unwrap();
        assert_ne!(scene.transform(&id).unwrap(), original);
        assert!(ledger.revert(&mut scene, &id).unwrap());
        assert_eq!(scene.transform(&id).unwrap(), original);
        assert!(ledger.is_empty());
        assert!(!ledger.revert(&mut scene, &id).unwrap());
    }

    proptest! {
        #[test]
        fn normalize_then_revert_round_trips(
            location in prop::array::uniform3(-1.0e3f64..1.0e3),
            scale in prop::array::uniform3(1.0e-3f64..1.0e2),
            half in prop::array::uniform3(0.0f64..10.0),
        ) {
            let mut scene = MemoryScene::new();
            let original = Transform { location, scale };
            let local = Aabb::new(half.map(|h| -h), half);
            let id = scene.add_object_with("Prop01", original, local);

            let mut ledger = TransformLedger::new();
            ledger.normalize(&mut scene, &id).unwrap();
            ledger.revert(&mut scene, &id).unwrap();

            let restored = scene.transform(&id).unwrap();
            for i in 0..3 {
                prop_assert!((restored.location[i] - original.location[i]).abs() <= 1e-9);
                prop_assert!((restored.scale[i] - original.scale[i]).abs() <= 1e-9);
            }
        }
    }
}
