//! Integration tests for scene restoration.
//!
//! Every run, successful or not, must leave the scene as it found it:
//! no extra objects, materials, images or nodes, original transforms,
//! visibility, selection and render engine. Temporary data must also be
//! gone by the end of the job that made it, not merely swept up by the
//! closing purge.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use xbake_engine::memory::{BakeRecord, MemoryScene, SceneEvent};
use xbake_engine::{
    run_bake, Aabb, BakeJobRunner, EngineError, ObjectId, RenderError, RunOptions, RunnerState,
    SceneHost, Selection, Transform,
};
use xbake_spec::{BakeConfiguration, BakeMode, DerivedChannel, MapType};

// =============================================================================
// Helper Functions
// =============================================================================

/// A high/low pair with one material each, low-poly object selected.
fn rock_scene() -> MemoryScene {
    let mut scene = MemoryScene::new();
    let high = scene.add_object("Rock_High");
    let low = scene.add_object_with(
        "Rock_Low",
        Transform {
            location: [3.0, -1.0, 0.5],
            scale: [2.0, 2.0, 2.0],
        },
        Aabb::new([-1.0, -0.5, 0.0], [1.0, 0.5, 2.0]),
    );
    let high_mat = scene.add_material("HighMat");
    let low_mat = scene.add_material("LowMat");
    scene.assign_material(&high, &high_mat);
    scene.assign_material(&low, &low_mat);
    scene
        .select(&Selection::new(Vec::new(), low))
        .expect("select");
    scene
}

fn rock_config(maps: &[MapType]) -> BakeConfiguration {
    BakeConfiguration::builder()
        .target("Rock_Low")
        .source("Rock_High")
        .maps(maps.iter().copied())
        .build()
}

fn options() -> RunOptions {
    RunOptions::new("/project").without_directories()
}

/// Snapshot of everything a run may touch.
#[derive(Debug, Clone, PartialEq)]
struct SceneSnapshot {
    objects: Vec<String>,
    materials: Vec<String>,
    images: usize,
    nodes: usize,
    slots: Vec<Vec<Option<String>>>,
    transforms: Vec<Transform>,
    hidden: Vec<bool>,
    selection: Selection,
    engine: String,
}

fn snapshot(scene: &mut MemoryScene) -> SceneSnapshot {
    let objects = scene.object_names();
    let mut slots = Vec::new();
    let mut transforms = Vec::new();
    let mut hidden = Vec::new();
    for name in &objects {
        let id = ObjectId::from(name.as_str());
        slots.push(
            scene
                .material_slots(&id)
                .unwrap()
                .into_iter()
                .map(|s| s.map(|m| m.to_string()))
                .collect(),
        );
        transforms.push(scene.transform(&id).unwrap());
        hidden.push(scene.hide_render(&id).unwrap());
    }
    SceneSnapshot {
        materials: scene.material_names(),
        images: scene.image_count(),
        nodes: scene.node_count(),
        selection: scene.selection().unwrap(),
        engine: scene.current_render_engine().to_string(),
        objects,
        slots,
        transforms,
        hidden,
    }
}

/// Materials present during a bake that are neither the user's nor a
/// lit-phase copy of one.
fn job_materials(bake: &BakeRecord, before: &SceneSnapshot) -> Vec<String> {
    bake.materials
        .iter()
        .filter(|name| !before.materials.contains(name))
        .filter(|name| {
            !before
                .materials
                .iter()
                .any(|user| name.starts_with(&format!("{}.", user)))
        })
        .cloned()
        .collect()
}

fn graph_material(map: MapType) -> Option<String> {
    let suffix = match map.derived_channel()? {
        DerivedChannel::Curvature => "Curvature",
        DerivedChannel::WorldSpaceNormal => "WSN",
        DerivedChannel::Position => "Position",
    };
    Some(format!("Rock_Low_{}", suffix))
}

/// Each bake sees only its own image and, for derived maps, its own graph
/// material: earlier jobs left nothing behind.
fn assert_jobs_leave_nothing(scene: &MemoryScene, maps: &[MapType], before: &SceneSnapshot) {
    let baked = maps.iter().copied().filter(|m| *m != MapType::Uv);
    for (map, bake) in baked.zip(scene.bakes()) {
        assert_eq!(bake.images.len(), before.images + 1, "images during {map}");
        assert!(bake.images.contains(&bake.image.to_string()));
        assert_eq!(
            job_materials(bake, before),
            graph_material(map).into_iter().collect::<Vec<_>>(),
            "materials during {map}"
        );
    }
}

fn purged_count(scene: &MemoryScene) -> Option<usize> {
    scene.events().iter().rev().find_map(|e| match e {
        SceneEvent::Purged(n) => Some(*n),
        _ => None,
    })
}

// =============================================================================
// Successful Runs
// =============================================================================

#[test]
fn test_every_map_restores_scene() {
    let mut scene = rock_scene();
    let before = snapshot(&mut scene);

    let report = run_bake(&rock_config(MapType::all()), options(), &mut scene).unwrap();

    assert!(report.ok);
    assert_eq!(report.baked_maps.len(), MapType::all().len());
    assert_eq!(snapshot(&mut scene), before);
    assert_jobs_leave_nothing(&scene, MapType::all(), &before);
    // every temporary was already removed by its own job
    assert_eq!(purged_count(&scene), Some(0));
}

#[test]
fn test_unassigned_user_material_survives() {
    let mut scene = rock_scene();
    scene.add_material("SpareUserMat");
    let before = snapshot(&mut scene);
    let config = BakeConfiguration::builder()
        .target("Rock_Low")
        .mode(BakeMode::SingleObject)
        .map(MapType::Normal)
        .build();

    run_bake(&config, options(), &mut scene).unwrap();

    assert_eq!(
        scene.material_names(),
        vec![
            "HighMat".to_string(),
            "LowMat".to_string(),
            "SpareUserMat".to_string()
        ]
    );
    assert_eq!(snapshot(&mut scene), before);

    run_bake(&rock_config(MapType::all()), options(), &mut scene).unwrap();
    assert_eq!(snapshot(&mut scene), before);
}

#[test]
fn test_graph_covers_every_slot_of_emitter() {
    let mut scene = MemoryScene::new();
    let low = scene.add_object("Rock_Low");
    let mat_a = scene.add_material("LowMatA");
    let mat_b = scene.add_material("LowMatB");
    scene.assign_material(&low, &mat_a);
    scene.assign_material(&low, &mat_b);
    let before = snapshot(&mut scene);
    let config = BakeConfiguration::builder()
        .target("Rock_Low")
        .mode(BakeMode::SingleObject)
        .maps([MapType::Position, MapType::WorldSpaceNormal])
        .build();

    run_bake(&config, options(), &mut scene).unwrap();

    for (bake, graph) in scene.bakes().iter().zip(["Rock_Low_Position", "Rock_Low_WSN"]) {
        let graph = xbake_engine::MaterialId::from(graph);
        assert_eq!(
            bake.active_materials,
            vec![Some(graph.clone()), Some(graph.clone())]
        );
        assert_eq!(bake.target_materials, vec![graph]);
    }
    assert_eq!(snapshot(&mut scene), before);
}

#[test]
fn test_projection_targets_every_target_material() {
    let mut scene = rock_scene();
    let low = ObjectId::from("Rock_Low");
    let extra = scene.add_material("LowTrim");
    scene.assign_material(&low, &extra);
    let before = snapshot(&mut scene);

    run_bake(
        &rock_config(&[MapType::Normal, MapType::Curvature, MapType::Combined]),
        options(),
        &mut scene,
    )
    .unwrap();

    let bakes = scene.bakes().to_vec();
    assert_eq!(bakes[0].target_materials.len(), 2);
    assert_eq!(
        bakes[0].target_materials,
        vec![
            xbake_engine::MaterialId::from("LowMat"),
            xbake_engine::MaterialId::from("LowTrim")
        ]
    );
    // curvature is emitted by the source; the target keeps its own materials
    assert_eq!(bakes[1].target_materials.len(), 2);
    assert_eq!(
        scene.material_slots(&ObjectId::from("Rock_High")).unwrap(),
        vec![Some(xbake_engine::MaterialId::from("HighMat"))]
    );
    // lit bake targets the copies on the duplicate
    assert_eq!(bakes[2].target_materials.len(), 2);
    assert!(!bakes[2]
        .target_materials
        .contains(&xbake_engine::MaterialId::from("LowMat")));
    assert_eq!(scene.node_count(), 0);
    assert_eq!(snapshot(&mut scene), before);
}

#[test]
fn test_report_paths_and_margin() {
    let mut scene = rock_scene();
    let config = BakeConfiguration::builder()
        .target("Rock_Low")
        .source("Rock_High")
        .map(MapType::Normal)
        .map(MapType::Position)
        .resolution(2048)
        .build();

    let report = run_bake(&config, options(), &mut scene).unwrap();

    assert_eq!(report.margin, 205);
    let paths: Vec<_> = report
        .baked_maps
        .iter()
        .map(|m| m.path.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        paths,
        vec![
            "/project/Resources/Rock/baked_maps/Rock_normal.png",
            "/project/Resources/Rock/baked_maps/Rock_position.png",
        ]
    );
    let saved: Vec<_> = scene.saved().iter().map(|s| s.bit_depth.bits()).collect();
    assert_eq!(saved, vec![8, 16]);
}

#[test]
fn test_lit_and_unlit_maps_duplicate_once() {
    let mut scene = rock_scene();
    let before = snapshot(&mut scene);

    run_bake(
        &rock_config(&[MapType::Normal, MapType::Combined]),
        options(),
        &mut scene,
    )
    .unwrap();

    // source and target duplicated for the lit phase, then removed
    assert_eq!(scene.duplicates_made(), 2);
    assert_eq!(scene.objects_removed(), 2);
    assert_eq!(snapshot(&mut scene), before);
}

#[test]
fn test_lit_bake_never_touches_user_material() {
    let mut scene = rock_scene();
    run_bake(&rock_config(&[MapType::Combined]), options(), &mut scene).unwrap();

    let bake = &scene.bakes()[0];
    let active = bake.selection.active.clone().unwrap();
    assert_ne!(active, ObjectId::from("Rock_Low"));
    assert_ne!(
        bake.active_materials,
        vec![Some(xbake_engine::MaterialId::from("LowMat"))]
    );
}

#[test]
fn test_unlit_only_run_makes_no_duplicates() {
    let mut scene = rock_scene();
    run_bake(
        &rock_config(&[MapType::Normal, MapType::AmbientOcclusion, MapType::Uv]),
        options(),
        &mut scene,
    )
    .unwrap();
    assert_eq!(scene.duplicates_made(), 0);
}

#[test]
fn test_single_object_mode() {
    let mut scene = rock_scene();
    let before = snapshot(&mut scene);
    let config = BakeConfiguration::builder()
        .target("Rock_Low")
        .mode(BakeMode::SingleObject)
        .maps([MapType::Normal, MapType::Curvature, MapType::Diffuse])
        .build();

    run_bake(&config, options(), &mut scene).unwrap();

    for bake in scene.bakes() {
        // the lit diffuse bake runs on a duplicate of the target
        assert_eq!(bake.selection.selected.len(), 1);
        assert!(!bake.settings.as_ref().unwrap().selected_to_active);
    }
    assert_eq!(
        scene.bakes()[0].selection.selected,
        vec![ObjectId::from("Rock_Low")]
    );
    assert_eq!(
        scene.saved()[0].path.to_string_lossy(),
        "/project/Resources/Rock_Low/baked_maps/Rock_Low_normal.png"
    );
    assert_eq!(snapshot(&mut scene), before);
}

#[test]
fn test_position_sees_unit_cube_and_reverts() {
    let mut scene = rock_scene();
    let low = ObjectId::from("Rock_Low");
    let original = scene.transform(&low).unwrap();

    run_bake(&rock_config(&[MapType::Position]), options(), &mut scene).unwrap();

    assert_eq!(scene.transform(&low).unwrap(), original);
    assert!(!scene.hide_render(&ObjectId::from("Rock_High")).unwrap());
}

#[test]
fn test_output_directories_created_on_save() {
    let out = tempfile::tempdir().unwrap();
    let mut scene = rock_scene();
    let config = BakeConfiguration::builder()
        .target("Rock_Low")
        .source("Rock_High")
        .maps([MapType::Normal, MapType::Uv])
        .custom_directory(out.path())
        .build();

    let report = run_bake(&config, RunOptions::new(out.path()), &mut scene).unwrap();

    let expected_dir = out.path().join("Rock").join("baked_maps");
    assert!(expected_dir.is_dir());
    assert_eq!(report.baked_maps.len(), 2);
    for map in &report.baked_maps {
        assert_eq!(map.path.parent(), Some(expected_dir.as_path()));
    }
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_failure_mid_run_stops_queue_and_restores() {
    let maps = [
        MapType::Normal,
        MapType::AmbientOcclusion,
        MapType::Curvature,
        MapType::Position,
        MapType::WorldSpaceNormal,
    ];
    let mut scene = rock_scene();
    let before = snapshot(&mut scene);
    scene.fail_bake_at(3);

    let config = rock_config(&maps);
    let mut runner = BakeJobRunner::new(&config, options());
    let err = runner.run(&mut scene).unwrap_err();

    match &err {
        EngineError::JobFailed {
            map_type,
            index,
            total,
            ..
        } => {
            assert_eq!(*map_type, MapType::Curvature);
            assert_eq!(*index, 2);
            assert_eq!(*total, 5);
        }
        other => panic!("expected job failure, got {other}"),
    }
    assert!(err.to_string().contains("job 3 of 5"));

    // jobs 4 and 5 never started
    let prepared: Vec<_> = runner
        .history()
        .iter()
        .filter_map(|s| match s {
            RunnerState::Preparing(m) => Some(*m),
            _ => None,
        })
        .collect();
    assert_eq!(
        prepared,
        vec![MapType::Normal, MapType::AmbientOcclusion, MapType::Curvature]
    );
    assert_eq!(scene.bakes().len(), 2);
    assert_eq!(scene.saved().len(), 2);
    assert_eq!(runner.state(), RunnerState::Idle);
    assert_eq!(snapshot(&mut scene), before);
}

#[test]
fn test_failure_in_lit_phase_removes_duplicates() {
    let mut scene = rock_scene();
    let before = snapshot(&mut scene);
    scene.fail_bake_at(2);

    let err = run_bake(
        &rock_config(&[MapType::Normal, MapType::Combined, MapType::Diffuse]),
        options(),
        &mut scene,
    )
    .unwrap_err();

    assert!(matches!(
        err.root(),
        EngineError::RenderFailed(RenderError { .. })
    ));
    assert_eq!(scene.duplicates_made(), 2);
    assert_eq!(scene.objects_removed(), 2);
    assert_eq!(snapshot(&mut scene), before);
}

#[test]
fn test_failed_duplication_restores_scene() {
    let mut scene = rock_scene();
    let before = snapshot(&mut scene);
    scene.fail_duplicate_after(1);

    let err = run_bake(&rock_config(&[MapType::Glossy]), options(), &mut scene).unwrap_err();

    assert!(matches!(err.root(), EngineError::Host(_)));
    assert_eq!(snapshot(&mut scene), before);
}

#[test]
fn test_missing_target_reported_before_mutation() {
    let mut scene = rock_scene();
    let config = BakeConfiguration::builder()
        .target("Nope")
        .source("Rock_High")
        .map(MapType::Normal)
        .build();

    let err = run_bake(&config, options(), &mut scene).unwrap_err();

    assert!(matches!(
        err,
        EngineError::ObjectNotFound { role: "target", .. }
    ));
    assert!(scene.events().is_empty());
}

#[test]
fn test_purge_runs_after_failure() {
    let mut scene = rock_scene();
    scene.fail_bake_at(1);
    let _ = run_bake(&rock_config(&[MapType::Normal]), options(), &mut scene);
    assert!(matches!(scene.events().last(), Some(SceneEvent::Purged(_))));
}

// =============================================================================
// Property Tests
// =============================================================================

fn map_subset() -> impl Strategy<Value = Vec<MapType>> {
    proptest::sample::subsequence(MapType::all().to_vec(), 1..=MapType::all().len())
}

proptest! {
    #[test]
    fn prop_any_map_subset_restores_scene(maps in map_subset(), fail_at in 0usize..6) {
        let mut scene = rock_scene();
        let before = snapshot(&mut scene);
        if fail_at > 0 {
            scene.fail_bake_at(fail_at);
        }

        let _ = run_bake(&rock_config(&maps), options(), &mut scene);

        prop_assert_eq!(snapshot(&mut scene), before.clone());
        assert_jobs_leave_nothing(&scene, &maps, &before);
        prop_assert_eq!(purged_count(&scene), Some(0));
    }
}
