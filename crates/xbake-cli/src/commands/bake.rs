//! Bake command implementation
//!
//! Imports a lowpoly and a highpoly mesh into a background Blender, bakes
//! the enabled maps next to the lowpoly file, then removes both meshes again.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use xbake_backend_blender::{BlenderSession, Orchestrator, OrchestratorConfig};
use xbake_engine::memory::MemoryScene;
use xbake_engine::{run_bake, BakeReport, ObjectId, RunOptions, SceneHost};
use xbake_spec::{BakeConfiguration, BakeMode, MapType, NormalFormat, OutputMode, SignedAxis};

use super::reporting;

/// Resolution used when no configuration file sets one.
pub const DEFAULT_RESOLUTION: u32 = 2048;

/// Maps baked when no configuration file names any.
pub const DEFAULT_MAPS: [MapType; 5] = [
    MapType::Normal,
    MapType::AmbientOcclusion,
    MapType::Curvature,
    MapType::Position,
    MapType::WorldSpaceNormal,
];

/// Arguments for `xbake bake`.
#[derive(Debug, Clone, Args)]
pub struct BakeArgs {
    /// Lowpoly mesh file receiving the bake (FBX, OBJ or glTF)
    #[arg(long)]
    pub lowpoly: PathBuf,

    /// Highpoly mesh file projected onto the lowpoly
    #[arg(long)]
    pub highpoly: PathBuf,

    /// JSON bake configuration; command-line flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Square output resolution in pixels [default: 2048]
    #[arg(short, long)]
    pub resolution: Option<u32>,

    /// Ray origin offset along the lowpoly normal
    #[arg(long)]
    pub extrusion: Option<f64>,

    /// Normal map green channel convention (opengl, directx)
    #[arg(long)]
    pub normal_format: Option<NormalFormat>,

    /// Skip the tangent-space normal map
    #[arg(long)]
    pub no_normal: bool,

    /// Skip the ambient occlusion map
    #[arg(long)]
    pub no_ao: bool,

    /// Skip the curvature map
    #[arg(long)]
    pub no_curvature: bool,

    /// Skip the position map
    #[arg(long)]
    pub no_position: bool,

    /// Skip the world-space normal map
    #[arg(long)]
    pub no_world_space_normal: bool,

    /// Use forward +Z / up +Y instead of forward +Y / up +Z
    #[arg(long)]
    pub maya_orientation: bool,

    /// Path to the Blender executable
    #[arg(long)]
    pub blender: Option<PathBuf>,

    /// Run the job sequence against an in-memory scene; no Blender, no files
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl BakeArgs {
    fn disabled_maps(&self) -> Vec<MapType> {
        [
            (self.no_normal, MapType::Normal),
            (self.no_ao, MapType::AmbientOcclusion),
            (self.no_curvature, MapType::Curvature),
            (self.no_position, MapType::Position),
            (self.no_world_space_normal, MapType::WorldSpaceNormal),
        ]
        .into_iter()
        .filter_map(|(off, map)| off.then_some(map))
        .collect()
    }
}

/// Builds the run configuration from the optional file and the flags.
///
/// Output always goes to the lowpoly file's directory in custom mode, with
/// no per-object folder. Object names are filled in after import.
pub fn build_config(args: &BakeArgs) -> Result<BakeConfiguration> {
    let mut config = match &args.config {
        Some(path) => BakeConfiguration::from_file(path)
            .with_context(|| format!("Failed to load bake configuration: {}", path.display()))?,
        None => BakeConfiguration {
            resolution: DEFAULT_RESOLUTION,
            ..BakeConfiguration::default()
        },
    };

    if config.maps.is_empty() {
        config.maps.extend(DEFAULT_MAPS);
    }
    for map in args.disabled_maps() {
        config.maps.remove(&map);
    }

    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }
    if let Some(extrusion) = args.extrusion {
        config.extrusion = extrusion;
    }
    if let Some(format) = args.normal_format {
        config.normal_format = format;
    }
    if args.maya_orientation {
        config.forward_axis = SignedAxis::PosZ;
        config.up_axis = SignedAxis::PosY;
    }

    config.mode = BakeMode::SelectedToActive;
    config.output.mode = OutputMode::Custom;
    config.output.use_custom_path = true;
    config.output.directory = Some(output_directory(&args.lowpoly));
    config.output.use_object_folder = false;

    Ok(config)
}

/// Directory holding the lowpoly file.
pub fn output_directory(lowpoly: &Path) -> PathBuf {
    match lowpoly.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Object name used for a mesh file in dry runs.
fn file_object_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string())
}

fn with_objects(config: &BakeConfiguration, target: &str, source: &str) -> BakeConfiguration {
    let mut config = config.clone();
    config.target_object = Some(target.to_string());
    config.source_object = Some(source.to_string());
    config
}

/// Run the bake command
///
/// # Returns
/// Exit code: 0 if every map was written, 1 otherwise
pub fn run(args: &BakeArgs) -> Result<ExitCode> {
    let mut missing = false;
    for (role, path) in [("lowpoly", &args.lowpoly), ("highpoly", &args.highpoly)] {
        if !path.is_file() {
            eprintln!("{} {} mesh not found: {}", "error:".red().bold(), role, path.display());
            missing = true;
        }
    }
    if missing {
        return Ok(ExitCode::from(1));
    }

    let config = build_config(args)?;

    // Check everything but object names before starting Blender.
    let preview = with_objects(
        &config,
        &file_object_name(&args.lowpoly),
        &file_object_name(&args.highpoly),
    );
    let validation = preview.validate();
    if !validation.ok {
        eprintln!("{}", "Bake configuration is invalid:".red().bold());
        reporting::print_errors(&validation.errors);
        return Ok(ExitCode::from(1));
    }

    if !args.json {
        println!("{} {}", "Lowpoly:".cyan().bold(), args.lowpoly.display());
        println!("{} {}", "Highpoly:".cyan().bold(), args.highpoly.display());
        println!(
            "{} {}",
            "Output:".dimmed(),
            output_directory(&args.lowpoly).display()
        );
        reporting::print_warnings(&validation.warnings);
    }

    if args.dry_run {
        run_dry(args, &config)
    } else {
        run_blender(args, &config)
    }
}

fn run_dry(args: &BakeArgs, config: &BakeConfiguration) -> Result<ExitCode> {
    let low = file_object_name(&args.lowpoly);
    let high = file_object_name(&args.highpoly);

    let mut scene = MemoryScene::new();
    scene.add_object(&high);
    scene.add_object(&low);

    if !args.json {
        println!("{}", "Dry run: no Blender, no files written".yellow());
    }

    let config = with_objects(config, &low, &high);
    let options = RunOptions::new(output_directory(&args.lowpoly)).without_directories();
    let outcome = run_bake(&config, options, &mut scene);
    finish(args, &config, outcome)
}

fn run_blender(args: &BakeArgs, config: &BakeConfiguration) -> Result<ExitCode> {
    let mut orchestrator_config = OrchestratorConfig::default();
    if let Some(path) = &args.blender {
        orchestrator_config = orchestrator_config.blender_path(path);
    }
    let orchestrator = Orchestrator::with_config(orchestrator_config);

    let mut session = orchestrator
        .launch(None)
        .context("Failed to start Blender")?;

    let low = import(&mut session, "lowpoly", &args.lowpoly);
    let high = import(&mut session, "highpoly", &args.highpoly);

    let result = match (&low, &high) {
        (Some(low), Some(high)) => {
            let config = with_objects(config, low.as_str(), high.as_str());
            let options = RunOptions::new(output_directory(&args.lowpoly));
            let outcome = run_bake(&config, options, &mut session);
            Some(finish(args, &config, outcome))
        }
        _ => None,
    };

    cleanup(session, [low, high].into_iter().flatten());

    result.unwrap_or(Ok(ExitCode::from(1)))
}

fn import(session: &mut BlenderSession, role: &str, path: &Path) -> Option<ObjectId> {
    match session.import_mesh(path) {
        Ok(object) => {
            log::info!("imported {} mesh '{}' from {}", role, object, path.display());
            Some(object)
        }
        Err(e) => {
            eprintln!("{} {} mesh: {}", "error:".red().bold(), role, e);
            None
        }
    }
}

/// Removes imported meshes, purges what they left behind and closes Blender.
fn cleanup(mut session: BlenderSession, imported: impl IntoIterator<Item = ObjectId>) {
    for object in imported {
        if let Err(e) = session.remove_object(&object) {
            log::warn!("could not remove imported object '{}': {}", object, e);
        }
    }
    match session.purge_orphans() {
        Ok(count) => log::debug!("purged {} orphan data-blocks", count),
        Err(e) => log::warn!("orphan purge failed: {}", e),
    }
    if let Err(e) = session.quit() {
        log::warn!("Blender did not exit cleanly: {}", e);
    }
}

fn finish(
    args: &BakeArgs,
    config: &BakeConfiguration,
    outcome: Result<BakeReport, xbake_engine::EngineError>,
) -> Result<ExitCode> {
    let report = match outcome {
        Ok(report) => report,
        Err(e) if args.json => BakeReport::failure(config, &e),
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", report.to_json_pretty()?);
    } else {
        reporting::print_report(&report);
    }

    Ok(if report.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        bake: BakeArgs,
    }

    fn parse(args: &[&str]) -> BakeArgs {
        let mut argv = vec![
            "xbake",
            "--lowpoly",
            "assets/rock_low.fbx",
            "--highpoly",
            "assets/rock_high.fbx",
        ];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().bake
    }

    #[test]
    fn test_defaults_bake_five_maps_at_2048() {
        let config = build_config(&parse(&[])).unwrap();
        assert_eq!(config.resolution, 2048);
        assert_eq!(config.maps, DEFAULT_MAPS.into_iter().collect::<BTreeSet<_>>());
        assert_eq!(config.forward_axis, SignedAxis::PosY);
        assert_eq!(config.up_axis, SignedAxis::PosZ);
        assert_eq!(config.mode, BakeMode::SelectedToActive);
    }

    #[test]
    fn test_output_forced_to_lowpoly_directory() {
        let config = build_config(&parse(&[])).unwrap();
        assert_eq!(config.output.mode, OutputMode::Custom);
        assert!(config.output.use_custom_path);
        assert!(!config.output.use_object_folder);
        assert_eq!(config.output.directory, Some(PathBuf::from("assets")));
    }

    #[test]
    fn test_bare_file_name_outputs_to_current_directory() {
        assert_eq!(output_directory(Path::new("rock_low.fbx")), PathBuf::from("."));
    }

    #[test]
    fn test_no_flags_remove_maps() {
        let config = build_config(&parse(&["--no-ao", "--no-world-space-normal"])).unwrap();
        assert_eq!(
            config.maps.iter().copied().collect::<Vec<_>>(),
            vec![MapType::Normal, MapType::Curvature, MapType::Position]
        );
    }

    #[test]
    fn test_flag_overrides() {
        let config = build_config(&parse(&[
            "--resolution",
            "512",
            "--extrusion",
            "0.2",
            "--normal-format",
            "directx",
            "--maya-orientation",
        ]))
        .unwrap();
        assert_eq!(config.resolution, 512);
        assert_eq!(config.extrusion, 0.2);
        assert_eq!(config.normal_format, NormalFormat::DirectX);
        assert_eq!(config.forward_axis, SignedAxis::PosZ);
        assert_eq!(config.up_axis, SignedAxis::PosY);
    }

    #[test]
    fn test_config_file_is_layered_under_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bake.json");
        std::fs::write(
            &path,
            r#"{ "resolution": 1024, "maps": ["normal", "uv"], "curvature_contrast": 0.8 }"#,
        )
        .unwrap();

        let config_arg = path.to_string_lossy().into_owned();
        let config = build_config(&parse(&["--config", &config_arg, "--no-normal"])).unwrap();
        assert_eq!(config.resolution, 1024);
        assert_eq!(config.curvature_contrast, 0.8);
        assert_eq!(config.maps.iter().copied().collect::<Vec<_>>(), vec![MapType::Uv]);
    }

    #[test]
    fn test_unknown_config_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bake.json");
        std::fs::write(&path, r#"{ "resolutoin": 1024 }"#).unwrap();

        let config_arg = path.to_string_lossy().into_owned();
        assert!(build_config(&parse(&["--config", &config_arg])).is_err());
    }

    #[test]
    fn test_invalid_normal_format_is_a_parse_error() {
        let argv = [
            "xbake",
            "--lowpoly",
            "a.fbx",
            "--highpoly",
            "b.fbx",
            "--normal-format",
            "metal",
        ];
        assert!(TestCli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_missing_mesh_exits_with_failure() {
        let args = parse(&["--dry-run"]);
        let code = run(&args).unwrap();
        assert_eq!(code, ExitCode::from(1));
    }

    #[test]
    fn test_dry_run_succeeds_for_existing_meshes() {
        let dir = tempfile::tempdir().unwrap();
        let low = dir.path().join("rock_low.fbx");
        let high = dir.path().join("rock_high.fbx");
        std::fs::write(&low, b"").unwrap();
        std::fs::write(&high, b"").unwrap();

        let low_arg = low.to_string_lossy().into_owned();
        let high_arg = high.to_string_lossy().into_owned();
        let args = TestCli::try_parse_from([
            "xbake",
            "--lowpoly",
            &low_arg,
            "--highpoly",
            &high_arg,
            "--dry-run",
            "--json",
        ])
        .unwrap()
        .bake;

        assert_eq!(run(&args).unwrap(), ExitCode::SUCCESS);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_disabling_every_map_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let low = dir.path().join("rock_low.fbx");
        let high = dir.path().join("rock_high.fbx");
        std::fs::write(&low, b"").unwrap();
        std::fs::write(&high, b"").unwrap();

        let low_arg = low.to_string_lossy().into_owned();
        let high_arg = high.to_string_lossy().into_owned();
        let args = TestCli::try_parse_from([
            "xbake",
            "--lowpoly",
            &low_arg,
            "--highpoly",
            &high_arg,
            "--no-normal",
            "--no-ao",
            "--no-curvature",
            "--no-position",
            "--no-world-space-normal",
            "--dry-run",
        ])
        .unwrap()
        .bake;

        assert_eq!(run(&args).unwrap(), ExitCode::from(1));
    }
}
