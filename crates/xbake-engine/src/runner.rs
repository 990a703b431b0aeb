//! Bake job runner.
//!
//! A run executes one job per enabled map type, strictly in order, one
//! blocking renderer call at a time. Each job walks the states
//!
//! ```text
//! Idle → Preparing → [GraphBuilding] → Baking → Saving → Restoring → Preparing(next) | Idle
//! ```
//!
//! Everything a job changes in the scene is pushed onto that job's undo
//! stack as it happens. `Restoring` replays the stack in reverse and runs
//! exactly once per job, whether the job succeeded or failed, so temporary
//! materials, images, bake nodes, transforms and visibility never outlive
//! their job. The first failing job stops the queue; run-level state (lit
//! phase duplicates, fallback material, selection, render engine) is then
//! restored before the error is returned.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use xbake_spec::{
    resolve_or_fallback, AxisAssignment, BakeConfiguration, DerivedChannel, MapType,
    ObjectNames, ValidationResult,
};

use crate::error::{EngineError, EngineResult, HostError};
use crate::graph::DerivedChannelGraph;
use crate::normalize::TransformLedger;
use crate::plan::{plan_jobs, BakeJob};
use crate::report::{BakeReport, BakedMap};
use crate::selection::{SceneObjects, SelectionManager};
use crate::session::{
    BakeSession, ImageId, ImageSpec, MaterialId, NodeId, ObjectId, PassSettings, SceneHost,
    Selection, PATH_TRACING_ENGINE,
};

/// Neutral grey the curvature image starts from.
pub const CURVATURE_FILL: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Runner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "map_type", rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    Preparing(MapType),
    GraphBuilding(MapType),
    Baking(MapType),
    Saving(MapType),
    Restoring(MapType),
}

/// Options that are not part of the bake configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root for automatic and project-relative output paths.
    pub project_root: PathBuf,
    /// Create output directories before saving.
    pub create_directories: bool,
}

impl RunOptions {
    /// Options for a run rooted at `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            create_directories: true,
        }
    }

    /// Skips directory creation.
    pub fn without_directories(mut self) -> Self {
        self.create_directories = false;
        self
    }
}

/// One reversible scene change.
#[derive(Debug)]
enum Undo {
    RemoveImage(ImageId),
    DetachBakeTarget(MaterialId, NodeId),
    RemoveMaterial(MaterialId),
    /// Puts back every slot the object had.
    RestoreMaterialSlots {
        object: ObjectId,
        slots: Vec<Option<MaterialId>>,
    },
    RevertTransform(ObjectId),
    SetHideRender(ObjectId, bool),
    RestoreSelection(Selection),
    ConfigurePass(PassSettings),
    SetRenderEngine(String),
}

/// Undo stack, replayed in reverse.
#[derive(Debug, Default)]
struct UndoStack {
    actions: Vec<Undo>,
}

impl UndoStack {
    fn push(&mut self, action: Undo) {
        self.actions.push(action);
    }

    fn unwind<S: BakeSession + ?Sized>(
        &mut self,
        session: &mut S,
        ledger: &mut TransformLedger,
    ) -> Vec<HostError> {
        let mut errors = Vec::new();
        while let Some(action) = self.actions.pop() {
            log::debug!("restore: {:?}", action);
            let result = match &action {
                Undo::RemoveImage(image) => session.remove_image(image),
                Undo::DetachBakeTarget(material, node) => session.detach_bake_target(material, node),
                Undo::RemoveMaterial(material) => session.remove_material(material),
                Undo::RestoreMaterialSlots { object, slots } => {
                    restore_material_slots(session, object, slots)
                }
                Undo::RevertTransform(object) => ledger.revert(session, object).map(|_| ()),
                Undo::SetHideRender(object, hidden) => session.set_hide_render(object, *hidden),
                Undo::RestoreSelection(selection) => session.select(selection),
                Undo::ConfigurePass(settings) => session.configure_pass(settings),
                Undo::SetRenderEngine(engine) => session.set_render_engine(engine),
            };
            if let Err(e) = result {
                log::error!("restore step {:?} failed: {}", action, e);
                errors.push(e);
            }
        }
        errors
    }
}

/// State shared by the jobs of one run.
struct RunContext {
    objects: SelectionManager,
    ledger: TransformLedger,
    axes: AxisAssignment,
    base: PassSettings,
    target_name: String,
}

/// Sequences the bake jobs of one configuration.
pub struct BakeJobRunner<'a> {
    config: &'a BakeConfiguration,
    options: RunOptions,
    state: RunnerState,
    history: Vec<RunnerState>,
}

impl<'a> BakeJobRunner<'a> {
    /// Creates a runner for a configuration.
    pub fn new(config: &'a BakeConfiguration, options: RunOptions) -> Self {
        Self {
            config,
            options,
            state: RunnerState::Idle,
            history: vec![RunnerState::Idle],
        }
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[RunnerState] {
        &self.history
    }

    fn enter(&mut self, state: RunnerState) {
        log::debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    /// Validates the configuration and resolves the object names it
    /// references without touching the scene.
    pub fn check(&self) -> EngineResult<ValidationResult> {
        let validation = self.config.validate();
        if !validation.is_ok() {
            return Err(EngineError::InvalidConfiguration(validation.errors));
        }
        Ok(validation)
    }

    /// Runs every job.
    ///
    /// Configuration errors and missing objects are reported before the
    /// scene is modified. On any later failure the scene is restored and a
    /// [`EngineError::JobFailed`] identifying the job is returned.
    pub fn run<S: BakeSession + ?Sized>(&mut self, session: &mut S) -> EngineResult<BakeReport> {
        let started = Instant::now();
        let validation = self.check()?;
        let config = self.config;

        let (source, target, cage) = resolve_objects(config, session)?;
        let names = ObjectNames {
            source: source.as_ref().map(|s| s.to_string()),
            target: target.to_string(),
        };
        let jobs = plan_jobs(config, &names, &self.options.project_root);

        let mut report = BakeReport::new(config);
        for warning in &validation.warnings {
            log::warn!("{}", warning);
            report.warn(warning.to_string());
        }

        let axes = if config.maps.iter().any(|m| m.is_axis_dependent()) {
            resolve_or_fallback(config.forward_axis, config.up_axis).0
        } else {
            AxisAssignment::identity()
        };

        let base = base_pass_settings(config, cage.clone());
        let mut run_undo = UndoStack::default();
        let mut ctx = match self.setup(session, &mut run_undo, source, target, cage, axes, base) {
            Ok(ctx) => ctx,
            Err(err) => {
                let mut ledger = TransformLedger::new();
                let teardown = run_undo.unwind(session, &mut ledger);
                for e in teardown {
                    log::error!("setup rollback: {}", e);
                }
                return Err(err);
            }
        };

        let total = jobs.len();
        let mut failure = None;
        for job in &jobs {
            log::info!(
                "[{}/{}] baking {} -> {}",
                job.index + 1,
                total,
                job.map_type,
                job.path().display()
            );
            let (result, teardown) = self.run_job(session, &mut ctx, job);
            match result {
                Ok(map) => {
                    if !teardown.is_empty() {
                        failure = Some(EngineError::JobFailed {
                            map_type: job.map_type,
                            index: job.index,
                            total,
                            source: Box::new(EngineError::RestoreFailed(teardown)),
                            teardown: Vec::new(),
                        });
                        break;
                    }
                    log::info!("[{}/{}] {} done", job.index + 1, total, job.map_type);
                    report.push_map(map);
                }
                Err(err) => {
                    log::error!("{} bake failed: {}", job.map_type, err);
                    failure = Some(EngineError::JobFailed {
                        map_type: job.map_type,
                        index: job.index,
                        total,
                        source: Box::new(err),
                        teardown,
                    });
                    break;
                }
            }
        }

        let mut teardown = ctx.objects.finish(session);
        teardown.extend(run_undo.unwind(session, &mut ctx.ledger));
        match session.purge_orphans() {
            Ok(purged) => log::debug!("purged {} orphan data blocks", purged),
            Err(e) => teardown.push(e),
        }
        self.enter(RunnerState::Idle);

        if let Some(mut err) = failure {
            if let EngineError::JobFailed {
                teardown: ref mut job_teardown,
                ..
            } = err
            {
                job_teardown.extend(teardown);
            }
            return Err(err);
        }
        if !teardown.is_empty() {
            return Err(EngineError::RestoreFailed(teardown));
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Run-level changes: render engine, fallback material, base pass.
    #[allow(clippy::too_many_arguments)]
    fn setup<S: BakeSession + ?Sized>(
        &mut self,
        session: &mut S,
        undo: &mut UndoStack,
        source: Option<ObjectId>,
        target: ObjectId,
        cage: Option<ObjectId>,
        axes: AxisAssignment,
        base: PassSettings,
    ) -> EngineResult<RunContext> {
        let objects = SelectionManager::new(session, source, target.clone(), cage)?;

        let engine = session.render_engine()?;
        if engine != PATH_TRACING_ENGINE {
            session.set_render_engine(PATH_TRACING_ENGINE)?;
            undo.push(Undo::SetRenderEngine(engine));
        }

        let slots = session.material_slots(&target)?;
        if slots.first().map_or(true, Option::is_none) {
            let name = format!("{}_Material", target);
            let material = session.create_material(&name)?;
            undo.push(Undo::RemoveMaterial(material.clone()));
            undo.push(Undo::RestoreMaterialSlots {
                object: target.clone(),
                slots,
            });
            session.set_material_slot(&target, 0, Some(&material))?;
            log::info!("created fallback material {} for {}", material, target);
        }

        session.configure_pass(&base)?;

        Ok(RunContext {
            objects,
            ledger: TransformLedger::new(),
            axes,
            base,
            target_name: target.to_string(),
        })
    }

    /// Runs one job and its `Restoring` step. Returns the job result and
    /// any restore failures.
    fn run_job<S: BakeSession + ?Sized>(
        &mut self,
        session: &mut S,
        ctx: &mut RunContext,
        job: &BakeJob,
    ) -> (EngineResult<BakedMap>, Vec<HostError>) {
        let mut undo = UndoStack::default();
        let result = self.execute_job(session, ctx, job, &mut undo);
        self.enter(RunnerState::Restoring(job.map_type));
        let teardown = undo.unwind(session, &mut ctx.ledger);
        (result, teardown)
    }

    fn execute_job<S: BakeSession + ?Sized>(
        &mut self,
        session: &mut S,
        ctx: &mut RunContext,
        job: &BakeJob,
        undo: &mut UndoStack,
    ) -> EngineResult<BakedMap> {
        let map_type = job.map_type;
        let config = self.config;
        self.enter(RunnerState::Preparing(map_type));

        let objects = ctx.objects.prepare_for_phase(session, job.lit)?;
        let selected_to_active = config.is_selected_to_active() && objects.source.is_some();

        let settings = job_pass_settings(&ctx.base, job, config, selected_to_active);
        if settings != ctx.base {
            session.configure_pass(&settings)?;
            undo.push(Undo::ConfigurePass(ctx.base.clone()));
        }

        let baked = BakedMap {
            map_type,
            path: job.path(),
            resolution: [config.resolution, config.resolution],
            bit_depth: job.bit_depth,
        };

        let Some(pass) = job.pass else {
            // UV layout: exported, not baked
            self.enter(RunnerState::Baking(map_type));
            let previous = session.selection()?;
            session.select(&Selection::new(Vec::new(), objects.target.clone()))?;
            undo.push(Undo::RestoreSelection(previous));
            self.enter(RunnerState::Saving(map_type));
            self.ensure_directory(job)?;
            session.export_uv_layout(
                &objects.target,
                &job.path(),
                config.resolution,
                config.uv_opacity,
            )?;
            return Ok(baked);
        };

        if let Some(channel) = job.derived {
            self.enter(RunnerState::GraphBuilding(map_type));
            self.build_graph(session, ctx, &objects, channel, selected_to_active, undo)?;
        }
        let bake_materials = target_materials(session, &objects.target)?;

        self.enter(RunnerState::Baking(map_type));
        let image = session.create_image(&ImageSpec::square(
            format!("{}_{}", ctx.target_name, map_type.tag()),
            config.resolution,
        ))?;
        undo.push(Undo::RemoveImage(image.clone()));
        if map_type == MapType::Curvature {
            session.fill_image(&image, CURVATURE_FILL)?;
        }
        // every material on the target needs the image as its active node
        for material in bake_materials {
            let node = session.attach_bake_target(&material, &image)?;
            undo.push(Undo::DetachBakeTarget(material, node));
        }

        session.execute_bake(pass, &image)?;

        self.enter(RunnerState::Saving(map_type));
        self.ensure_directory(job)?;
        session.save_image(&image, &job.path(), job.bit_depth)?;
        Ok(baked)
    }

    /// Builds the derived-channel graph and assigns it to every slot of the
    /// emitting object, so all of its faces emit the channel.
    fn build_graph<S: BakeSession + ?Sized>(
        &mut self,
        session: &mut S,
        ctx: &mut RunContext,
        objects: &SceneObjects,
        channel: DerivedChannel,
        selected_to_active: bool,
        undo: &mut UndoStack,
    ) -> EngineResult<()> {
        let graph =
            DerivedChannelGraph::for_channel(channel, self.config.curvature_contrast, &ctx.axes);

        // position is baked on the target alone; the other channels are
        // emitted by the source when projecting
        let emitter = match (channel, &objects.source) {
            (DerivedChannel::Position, _) => objects.target.clone(),
            (_, Some(source)) if selected_to_active => source.clone(),
            _ => objects.target.clone(),
        };

        let name = format!("{}_{}", ctx.target_name, channel_material_suffix(channel));
        let material = session.create_graph_material(&name, &graph)?;
        undo.push(Undo::RemoveMaterial(material.clone()));

        let slots = session.material_slots(&emitter)?;
        let count = slots.len().max(1);
        undo.push(Undo::RestoreMaterialSlots {
            object: emitter.clone(),
            slots,
        });
        for slot in 0..count {
            session.set_material_slot(&emitter, slot, Some(&material))?;
        }

        if channel == DerivedChannel::Position {
            ctx.ledger.normalize(session, &objects.target)?;
            undo.push(Undo::RevertTransform(objects.target.clone()));

            if let Some(source) = objects.source.as_ref().filter(|_| selected_to_active) {
                let hidden = session.hide_render(source)?;
                session.set_hide_render(source, true)?;
                undo.push(Undo::SetHideRender(source.clone(), hidden));

                let previous = session.selection()?;
                session.select(&Selection::new(Vec::new(), objects.target.clone()))?;
                undo.push(Undo::RestoreSelection(previous));
            }
        }
        Ok(())
    }

    fn ensure_directory(&self, job: &BakeJob) -> Result<(), HostError> {
        if self.options.create_directories {
            job.output.create_dir()?;
        }
        Ok(())
    }
}

fn resolve_objects<S: SceneHost + ?Sized>(
    config: &BakeConfiguration,
    session: &mut S,
) -> EngineResult<(Option<ObjectId>, ObjectId, Option<ObjectId>)> {
    let find = |session: &mut S, role: &'static str, name: &str| -> EngineResult<ObjectId> {
        session
            .find_object(name)?
            .ok_or_else(|| EngineError::ObjectNotFound {
                role,
                name: name.to_string(),
            })
    };

    // validation guarantees the names are present
    let target_name = config.target_object.as_deref().unwrap_or_default();
    let target = find(session, "target", target_name)?;

    let source = match config.active_source() {
        Some(name) => Some(find(session, "source", name)?),
        None => None,
    };

    let cage = match (&config.cage.object, config.cage.enabled, config.is_selected_to_active()) {
        (Some(name), true, true) => Some(find(session, "cage", name)?),
        _ => None,
    };

    Ok((source, target, cage))
}

fn channel_material_suffix(channel: DerivedChannel) -> &'static str {
    match channel {
        DerivedChannel::Curvature => "Curvature",
        DerivedChannel::WorldSpaceNormal => "WSN",
        DerivedChannel::Position => "Position",
    }
}

fn base_pass_settings(config: &BakeConfiguration, cage: Option<ObjectId>) -> PassSettings {
    PassSettings {
        resolution: config.resolution,
        margin: config.margin_pixels(),
        margin_mode: config.margin_mode,
        selected_to_active: config.is_selected_to_active(),
        cage,
        extrusion: config.extrusion,
        max_ray_distance: config.max_ray_distance,
        lighting: config.lighting,
        normal_green: config.normal_format.green_axis(),
        clear_image: true,
    }
}

fn job_pass_settings(
    base: &PassSettings,
    job: &BakeJob,
    config: &BakeConfiguration,
    selected_to_active: bool,
) -> PassSettings {
    let mut settings = base.clone();
    settings.selected_to_active = selected_to_active;
    if job.map_type == MapType::Normal {
        settings.normal_green = config.normal_format.green_axis();
    }
    if let Some(channel) = job.derived {
        settings.lighting = xbake_spec::LightingContributions::color_only();
        match channel {
            DerivedChannel::Curvature => settings.clear_image = false,
            DerivedChannel::Position => settings.selected_to_active = false,
            DerivedChannel::WorldSpaceNormal => {}
        }
    }
    settings
}

/// Distinct materials in the object's slots, in slot order.
fn target_materials<S: SceneHost + ?Sized>(
    session: &mut S,
    object: &ObjectId,
) -> EngineResult<Vec<MaterialId>> {
    let mut materials: Vec<MaterialId> = Vec::new();
    for material in session.material_slots(object)?.into_iter().flatten() {
        if !materials.contains(&material) {
            materials.push(material);
        }
    }
    if materials.is_empty() {
        return Err(HostError::operation("bake", format!("{} has no material", object)).into());
    }
    Ok(materials)
}

fn restore_material_slots<S: SceneHost + ?Sized>(
    session: &mut S,
    object: &ObjectId,
    slots: &[Option<MaterialId>],
) -> Result<(), HostError> {
    session.clear_material_slots(object)?;
    for (index, material) in slots.iter().enumerate() {
        session.set_material_slot(object, index, material.as_ref())?;
    }
    Ok(())
}

/// Validates `config` and runs it against `session`.
pub fn run_bake<S: BakeSession + ?Sized>(
    config: &BakeConfiguration,
    options: RunOptions,
    session: &mut S,
) -> EngineResult<BakeReport> {
    BakeJobRunner::new(config, options).run(session)
}
