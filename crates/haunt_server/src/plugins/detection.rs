//! Detection loop plugin.
//!
//! Polls the distance sensors on a timer, feeds the readings to the
//! detection state machine and launches the selected scene as a background
//! task when a visitor comes close enough.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy::prelude::*;
use bevy::time::common_conditions::on_timer;
use bevy_tokio_tasks::TokioTasksRuntime;
use haunt::actuators::Rgb;
use haunt::detection::read_shortest_distance;
use haunt::{
    DetectionMode, DetectionState, DistanceSensor, Observation, SceneOutcome, SceneReport,
    SceneRunner, SceneSelector, Suppression,
};
use haunt_common::{DetectionConfig, SceneDocument};

// ============================================================================
// Resources
// ============================================================================

/// The configured distance sensors.
#[derive(Resource)]
pub struct Sensors(pub Vec<Box<dyn DistanceSensor>>);

/// Everything a trigger needs to run a scene.
#[derive(Resource, Clone)]
pub struct SceneEngine {
    pub runner: Arc<SceneRunner>,
    pub document: Arc<SceneDocument>,
    pub selector: SceneSelector,
}

#[derive(Resource, Deref, DerefMut)]
pub struct Detector(pub DetectionState);

/// Present once the startup scene (if any) has finished.
#[derive(Resource)]
pub struct DetectionArmed;

// ============================================================================
// Plugin
// ============================================================================

/// Requires [`Sensors`], [`SceneEngine`] and [`DetectionConfig`] to be
/// inserted before the app runs.
pub struct DetectionPlugin {
    pub poll_interval: Duration,
}

impl DetectionPlugin {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
        }
    }
}

impl Plugin for DetectionPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, (init_detector, run_startup_scene).chain());
        app.add_systems(
            Update,
            poll_sensors
                .run_if(resource_exists::<DetectionArmed>)
                .run_if(on_timer(self.poll_interval)),
        );
    }
}

// ============================================================================
// Systems
// ============================================================================

fn init_detector(mut commands: Commands, config: Res<DetectionConfig>, engine: Res<SceneEngine>) {
    let cooldown = engine.document.settings.cooldown();
    commands.insert_resource(Detector(DetectionState::new(&config, cooldown)));
    info!(
        near = config.distance_threshold_near,
        far = config.distance_threshold_far,
        cooldown_secs = cooldown.as_secs_f64(),
        "detection configured"
    );
}

/// Run the startup scene, if one is configured, then arm detection.
fn run_startup_scene(
    tokio: Res<TokioTasksRuntime>,
    engine: Res<SceneEngine>,
    config: Res<DetectionConfig>,
) {
    let engine = engine.clone();
    let mode_lights = config.mode_lights;

    tokio.spawn_background_task(move |mut ctx| async move {
        if let Some(name) = engine.document.settings.startup_scene.clone() {
            info!(scene = %name, "running startup scene");
            let report = engine.runner.run_named(&engine.document, &name).await;
            log_report(&report);
        }
        if mode_lights {
            set_mode_color(&engine.runner, DetectionMode::Idle.color()).await;
        }

        ctx.run_on_main_thread(move |ctx| {
            ctx.world.insert_resource(DetectionArmed);
        })
        .await;
        info!("detection armed");
    });
}

fn poll_sensors(
    tokio: Res<TokioTasksRuntime>,
    mut sensors: ResMut<Sensors>,
    mut detector: ResMut<Detector>,
    engine: Res<SceneEngine>,
    config: Res<DetectionConfig>,
) {
    let distance = read_shortest_distance(&mut sensors.0);
    let scene_running = engine.runner.is_running();
    let observation = detector.observe(distance, Instant::now(), scene_running);

    match distance {
        Some(d) => trace!(distance = d, mode = %detector.mode(), "sensor poll"),
        None => trace!("sensor poll, no valid reading"),
    }
    if let Some((from, to)) = observation.transition {
        info!(%from, %to, distance, "detection mode changed");
    }
    match observation.suppressed {
        Some(Suppression::SceneRunning) => debug!("trigger ignored, scene still running"),
        Some(Suppression::Cooldown { remaining }) => {
            debug!(remaining_secs = remaining.as_secs_f64(), "trigger ignored, cooling down")
        }
        None => {}
    }

    if let Some(color) = mode_light_color(&observation, config.mode_lights, scene_running) {
        let runner = engine.runner.clone();
        tokio.spawn_background_task(move |_| async move {
            set_mode_color(&runner, color).await;
        });
    }

    if observation.trigger {
        launch_scene(&tokio, &engine);
    }
}

/// Pick a scene and run it in the background. Completion is written back to
/// the [`Detector`] so the cooldown restarts from the end of the scene.
fn launch_scene(tokio: &TokioTasksRuntime, engine: &SceneEngine) {
    let Some(name) = engine
        .selector
        .pick(&mut rand::thread_rng())
        .map(str::to_string)
    else {
        warn!("visitor detected but no scene is eligible");
        return;
    };
    info!(scene = %name, "visitor detected, starting scene");

    let runner = engine.runner.clone();
    let document = engine.document.clone();
    tokio.spawn_background_task(move |mut ctx| async move {
        let report = runner.run_named(&document, &name).await;
        log_report(&report);

        ctx.run_on_main_thread(move |ctx| finish_scene(ctx.world, Instant::now()))
            .await;
    });
}

/// Restart the cooldown from the end of a scene.
fn finish_scene(world: &mut World, now: Instant) {
    if let Some(mut detector) = world.get_resource_mut::<Detector>() {
        detector.scene_finished(now);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Color to show for a mode change, if the light should follow it.
///
/// A trigger hands the light to the scene, so only changes that do not
/// start a scene recolor it.
fn mode_light_color(
    observation: &Observation,
    mode_lights: bool,
    scene_running: bool,
) -> Option<Rgb> {
    if !mode_lights || scene_running || observation.trigger {
        return None;
    }
    observation.transition.map(|(_, to)| to.color())
}

async fn set_mode_color(runner: &SceneRunner, color: Rgb) {
    let Some(light) = runner.registry().light() else {
        return;
    };
    if let Err(e) = light.set_rgb(color).await {
        warn!(light = light.name(), error = %e, "failed to show detection mode");
    }
}

/// Summarize a finished scene.
pub fn log_report(report: &SceneReport) {
    let elapsed_secs = report.elapsed.as_secs_f64();
    match &report.outcome {
        SceneOutcome::Completed => info!(
            scene = %report.scene,
            steps = report.steps_run,
            elapsed_secs,
            "scene finished"
        ),
        SceneOutcome::Failed { steps } => {
            for step in steps {
                for failure in &step.failures {
                    warn!(
                        scene = %report.scene,
                        step = step.step,
                        effect = %failure.effect,
                        target = %failure.target,
                        reason = %failure.reason,
                        "effect failed"
                    );
                }
            }
            warn!(
                scene = %report.scene,
                failed_steps = steps.len(),
                elapsed_secs,
                "scene finished with failures"
            );
        }
        SceneOutcome::Aborted { fault, cleanup } => error!(
            scene = %report.scene,
            step = fault.step,
            target = %fault.target,
            reason = %fault.reason,
            cleanup_failures = cleanup.failures.len(),
            "scene aborted"
        ),
        SceneOutcome::Busy => warn!(scene = %report.scene, "scene skipped, runner busy"),
        SceneOutcome::Closed => info!(scene = %report.scene, "scene skipped, shutting down"),
        SceneOutcome::NotFound => error!(scene = %report.scene, "scene not found"),
    }
}
