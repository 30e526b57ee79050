//! haunt: controller for a motion-triggered animatronic prop.
//!
//! # Architecture
//! - `run` is a headless Bevy app; detection and shutdown are plugins
//! - scenes run on the tokio runtime owned by `bevy_tokio_tasks`
//! - the other commands are one-shot operator tools on a plain tokio runtime

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_tokio_tasks::TokioTasksPlugin;
use clap::{Parser, Subcommand};
use haunt::{EmergencyCleanup, HardwareRegistry, SceneRunner, SceneSelector};
use haunt_common::{LoggingConfig, SceneDocument, SceneSection, SystemConfig};
use haunt::sim::EventLog;
use haunt_devices::{Hardware, build_hardware};
use tracing_subscriber::EnvFilter;

mod plugins;

use plugins::detection::log_report;
use plugins::{DetectionPlugin, SceneEngine, Sensors, ShutdownPlugin};

#[derive(Parser)]
#[command(name = "haunt", about = "Scene controller for a motion-triggered animatronic prop")]
struct Cli {
    /// System configuration file.
    #[arg(long, default_value = "configs.yaml")]
    config: PathBuf,

    /// Scene document.
    #[arg(long, default_value = "scenes.yaml")]
    scenes: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the sensors and run scenes when someone approaches.
    Run,
    /// Run one scene by name, then clean up.
    Scene {
        /// Key of the scene in the scene document.
        name: String,
    },
    /// List the available scenes and selection settings.
    List,
    /// Run one random non-test scene, then clean up.
    Random,
    /// Put every actuator in its safe state.
    Cleanup,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Run => run_detection(&cli),
        Command::Scene { name } => run_once(&cli, Some(name.as_str())),
        Command::Random => run_once(&cli, None),
        Command::List => list_scenes(&cli),
        Command::Cleanup => run_cleanup(&cli),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn run_detection(cli: &Cli) -> Result<ExitCode> {
    let (config, document) = load(cli)?;
    let hardware = build_hardware(&config.hardware).context("hardware initialization failed")?;
    hardware.require_sensors()?;

    let selector = SceneSelector::from_document(&document);
    let engine = SceneEngine {
        runner: scene_runner(hardware.registry, &document),
        document: Arc::new(document),
        selector,
    };

    let mut app = App::new();

    // Headless, 60Hz
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))),
        LogPlugin {
            filter: config.logging.level.clone(),
            ..default()
        },
    ));
    app.add_plugins(TokioTasksPlugin::default());

    app.insert_resource(config.detection.clone());
    app.insert_resource(Sensors(hardware.sensors));
    app.insert_resource(engine);
    app.add_plugins((DetectionPlugin::new(&config.detection), ShutdownPlugin));

    Ok(match app.run() {
        AppExit::Success => ExitCode::SUCCESS,
        AppExit::Error(code) => ExitCode::from(code.get()),
    })
}

/// Run a named scene, or a random one when `name` is `None`.
fn run_once(cli: &Cli, name: Option<&str>) -> Result<ExitCode> {
    let (config, document) = load(cli)?;
    init_tracing(&config.logging);

    let name = match name {
        Some(name) => name.to_string(),
        None => match SceneSelector::any_scene(&document).pick(&mut rand::thread_rng()) {
            Some(name) => name.to_string(),
            None => bail!("no non-test scenes in {}", cli.scenes.display()),
        },
    };
    if document.scene(&name).is_none() {
        bail!("scene '{name}' not found in {}", cli.scenes.display());
    }

    let Hardware {
        registry, history, ..
    } = build_hardware(&config.hardware).context("hardware initialization failed")?;
    let runner = scene_runner(registry, &document);

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let report = runtime.block_on(async {
        let report = runner.run_named(&document, &name).await;
        runner.emergency_cleanup().await;
        report
    });
    log_report(&report);
    log_history(&history);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_cleanup(cli: &Cli) -> Result<ExitCode> {
    let (config, document) = load(cli)?;
    init_tracing(&config.logging);

    let hardware = build_hardware(&config.hardware).context("hardware initialization failed")?;
    let runner = scene_runner(hardware.registry, &document);

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let report = runtime.block_on(runner.emergency_cleanup());

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list_scenes(cli: &Cli) -> Result<ExitCode> {
    let document = SceneDocument::load(&cli.scenes)
        .with_context(|| format!("failed to load scenes from {}", cli.scenes.display()))?;
    let settings = &document.settings;

    let mut section = None;
    for (key, scene, in_section) in document.iter() {
        if section != Some(in_section) {
            section = Some(in_section);
            println!(
                "{}:",
                match in_section {
                    SceneSection::Main => "Scenes",
                    SceneSection::Alternative => "Alternative sequences",
                }
            );
        }
        let test = if settings.is_test_scene(key) { " [test]" } else { "" };
        println!(
            "  {key}{test}: {} ({} steps, {:.1}s minimum)",
            scene.name,
            scene.steps.len(),
            scene.minimum_runtime().as_secs_f64()
        );
        if !scene.description.is_empty() {
            println!("      {}", scene.description);
        }
    }

    println!();
    if settings.random_scene_mode {
        let pool = match SceneSelector::from_document(&document) {
            SceneSelector::Random(pool) => pool,
            SceneSelector::Fixed(name) => vec![name],
        };
        println!("Random mode: on, choosing from {}", pool.join(", "));
    } else {
        println!("Random mode: off, default scene {}", settings.default_scene);
    }
    println!("Cooldown: {:.1}s", settings.cooldown().as_secs_f64());
    if let Some(startup) = &settings.startup_scene {
        println!("Startup scene: {startup}");
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Setup
// ============================================================================

fn load(cli: &Cli) -> Result<(SystemConfig, SceneDocument)> {
    let config = SystemConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let document = SceneDocument::load(&cli.scenes)
        .with_context(|| format!("failed to load scenes from {}", cli.scenes.display()))?;
    Ok((config, document))
}

fn scene_runner(registry: HardwareRegistry, document: &SceneDocument) -> Arc<SceneRunner> {
    Arc::new(SceneRunner::new(
        Arc::new(registry),
        EmergencyCleanup::from_config(&document.error_handling),
    ))
}

/// Replay what the simulated drivers did, relative to the first event.
fn log_history(history: &EventLog) {
    let events = history.events();
    let Some(first) = events.first().map(|r| r.at) else {
        return;
    };
    for recorded in &events {
        debug!(
            device = %recorded.device,
            event = ?recorded.event,
            at_secs = (recorded.at - first).as_secs_f64(),
            "simulated activity"
        );
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
