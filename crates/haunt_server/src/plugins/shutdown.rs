//! Ctrl-C handling: stop the running scene, leave the prop in a safe state,
//! then stop the app.

use bevy::prelude::*;
use bevy_tokio_tasks::TokioTasksRuntime;

use super::detection::SceneEngine;

pub struct ShutdownPlugin;

impl Plugin for ShutdownPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, listen_for_interrupt);
        app.add_systems(
            Update,
            exit_after_cleanup.run_if(resource_exists::<ShutdownRequested>),
        );
    }
}

/// Inserted once the runner has shut down and cleanup has run.
#[derive(Resource)]
pub struct ShutdownRequested;

fn listen_for_interrupt(tokio: Res<TokioTasksRuntime>, engine: Res<SceneEngine>) {
    let runner = engine.runner.clone();

    tokio.spawn_background_task(move |mut ctx| async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            return;
        }
        info!("interrupt received, shutting down");
        if runner.is_running() {
            warn!(state = ?runner.state(), "interrupting running scene");
        }

        let cleanup = runner.shutdown().await;
        if !cleanup.is_clean() {
            warn!(failures = cleanup.failures.len(), "prop may not be in a safe state");
        }

        ctx.run_on_main_thread(move |ctx| {
            ctx.world.insert_resource(ShutdownRequested);
        })
        .await;
    });
}

fn exit_after_cleanup(mut exit: MessageWriter<AppExit>) {
    exit.write(AppExit::Success);
}
