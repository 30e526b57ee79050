//! Scene execution.
//!
//! A [`SceneRunner`] runs one scene at a time. Each step dispatches its
//! effects, then dwells for at least the step duration measured from when
//! dispatch began. Dispatch failures are reported and the scene continues;
//! a hardware fault or panic aborts the scene and runs emergency cleanup
//! immediately. [`SceneRunner::abort`] and [`SceneRunner::shutdown`] stop a
//! scene from outside the same way.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use haunt_common::{LogLevel, Scene, SceneDocument, Step};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cleanup::{CleanupReport, EmergencyCleanup};
use crate::dispatcher::{DispatchFailure, EffectDispatcher};
use crate::registry::HardwareRegistry;
use crate::tasks::{EffectFault, EffectTasks};

// ============================================================================
// Reports
// ============================================================================

/// Lifecycle of the runner's most recent scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Running { scene: String, step: u32 },
    Completed { scene: String },
    Aborted { scene: String, step: u32 },
}

/// Dispatch failures of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: u32,
    pub failures: Vec<DispatchFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneOutcome {
    /// Every step ran and every effect was dispatched
    Completed,
    /// Every step ran but some effects could not be dispatched
    Failed { steps: Vec<StepFailure> },
    /// An unrecoverable fault stopped the scene; cleanup has run
    Aborted {
        fault: EffectFault,
        cleanup: CleanupReport,
    },
    /// Another scene was running; nothing was done
    Busy,
    /// The runner has been shut down; nothing was done
    Closed,
    /// No scene with that name exists
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneReport {
    pub scene: String,
    pub outcome: SceneOutcome,
    /// Steps started, including an aborted one
    pub steps_run: usize,
    pub elapsed: Duration,
}

impl SceneReport {
    fn immediate(scene: &str, outcome: SceneOutcome) -> Self {
        Self {
            scene: scene.to_string(),
            outcome,
            steps_run: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == SceneOutcome::Completed
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Target recorded in the report of a run stopped by [`SceneRunner::abort`].
pub const ABORT_TARGET: &str = "runner";

/// Holds the run flag for the duration of a scene.
struct RunGuard<'a> {
    runner: &'a SceneRunner,
    id: u64,
}

impl<'a> RunGuard<'a> {
    fn acquire(runner: &'a SceneRunner) -> Option<Self> {
        runner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let id = runner.current_run.fetch_add(1, Ordering::AcqRel) + 1;
        Some(RunGuard { runner, id })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runner.running.store(false, Ordering::Release);
        self.runner.finished.notify_waiters();
    }
}

pub struct SceneRunner {
    registry: Arc<HardwareRegistry>,
    cleanup: EmergencyCleanup,
    state: Mutex<RunState>,
    running: AtomicBool,
    /// Id of the latest run; ids start at 1
    current_run: AtomicU64,
    /// Id of the run asked to abort, 0 for none
    abort_target: AtomicU64,
    abort_signal: Notify,
    finished: Notify,
    closed: AtomicBool,
    /// Cleanup report of the last aborted run
    last_cleanup: Mutex<Option<CleanupReport>>,
}

impl SceneRunner {
    pub fn new(registry: Arc<HardwareRegistry>, cleanup: EmergencyCleanup) -> Self {
        Self {
            registry,
            cleanup,
            state: Mutex::new(RunState::Idle),
            running: AtomicBool::new(false),
            current_run: AtomicU64::new(0),
            abort_target: AtomicU64::new(0),
            abort_signal: Notify::new(),
            finished: Notify::new(),
            closed: AtomicBool::new(false),
            last_cleanup: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<HardwareRegistry> {
        &self.registry
    }

    pub fn state(&self) -> RunState {
        self.state.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run emergency cleanup outside of a scene (manual command).
    pub async fn emergency_cleanup(&self) -> CleanupReport {
        self.cleanup.run(&self.registry).await
    }

    /// Ask the running scene to stop.
    ///
    /// The scene stops before its next step or during its current dwell,
    /// ends as [`SceneOutcome::Aborted`] and runs emergency cleanup once.
    /// Returns `false` if no scene was running.
    pub fn abort(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        let run = self.current_run.load(Ordering::Acquire);
        self.abort_target.store(run, Ordering::Release);
        self.abort_signal.notify_waiters();
        info!(run, "scene abort requested");
        true
    }

    /// Stop accepting scenes, abort the running one and leave the prop safe.
    ///
    /// Cleanup runs exactly once: inside the aborted scene, or here when no
    /// scene was running.
    pub async fn shutdown(&self) -> CleanupReport {
        let finished = self.finished.notified();
        let was_running = self.is_running();
        self.closed.store(true, Ordering::Release);

        if self.abort() || was_running {
            finished.await;
            if let Some(report) = self.last_cleanup.lock().take() {
                return report;
            }
        }
        self.emergency_cleanup().await
    }

    fn abort_requested(&self, run: u64) -> bool {
        self.closed.load(Ordering::Acquire) || self.abort_target.load(Ordering::Acquire) == run
    }

    /// Resolves once `run` has been asked to abort.
    async fn aborted(&self, run: u64) {
        loop {
            let notified = self.abort_signal.notified();
            if self.abort_requested(run) {
                return;
            }
            notified.await;
        }
    }

    /// Look up `name` in `document` and run it.
    pub async fn run_named(&self, document: &SceneDocument, name: &str) -> SceneReport {
        match document.scene(name) {
            Some(scene) => self.run(name, scene).await,
            None => {
                error!(scene = name, "scene not found");
                SceneReport::immediate(name, SceneOutcome::NotFound)
            }
        }
    }

    /// Run `scene` to completion.
    ///
    /// Returns [`SceneOutcome::Busy`] without side effects if another scene
    /// is running on this runner, and [`SceneOutcome::Closed`] after
    /// [`shutdown`](Self::shutdown). Effects still in flight after the last
    /// step are awaited before the run is released.
    pub async fn run(&self, key: &str, scene: &Scene) -> SceneReport {
        let Some(guard) = RunGuard::acquire(self) else {
            warn!(scene = key, "scene rejected, another scene is running");
            return SceneReport::immediate(key, SceneOutcome::Busy);
        };
        if self.closed.load(Ordering::Acquire) {
            warn!(scene = key, "scene rejected, runner shut down");
            return SceneReport::immediate(key, SceneOutcome::Closed);
        }
        let run = guard.id;
        *self.last_cleanup.lock() = None;

        let started = Instant::now();
        info!(
            scene = key,
            name = %scene.name,
            steps = scene.steps.len(),
            "starting scene"
        );

        let dispatcher = EffectDispatcher::new(&self.registry);
        let mut tasks = EffectTasks::new(key);
        let mut failed_steps = Vec::new();

        for (index, step) in scene.steps.iter().enumerate() {
            self.set_state(RunState::Running {
                scene: key.to_string(),
                step: step.step,
            });
            if self.abort_requested(run) {
                return self
                    .abort_run(key, abort_fault(step.step), tasks, index, started)
                    .await;
            }
            log_step(key, step);

            let step_started = Instant::now();
            let dispatched = std::panic::catch_unwind(AssertUnwindSafe(|| {
                dispatcher.dispatch(key, step, &mut tasks)
            }));
            let report = match dispatched {
                Ok(Ok(report)) => report,
                Ok(Err(fault)) => {
                    return self
                        .abort_run(key, fault, tasks, index + 1, started)
                        .await;
                }
                Err(_) => {
                    let fault = EffectFault {
                        step: step.step,
                        effect: None,
                        target: step.display_name(),
                        reason: "effect dispatch panicked".to_string(),
                    };
                    return self.abort_run(key, fault, tasks, index + 1, started).await;
                }
            };
            if !report.is_success() {
                failed_steps.push(StepFailure {
                    step: step.step,
                    failures: report.failures,
                });
            }

            let remaining = step.dwell().saturating_sub(step_started.elapsed());
            let fault = tokio::select! {
                _ = tokio::time::sleep(remaining) => None,
                fault = tasks.next_fault() => Some(fault),
                _ = self.aborted(run) => Some(abort_fault(step.step)),
            };
            if let Some(fault) = fault {
                return self.abort_run(key, fault, tasks, index + 1, started).await;
            }
        }

        if !tasks.is_empty() {
            debug!(scene = key, pending = tasks.len(), "waiting for effects to finish");
        }
        let last_step = scene.steps.last().map_or(0, |step| step.step);
        let fault = tokio::select! {
            faults = tasks.drain() => faults.into_iter().next(),
            _ = self.aborted(run) => Some(abort_fault(last_step)),
        };
        if let Some(fault) = fault {
            return self
                .abort_run(key, fault, tasks, scene.steps.len(), started)
                .await;
        }

        let outcome = if failed_steps.is_empty() {
            info!(scene = key, "scene completed");
            SceneOutcome::Completed
        } else {
            warn!(
                scene = key,
                failed_steps = failed_steps.len(),
                "scene completed with dispatch failures"
            );
            SceneOutcome::Failed {
                steps: failed_steps,
            }
        };
        self.set_state(RunState::Completed {
            scene: key.to_string(),
        });
        SceneReport {
            scene: key.to_string(),
            outcome,
            steps_run: scene.steps.len(),
            elapsed: started.elapsed(),
        }
    }

    /// Clean up first, then let in-flight effects settle.
    async fn abort_run(
        &self,
        key: &str,
        fault: EffectFault,
        mut tasks: EffectTasks,
        steps_run: usize,
        started: Instant,
    ) -> SceneReport {
        error!(
            scene = key,
            step = fault.step,
            target = %fault.target,
            reason = %fault.reason,
            "aborting scene"
        );
        let cleanup = self.cleanup.run(&self.registry).await;
        *self.last_cleanup.lock() = Some(cleanup.clone());
        for late in tasks.drain().await {
            debug!(scene = key, step = late.step, reason = %late.reason, "further fault during abort");
        }
        self.set_state(RunState::Aborted {
            scene: key.to_string(),
            step: fault.step,
        });
        SceneReport {
            scene: key.to_string(),
            outcome: SceneOutcome::Aborted { fault, cleanup },
            steps_run,
            elapsed: started.elapsed(),
        }
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock() = state;
    }
}

fn abort_fault(step: u32) -> EffectFault {
    EffectFault {
        step,
        effect: None,
        target: ABORT_TARGET.to_string(),
        reason: "abort requested".to_string(),
    }
}

/// Emit a step's log annotation at its configured level.
fn log_step(scene: &str, step: &Step) {
    let message = step.log_message();
    match step.log_level() {
        LogLevel::Debug => debug!(scene, step = step.step, "{message}"),
        LogLevel::Info => info!(scene, step = step.step, "{message}"),
        LogLevel::Warning => warn!(scene, step = step.step, "{message}"),
        LogLevel::Error => error!(scene, step = step.step, "{message}"),
    }
}
