//! Emergency cleanup: drive every actuator to a safe resting state.
//!
//! Runs after an unrecoverable fault and on shutdown. Each action runs in
//! its own task so a failing or panicking actuator cannot stop the actions
//! after it.

use std::future::Future;
use std::time::Duration;

use haunt_common::{CleanupAction, CleanupKind, ErrorHandling};
use tracing::{error, info, warn};

use crate::actuators::DeviceResult;
use crate::registry::HardwareRegistry;

/// Relay target that addresses every registered relay.
const ALL_RELAYS: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub action: CleanupKind,
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of actuator commands attempted
    pub attempted: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, action: CleanupKind, target: &str, reason: impl Into<String>) {
        let reason = reason.into();
        error!(?action, %target, %reason, "cleanup action failed");
        self.failures.push(CleanupFailure {
            action,
            target: target.to_string(),
            reason,
        });
    }

    async fn attempt<F>(&mut self, action: CleanupKind, target: &str, command: F)
    where
        F: Future<Output = DeviceResult<()>> + Send + 'static,
    {
        self.attempted += 1;
        match tokio::spawn(command).await {
            Ok(Ok(())) => info!(?action, %target, "cleanup action done"),
            Ok(Err(e)) => self.fail(action, target, e.to_string()),
            Err(e) if e.is_panic() => self.fail(action, target, "cleanup action panicked"),
            Err(_) => self.fail(action, target, "cleanup action cancelled"),
        }
    }
}

/// The ordered cleanup plan.
#[derive(Debug, Clone)]
pub struct EmergencyCleanup {
    actions: Vec<CleanupAction>,
    motor_close: Duration,
}

impl Default for EmergencyCleanup {
    fn default() -> Self {
        Self::from_config(&ErrorHandling::default())
    }
}

impl EmergencyCleanup {
    pub fn new(actions: Vec<CleanupAction>, motor_close: Duration) -> Self {
        Self {
            actions,
            motor_close,
        }
    }

    /// Plan from the scene document's `error_handling` section.
    pub fn from_config(config: &ErrorHandling) -> Self {
        Self::new(config.plan(), config.motor_close_time())
    }

    pub fn actions(&self) -> &[CleanupAction] {
        &self.actions
    }

    /// Execute every action in order. Failures are logged and reported but
    /// never stop the remaining actions. Safe to run repeatedly.
    pub async fn run(&self, registry: &HardwareRegistry) -> CleanupReport {
        warn!(actions = self.actions.len(), "running emergency cleanup");
        let mut report = CleanupReport::default();

        for step in &self.actions {
            let target = step.target.as_deref();
            match step.action {
                CleanupKind::RelayOff => match target {
                    None | Some(ALL_RELAYS) => {
                        for relay in registry.relays() {
                            let relay = relay.clone();
                            let name = relay.name().to_string();
                            report
                                .attempt(step.action, &name, async move { relay.force_off() })
                                .await;
                        }
                    }
                    Some(name) => match registry.relay(name) {
                        Some(relay) => {
                            let relay = relay.clone();
                            report
                                .attempt(step.action, name, async move { relay.force_off() })
                                .await;
                        }
                        None => report.fail(step.action, name, "relay not registered"),
                    },
                },
                CleanupKind::MotorClose => match registry.motor() {
                    Some(motor) => {
                        let motor = motor.clone();
                        let name = motor.name().to_string();
                        let close = self.motor_close;
                        report
                            .attempt(step.action, &name, async move {
                                motor.move_reverse(close).await
                            })
                            .await;
                    }
                    None => report.fail(step.action, target.unwrap_or("motor"), "no motor registered"),
                },
                CleanupKind::LightsOff => match registry.light() {
                    Some(light) => {
                        let light = light.clone();
                        let name = light.name().to_string();
                        report
                            .attempt(step.action, &name, async move { light.turn_off().await })
                            .await;
                    }
                    None => report.fail(step.action, target.unwrap_or("light"), "no light registered"),
                },
            }
        }

        if report.is_clean() {
            info!(attempted = report.attempted, "emergency cleanup complete");
        } else {
            error!(
                attempted = report.attempted,
                failed = report.failures.len(),
                "emergency cleanup finished with failures"
            );
        }
        report
    }
}
