//! Tracking of in-flight effect tasks for one scene run.

use std::future::Future;

use haunt_common::EffectKind;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{error, warn};

use crate::actuators::DeviceResult;

/// An unrecoverable effect failure. Aborts the scene and triggers cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectFault {
    pub step: u32,
    /// `None` when the failure could not be attributed to one effect
    pub effect: Option<EffectKind>,
    pub target: String,
    pub reason: String,
}

impl EffectFault {
    pub fn new(step: u32, effect: EffectKind, target: &str, reason: impl Into<String>) -> Self {
        Self {
            step,
            effect: Some(effect),
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct TaskLabel {
    step: u32,
    effect: EffectKind,
    target: String,
}

type Settled = (TaskLabel, Result<DeviceResult<()>, JoinError>);

/// Effect tasks started by a scene run.
///
/// Each tracked task is awaited by a small supervisor in a [`JoinSet`], so a
/// panic in the effect still reports which effect it was. Dropping the set
/// detaches the effects rather than cancelling them.
pub struct EffectTasks {
    scene: String,
    set: JoinSet<Settled>,
}

impl EffectTasks {
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            set: JoinSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Spawn an effect future and track it.
    pub fn spawn<F>(&mut self, step: u32, effect: EffectKind, target: &str, future: F)
    where
        F: Future<Output = DeviceResult<()>> + Send + 'static,
    {
        self.track(step, effect, target, tokio::spawn(future));
    }

    /// Track an effect task spawned elsewhere.
    pub fn track(
        &mut self,
        step: u32,
        effect: EffectKind,
        target: &str,
        handle: JoinHandle<DeviceResult<()>>,
    ) {
        let label = TaskLabel {
            step,
            effect,
            target: target.to_string(),
        };
        self.set.spawn(async move { (label, handle.await) });
    }

    /// Wait until a tracked effect fails unrecoverably.
    ///
    /// Recoverable failures are logged and skipped. Never resolves if no
    /// fault occurs, which makes it suitable for `select!` against a timer.
    pub async fn next_fault(&mut self) -> EffectFault {
        loop {
            match self.set.join_next().await {
                Some(Ok((label, outcome))) => {
                    if let Some(fault) = self.settle(label, outcome) {
                        return fault;
                    }
                }
                Some(Err(e)) => warn!(scene = %self.scene, error = %e, "effect supervisor ended"),
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// Wait for every tracked effect and return the faults among them.
    pub async fn drain(&mut self) -> Vec<EffectFault> {
        let mut faults = Vec::new();
        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok((label, outcome)) => faults.extend(self.settle(label, outcome)),
                Err(e) => warn!(scene = %self.scene, error = %e, "effect supervisor ended"),
            }
        }
        faults
    }

    fn settle(
        &self,
        label: TaskLabel,
        outcome: Result<DeviceResult<()>, JoinError>,
    ) -> Option<EffectFault> {
        let TaskLabel {
            step,
            effect,
            target,
        } = label;
        let reason = match outcome {
            Ok(Ok(())) => return None,
            Ok(Err(e)) if !e.is_fatal() => {
                warn!(scene = %self.scene, step, %effect, %target, error = %e, "effect failed");
                return None;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => "effect task panicked".to_string(),
            Err(_) => return None,
        };
        error!(scene = %self.scene, step, %effect, %target, %reason, "effect fault");
        Some(EffectFault {
            step,
            effect: Some(effect),
            target,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::DeviceError;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_failures_are_not_faults() {
        let mut tasks = EffectTasks::new("test");
        tasks.spawn(1, EffectKind::Lights, "govee", async {
            Err(DeviceError::SendFailed("unreachable".into()))
        });
        tasks.spawn(1, EffectKind::Motor, "lid", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        });
        assert_eq!(tasks.len(), 2);
        assert!(tasks.drain().await.is_empty());
        assert!(tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_and_panic_reported() {
        let mut tasks = EffectTasks::new("test");
        tasks.spawn(2, EffectKind::Motor, "lid", async {
            Err(DeviceError::Fault("stalled".into()))
        });
        tasks.spawn(3, EffectKind::Relay, "smoke", async { panic!("boom") });

        let mut faults = tasks.drain().await;
        faults.sort_by_key(|f| f.step);
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[0].effect, Some(EffectKind::Motor));
        assert_eq!(faults[0].reason, "Hardware fault: stalled");
        assert_eq!(faults[1].target, "smoke");
        assert_eq!(faults[1].reason, "effect task panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_fault_waits_past_successes() {
        let mut tasks = EffectTasks::new("test");
        tasks.spawn(1, EffectKind::Motor, "lid", async { Ok(()) });
        tasks.spawn(1, EffectKind::Relay, "skull", async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Err(DeviceError::Fault("welded".into()))
        });

        let fault = tasks.next_fault().await;
        assert_eq!(fault.target, "skull");
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_fault_pending_without_faults() {
        let mut tasks = EffectTasks::new("test");
        tasks.spawn(1, EffectKind::Motor, "lid", async { Ok(()) });

        let timed_out = tokio::time::timeout(Duration::from_secs(5), tasks.next_fault()).await;
        assert!(timed_out.is_err());
    }
}
