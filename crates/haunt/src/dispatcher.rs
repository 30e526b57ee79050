//! Effect dispatch: turns a step's effect bundle into actuator calls.
//!
//! Dispatch never waits on a physical action. Anything that takes time
//! (motor moves, light sequences, relay auto-off, audio) runs as a tracked
//! task, so the step timer starts as soon as the bundle has been handed out.

use haunt_common::{
    AudioEffect, EffectKind, LightEffect, MotorAction, MotorEffect, RelayAction, RelayEffect,
    Step,
};
use tracing::{debug, warn};

use crate::actuators::{DeviceError, DeviceResult, Light, Rgb};
use crate::registry::HardwareRegistry;
use crate::tasks::{EffectFault, EffectTasks};

/// An effect that could not be started. The scene carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub effect: EffectKind,
    pub target: String,
    pub reason: String,
}

/// Outcome of dispatching one effect bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Effects handed to an actuator, in dispatch order
    pub dispatched: Vec<EffectKind>,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Rejected {
    Failure(DispatchFailure),
    Fault(EffectFault),
}

pub struct EffectDispatcher<'a> {
    registry: &'a HardwareRegistry,
}

impl<'a> EffectDispatcher<'a> {
    pub fn new(registry: &'a HardwareRegistry) -> Self {
        Self { registry }
    }

    /// Dispatch every effect of `step` in the order lights, audio, motor,
    /// relay.
    ///
    /// Failures to start an effect are collected in the report. A hardware
    /// fault stops dispatch and is returned as an error. Must be called from
    /// within a tokio runtime.
    pub fn dispatch(
        &self,
        scene: &str,
        step: &Step,
        tasks: &mut EffectTasks,
    ) -> Result<DispatchReport, EffectFault> {
        let effects = &step.effects;
        let mut report = DispatchReport::default();

        if let Some(lights) = &effects.lights {
            let attempt = self.lights(step.step, lights, tasks);
            record(&mut report, scene, step, EffectKind::Lights, attempt)?;
        }
        if let Some(audio) = &effects.audio {
            let attempt = self.audio(step.step, audio);
            record(&mut report, scene, step, EffectKind::Audio, attempt)?;
        }
        if let Some(motor) = &effects.motor {
            let attempt = self.motor(step.step, motor, tasks);
            record(&mut report, scene, step, EffectKind::Motor, attempt)?;
        }
        if let Some(relay) = &effects.relay {
            let attempt = self.relay(step.step, relay, tasks);
            record(&mut report, scene, step, EffectKind::Relay, attempt)?;
        }
        Ok(report)
    }

    fn lights(
        &self,
        step: u32,
        effect: &LightEffect,
        tasks: &mut EffectTasks,
    ) -> Result<(), Rejected> {
        let light = self
            .registry
            .light()
            .ok_or_else(|| missing(EffectKind::Lights, "light"))?;
        let color = effect
            .color
            .map(|[r, g, b]| Rgb::new(r, g, b))
            .transpose()
            .map_err(|e| classify(step, EffectKind::Lights, light.name(), e))?;

        let sequence = LightSequence {
            light: light.clone(),
            on: effect.on,
            color,
            flash: effect.flash.then_some(effect.flash_amount),
            off: effect.off,
        };
        tasks.spawn(step, EffectKind::Lights, light.name(), sequence.run());
        Ok(())
    }

    fn audio(&self, step: u32, effect: &AudioEffect) -> Result<(), Rejected> {
        let track = effect.track();
        let channel = self
            .registry
            .audio(track)
            .ok_or_else(|| missing(EffectKind::Audio, track))?;
        channel.set_volume(effect.volume);
        // Playback is fire-and-return; the channel guards its own re-entry
        channel
            .play()
            .map(drop)
            .map_err(|e| classify(step, EffectKind::Audio, track, e))
    }

    fn motor(
        &self,
        step: u32,
        effect: &MotorEffect,
        tasks: &mut EffectTasks,
    ) -> Result<(), Rejected> {
        let motor = self
            .registry
            .motor()
            .ok_or_else(|| missing(EffectKind::Motor, "motor"))?
            .clone();
        let target = motor.name().to_string();
        let action = effect.action;
        let duration = effect.run_time();
        tasks.spawn(step, EffectKind::Motor, &target, async move {
            match action {
                MotorAction::Open => motor.move_forward(duration).await,
                MotorAction::Close => motor.move_reverse(duration).await,
            }
        });
        Ok(())
    }

    fn relay(
        &self,
        step: u32,
        effect: &RelayEffect,
        tasks: &mut EffectTasks,
    ) -> Result<(), Rejected> {
        let relay = self
            .registry
            .relay(&effect.name)
            .ok_or_else(|| missing(EffectKind::Relay, &effect.name))?;
        let result = match (effect.action, effect.auto_off()) {
            (RelayAction::On, Some(after)) => relay
                .timed_on(after)
                .map(|handle| tasks.track(step, EffectKind::Relay, relay.name(), handle)),
            (RelayAction::On, None) => relay.on(),
            (RelayAction::Off, _) => relay.off(),
        };
        result.map_err(|e| classify(step, EffectKind::Relay, relay.name(), e))
    }
}

fn record(
    report: &mut DispatchReport,
    scene: &str,
    step: &Step,
    effect: EffectKind,
    attempt: Result<(), Rejected>,
) -> Result<(), EffectFault> {
    match attempt {
        Ok(()) => {
            debug!(scene, step = step.step, %effect, "effect dispatched");
            report.dispatched.push(effect);
            Ok(())
        }
        Err(Rejected::Failure(failure)) => {
            warn!(
                scene,
                step = step.step,
                %effect,
                target = %failure.target,
                reason = %failure.reason,
                "effect not dispatched"
            );
            report.failures.push(failure);
            Ok(())
        }
        Err(Rejected::Fault(fault)) => Err(fault),
    }
}

fn missing(effect: EffectKind, target: &str) -> Rejected {
    Rejected::Failure(DispatchFailure {
        effect,
        target: target.to_string(),
        reason: "not registered".to_string(),
    })
}

fn classify(step: u32, effect: EffectKind, target: &str, error: DeviceError) -> Rejected {
    if error.is_fatal() {
        Rejected::Fault(EffectFault::new(step, effect, target, error.to_string()))
    } else {
        Rejected::Failure(DispatchFailure {
            effect,
            target: target.to_string(),
            reason: error.to_string(),
        })
    }
}

/// The light part of a bundle, applied in the order on, color, flash, off.
struct LightSequence {
    light: Light,
    on: bool,
    color: Option<Rgb>,
    flash: Option<u32>,
    off: bool,
}

impl LightSequence {
    /// Applies every part even if an earlier one failed; returns the first
    /// error.
    async fn run(self) -> DeviceResult<()> {
        let mut first_error = None;
        if self.on {
            if let Err(e) = self.light.turn_on().await {
                first_error.get_or_insert(e);
            }
        }
        if let Some(rgb) = self.color {
            if let Err(e) = self.light.set_rgb(rgb).await {
                first_error.get_or_insert(e);
            }
        }
        if let Some(amount) = self.flash {
            let delay = self.light.flash_delay();
            if let Err(e) = self.light.flash(amount, delay).await {
                first_error.get_or_insert(e);
            }
        }
        if self.off {
            if let Err(e) = self.light.turn_off().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::{AudioChannel, LightCommand, Motor, MotorDirection, Relay};
    use crate::sim::{EventLog, Fault, SimAudio, SimEvent, SimLight, SimMotor, SimRelay};
    use haunt_common::Effects;
    use std::time::Duration;

    fn registry(log: &EventLog) -> HardwareRegistry {
        HardwareRegistry::new()
            .with_motor(Motor::new("motor", SimMotor::new("motor", log.clone())))
            .with_relay(Relay::new("skull", SimRelay::new("skull", log.clone())))
            .with_light(Light::new(
                "govee",
                Duration::from_millis(300),
                SimLight::new("govee", log.clone()),
            ))
            .with_audio(AudioChannel::new("creepy", SimAudio::new("creepy", log.clone())))
    }

    fn step(effects: Effects) -> Step {
        Step::new(1, 1.0).with_effects(effects)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_bundle_dispatched_in_order() {
        let log = EventLog::new();
        let registry = registry(&log);
        let mut tasks = EffectTasks::new("test");

        let effects = Effects {
            lights: Some(LightEffect {
                color: Some([255, 0, 0]),
                ..Default::default()
            }),
            audio: Some(AudioEffect {
                file: "creepy.mp3".into(),
                volume: 0.4,
            }),
            motor: Some(MotorEffect {
                action: MotorAction::Open,
                duration: 2.0,
            }),
            relay: Some(RelayEffect {
                name: "skull".into(),
                action: RelayAction::On,
                duration: None,
            }),
        };
        let report = EffectDispatcher::new(&registry)
            .dispatch("test", &step(effects), &mut tasks)
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            report.dispatched,
            vec![EffectKind::Lights, EffectKind::Audio, EffectKind::Motor, EffectKind::Relay]
        );
        // Relays switch inline, the rest completes in tasks
        assert_eq!(log.for_device("skull"), vec![SimEvent::Relay(true)]);
        assert!(tasks.drain().await.is_empty());

        assert_eq!(
            log.for_device("govee"),
            vec![SimEvent::Light(LightCommand::Color(Rgb::RED))]
        );
        assert_eq!(
            log.for_device("motor").last(),
            Some(&SimEvent::Motor(None))
        );
        assert!(log
            .for_device("motor")
            .contains(&SimEvent::Motor(Some(MotorDirection::Forward))));
    }

    #[tokio::test]
    async fn test_missing_targets_are_failures() {
        let log = EventLog::new();
        let registry = registry(&log);
        let mut tasks = EffectTasks::new("test");

        let effects = Effects {
            audio: Some(AudioEffect {
                file: "missing.mp3".into(),
                volume: 0.7,
            }),
            relay: Some(RelayEffect {
                name: "fog".into(),
                action: RelayAction::On,
                duration: None,
            }),
            ..Default::default()
        };
        let report = EffectDispatcher::new(&registry)
            .dispatch("test", &step(effects), &mut tasks)
            .unwrap();

        assert!(report.dispatched.is_empty());
        let targets: Vec<_> = report.failures.iter().map(|f| f.target.as_str()).collect();
        assert_eq!(targets, vec!["missing", "fog"]);
    }

    #[tokio::test]
    async fn test_invalid_color_is_failure_without_commands() {
        let log = EventLog::new();
        let registry = registry(&log);
        let mut tasks = EffectTasks::new("test");

        let effects = Effects {
            lights: Some(LightEffect {
                color: Some([300, 0, 0]),
                on: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = EffectDispatcher::new(&registry)
            .dispatch("test", &step(effects), &mut tasks)
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].effect, EffectKind::Lights);
        assert!(tasks.is_empty());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_relay_fault_stops_dispatch() {
        let log = EventLog::new();
        let registry = HardwareRegistry::new().with_relay(Relay::new(
            "smoke",
            SimRelay::new("smoke", log.clone()).with_fault(Fault::Fatal),
        ));
        let mut tasks = EffectTasks::new("test");

        let effects = Effects {
            relay: Some(RelayEffect {
                name: "smoke".into(),
                action: RelayAction::On,
                duration: Some(3.0),
            }),
            ..Default::default()
        };
        let fault = EffectDispatcher::new(&registry)
            .dispatch("test", &step(effects), &mut tasks)
            .unwrap_err();
        assert_eq!(fault.effect, Some(EffectKind::Relay));
        assert_eq!(fault.target, "smoke");
    }

    #[tokio::test]
    async fn test_busy_audio_is_failure() {
        let log = EventLog::new();
        let (driver, gate) = SimAudio::gated("creepy", log.clone());
        let registry = HardwareRegistry::new().with_audio(AudioChannel::new("creepy", driver));
        let mut tasks = EffectTasks::new("test");

        let effects = Effects {
            audio: Some(AudioEffect {
                file: "creepy".into(),
                volume: 0.7,
            }),
            ..Default::default()
        };
        let dispatcher = EffectDispatcher::new(&registry);
        assert!(dispatcher.dispatch("test", &step(effects.clone()), &mut tasks).unwrap().is_success());

        let report = dispatcher.dispatch("test", &step(effects), &mut tasks).unwrap();
        assert_eq!(report.failures[0].reason, "Device busy");
        gate.release();
    }
}
