//! Simulated drivers.
//!
//! These back the `simulated` hardware backend and the test suites. Every
//! driver records what it was asked to do into a shared [`EventLog`], and
//! can be configured to fail with a [`Fault`] to exercise error paths.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::actuators::{
    AudioDriver, DeviceError, DeviceResult, LightCommand, LightDriver, MotorDirection,
    MotorDriver, RelayDriver,
};
use crate::detection::DistanceSensor;

/// Failure injected into a simulated driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with [`DeviceError::SendFailed`]
    Recoverable,
    /// Fail with [`DeviceError::Fault`]
    Fatal,
    /// Panic inside the driver
    Panic,
}

fn inject(fault: Option<Fault>, device: &str) -> DeviceResult<()> {
    match fault {
        None => Ok(()),
        Some(Fault::Recoverable) => Err(DeviceError::SendFailed(format!(
            "{device}: injected send failure"
        ))),
        Some(Fault::Fatal) => Err(DeviceError::Fault(format!("{device}: injected fault"))),
        Some(Fault::Panic) => panic!("{device}: injected panic"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Motor(Option<MotorDirection>),
    Relay(bool),
    Light(LightCommand),
    AudioStarted { volume: f32 },
    AudioFinished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub device: String,
    pub event: SimEvent,
    pub at: Instant,
}

/// Shared, append-only record of simulated device activity.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, device: &str, event: SimEvent) {
        debug!(device, ?event, "simulated");
        self.events.lock().push(Recorded {
            device: device.to_string(),
            event,
            at: Instant::now(),
        });
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    /// Events for one device, in order.
    pub fn for_device(&self, device: &str) -> Vec<SimEvent> {
        self.events
            .lock()
            .iter()
            .filter(|r| r.device == device)
            .map(|r| r.event.clone())
            .collect()
    }

    /// Time of the first event for `device` matching `event`.
    pub fn first_at(&self, device: &str, event: &SimEvent) -> Option<Instant> {
        self.events
            .lock()
            .iter()
            .find(|r| r.device == device && r.event == *event)
            .map(|r| r.at)
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// Motor simulation. Faults apply to energize commands only, so stopping
/// always succeeds.
pub struct SimMotor {
    name: String,
    log: EventLog,
    fault: Option<Fault>,
}

impl SimMotor {
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
            fault: None,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }
}

impl MotorDriver for SimMotor {
    fn drive(&mut self, direction: Option<MotorDirection>) -> DeviceResult<()> {
        if direction.is_some() {
            inject(self.fault, &self.name)?;
        }
        self.log.record(&self.name, SimEvent::Motor(direction));
        Ok(())
    }
}

/// Relay simulation. Faults apply to switching on only.
pub struct SimRelay {
    name: String,
    log: EventLog,
    fault: Option<Fault>,
}

impl SimRelay {
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
            fault: None,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }
}

impl RelayDriver for SimRelay {
    fn set(&mut self, energized: bool) -> DeviceResult<()> {
        if energized {
            inject(self.fault, &self.name)?;
        }
        self.log.record(&self.name, SimEvent::Relay(energized));
        Ok(())
    }
}

/// Light simulation. Faults apply to every command.
pub struct SimLight {
    name: String,
    log: EventLog,
    fault: Option<Fault>,
}

impl SimLight {
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
            fault: None,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }
}

impl LightDriver for SimLight {
    fn send(&mut self, command: &LightCommand) -> DeviceResult<()> {
        inject(self.fault, &self.name)?;
        self.log.record(&self.name, SimEvent::Light(*command));
        Ok(())
    }
}

/// Audio simulation. Playback either lasts a fixed wall-clock time or waits
/// for an [`AudioGate`] release.
pub struct SimAudio {
    name: String,
    log: EventLog,
    length: Duration,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    fault: Option<Fault>,
}

/// Ends one gated playback per [`AudioGate::release`].
pub struct AudioGate(mpsc::Sender<()>);

impl AudioGate {
    pub fn release(&self) {
        let _ = self.0.send(());
    }
}

impl SimAudio {
    /// Playback that finishes immediately.
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
            length: Duration::ZERO,
            gate: None,
            fault: None,
        }
    }

    pub fn with_length(mut self, length: Duration) -> Self {
        self.length = length;
        self
    }

    /// Playback that lasts until the returned gate is released (or dropped).
    pub fn gated(name: impl Into<String>, log: EventLog) -> (Self, AudioGate) {
        let (tx, rx) = mpsc::channel();
        let mut audio = Self::new(name, log);
        audio.gate = Some(Mutex::new(rx));
        (audio, AudioGate(tx))
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }
}

impl AudioDriver for SimAudio {
    fn play(&self, volume: f32) -> DeviceResult<()> {
        inject(self.fault, &self.name)?;
        self.log.record(&self.name, SimEvent::AudioStarted { volume });
        match &self.gate {
            Some(gate) => {
                let _ = gate.lock().recv();
            }
            None if !self.length.is_zero() => std::thread::sleep(self.length),
            None => {}
        }
        self.log.record(&self.name, SimEvent::AudioFinished);
        Ok(())
    }
}

/// Ultrasonic sensor simulation cycling through a fixed list of readings.
pub struct SimSensor {
    name: String,
    readings: Vec<Option<f64>>,
    cursor: usize,
    max_range: f64,
}

impl SimSensor {
    /// `None` entries model echo timeouts.
    pub fn new(name: impl Into<String>, readings: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            readings,
            cursor: 0,
            max_range: f64::INFINITY,
        }
    }

    pub fn with_max_range(mut self, max_range: f64) -> Self {
        self.max_range = max_range;
        self
    }
}

impl DistanceSensor for SimSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_distance(&mut self) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        let reading = self.readings[self.cursor % self.readings.len()];
        self.cursor = self.cursor.wrapping_add(1);
        reading
    }

    fn max_range(&self) -> f64 {
        self.max_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_cycles_readings() {
        let mut sensor = SimSensor::new("front", vec![Some(120.0), None, Some(40.0)]);
        let readings: Vec<_> = (0..4).map(|_| sensor.read_distance()).collect();
        assert_eq!(readings, vec![Some(120.0), None, Some(40.0), Some(120.0)]);
    }

    #[test]
    fn test_empty_sensor_times_out() {
        let mut sensor = SimSensor::new("front", Vec::new());
        assert_eq!(sensor.read_distance(), None);
    }

    #[test]
    fn test_motor_fault_spares_stop() {
        let log = EventLog::new();
        let mut motor = SimMotor::new("lid", log.clone()).with_fault(Fault::Fatal);
        assert!(motor.drive(Some(MotorDirection::Forward)).is_err());
        motor.drive(None).unwrap();
        assert_eq!(log.for_device("lid"), vec![SimEvent::Motor(None)]);
    }
}
