//! Building the hardware registry from configuration.

use std::collections::HashMap;
use std::time::Duration;

use haunt::DistanceSensor;
use haunt::actuators::{AudioChannel, Light, Motor, Relay};
use haunt::registry::HardwareRegistry;
use haunt::sim::{EventLog, SimAudio, SimLight, SimMotor, SimRelay, SimSensor};
use haunt_common::{Backend, HardwareConfig};
use tracing::{info, warn};

use crate::error::InitError;
use crate::govee::GoveeLight;
use crate::player::PlayerAudio;

pub const MOTOR_NAME: &str = "motor";
pub const LIGHT_NAME: &str = "lights";

/// How long a simulated track "plays".
const SIMULATED_TRACK_LENGTH: Duration = Duration::from_secs(2);

/// Everything the engine and the detection loop need from the hardware.
pub struct Hardware {
    pub registry: HardwareRegistry,
    pub sensors: Vec<Box<dyn DistanceSensor>>,
    /// Activity recorded by the simulated drivers
    pub history: EventLog,
}

impl Hardware {
    /// Detection cannot run without a sensor.
    pub fn require_sensors(&self) -> Result<(), InitError> {
        if self.sensors.is_empty() {
            return Err(InitError::NoSensors);
        }
        Ok(())
    }
}

/// Instantiate every configured device.
///
/// Motor, relays and sensors always use simulated drivers. The `live`
/// backend talks to the real smart light and plays audio through the
/// configured player; a missing audio file is then an error.
pub fn build_hardware(config: &HardwareConfig) -> Result<Hardware, InitError> {
    check_pins(config)?;
    let history = EventLog::new();
    let mut registry = HardwareRegistry::new();

    if let Some(motor) = &config.motor {
        info!(
            forward_pin = motor.forward_pin,
            reverse_pin = motor.reverse_pin,
            "motor (simulated)"
        );
        registry = registry.with_motor(Motor::new(
            MOTOR_NAME,
            SimMotor::new(MOTOR_NAME, history.clone()),
        ));
    }

    for (name, relay) in &config.relays {
        info!(relay = %name, pin = relay.pin, active_high = relay.active_high, "relay (simulated)");
        registry = registry.with_relay(Relay::new(name, SimRelay::new(name, history.clone())));
    }

    if let Some(govee) = &config.lights.govee {
        let light = match config.backend {
            Backend::Live => Light::new(LIGHT_NAME, govee.flash_delay(), GoveeLight::connect(govee)?),
            Backend::Simulated => Light::new(
                LIGHT_NAME,
                govee.flash_delay(),
                SimLight::new(LIGHT_NAME, history.clone()),
            ),
        };
        registry = registry.with_light(light);
    }

    let audio = &config.audio;
    for (track, file) in &audio.files {
        let channel = match config.backend {
            Backend::Live => AudioChannel::new(track, PlayerAudio::new(audio, track, file)?),
            Backend::Simulated => {
                if !audio.track_path(file).is_file() {
                    warn!(%track, path = %audio.track_path(file).display(), "audio file missing");
                }
                AudioChannel::new(
                    track,
                    SimAudio::new(track, history.clone()).with_length(SIMULATED_TRACK_LENGTH),
                )
            }
        };
        registry = registry.with_audio(channel);
    }

    let sensors = config
        .sensors
        .iter()
        .map(|(name, sensor)| {
            info!(
                sensor = %name,
                trigger_pin = sensor.trigger_pin,
                echo_pin = sensor.echo_pin,
                "distance sensor (simulated)"
            );
            Box::new(
                SimSensor::new(name, sensor.simulated_readings.clone())
                    .with_max_range(sensor.max_distance),
            ) as Box<dyn DistanceSensor>
        })
        .collect();

    info!(backend = ?config.backend, "hardware initialized");
    Ok(Hardware {
        registry,
        sensors,
        history,
    })
}

/// Every GPIO pin may be claimed by one device only.
fn check_pins(config: &HardwareConfig) -> Result<(), InitError> {
    let mut owners: HashMap<u8, String> = HashMap::new();
    let mut claim = |pin: u8, device: String| match owners.get(&pin) {
        Some(owner) => Err(InitError::PinConflict {
            device,
            pin,
            owner: owner.clone(),
        }),
        None => {
            owners.insert(pin, device);
            Ok(())
        }
    };

    if let Some(motor) = &config.motor {
        claim(motor.forward_pin, "motor forward".to_string())?;
        claim(motor.reverse_pin, "motor reverse".to_string())?;
    }
    for (name, relay) in &config.relays {
        claim(relay.pin, format!("relay {name}"))?;
    }
    for (name, sensor) in &config.sensors {
        claim(sensor.trigger_pin, format!("sensor {name} trigger"))?;
        claim(sensor.echo_pin, format!("sensor {name} echo"))?;
    }
    Ok(())
}
