//! Registry of the actuator handles a scene can address.

use indexmap::IndexMap;

use crate::actuators::{AudioChannel, Light, Motor, Relay};

/// All actuators available to the engine, keyed the way scene effects name
/// them. Built once at startup and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct HardwareRegistry {
    motor: Option<Motor>,
    relays: IndexMap<String, Relay>,
    light: Option<Light>,
    audio: IndexMap<String, AudioChannel>,
}

impl HardwareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_motor(mut self, motor: Motor) -> Self {
        self.motor = Some(motor);
        self
    }

    /// Register a relay under its own name.
    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.relays.insert(relay.name().to_string(), relay);
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.light = Some(light);
        self
    }

    /// Register an audio channel under its track name.
    pub fn with_audio(mut self, channel: AudioChannel) -> Self {
        self.audio.insert(channel.track().to_string(), channel);
        self
    }

    pub fn motor(&self) -> Option<&Motor> {
        self.motor.as_ref()
    }

    pub fn relay(&self, name: &str) -> Option<&Relay> {
        self.relays.get(name)
    }

    pub fn relays(&self) -> impl Iterator<Item = &Relay> {
        self.relays.values()
    }

    pub fn light(&self) -> Option<&Light> {
        self.light.as_ref()
    }

    pub fn audio(&self, track: &str) -> Option<&AudioChannel> {
        self.audio.get(track)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &str> {
        self.audio.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{EventLog, SimAudio, SimRelay};

    #[test]
    fn test_lookup_by_name() {
        let log = EventLog::new();
        let registry = HardwareRegistry::new()
            .with_relay(Relay::new("skull", SimRelay::new("skull", log.clone())))
            .with_relay(Relay::new("smoke", SimRelay::new("smoke", log.clone())))
            .with_audio(AudioChannel::new("creepy", SimAudio::new("creepy", log)));

        assert!(registry.relay("skull").is_some());
        assert!(registry.relay("fog").is_none());
        assert_eq!(registry.relays().count(), 2);
        assert_eq!(registry.audio_tracks().collect::<Vec<_>>(), vec!["creepy"]);
        assert!(registry.motor().is_none());
        assert!(registry.light().is_none());
    }
}
