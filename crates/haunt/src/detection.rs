//! Presence detection: sensor aggregation and the idle/warning/triggered
//! state machine.
//!
//! The state machine is pure. Callers feed it the aggregated distance, the
//! current time and whether a scene is running, and act on the returned
//! [`Observation`].

use std::fmt;
use std::time::{Duration, Instant};

use haunt_common::DetectionConfig;

use crate::actuators::Rgb;

/// A distance sensor.
pub trait DistanceSensor: Send + Sync {
    fn name(&self) -> &str;

    /// Distance in cm, or `None` on timeout or error.
    fn read_distance(&mut self) -> Option<f64>;

    /// Readings beyond this range are treated as invalid.
    fn max_range(&self) -> f64 {
        f64::INFINITY
    }
}

/// Whether a reading is a usable distance for a sensor with `max_range`.
fn is_valid(reading: f64, max_range: f64) -> bool {
    reading.is_finite() && reading >= 0.0 && reading <= max_range
}

/// Minimum over the valid readings, or `None` if none are valid.
pub fn shortest_distance<I>(readings: I) -> Option<f64>
where
    I: IntoIterator<Item = (Option<f64>, f64)>,
{
    readings
        .into_iter()
        .filter_map(|(reading, max_range)| reading.filter(|d| is_valid(*d, max_range)))
        .reduce(f64::min)
}

/// Poll every sensor once and return the closest valid distance.
pub fn read_shortest_distance(sensors: &mut [Box<dyn DistanceSensor>]) -> Option<f64> {
    shortest_distance(sensors.iter_mut().map(|sensor| {
        let reading = sensor.read_distance();
        (reading, sensor.max_range())
    }))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectionMode {
    /// Nobody nearby
    #[default]
    Idle,
    /// Someone is approaching
    Warning,
    /// A scene was started
    Triggered,
}

impl DetectionMode {
    /// Indicator color shown while no scene is running.
    pub fn color(self) -> Rgb {
        match self {
            DetectionMode::Idle => Rgb::GREEN,
            DetectionMode::Warning => Rgb::ORANGE,
            DetectionMode::Triggered => Rgb::RED,
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DetectionMode::Idle => "idle",
            DetectionMode::Warning => "warning",
            DetectionMode::Triggered => "triggered",
        };
        f.write_str(label)
    }
}

/// Why a close reading did not start a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    SceneRunning,
    Cooldown { remaining: Duration },
}

/// Result of feeding one aggregated reading to [`DetectionState::observe`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observation {
    pub distance: Option<f64>,
    /// `(from, to)` when the mode changed
    pub transition: Option<(DetectionMode, DetectionMode)>,
    /// A scene should be started now
    pub trigger: bool,
    pub suppressed: Option<Suppression>,
}

/// Detection state machine.
///
/// - below the near threshold: trigger, unless a scene is running or the
///   cooldown has not elapsed (then warning)
/// - below the far threshold: warning
/// - otherwise: idle
///
/// Once triggered, the mode only returns to idle when the reset timeout has
/// passed since the trigger and the reading is beyond the far threshold.
#[derive(Debug, Clone)]
pub struct DetectionState {
    near: f64,
    far: f64,
    reset_after: Duration,
    cooldown: Duration,
    mode: DetectionMode,
    last_trigger: Option<Instant>,
    last_scene_end: Option<Instant>,
}

impl DetectionState {
    pub fn new(config: &DetectionConfig, cooldown: Duration) -> Self {
        Self {
            near: config.distance_threshold_near,
            far: config.distance_threshold_far,
            reset_after: config.reset_after(),
            cooldown,
            mode: DetectionMode::Idle,
            last_trigger: None,
            last_scene_end: None,
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Time left before another trigger is allowed.
    ///
    /// The cooldown runs from the later of the last trigger and the end of
    /// the last scene.
    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        let anchor = match (self.last_trigger, self.last_scene_end) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => return Duration::ZERO,
        };
        (anchor + self.cooldown).saturating_duration_since(now)
    }

    /// Record that the triggered scene has finished.
    pub fn scene_finished(&mut self, now: Instant) {
        self.last_scene_end = Some(now);
    }

    pub fn observe(
        &mut self,
        distance: Option<f64>,
        now: Instant,
        scene_running: bool,
    ) -> Observation {
        let mut observation = Observation {
            distance,
            ..Default::default()
        };
        let Some(d) = distance else {
            return observation;
        };

        let next = if self.mode == DetectionMode::Triggered {
            let since_trigger = self
                .last_trigger
                .map_or(Duration::MAX, |t| now.saturating_duration_since(t));
            if since_trigger >= self.reset_after && d > self.far {
                DetectionMode::Idle
            } else {
                DetectionMode::Triggered
            }
        } else if d < self.near {
            let remaining = self.cooldown_remaining(now);
            if scene_running {
                observation.suppressed = Some(Suppression::SceneRunning);
                DetectionMode::Warning
            } else if !remaining.is_zero() {
                observation.suppressed = Some(Suppression::Cooldown { remaining });
                DetectionMode::Warning
            } else {
                observation.trigger = true;
                self.last_trigger = Some(now);
                DetectionMode::Triggered
            }
        } else if d < self.far {
            DetectionMode::Warning
        } else {
            DetectionMode::Idle
        };

        if next != self.mode {
            observation.transition = Some((self.mode, next));
            self.mode = next;
        }
        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSensor;

    fn config(reset_timeout: f64) -> DetectionConfig {
        DetectionConfig {
            distance_threshold_far: 100.0,
            distance_threshold_near: 50.0,
            reset_timeout,
            ..Default::default()
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_shortest_ignores_invalid_readings() {
        let readings = [(None, 400.0), (Some(40.0), 400.0)];
        assert_eq!(shortest_distance(readings), Some(40.0));

        let readings = [(Some(-1.0), 400.0), (Some(f64::NAN), 400.0), (Some(500.0), 400.0)];
        assert_eq!(shortest_distance(readings), None);

        let readings = [(Some(80.0), 400.0), (Some(30.0), 400.0)];
        assert_eq!(shortest_distance(readings), Some(30.0));
    }

    #[test]
    fn test_read_shortest_polls_every_sensor() {
        let mut sensors: Vec<Box<dyn DistanceSensor>> = vec![
            Box::new(SimSensor::new("left", vec![None])),
            Box::new(SimSensor::new("right", vec![Some(40.0)]).with_max_range(400.0)),
        ];
        assert_eq!(read_shortest_distance(&mut sensors), Some(40.0));
    }

    #[test]
    fn test_modes_follow_thresholds() {
        let now = Instant::now();
        let mut state = DetectionState::new(&config(10.0), secs(30));

        let obs = state.observe(Some(150.0), now, false);
        assert_eq!(obs.transition, None);
        assert_eq!(state.mode(), DetectionMode::Idle);

        let obs = state.observe(Some(80.0), now, false);
        assert_eq!(obs.transition, Some((DetectionMode::Idle, DetectionMode::Warning)));
        assert!(!obs.trigger);

        let obs = state.observe(Some(30.0), now, false);
        assert!(obs.trigger);
        assert_eq!(state.mode(), DetectionMode::Triggered);
    }

    #[test]
    fn test_no_reading_changes_nothing() {
        let now = Instant::now();
        let mut state = DetectionState::new(&config(10.0), secs(30));
        state.observe(Some(80.0), now, false);

        let obs = state.observe(None, now + secs(1), false);
        assert_eq!(obs, Observation::default());
        assert_eq!(state.mode(), DetectionMode::Warning);
    }

    #[test]
    fn test_triggered_holds_until_reset_timeout_and_far() {
        let t0 = Instant::now();
        let mut state = DetectionState::new(&config(10.0), secs(30));
        assert!(state.observe(Some(30.0), t0, false).trigger);

        // Far away but too soon
        state.observe(Some(150.0), t0 + secs(5), false);
        assert_eq!(state.mode(), DetectionMode::Triggered);

        // Late enough but still close
        state.observe(Some(60.0), t0 + secs(11), false);
        assert_eq!(state.mode(), DetectionMode::Triggered);

        let obs = state.observe(Some(150.0), t0 + secs(12), false);
        assert_eq!(obs.transition, Some((DetectionMode::Triggered, DetectionMode::Idle)));
    }

    #[test]
    fn test_cooldown_blocks_retrigger() {
        let t0 = Instant::now();
        let mut state = DetectionState::new(&config(0.0), secs(30));
        assert!(state.observe(Some(30.0), t0, false).trigger);

        state.observe(Some(150.0), t0 + secs(1), false);
        assert_eq!(state.mode(), DetectionMode::Idle);

        let obs = state.observe(Some(30.0), t0 + secs(5), false);
        assert!(!obs.trigger);
        assert_eq!(
            obs.suppressed,
            Some(Suppression::Cooldown { remaining: secs(25) })
        );
        assert_eq!(state.mode(), DetectionMode::Warning);

        assert!(state.observe(Some(30.0), t0 + secs(30), false).trigger);
    }

    #[test]
    fn test_cooldown_runs_from_scene_end() {
        let t0 = Instant::now();
        let mut state = DetectionState::new(&config(0.0), secs(30));
        assert!(state.observe(Some(30.0), t0, false).trigger);
        state.scene_finished(t0 + secs(20));
        state.observe(Some(150.0), t0 + secs(21), false);

        assert_eq!(state.cooldown_remaining(t0 + secs(35)), secs(15));
        assert!(!state.observe(Some(30.0), t0 + secs(35), false).trigger);
        assert!(state.observe(Some(30.0), t0 + secs(50), false).trigger);
    }

    #[test]
    fn test_running_scene_suppresses_trigger() {
        let t0 = Instant::now();
        let mut state = DetectionState::new(&config(0.0), Duration::ZERO);

        let obs = state.observe(Some(30.0), t0, true);
        assert!(!obs.trigger);
        assert_eq!(obs.suppressed, Some(Suppression::SceneRunning));
    }

    #[test]
    fn test_mode_colors() {
        assert_eq!(DetectionMode::Idle.color(), Rgb::GREEN);
        assert_eq!(DetectionMode::Warning.color(), Rgb::ORANGE);
        assert_eq!(DetectionMode::Triggered.color(), Rgb::RED);
    }
}
