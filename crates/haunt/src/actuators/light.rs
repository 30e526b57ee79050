//! Network-controlled RGB light.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{DeviceError, DeviceResult};

/// A validated RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    pub const ORANGE: Rgb = Rgb { r: 255, g: 165, b: 0 };
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    /// Validate raw channels. Out-of-range values are rejected, never clamped.
    pub fn new(r: i32, g: i32, b: i32) -> DeviceResult<Self> {
        let channel = |value: i32, label: &str| {
            u8::try_from(value).map_err(|_| {
                DeviceError::InvalidCommand(format!(
                    "{label} channel {value} is outside 0..=255"
                ))
            })
        };
        Ok(Self {
            r: channel(r, "red")?,
            g: channel(g, "green")?,
            b: channel(b, "blue")?,
        })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// A command sent to the light. Delivery is fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCommand {
    Power(bool),
    Color(Rgb),
}

pub trait LightDriver: Send {
    fn send(&mut self, command: &LightCommand) -> DeviceResult<()>;
}

struct LightState {
    driver: Box<dyn LightDriver>,
    /// `None` when the last send failed and the device state is unknown
    power: Option<bool>,
    color: Option<Rgb>,
}

impl LightState {
    fn apply(&mut self, command: LightCommand, name: &str) -> DeviceResult<()> {
        let result = self.driver.send(&command);
        match (&result, command) {
            (Ok(()), LightCommand::Power(on)) => self.power = Some(on),
            (Ok(()), LightCommand::Color(rgb)) => self.color = Some(rgb),
            (Err(_), LightCommand::Power(_)) => self.power = None,
            (Err(_), LightCommand::Color(_)) => self.color = None,
        }
        if let Err(e) = &result {
            warn!(light = %name, ?command, error = %e, "light command failed");
        }
        result
    }
}

/// Shared handle to the light.
///
/// Commands are serialized, so a flash sequence runs to completion before
/// the next command reaches the device.
#[derive(Clone)]
pub struct Light {
    name: Arc<str>,
    flash_delay: Duration,
    state: Arc<Mutex<LightState>>,
}

impl Light {
    pub fn new(
        name: impl Into<String>,
        flash_delay: Duration,
        driver: impl LightDriver + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name.into()),
            flash_delay,
            state: Arc::new(Mutex::new(LightState {
                driver: Box::new(driver),
                power: None,
                color: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delay between toggles used by scene flashes.
    pub fn flash_delay(&self) -> Duration {
        self.flash_delay
    }

    /// Last power state the device acknowledged, if known.
    pub async fn power(&self) -> Option<bool> {
        self.state.lock().await.power
    }

    /// Last color the device acknowledged, if known.
    pub async fn color(&self) -> Option<Rgb> {
        self.state.lock().await.color
    }

    /// Validate and set the color. Invalid channels leave the light untouched.
    pub async fn set_color(&self, r: i32, g: i32, b: i32) -> DeviceResult<()> {
        let rgb = Rgb::new(r, g, b)?;
        self.set_rgb(rgb).await
    }

    pub async fn set_rgb(&self, rgb: Rgb) -> DeviceResult<()> {
        debug!(light = %self.name, color = %rgb, "setting color");
        self.state
            .lock()
            .await
            .apply(LightCommand::Color(rgb), &self.name)
    }

    pub async fn turn_on(&self) -> DeviceResult<()> {
        self.state
            .lock()
            .await
            .apply(LightCommand::Power(true), &self.name)
    }

    pub async fn turn_off(&self) -> DeviceResult<()> {
        self.state
            .lock()
            .await
            .apply(LightCommand::Power(false), &self.name)
    }

    /// Toggle off/on `amount` times, `delay` apart, ending on.
    ///
    /// A failed toggle does not stop the sequence; the first error is
    /// returned once the sequence has finished.
    pub async fn flash(&self, amount: u32, delay: Duration) -> DeviceResult<()> {
        let mut state = self.state.lock().await;
        debug!(light = %self.name, amount, "flashing");

        let mut first_error = None;
        for i in 0..amount {
            if let Err(e) = state.apply(LightCommand::Power(false), &self.name) {
                first_error.get_or_insert(e);
            }
            tokio::time::sleep(delay).await;
            if let Err(e) = state.apply(LightCommand::Power(true), &self.name) {
                first_error.get_or_insert(e);
            }
            if i + 1 < amount {
                tokio::time::sleep(delay).await;
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
