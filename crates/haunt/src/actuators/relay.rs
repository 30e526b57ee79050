//! On/off relays (skull, smoke machine, ...).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::DeviceResult;

/// Low-level relay output.
pub trait RelayDriver: Send {
    fn set(&mut self, energized: bool) -> DeviceResult<()>;
}

struct RelayState {
    driver: Box<dyn RelayDriver>,
    on: bool,
    /// Bumped by every command so a pending auto-off can tell it is stale
    generation: u64,
}

impl RelayState {
    fn switch(&mut self, on: bool, name: &str) -> DeviceResult<()> {
        if self.on == on {
            return Ok(());
        }
        self.force(on, name)
    }

    fn force(&mut self, on: bool, name: &str) -> DeviceResult<()> {
        self.driver.set(on)?;
        self.on = on;
        debug!(relay = %name, on, "relay switched");
        Ok(())
    }
}

/// Shared handle to a named relay.
///
/// `on` and `off` are idempotent. A timed `on` schedules an auto-off that is
/// skipped if any other command reached the relay in the meantime.
#[derive(Clone)]
pub struct Relay {
    name: Arc<str>,
    state: Arc<Mutex<RelayState>>,
}

impl Relay {
    /// Wrap a driver whose output is currently off.
    pub fn new(name: impl Into<String>, driver: impl RelayDriver + 'static) -> Self {
        Self {
            name: Arc::from(name.into()),
            state: Arc::new(Mutex::new(RelayState {
                driver: Box::new(driver),
                on: false,
                generation: 0,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_on(&self) -> bool {
        self.state.lock().on
    }

    pub fn on(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.generation += 1;
        state.switch(true, &self.name)
    }

    pub fn off(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.generation += 1;
        state.switch(false, &self.name)
    }

    /// Drive the output off even if it is believed to be off already.
    pub fn force_off(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.generation += 1;
        state.force(false, &self.name)
    }

    /// Turn on now and off again after `duration`.
    ///
    /// Returns the handle of the auto-off task. Must be called from within a
    /// tokio runtime.
    pub fn timed_on(&self, duration: Duration) -> DeviceResult<JoinHandle<DeviceResult<()>>> {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.switch(true, &self.name)?;
            state.generation
        };
        info!(relay = %self.name, seconds = duration.as_secs_f64(), "relay on with auto-off");

        let relay = self.clone();
        Ok(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut state = relay.state.lock();
            if state.generation != generation {
                debug!(relay = %relay.name, "auto-off superseded by a later command");
                return Ok(());
            }
            state.switch(false, &relay.name)
        }))
    }
}
