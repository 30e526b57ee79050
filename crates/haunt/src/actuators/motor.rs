//! Bidirectional DC motor behind an H-bridge.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::DeviceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Forward,
    Reverse,
}

impl fmt::Display for MotorDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorDirection::Forward => f.write_str("forward"),
            MotorDirection::Reverse => f.write_str("reverse"),
        }
    }
}

/// Low-level motor output.
pub trait MotorDriver: Send {
    /// Energize one direction, or de-energize both with `None`.
    fn drive(&mut self, direction: Option<MotorDirection>) -> DeviceResult<()>;
}

/// Shared handle to the motor.
///
/// Moves are serialized: a second move waits until the first has finished
/// and the motor has been stopped. A move always ends with the motor
/// de-energized, including when the move errors, panics or its task is
/// cancelled mid-sleep.
#[derive(Clone)]
pub struct Motor {
    name: Arc<str>,
    driver: Arc<Mutex<Box<dyn MotorDriver>>>,
}

impl Motor {
    pub fn new(name: impl Into<String>, driver: impl MotorDriver + 'static) -> Self {
        Self {
            name: Arc::from(name.into()),
            driver: Arc::new(Mutex::new(Box::new(driver))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drive forward for `duration`, then stop.
    pub async fn move_forward(&self, duration: Duration) -> DeviceResult<()> {
        self.run(MotorDirection::Forward, duration).await
    }

    /// Drive in reverse for `duration`, then stop.
    pub async fn move_reverse(&self, duration: Duration) -> DeviceResult<()> {
        self.run(MotorDirection::Reverse, duration).await
    }

    /// De-energize both directions. Waits for any move in progress.
    pub async fn stop(&self) -> DeviceResult<()> {
        let mut driver = self.driver.lock().await;
        driver.drive(None)
    }

    async fn run(&self, direction: MotorDirection, duration: Duration) -> DeviceResult<()> {
        let mut driver = self.driver.lock().await;
        let guard = StopOnDrop {
            name: &self.name,
            driver: &mut driver,
            armed: true,
        };

        // Never energize one side while the other may still be on
        guard.driver.drive(None)?;
        guard.driver.drive(Some(direction))?;
        info!(motor = %self.name, %direction, seconds = duration.as_secs_f64(), "motor moving");

        tokio::time::sleep(duration).await;
        guard.finish()
    }
}

/// Stops the motor when a move is dropped before finishing.
struct StopOnDrop<'a> {
    name: &'a str,
    driver: &'a mut Box<dyn MotorDriver>,
    armed: bool,
}

impl StopOnDrop<'_> {
    fn finish(mut self) -> DeviceResult<()> {
        self.armed = false;
        self.driver.drive(None)?;
        debug!(motor = %self.name, "motor stopped");
        Ok(())
    }
}

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.driver.drive(None) {
            Ok(()) => debug!(motor = %self.name, "motor stopped after interrupted move"),
            Err(e) => error!(motor = %self.name, error = %e, "failed to stop motor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{EventLog, Fault, SimEvent, SimMotor};
    use tokio::time::Instant;

    fn motor_events(log: &EventLog) -> Vec<SimEvent> {
        log.for_device("lid")
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_ends_stopped() {
        let log = EventLog::new();
        let motor = Motor::new("lid", SimMotor::new("lid", log.clone()));

        let start = Instant::now();
        motor.move_forward(Duration::from_secs(6)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(6));

        assert_eq!(
            motor_events(&log),
            vec![
                SimEvent::Motor(None),
                SimEvent::Motor(Some(MotorDirection::Forward)),
                SimEvent::Motor(None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_moves_are_serialized() {
        let log = EventLog::new();
        let motor = Motor::new("lid", SimMotor::new("lid", log.clone()));

        let opening = tokio::spawn({
            let motor = motor.clone();
            async move { motor.move_forward(Duration::from_secs(2)).await }
        });
        tokio::task::yield_now().await;

        let start = Instant::now();
        motor.move_reverse(Duration::from_secs(1)).await.unwrap();
        opening.await.unwrap().unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));

        let events = motor_events(&log);
        let forward = events
            .iter()
            .position(|e| *e == SimEvent::Motor(Some(MotorDirection::Forward)))
            .unwrap();
        let reverse = events
            .iter()
            .position(|e| *e == SimEvent::Motor(Some(MotorDirection::Reverse)))
            .unwrap();
        assert!(forward < reverse);
        assert_eq!(events[forward + 1], SimEvent::Motor(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_move_still_stops() {
        let log = EventLog::new();
        let motor = Motor::new("lid", SimMotor::new("lid", log.clone()));

        let task = tokio::spawn({
            let motor = motor.clone();
            async move { motor.move_forward(Duration::from_secs(10)).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(motor_events(&log).last(), Some(&SimEvent::Motor(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_leaves_motor_stopped() {
        let log = EventLog::new();
        let motor = Motor::new("lid", SimMotor::new("lid", log.clone()).with_fault(Fault::Fatal));

        let err = motor.move_forward(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(motor_events(&log).last(), Some(&SimEvent::Motor(None)));
    }
}
