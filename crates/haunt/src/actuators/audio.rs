//! Audio channels, one per registered track.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{DeviceError, DeviceResult};

/// Plays a single track.
pub trait AudioDriver: Send + Sync {
    /// Play the track to completion at `volume` (0.0 to 1.0). Blocks.
    fn play(&self, volume: f32) -> DeviceResult<()>;
}

struct ChannelInner {
    driver: Box<dyn AudioDriver>,
    volume: Mutex<f32>,
    playing: AtomicBool,
}

/// Clears the playing flag however playback ends.
struct PlayingFlag<'a>(&'a AtomicBool);

impl Drop for PlayingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared handle to one track's playback channel.
///
/// Playback is fire-and-return: [`AudioChannel::play`] starts the track on
/// the blocking pool and hands back its join handle. While a track plays,
/// further `play` calls on the same channel fail with [`DeviceError::Busy`].
#[derive(Clone)]
pub struct AudioChannel {
    track: Arc<str>,
    inner: Arc<ChannelInner>,
}

impl AudioChannel {
    pub fn new(track: impl Into<String>, driver: impl AudioDriver + 'static) -> Self {
        Self {
            track: Arc::from(track.into()),
            inner: Arc::new(ChannelInner {
                driver: Box::new(driver),
                volume: Mutex::new(1.0),
                playing: AtomicBool::new(false),
            }),
        }
    }

    pub fn track(&self) -> &str {
        &self.track
    }

    /// Set the volume for the next playback, clamped to 0.0..=1.0.
    ///
    /// Returns the value actually stored.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let clamped = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        *self.inner.volume.lock() = clamped;
        clamped
    }

    pub fn volume(&self) -> f32 {
        *self.inner.volume.lock()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.playing.load(Ordering::Acquire)
    }

    /// Start playback. Must be called from within a tokio runtime.
    pub fn play(&self) -> DeviceResult<JoinHandle<DeviceResult<()>>> {
        if self
            .inner
            .playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DeviceError::Busy);
        }

        let volume = self.volume();
        let inner = Arc::clone(&self.inner);
        let track = Arc::clone(&self.track);
        info!(%track, volume, "playing audio");

        Ok(tokio::task::spawn_blocking(move || {
            let _flag = PlayingFlag(&inner.playing);
            let result = inner.driver.play(volume);
            debug!(%track, ok = result.is_ok(), "audio finished");
            result
        }))
    }
}
