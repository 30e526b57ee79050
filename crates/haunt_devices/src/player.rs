//! Audio playback through an external command-line player.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use haunt::actuators::{AudioDriver, DeviceError, DeviceResult};
use haunt_common::AudioConfig;
use tracing::debug;

use crate::error::InitError;

/// Placeholder in `player_args` replaced by the volume in percent.
const VOLUME_PLACEHOLDER: &str = "{volume}";

/// Plays one file by running the configured player and waiting for it.
#[derive(Debug, Clone)]
pub struct PlayerAudio {
    program: String,
    args: Vec<String>,
    path: PathBuf,
}

impl PlayerAudio {
    /// Fails if the track's file does not exist.
    pub fn new(config: &AudioConfig, track: &str, file: &str) -> Result<Self, InitError> {
        let path = config.track_path(file);
        if !path.is_file() {
            return Err(InitError::MissingAudio {
                track: track.to_string(),
                path,
            });
        }
        Ok(Self {
            program: config.player.clone(),
            args: config.player_args.clone(),
            path,
        })
    }

    fn command(&self, volume: f32) -> Command {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u32;
        let mut command = Command::new(&self.program);
        command
            .args(
                self.args
                    .iter()
                    .map(|arg| arg.replace(VOLUME_PLACEHOLDER, &percent.to_string())),
            )
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl AudioDriver for PlayerAudio {
    fn play(&self, volume: f32) -> DeviceResult<()> {
        debug!(program = %self.program, path = %self.path.display(), volume, "starting player");
        let status = self
            .command(volume)
            .status()
            .map_err(|e| DeviceError::SendFailed(format!("failed to start {}: {e}", self.program)))?;
        if status.success() {
            Ok(())
        } else {
            Err(DeviceError::SendFailed(format!(
                "{} exited with {status}",
                self.program
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path, player: &str) -> AudioConfig {
        AudioConfig {
            base_path: dir.to_path_buf(),
            player: player.to_string(),
            player_args: vec!["--gain={volume}".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlayerAudio::new(&config(dir.path(), "mpg123"), "creepy", "creepy.mp3").unwrap_err();
        assert!(matches!(err, InitError::MissingAudio { ref track, .. } if track == "creepy"));
    }

    #[test]
    fn test_volume_substituted_into_args() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("creepy.mp3"), b"").unwrap();
        let player = PlayerAudio::new(&config(dir.path(), "mpg123"), "creepy", "creepy.mp3").unwrap();

        let command = player.command(0.7);
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[0], "--gain=70");
        assert!(args[1].ends_with("creepy.mp3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("creepy.mp3"), b"").unwrap();

        let ok = PlayerAudio::new(&config(dir.path(), "true"), "creepy", "creepy.mp3").unwrap();
        assert!(ok.play(0.5).is_ok());

        let failing = PlayerAudio::new(&config(dir.path(), "false"), "creepy", "creepy.mp3").unwrap();
        assert!(matches!(failing.play(0.5), Err(DeviceError::SendFailed(_))));
    }

    #[test]
    fn test_unknown_player_is_send_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("creepy.mp3"), b"").unwrap();
        let player =
            PlayerAudio::new(&config(dir.path(), "no-such-player-binary"), "creepy", "creepy.mp3")
                .unwrap();
        assert!(matches!(player.play(0.5), Err(DeviceError::SendFailed(_))));
    }
}
