use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::info;

use super::run_command;
use super::ActionError;
use super::AudioPlayer;
use super::Camera;
use crate::config::MediaConfig;

/// Where a still captured at `at` is stored, e.g. `04June2024100000picturedump.jpg`.
pub fn capture_path(directory: &Path, at: NaiveDateTime) -> PathBuf {
    directory.join(format!("{}picturedump.jpg", at.format("%d%B%Y%H%M%S")))
}

/// Captures stills with `fswebcam <path>`
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
}

impl CommandCamera {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl From<&MediaConfig> for CommandCamera {
    fn from(cfg: &MediaConfig) -> Self {
        Self::new(cfg.capture_program.clone())
    }
}

#[async_trait]
impl Camera for CommandCamera {
    async fn capture(&self, path: &Path) -> Result<(), ActionError> {
        info!("Capturing picture in file {}", path.display());
        run_command(&self.program, [path]).await
    }
}

/// Plays audio with `aplay -D <device> <file>`
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    device: String,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            device: device.into(),
        }
    }
}

impl From<&MediaConfig> for CommandPlayer {
    fn from(cfg: &MediaConfig) -> Self {
        Self::new(cfg.playback_program.clone(), cfg.playback_device.clone())
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, file: &Path) -> Result<(), ActionError> {
        info!("Playing message {}", file.display());
        run_command(
            &self.program,
            [OsStr::new("-D"), OsStr::new(&self.device), file.as_os_str()],
        )
        .await
    }
}
