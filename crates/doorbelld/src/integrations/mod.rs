//! External collaborators of the controller.
//!
//! Each one is a narrow async trait so the controller can be exercised against recording
//! mocks; the concrete types here shell out to the usual Raspberry Pi tools or talk HTTP/MQTT.

pub mod gpio;
pub mod linphone;
pub mod media;
pub mod mqtt;
pub mod pushover;

use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitStatus;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Failure of a single collaborator call. Always logged, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },

    #[error("Failed to read attachment {0}: {1}")]
    Attachment(PathBuf, #[source] std::io::Error),

    #[error("Notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification rejected with HTTP {0}")]
    Rejected(reqwest::StatusCode),
}

/// Still image capture
#[async_trait]
pub trait Camera: Send + Sync {
    async fn capture(&self, path: &Path) -> Result<(), ActionError>;
}

/// Plays the recorded door message
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, file: &Path) -> Result<(), ActionError>;
}

/// SIP bridge used to reach a human operator in manual mode
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Bring the SIP user agent up so calls can be placed
    async fn start_service(&self) -> Result<(), ActionError>;

    async fn stop_service(&self) -> Result<(), ActionError>;

    async fn dial(&self, address: &str) -> Result<(), ActionError>;

    async fn hang_up(&self) -> Result<(), ActionError>;
}

pub const NOTIFICATION_TITLE: &str = "Doorbell";

/// A push notification, optionally carrying a captured image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// Name of the alert sound on the receiving device
    pub sound: String,
    pub attachment: Option<PathBuf>,
}

impl Notification {
    pub fn new(message: &str, sound: &str, attachment: Option<PathBuf>) -> Self {
        Self {
            title: NOTIFICATION_TITLE.to_string(),
            message: message.to_string(),
            sound: sound.to_string(),
            attachment,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), ActionError>;
}

/// Run `program` to completion, treating a non-zero exit as a failure.
pub(crate) async fn run_command<I, S>(program: &str, args: I) -> Result<(), ActionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    debug!("Running {:?}", command.as_std());

    let status = command.status().await.map_err(|source| ActionError::Spawn {
        program: program.to_string(),
        source,
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(ActionError::Failed {
            program: program.to_string(),
            status,
        })
    }
}
