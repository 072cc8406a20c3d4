use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::run_command;
use super::ActionError;
use super::Telephony;
use crate::config::Config;

/// Drives a linphone daemon through `linphonecsh`
#[derive(Debug, Clone)]
pub struct Linphone {
    program: String,
    full_video: bool,
    debug_log_file: PathBuf,
    config_file: Option<PathBuf>,
}

impl Linphone {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            program: cfg.telephony.program.clone(),
            full_video: cfg.modes.full_video,
            debug_log_file: cfg.telephony.debug_log_file.clone(),
            config_file: cfg.telephony.config_file.clone(),
        }
    }

    /// Arguments for `linphonecsh init`
    fn init_args(&self) -> Vec<String> {
        let video = if self.full_video { "-V" } else { "-C" };
        let mut args = vec![
            "init".to_string(),
            video.to_string(),
            "-d".to_string(),
            "1".to_string(),
            "-l".to_string(),
            self.debug_log_file.display().to_string(),
        ];
        if let Some(config_file) = &self.config_file {
            args.push("-c".to_string());
            args.push(config_file.display().to_string());
        }
        args
    }
}

#[async_trait]
impl Telephony for Linphone {
    async fn start_service(&self) -> Result<(), ActionError> {
        info!("Starting Linphone");
        run_command(&self.program, self.init_args()).await
    }

    async fn stop_service(&self) -> Result<(), ActionError> {
        info!("Stopping Linphone");
        run_command(&self.program, ["exit"]).await
    }

    async fn dial(&self, address: &str) -> Result<(), ActionError> {
        info!("Calling {}", address);
        run_command(&self.program, ["dial", address]).await
    }

    async fn hang_up(&self) -> Result<(), ActionError> {
        info!("Terminating Linphone call");
        run_command(&self.program, ["generic", "terminate"]).await
    }
}
