//! Configuration file parsing and structures.
//!
//! doorbelld reads a single TOML file. Every section falls back to defaults matching the
//! reference wiring, except credentials and addresses which have no sensible default:
//! - `[pushover]` token and user are always required (idle and auto rings notify)
//! - `[telephony] sip_address` is required when `telephony_in_manual_mode` is set

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub mqtt: MqttConfig,
    pub modes: ModesConfig,
    pub schedule: ScheduleConfig,
    pub watchdog: WatchdogConfig,
    pub status: StatusConfig,
    pub media: MediaConfig,
    pub telephony: TelephonyConfig,
    pub pushover: PushoverConfig,

    /// Read-only HTTP status API, disabled when absent
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `rumqttc = "warn"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the subscriber filter: the default level plus one directive per override.
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

/// MQTT broker connection and topic names
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    pub broker: String,

    pub port: u16,

    pub client_id: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Topic carrying button presses and home-manager commands
    pub command_topic: String,

    /// Topic the status, heartbeat and restart messages are published on
    pub status_topic: String,

    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "doorbell".to_string(),
            username: None,
            password: None,
            command_topic: "DoorbellButton".to_string(),
            status_topic: "DoorbellStatus".to_string(),
            keep_alive_secs: 60,
        }
    }
}

/// Operating mode flags
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModesConfig {
    /// Send a push notification when the bell rings in manual mode
    pub push_in_manual_mode: bool,

    /// Start linphone with full video instead of capture-only video
    pub full_video: bool,

    /// Select Auto mode right after startup
    pub auto_on_startup: bool,

    /// Ring the configured SIP address when the bell rings in manual mode
    pub telephony_in_manual_mode: bool,

    /// Exchange heartbeats with the home manager and restart when they stop
    pub heartbeat_enabled: bool,

    /// Run a test call (or a test capture) before entering the main loop
    pub startup_self_test: bool,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            push_in_manual_mode: true,
            full_video: false,
            auto_on_startup: false,
            telephony_in_manual_mode: false,
            heartbeat_enabled: false,
            startup_self_test: true,
        }
    }
}

/// Window during which Auto mode may answer the door
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// First hour (inclusive, 24h clock) in which Auto may answer
    pub start_hour: u32,

    /// Hour (exclusive) at which Auto stops answering
    pub end_hour: u32,

    pub disable_weekend: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start_hour: 7,
            end_hour: 19,
            disable_weekend: true,
        }
    }
}

/// Liveness watchdog thresholds, in main loop ticks
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub heartbeat_ticks: u32,
    pub lost_ticks: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            heartbeat_ticks: 3000,
            lost_ticks: 4500,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Publish an unconditional status every this many ticks (0 disables the baseline)
    pub baseline_ticks: u32,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { baseline_ticks: 1 }
    }
}

/// Still capture and message playback
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub capture_directory: PathBuf,
    pub capture_program: String,
    pub auto_message_file: PathBuf,
    pub playback_program: String,

    /// ALSA device passed to the playback program with `-D`
    pub playback_device: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            capture_directory: PathBuf::from("/var/lib/doorbelld/captures"),
            capture_program: "fswebcam".to_string(),
            auto_message_file: PathBuf::from("/usr/share/doorbelld/auto_message.wav"),
            playback_program: "aplay".to_string(),
            playback_device: "front:CARD=Device,DEV=0".to_string(),
        }
    }
}

/// Linphone SIP bridge used in manual mode
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub sip_address: Option<String>,
    pub program: String,
    pub config_file: Option<PathBuf>,
    pub debug_log_file: PathBuf,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            sip_address: None,
            program: "linphonecsh".to_string(),
            config_file: None,
            debug_log_file: PathBuf::from("/var/log/doorbelld/linphone.log"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushoverConfig {
    pub token: String,
    pub user: String,
    pub api_url: String,
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            user: String::new(),
            api_url: "https://api.pushover.net/1/messages.json".to_string(),
        }
    }
}

/// HTTP status API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.schedule;
        if schedule.start_hour > 24 || schedule.end_hour > 24 {
            return Err(ConfigError::Invalid {
                field: "schedule",
                message: format!(
                    "hours must be within 0..=24, got start {} and end {}",
                    schedule.start_hour, schedule.end_hour
                ),
            });
        }
        if schedule.start_hour > schedule.end_hour {
            return Err(ConfigError::Invalid {
                field: "schedule",
                message: format!(
                    "start_hour {} is after end_hour {}",
                    schedule.start_hour, schedule.end_hour
                ),
            });
        }

        if self.watchdog.lost_ticks <= self.watchdog.heartbeat_ticks {
            return Err(ConfigError::Invalid {
                field: "watchdog.lost_ticks",
                message: format!(
                    "must be greater than heartbeat_ticks ({})",
                    self.watchdog.heartbeat_ticks
                ),
            });
        }

        if self.modes.telephony_in_manual_mode && self.telephony.sip_address.is_none() {
            return Err(ConfigError::Invalid {
                field: "telephony.sip_address",
                message: "required when modes.telephony_in_manual_mode is enabled".to_string(),
            });
        }

        if self.pushover.token.is_empty() || self.pushover.user.is_empty() {
            return Err(ConfigError::Invalid {
                field: "pushover",
                message: "token and user are required".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}
