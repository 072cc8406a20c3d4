#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod controller;
pub mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use controller::Controller;
pub use controller::DoorbellStatus;
pub use controller::Exit;
pub use controller::Mode;
