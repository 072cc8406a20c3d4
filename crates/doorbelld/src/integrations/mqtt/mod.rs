mod bridge;
mod client;
mod message;

pub use bridge::MqttBridge;
pub use client::MqttClient;
pub use client::MqttMessage;
pub use client::MqttPublisher;
pub use client::RumqttcClient;
pub use message::decode_command;
pub use message::MessageError;
