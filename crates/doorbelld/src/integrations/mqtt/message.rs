use serde::Deserialize;
use serde_json::Value;

use crate::controller::ControlEvent;
use crate::controller::TriggerSource;

/// Reasons an inbound command is ignored
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Malformed command payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command has no service field")]
    MissingService,

    #[error("Unknown command service: {0}")]
    UnknownService(String),
}

#[derive(Debug, Deserialize)]
struct DoorStatusChange {
    door: String,
    new_door_state: i64,
}

/// Decode a payload from the command topic into a control event.
pub fn decode_command(payload: &[u8]) -> Result<ControlEvent, MessageError> {
    let value: Value = serde_json::from_slice(payload)?;
    let service = value
        .get("service")
        .and_then(Value::as_str)
        .ok_or(MessageError::MissingService)?
        .to_string();

    let event = match service.as_str() {
        "Automatic" => ControlEvent::AutoTrigger(TriggerSource::Remote),
        "Manual" => ControlEvent::ManualTrigger(TriggerSource::Remote),
        "OpenDoor" => ControlEvent::OpenDoor,
        "UpdateStatus" => ControlEvent::UpdateStatus,
        "Heartbeat Ack" => ControlEvent::HeartbeatAck,
        "DoorStatusChange" => {
            let change: DoorStatusChange = serde_json::from_value(value)?;
            ControlEvent::DoorStatusChange {
                door: change.door,
                open: change.new_door_state == 1,
            }
        }
        _ => return Err(MessageError::UnknownService(service)),
    };
    Ok(event)
}
