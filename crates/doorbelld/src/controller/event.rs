use tokio::sync::mpsc;

/// Where a mode trigger came from, for the transition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TriggerSource {
    #[strum(to_string = "button")]
    Button,
    #[strum(to_string = "remote")]
    Remote,
    #[strum(to_string = "startup")]
    Startup,
}

/// The only door whose state gates Auto mode
pub const ENTRY_DOOR: &str = "Entry Door";

/// Everything that can change the controller's state from outside.
///
/// Button edge handlers and the MQTT bridge only ever enqueue these; the control loop drains
/// the queue once per tick, so mode state has a single writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Toggle Auto mode
    AutoTrigger(TriggerSource),

    /// Toggle Manual mode
    ManualTrigger(TriggerSource),

    /// Pulse the door release once
    OpenDoor,

    /// Publish the current status now
    UpdateStatus,

    /// A door sensor reported through the home manager
    DoorStatusChange { door: String, open: bool },

    /// The supervisor answered a heartbeat
    HeartbeatAck,
}

pub type EventSender = mpsc::UnboundedSender<ControlEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ControlEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
