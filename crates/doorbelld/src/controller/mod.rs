//! The doorbell control core: mode state machine, ring-response sequences, schedule,
//! watchdog, indicator patterns and status publishing.

mod clock;
mod event;
pub mod indicator;
mod machine;
mod ring;
mod schedule;
pub mod sequence;
mod status;
mod watchdog;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use clock::Clock;
pub use clock::SystemClock;
pub use event::event_channel;
pub use event::ControlEvent;
pub use event::EventReceiver;
pub use event::EventSender;
pub use event::TriggerSource;
pub use event::ENTRY_DOOR;
pub use indicator::IndicatorBoard;
pub use indicator::IndicatorPattern;
pub use indicator::Lamp;
pub use machine::Collaborators;
pub use machine::Controller;
pub use machine::ControllerState;
pub use machine::Exit;
pub use machine::Mode;
pub use machine::TickOutcome;
pub use machine::CONTROL_TICK;
pub use ring::RingEvent;
pub use ring::RingSensor;
pub use schedule::auto_permitted;
pub use schedule::Schedule;
pub use status::DoorbellStatus;
pub use status::OutboundMessage;
pub use status::PublishError;
pub use status::StatusPublisher;
pub use status::StatusSink;
pub use watchdog::Watchdog;
pub use watchdog::WatchdogAction;
