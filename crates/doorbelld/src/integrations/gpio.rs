//! Pin-level seams.
//!
//! Real pin drivers are out of scope; they implement [`DoorIo`] and [`IndicatorOutput`] and
//! feed button edges through [`Button`]. The simulated backends let the daemon run on a
//! development machine; [`run_console`] turns stdin lines into rings and button presses.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::time::Instant;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::controller::ControlEvent;
use crate::controller::EventSender;
use crate::controller::TriggerSource;

/// Minimum gap between two accepted button edges
pub const BUTTON_DEBOUNCE: Duration = Duration::from_millis(300);

/// How long a console `ring` holds the simulated ring line active
const CONSOLE_RING_PRESS: Duration = Duration::from_millis(250);

/// Ring line and door release relay, owned by the control loop
pub trait DoorIo: Send {
    /// Logical level of the ring line (true while the bell is ringing)
    fn ring_active(&mut self) -> bool;

    /// Energise (true) or release (false) the door release relay
    fn set_door_release(&mut self, energised: bool);
}

/// The two status lamps, owned by the indicator task
pub trait IndicatorOutput: Send {
    fn set_lamps(&mut self, auto_on: bool, manual_on: bool);
}

/// Rejects edges arriving within the debounce window of the last accepted one.
#[derive(Debug)]
pub struct ButtonDebouncer {
    window: Duration,
    last: Option<Instant>,
}

impl ButtonDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Which mode a physical button toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ButtonKind {
    Auto,
    Manual,
}

/// A momentary push button. Edge handlers call [`Button::on_rising_edge`], which enqueues a
/// trigger for the next control loop tick instead of touching mode state.
pub struct Button {
    kind: ButtonKind,
    debouncer: ButtonDebouncer,
    events: EventSender,
}

impl Button {
    pub fn new(kind: ButtonKind, events: EventSender) -> Self {
        Self {
            kind,
            debouncer: ButtonDebouncer::new(BUTTON_DEBOUNCE),
            events,
        }
    }

    /// Returns whether the edge was accepted and queued.
    pub fn on_rising_edge(&mut self, now: Instant) -> bool {
        if !self.debouncer.accept(now) {
            trace!("{} button bounce ignored", self.kind);
            return false;
        }

        info!("{} button pressed", self.kind);
        let event = match self.kind {
            ButtonKind::Auto => ControlEvent::AutoTrigger(TriggerSource::Button),
            ButtonKind::Manual => ControlEvent::ManualTrigger(TriggerSource::Button),
        };
        self.events.send(event).is_ok()
    }
}

/// Door I/O for hosts without the doorbell hardware.
#[derive(Debug, Default)]
pub struct SimulatedDoor {
    ring: Arc<AtomicBool>,
    relay: bool,
}

impl SimulatedDoor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to drive the simulated ring line
    pub fn ring_line(&self) -> Arc<AtomicBool> {
        self.ring.clone()
    }

    pub fn relay_energised(&self) -> bool {
        self.relay
    }
}

impl DoorIo for SimulatedDoor {
    fn ring_active(&mut self) -> bool {
        self.ring.load(Ordering::Relaxed)
    }

    fn set_door_release(&mut self, energised: bool) {
        self.relay = energised;
        info!(
            "Door release relay {}",
            if energised { "energised" } else { "released" }
        );
    }
}

/// Lamps for hosts without the doorbell hardware.
#[derive(Debug, Default)]
pub struct SimulatedLamps {
    last: Option<(bool, bool)>,
}

impl IndicatorOutput for SimulatedLamps {
    fn set_lamps(&mut self, auto_on: bool, manual_on: bool) {
        if self.last != Some((auto_on, manual_on)) {
            trace!("Lamps: auto={} manual={}", auto_on, manual_on);
            self.last = Some((auto_on, manual_on));
        }
    }
}

/// Console stand-in for the bell push and the two mode buttons.
///
/// Reads `ring`, `auto` and `manual` lines from stdin until it closes.
pub async fn run_console(ring_line: Arc<AtomicBool>, events: EventSender) {
    let mut auto = Button::new(ButtonKind::Auto, events.clone());
    let mut manual = Button::new(ButtonKind::Manual, events);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "ring" => {
                ring_line.store(true, Ordering::Relaxed);
                tokio::time::sleep(CONSOLE_RING_PRESS).await;
                ring_line.store(false, Ordering::Relaxed);
            }
            "auto" => {
                auto.on_rising_edge(Instant::now());
            }
            "manual" => {
                manual.on_rising_edge(Instant::now());
            }
            "" => {}
            other => warn!("Unknown console command {:?} (expected ring, auto or manual)", other),
        }
    }
    trace!("Console input closed");
}
