//! Two-channel status light driver.
//!
//! The control loop stores an [`IndicatorPattern`] on the shared [`IndicatorBoard`]; the
//! indicator task loads it every tick and drives the lamps. Patterns are swapped as a whole
//! so the task never sees the auto threshold of one pattern next to the manual threshold of
//! another.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::integrations::gpio::IndicatorOutput;

/// Number of ticks in one blink cycle
pub const DEFAULT_CYCLE_LENGTH: u16 = 20;

/// Duration of one indicator tick
pub const INDICATOR_TICK: Duration = Duration::from_millis(50);

/// What a single lamp shows over one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lamp {
    Off,
    /// On for a single tick per cycle
    Blip,
    /// On for half the cycle
    Blink,
    Solid,
}

impl Lamp {
    /// On-threshold for a cycle of `cycle_length` ticks
    pub fn threshold(self, cycle_length: u16) -> u16 {
        match self {
            Lamp::Off => 0,
            Lamp::Blip => 1,
            Lamp::Blink => cycle_length / 2,
            Lamp::Solid => cycle_length,
        }
    }
}

/// On-thresholds for both channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorPattern {
    pub auto: u16,
    pub manual: u16,
}

impl IndicatorPattern {
    pub fn new(auto: Lamp, manual: Lamp, cycle_length: u16) -> Self {
        Self {
            auto: auto.threshold(cycle_length),
            manual: manual.threshold(cycle_length),
        }
    }

    pub const fn off() -> Self {
        Self { auto: 0, manual: 0 }
    }
}

/// Pattern plus a generation number so the driver can restart its cycle on every change.
#[derive(Debug, Clone, Copy)]
struct Published {
    pattern: IndicatorPattern,
    generation: u64,
}

/// Shared handoff between the control loop (single writer) and the indicator task (single
/// reader).
#[derive(Debug)]
pub struct IndicatorBoard {
    cycle_length: u16,
    current: ArcSwap<Published>,
    running: AtomicBool,
}

impl IndicatorBoard {
    pub fn new(cycle_length: u16, initial: IndicatorPattern) -> Self {
        Self {
            cycle_length,
            current: ArcSwap::from_pointee(Published {
                pattern: initial,
                generation: 0,
            }),
            running: AtomicBool::new(true),
        }
    }

    pub fn cycle_length(&self) -> u16 {
        self.cycle_length
    }

    /// Replace the pattern; the cycle restarts at position 0.
    pub fn set(&self, pattern: IndicatorPattern) {
        let generation = self.current.load().generation + 1;
        self.current.store(Arc::new(Published {
            pattern,
            generation,
        }));
    }

    /// Set both lamps from their [`Lamp`] descriptions.
    pub fn show(&self, auto: Lamp, manual: Lamp) {
        self.set(IndicatorPattern::new(auto, manual, self.cycle_length));
    }

    /// Change only the manual lamp, keeping the auto lamp as it is.
    pub fn show_manual(&self, manual: Lamp) {
        self.set(IndicatorPattern {
            manual: manual.threshold(self.cycle_length),
            ..self.pattern()
        });
    }

    pub fn pattern(&self) -> IndicatorPattern {
        self.current.load().pattern
    }

    fn snapshot(&self) -> Published {
        **self.current.load()
    }

    /// Ask the indicator task to turn both lamps off and exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// The driver's cycle counter.
#[derive(Debug)]
pub struct IndicatorCycle {
    length: u16,
    position: u16,
    generation: u64,
}

impl IndicatorCycle {
    pub fn new(length: u16) -> Self {
        Self {
            length: length.max(1),
            position: 0,
            generation: 0,
        }
    }

    pub fn position(&self) -> u16 {
        self.position
    }

    /// Lamp states for the current position, then advance and wrap.
    ///
    /// Returns `(auto_on, manual_on)`.
    pub fn step(&mut self, pattern: IndicatorPattern) -> (bool, bool) {
        let lamps = (self.position < pattern.auto, self.position < pattern.manual);
        self.position = (self.position + 1) % self.length;
        lamps
    }

    fn step_published(&mut self, published: Published) -> (bool, bool) {
        if published.generation != self.generation {
            self.generation = published.generation;
            self.position = 0;
        }
        self.step(published.pattern)
    }
}

/// Indicator task: runs until [`IndicatorBoard::stop`] is called.
pub async fn run_indicator(
    board: Arc<IndicatorBoard>,
    mut output: Box<dyn IndicatorOutput>,
    tick: Duration,
) {
    let mut cycle = IndicatorCycle::new(board.cycle_length());
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while board.is_running() {
        interval.tick().await;
        let (auto_on, manual_on) = cycle.step_published(board.snapshot());
        output.set_lamps(auto_on, manual_on);
    }

    output.set_lamps(false, false);
    debug!("Indicator loop stopped");
}
