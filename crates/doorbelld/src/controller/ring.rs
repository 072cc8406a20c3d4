use chrono::NaiveDateTime;

/// Consecutive active samples required before a ring is accepted
pub const DEFAULT_DEBOUNCE_SAMPLES: u8 = 2;

/// A detected ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEvent {
    pub at: NaiveDateTime,
}

/// Debounced edge detector for the "ring active" line.
///
/// A ring is reported once per press: the line must go inactive before the next one counts.
/// While suppressed (door unlock pulse) nothing is reported, and after suppression is released
/// the line has to be seen inactive again first.
#[derive(Debug)]
pub struct RingSensor {
    debounce_samples: u8,
    active_samples: u8,
    armed: bool,
    suppressed: bool,
}

impl RingSensor {
    pub fn new(debounce_samples: u8) -> Self {
        Self {
            debounce_samples: debounce_samples.max(1),
            active_samples: 0,
            armed: true,
            suppressed: false,
        }
    }

    /// Feed one sample of the line. Returns a ring on the debounced inactive→active edge.
    pub fn sample(&mut self, active: bool, at: NaiveDateTime) -> Option<RingEvent> {
        if !active {
            self.active_samples = 0;
            if !self.suppressed {
                self.armed = true;
            }
            return None;
        }

        self.active_samples = self.active_samples.saturating_add(1);
        if self.suppressed || !self.armed || self.active_samples < self.debounce_samples {
            return None;
        }

        self.armed = false;
        Some(RingEvent { at })
    }

    /// Ignore the line until [`release`](Self::release).
    pub fn suppress(&mut self) {
        self.suppressed = true;
        self.armed = false;
    }

    pub fn release(&mut self) {
        self.suppressed = false;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }
}

impl Default for RingSensor {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_SAMPLES)
    }
}
