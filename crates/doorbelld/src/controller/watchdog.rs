use crate::config::WatchdogConfig;

/// What the control loop must do after a watchdog tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    None,
    /// Ask the supervisor to acknowledge
    SendHeartbeat,
    /// The supervisor stopped acknowledging: shut down and restart
    SupervisorLost,
}

/// Counts control loop ticks since the supervisor last acknowledged a heartbeat.
///
/// Loss is reported once; the watchdog stays latched until [`acknowledge`](Self::acknowledge).
#[derive(Debug)]
pub struct Watchdog {
    enabled: bool,
    heartbeat_ticks: u32,
    lost_ticks: u32,
    counter: u32,
    lost: bool,
}

impl Watchdog {
    pub fn new(enabled: bool, heartbeat_ticks: u32, lost_ticks: u32) -> Self {
        debug_assert!(lost_ticks > heartbeat_ticks);
        Self {
            enabled,
            heartbeat_ticks,
            lost_ticks,
            counter: 0,
            lost: false,
        }
    }

    pub fn from_config(enabled: bool, cfg: &WatchdogConfig) -> Self {
        Self::new(enabled, cfg.heartbeat_ticks, cfg.lost_ticks)
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Advance by one control loop tick.
    pub fn tick(&mut self) -> WatchdogAction {
        if !self.enabled || self.lost {
            return WatchdogAction::None;
        }

        self.counter = self.counter.saturating_add(1);

        if self.counter > self.lost_ticks {
            self.lost = true;
            WatchdogAction::SupervisorLost
        } else if self.counter == self.heartbeat_ticks {
            WatchdogAction::SendHeartbeat
        } else {
            WatchdogAction::None
        }
    }

    /// The supervisor answered a heartbeat.
    pub fn acknowledge(&mut self) {
        self.counter = 0;
        self.lost = false;
    }
}
