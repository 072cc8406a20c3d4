use chrono::Datelike;
use chrono::NaiveDateTime;
use chrono::Timelike;
use chrono::Weekday;

use crate::config::ScheduleConfig;

/// Whether Auto mode may answer the door at `now`.
///
/// True iff the hour lies in `[start_hour, end_hour)`, the entry door is closed, and either
/// weekends are allowed or `now` is a weekday.
pub fn auto_permitted(
    now: NaiveDateTime,
    door_open: bool,
    start_hour: u32,
    end_hour: u32,
    disable_weekend: bool,
) -> bool {
    let hour = now.hour();
    let weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);

    (start_hour..end_hour).contains(&hour) && !door_open && !(disable_weekend && weekend)
}

/// The configured Auto window, evaluated once per tick.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    start_hour: u32,
    end_hour: u32,
    disable_weekend: bool,
}

impl Schedule {
    pub fn new(start_hour: u32, end_hour: u32, disable_weekend: bool) -> Self {
        Self {
            start_hour,
            end_hour,
            disable_weekend,
        }
    }

    pub fn permits(&self, now: NaiveDateTime, door_open: bool) -> bool {
        auto_permitted(
            now,
            door_open,
            self.start_hour,
            self.end_hour,
            self.disable_weekend,
        )
    }

    /// Human-readable summary for the startup log
    pub fn describe(&self) -> String {
        format!(
            "Active Auto Mode Start at {}:00 Hours, Active Auto Mode Finish at {}:00 Hours, Auto Mode {} on Weekends",
            self.start_hour,
            self.end_hour,
            if self.disable_weekend {
                "Disabled"
            } else {
                "Enabled"
            }
        )
    }
}

impl From<&ScheduleConfig> for Schedule {
    fn from(cfg: &ScheduleConfig) -> Self {
        Self::new(cfg.start_hour, cfg.end_hour, cfg.disable_weekend)
    }
}
