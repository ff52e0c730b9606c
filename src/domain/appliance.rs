use serde::{Deserialize, Serialize};

use crate::domain::{SLOTS_PER_DAY, STEPS_PER_HOUR};
use crate::error::EmsError;

/// Immutable catalog entry for a deferrable appliance.
///
/// The start window is given in hours of the day and may wrap past midnight
/// (`earliest_start_hour > latest_finish_hour`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appliance {
    pub name: String,
    /// Earliest start, hour of day.
    pub earliest_start_hour: f64,
    /// Latest finish, hour of day.
    pub latest_finish_hour: f64,
    /// Run duration in hours.
    pub duration_hours: f64,
    /// Electrical draw while running (kW).
    pub power_kw: f64,
}

impl Appliance {
    pub fn new(
        name: &str,
        earliest_start_hour: f64,
        latest_finish_hour: f64,
        duration_hours: f64,
        power_kw: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            earliest_start_hour,
            latest_finish_hour,
            duration_hours,
            power_kw,
        }
    }

    /// Run duration in half-hour slots.
    pub fn slots(&self) -> usize {
        (self.duration_hours * STEPS_PER_HOUR as f64).round() as usize
    }

    /// Slot of day at which the start window opens.
    pub fn opening_slot(&self) -> i64 {
        (self.earliest_start_hour * STEPS_PER_HOUR as f64) as i64
    }

    /// Latest admissible start, slot of day, such that the run still
    /// finishes inside the window.
    pub fn latest_start_slot(&self) -> i64 {
        ((self.latest_finish_hour * STEPS_PER_HOUR as f64) as i64 - self.slots() as i64)
            .rem_euclid(SLOTS_PER_DAY as i64)
    }

    pub fn validate(&self) -> Result<(), EmsError> {
        let invalid = |reason: &str| EmsError::InvalidCatalog {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if !(0.0..=24.0).contains(&self.earliest_start_hour)
            || !(0.0..=24.0).contains(&self.latest_finish_hour)
        {
            return Err(invalid("window hours must lie in [0, 24]"));
        }
        if self.earliest_start_hour == self.latest_finish_hour {
            return Err(invalid("start window is empty"));
        }
        if self.duration_hours <= 0.0 {
            return Err(invalid("duration must be positive"));
        }
        if self.duration_hours > 24.0 {
            return Err(invalid("duration exceeds 24 h"));
        }
        if (self.duration_hours * STEPS_PER_HOUR as f64).fract() != 0.0 {
            return Err(invalid("duration is not a whole number of half-hour slots"));
        }
        if self.power_kw < 0.0 {
            return Err(invalid("power must be non-negative"));
        }
        Ok(())
    }
}

/// Horizon-local slots where a start may still be scheduled during one
/// planning pass anchored at `step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartWindow {
    pub open_starts: Vec<usize>,
}

/// Walk the horizon and collect the admissible start slots for `app`.
///
/// Only the first contiguous opening of the window counts: once an invalid
/// slot follows a valid one, any later valid slot inside the same horizon is
/// forbidden. This keeps a rolling plan from scheduling the same appliance
/// again when its window re-opens near the end of the look-ahead.
pub fn start_window(app: &Appliance, step: u64) -> StartWindow {
    let opens = app.opening_slot();
    let latest = app.latest_start_slot();

    let mut open_starts = Vec::new();
    let mut seen_open = false;
    let mut closed = false;

    for k in 0..SLOTS_PER_DAY {
        let abs_t = ((step as usize + k) % SLOTS_PER_DAY) as i64;

        let valid = if opens <= latest {
            opens <= abs_t && abs_t <= latest
        } else {
            abs_t >= opens || abs_t <= latest
        };

        if valid {
            if !closed {
                open_starts.push(k);
                seen_open = true;
            }
        } else if seen_open {
            closed = true;
        }
    }

    StartWindow { open_starts }
}
