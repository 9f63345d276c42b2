//! Serializable diagnostics view of the scheduler.

use alarmd_core::{AlarmRecord, ClockClass};
use serde::Serialize;

use crate::delivery::InFlightSnapshot;
use crate::problems::Problem;
use crate::stats::{FilterSnapshot, PrincipalSnapshot};

#[derive(Debug, Clone, Serialize)]
pub struct ClassSnapshot {
    pub class: ClockClass,
    /// Pending records, earliest first.
    pub pending: Vec<AlarmRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub wall_millis: i64,
    pub elapsed_millis: i64,
    pub next_alarm: Option<i64>,
    pub classes: Vec<ClassSnapshot>,
    pub in_flight: Vec<InFlightSnapshot>,
    pub wake_held: bool,
    pub top_filters: Vec<FilterSnapshot>,
    pub principals: Vec<PrincipalSnapshot>,
    pub recent_problems: Vec<Problem>,
    pub total_problems: u64,
}

impl SchedulerSnapshot {
    pub fn pending_len(&self) -> usize {
        self.classes.iter().map(|c| c.pending.len()).sum()
    }
}
