//! Trigger pass: pull due alarms per class, advance repeaters, re-arm.

use alarmd_core::{AlarmRecord, ClassMask, Clock, ClockClass};
use serde::Serialize;
use tracing::{debug, info};

use crate::store::AlarmStore;
use crate::traits::TimeSource;

/// Per-class summary of one trigger pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassPass {
    pub class: ClockClass,
    /// The single "now" every record in this class was compared against.
    pub now: i64,
    pub triggered: usize,
    /// Head trigger time armed after the pass, `None` if the class was disarmed.
    pub next: Option<i64>,
}

/// Output of [`TriggerEngine::run`].
#[derive(Debug, Clone, Default)]
pub struct TriggerPass {
    /// Due records in dispatch order: class order, then ascending trigger time.
    pub triggered: Vec<AlarmRecord>,
    pub classes: Vec<ClassPass>,
    pub time_changed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerEngine {
    late_threshold: i64,
    fire_count_cap: Option<u64>,
}

impl TriggerEngine {
    pub fn new(late_threshold: i64, fire_count_cap: Option<u64>) -> Self {
        Self {
            late_threshold,
            fire_count_cap,
        }
    }

    /// Run one pass over every class set in `mask`.
    pub fn run(
        &self,
        store: &mut AlarmStore,
        mask: ClassMask,
        clock: &dyn Clock,
        time_source: &mut dyn TimeSource,
    ) -> TriggerPass {
        let mut pass = TriggerPass {
            time_changed: mask.time_changed(),
            ..TriggerPass::default()
        };
        if pass.time_changed {
            info!("Wall clock changed, running trigger pass");
        }

        for class in mask.classes() {
            let now = clock.now(class);
            let due = store.take_due(class, now);
            let triggered = due.len();

            for mut record in due {
                let count = fire_count(record.trigger_at, record.repeat_interval, now);
                let late_by = now.saturating_sub(record.trigger_at);
                if late_by > self.late_threshold {
                    debug!(
                        class = %class,
                        target = %record.target,
                        late_by_ms = late_by,
                        "Alarm is late"
                    );
                }

                if record.is_repeating() {
                    let steps = i64::try_from(count).unwrap_or(i64::MAX);
                    let mut next = record.clone();
                    next.trigger_at = record
                        .trigger_at
                        .saturating_add(steps.saturating_mul(record.repeat_interval));
                    next.fire_count = 0;
                    debug!(
                        class = %class,
                        target = %record.target,
                        fire_count = count,
                        next_trigger_at = next.trigger_at,
                        "Repeating alarm re-enqueued"
                    );
                    store.insert(next);
                }

                record.fire_count = match self.fire_count_cap {
                    Some(cap) => count.min(cap),
                    None => count,
                };
                pass.triggered.push(record);
            }

            let next = arm_head(store, class, time_source);
            pass.classes.push(ClassPass {
                class,
                now,
                triggered,
                next,
            });
        }

        pass
    }
}

/// How many times a record has come due at `now`.
///
/// One-shot records always fire once. A repeater that has fallen `k` whole
/// intervals behind fires `k + 1` times.
pub fn fire_count(trigger_at: i64, repeat_interval: i64, now: i64) -> u64 {
    if repeat_interval <= 0 || now < trigger_at {
        return 1;
    }
    let behind = now.saturating_sub(trigger_at) / repeat_interval;
    u64::try_from(behind).unwrap_or(0).saturating_add(1)
}

/// Push the head of `class` to the time source, or disarm when empty.
/// Negative trigger times are armed at 0.
pub fn arm_head(
    store: &AlarmStore,
    class: ClockClass,
    time_source: &mut dyn TimeSource,
) -> Option<i64> {
    match store.peek_earliest(class) {
        Some(head) => {
            let at = head.trigger_at.max(0);
            time_source.arm_next_wake(class, at);
            Some(at)
        }
        None => {
            time_source.disarm(class);
            None
        }
    }
}
