//! Dispatches triggered alarms and owns the shared wake-resource.
//!
//! The wake-resource is held exactly while the in-flight set is non-empty.
//! It is acquired when the first delivery goes out, reattributed to the
//! oldest outstanding delivery on every completion, and released when the
//! last one completes. Completions may arrive in any order; a completion
//! for an id that is not in flight is absorbed as a no-op.

use std::collections::BTreeMap;

use alarmd_core::{AlarmRecord, ClockClass, Target};
use serde::Serialize;

use crate::problems::ProblemLog;
use crate::stats::{FinishResult, LedgerKey, StatsLedger};
use crate::traits::{Delivery, DeliveryError, DeliveryId, DeliveryOutcome, DeliveryTransport, WakeResource};

/// A delivery handed to the transport that has not reported back yet.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub target: Target,
    pub class: ClockClass,
    pub repeating: bool,
    pub dispatched_at: i64,
    ledger: LedgerKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlightSnapshot {
    pub id: DeliveryId,
    pub principal: String,
    pub class: ClockClass,
    pub dispatched_at: i64,
}

/// Result of [`DeliveryCoordinator::dispatch_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: Vec<DeliveryId>,
    /// Records the transport refused with a transient error.
    pub failed: usize,
    /// Repeating targets the transport reported dead; the caller cancels them.
    pub canceled_targets: Vec<Target>,
}

/// Result of [`DeliveryCoordinator::complete`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Whether the id was in flight.
    pub known: bool,
    /// Set when a repeating delivery completed as canceled.
    pub cancel_target: Option<Target>,
}

pub struct DeliveryCoordinator {
    transport: Box<dyn DeliveryTransport>,
    wake: Box<dyn WakeResource>,
    ledger: StatsLedger,
    problems: ProblemLog,
    in_flight: BTreeMap<DeliveryId, InFlight>,
    next_id: u64,
    wake_held: bool,
}

impl DeliveryCoordinator {
    pub fn new(
        transport: Box<dyn DeliveryTransport>,
        wake: Box<dyn WakeResource>,
        problem_log_capacity: usize,
    ) -> Self {
        Self {
            transport,
            wake,
            ledger: StatsLedger::new(),
            problems: ProblemLog::new(problem_log_capacity),
            in_flight: BTreeMap::new(),
            next_id: 1,
            wake_held: false,
        }
    }

    /// Hand every record to the transport, in order.
    ///
    /// `now` is elapsed millis and is used for busy-time accounting.
    pub fn dispatch_batch(&mut self, records: Vec<AlarmRecord>, now: i64) -> DispatchReport {
        let mut report = DispatchReport::default();

        for record in records {
            let id = DeliveryId(self.next_id);
            self.next_id += 1;

            let target = record.target.clone();
            let class = record.class;
            let repeating = record.is_repeating();

            match self.transport.deliver(Delivery { id, record }) {
                Ok(()) => {}
                Err(DeliveryError::Canceled) => {
                    if repeating {
                        tracing::info!(
                            target = %target,
                            "Delivery target canceled, dropping repeating alarm"
                        );
                        report.canceled_targets.push(target);
                    } else {
                        tracing::debug!(target = %target, "Delivery target canceled");
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        transport = self.transport.name(),
                        target = %target,
                        error = %e,
                        "Alarm delivery failed"
                    );
                    report.failed += 1;
                    continue;
                }
            }

            if self.in_flight.is_empty() {
                if self.wake_held {
                    self.problems
                        .record(now, "wake-resource held with nothing in flight");
                } else {
                    self.wake.acquire(&target);
                    self.wake_held = true;
                }
            }

            let ledger = self.ledger.begin(&target, class.is_wakeup(), now);
            tracing::debug!(
                delivery_id = %id,
                class = %class,
                target = %target,
                in_flight = self.in_flight.len() + 1,
                "Alarm dispatched"
            );
            self.in_flight.insert(
                id,
                InFlight {
                    target,
                    class,
                    repeating,
                    dispatched_at: now,
                    ledger,
                },
            );
            report.dispatched.push(id);
        }

        report
    }

    /// Record the transport's final word on delivery `id`.
    pub fn complete(&mut self, id: DeliveryId, outcome: DeliveryOutcome, now: i64) -> CompletionReport {
        let Some(entry) = self.in_flight.remove(&id) else {
            self.problems
                .record(now, format!("completion for unknown delivery {id}"));
            return CompletionReport::default();
        };

        let mut report = CompletionReport {
            known: true,
            cancel_target: None,
        };

        match &outcome {
            DeliveryOutcome::Delivered => {
                tracing::debug!(delivery_id = %id, target = %entry.target, "Alarm delivered");
            }
            DeliveryOutcome::Failed(reason) => {
                tracing::warn!(
                    delivery_id = %id,
                    target = %entry.target,
                    reason = %reason,
                    "Alarm delivery reported failure"
                );
            }
            DeliveryOutcome::Canceled => {
                tracing::info!(delivery_id = %id, target = %entry.target, "Delivery target canceled");
                if entry.repeating {
                    report.cancel_target = Some(entry.target.clone());
                }
            }
        }

        match self.ledger.finish(&entry.ledger, now) {
            FinishResult::Recorded => {}
            FinishResult::Detached => {
                tracing::debug!(
                    delivery_id = %id,
                    principal = %entry.target.principal,
                    "Stats dropped while delivery was in flight"
                );
            }
            FinishResult::Underflow => {
                self.problems.record(
                    now,
                    format!("nesting underflow for {} on {id}", entry.target.principal),
                );
            }
        }

        match self.in_flight.values().next() {
            Some(head) => self.wake.reattribute(Some(&head.target)),
            None => {
                if self.wake_held {
                    self.wake.release();
                    self.wake_held = false;
                    tracing::debug!("Wake-resource released");
                } else {
                    self.problems
                        .record(now, format!("completion {id} while wake-resource not held"));
                }
            }
        }

        report
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight(&self) -> Vec<InFlightSnapshot> {
        self.in_flight
            .iter()
            .map(|(id, entry)| InFlightSnapshot {
                id: *id,
                principal: entry.target.principal.clone(),
                class: entry.class,
                dispatched_at: entry.dispatched_at,
            })
            .collect()
    }

    pub fn wake_held(&self) -> bool {
        self.wake_held
    }

    pub fn ledger(&self) -> &StatsLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut StatsLedger {
        &mut self.ledger
    }

    pub fn problems(&self) -> &ProblemLog {
        &self.problems
    }
}
