//! The scheduler object: store, alignment, trigger pass and delivery,
//! owned together and driven through explicit entry points.

use std::sync::Arc;

use alarmd_core::{
    AlarmError, AlarmRecord, AlarmRequest, ClassMask, Clock, ClockClass, SchedulerSettings,
    Target,
};
use serde::{Deserialize, Serialize};

use crate::align::AlignmentPolicy;
use crate::delivery::DeliveryCoordinator;
use crate::snapshot::{ClassSnapshot, SchedulerSnapshot};
use crate::stats::StatsLedger;
use crate::store::AlarmStore;
use crate::trigger::{arm_head, ClassPass, TriggerEngine};
use crate::traits::{DeliveryId, DeliveryOutcome, DeliveryTransport, TimeSource, WakeResource};

/// External services the scheduler calls into.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub time_source: Box<dyn TimeSource>,
    pub transport: Box<dyn DeliveryTransport>,
    pub wake_resource: Box<dyn WakeResource>,
}

/// Lifecycle notifications about alarm-owning principals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalEvent {
    /// Uninstalled. Ignored when `replacing`, since an update keeps its alarms.
    Removed { principal: String, replacing: bool },
    /// Force-stopped.
    Restarted(String),
    /// Storage holding these principals went away.
    Unavailable(Vec<String>),
    /// Every principal of this user.
    UserStopped(u32),
}

/// What a wake signal did.
#[derive(Debug, Clone, Default)]
pub struct WakeReport {
    pub time_changed: bool,
    pub classes: Vec<ClassPass>,
    pub triggered: Vec<AlarmRecord>,
    pub dispatched: Vec<DeliveryId>,
    pub failed: usize,
    pub canceled: Vec<Target>,
}

pub struct AlarmManager {
    settings: SchedulerSettings,
    clock: Arc<dyn Clock>,
    time_source: Box<dyn TimeSource>,
    store: AlarmStore,
    align: AlignmentPolicy,
    engine: TriggerEngine,
    delivery: DeliveryCoordinator,
}

impl AlarmManager {
    pub fn new(settings: SchedulerSettings, collaborators: Collaborators) -> Self {
        let Collaborators {
            clock,
            time_source,
            transport,
            wake_resource,
        } = collaborators;

        Self {
            align: AlignmentPolicy::new(settings.quantum_ms),
            engine: TriggerEngine::new(settings.late_alarm_threshold_ms, settings.fire_count_cap),
            delivery: DeliveryCoordinator::new(
                transport,
                wake_resource,
                settings.problem_log_capacity,
            ),
            store: AlarmStore::new(),
            settings,
            clock,
            time_source,
        }
    }

    /// Schedule (or replace) the alarm for `request.target`.
    ///
    /// Any existing record for the same target is removed from all four
    /// lists first. Invalid requests are rejected before anything changes.
    pub fn schedule(&mut self, request: AlarmRequest) -> Result<(), AlarmError> {
        let record = request.into_record()?;
        let class = record.class;

        let before = self.heads();
        let replaced = self.store.remove_target(&record.target, ClassMask::all());

        tracing::debug!(
            class = %class,
            target = %record.target,
            trigger_at = record.trigger_at,
            repeat_interval = record.repeat_interval,
            replaced,
            "Alarm scheduled"
        );
        self.store.insert(record);
        self.rearm_changed(before);
        Ok(())
    }

    /// Schedule a repeating alarm whose trigger time may be slipped forward
    /// onto a quantum boundary.
    pub fn schedule_inexact(&mut self, request: AlarmRequest) -> Result<(), AlarmError> {
        if request.repeat_interval <= 0 {
            return Err(AlarmError::InvalidInterval(request.repeat_interval));
        }
        let skew = self.clock.wall_to_elapsed_skew();
        let trigger_at =
            self.align
                .align(request.trigger_at, request.repeat_interval, request.class, skew);
        if trigger_at != request.trigger_at {
            tracing::debug!(
                class = %request.class,
                requested = request.trigger_at,
                aligned = trigger_at,
                "Inexact alarm aligned"
            );
        }
        self.schedule(AlarmRequest {
            trigger_at,
            ..request
        })
    }

    /// Remove `target`'s pending alarms. Deliveries already in flight are
    /// unaffected.
    pub fn cancel(&mut self, target: &Target) -> bool {
        let before = self.heads();
        let removed = self.store.remove_target(target, ClassMask::all());
        self.rearm_changed(before);
        removed
    }

    pub fn cancel_principal(&mut self, principal: &str) -> usize {
        let before = self.heads();
        let removed = self.store.remove_principal(principal);
        self.rearm_changed(before);
        removed
    }

    /// Remove every alarm created by a uid belonging to `user_id`.
    pub fn cancel_user(&mut self, user_id: u32) -> usize {
        let before = self.heads();
        let removed = self.store.remove_user(user_id);
        self.rearm_changed(before);
        removed
    }

    pub fn has_alarms_for(&self, principal: &str) -> bool {
        self.store.contains_principal(principal)
    }

    /// Earliest pending trigger time across every class, raw values compared.
    pub fn next_alarm(&self) -> Option<i64> {
        self.store.next_trigger()
    }

    /// Returns how many pending alarms were removed.
    pub fn on_principal_event(&mut self, event: PrincipalEvent) -> usize {
        let removed = match &event {
            PrincipalEvent::Removed {
                replacing: true, ..
            } => 0,
            PrincipalEvent::Removed { principal, .. } | PrincipalEvent::Restarted(principal) => {
                self.forget_principal(principal)
            }
            PrincipalEvent::Unavailable(principals) => principals
                .iter()
                .map(|principal| self.forget_principal(principal))
                .sum(),
            PrincipalEvent::UserStopped(user_id) => self.cancel_user(*user_id),
        };
        tracing::info!(event = ?event, removed, "Principal event handled");
        removed
    }

    /// Run a trigger pass for `mask`, then dispatch everything that came due.
    pub fn on_wake_signal(&mut self, mask: ClassMask) -> WakeReport {
        let pass = self
            .engine
            .run(&mut self.store, mask, self.clock.as_ref(), self.time_source.as_mut());

        let triggered = pass.triggered.clone();
        let now = self.clock.elapsed_millis();
        let dispatch = self.delivery.dispatch_batch(pass.triggered, now);

        for target in &dispatch.canceled_targets {
            self.cancel(target);
        }

        if !triggered.is_empty() {
            tracing::info!(
                triggered = triggered.len(),
                dispatched = dispatch.dispatched.len(),
                failed = dispatch.failed,
                canceled = dispatch.canceled_targets.len(),
                in_flight = self.delivery.in_flight_len(),
                "Wake signal processed"
            );
        }

        WakeReport {
            time_changed: pass.time_changed,
            classes: pass.classes,
            triggered,
            dispatched: dispatch.dispatched,
            failed: dispatch.failed,
            canceled: dispatch.canceled_targets,
        }
    }

    /// Returns whether `id` was in flight.
    pub fn on_delivery_complete(&mut self, id: DeliveryId, outcome: DeliveryOutcome) -> bool {
        let now = self.clock.elapsed_millis();
        let report = self.delivery.complete(id, outcome, now);
        if let Some(target) = report.cancel_target {
            self.cancel(&target);
        }
        report.known
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let ledger = self.delivery.ledger();
        let problems = self.delivery.problems();
        SchedulerSnapshot {
            wall_millis: self.clock.wall_millis(),
            elapsed_millis: self.clock.elapsed_millis(),
            next_alarm: self.next_alarm(),
            classes: ClockClass::ALL
                .into_iter()
                .map(|class| ClassSnapshot {
                    class,
                    pending: self.store.list(class).iter().cloned().collect(),
                })
                .collect(),
            in_flight: self.delivery.in_flight(),
            wake_held: self.delivery.wake_held(),
            top_filters: ledger.top_filters(self.settings.top_filters),
            principals: ledger.principals(),
            recent_problems: problems.recent(),
            total_problems: problems.total(),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &AlarmStore {
        &self.store
    }

    pub fn ledger(&self) -> &StatsLedger {
        self.delivery.ledger()
    }

    pub fn delivery(&self) -> &DeliveryCoordinator {
        &self.delivery
    }

    fn forget_principal(&mut self, principal: &str) -> usize {
        let removed = self.cancel_principal(principal);
        self.delivery.ledger_mut().remove_principal(principal);
        removed
    }

    fn heads(&self) -> [Option<i64>; 4] {
        ClockClass::ALL.map(|class| self.store.peek_earliest(class).map(|r| r.trigger_at))
    }

    /// Re-arm (or disarm) every class whose head changed since `before`.
    fn rearm_changed(&mut self, before: [Option<i64>; 4]) {
        for class in ClockClass::ALL {
            let now_head = self.store.peek_earliest(class).map(|r| r.trigger_at);
            if now_head != before[class.index()] {
                arm_head(&self.store, class, self.time_source.as_mut());
            }
        }
    }
}
