//! Tokio-backed collaborators used by the `alarmd` daemon.
//!
//! All three report back through an [`AlarmHandle`], so they must be
//! driven from inside a tokio runtime (the service task calls them).

use std::sync::Arc;
use std::time::Duration;

use alarmd_core::{Clock, ClockClass, Target};
use tokio::task::JoinHandle;

use crate::service::AlarmHandle;
use crate::traits::{Delivery, DeliveryError, DeliveryOutcome, DeliveryTransport, TimeSource, WakeResource};

/// One sleeping task per clock class; re-arming replaces the task.
pub struct TokioTimeSource {
    handle: AlarmHandle,
    clock: Arc<dyn Clock>,
    timers: [Option<JoinHandle<()>>; 4],
}

impl TokioTimeSource {
    pub fn new(handle: AlarmHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle,
            clock,
            timers: [None, None, None, None],
        }
    }

    fn cancel_timer(&mut self, class: ClockClass) {
        if let Some(timer) = self.timers[class.index()].take() {
            timer.abort();
        }
    }
}

impl TimeSource for TokioTimeSource {
    fn arm_next_wake(&mut self, class: ClockClass, trigger_at: i64) {
        self.cancel_timer(class);

        let delay_ms = trigger_at.saturating_sub(self.clock.now(class)).max(0);
        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
        let handle = self.handle.clone();
        tracing::debug!(class = %class, trigger_at, delay_ms, "Wake armed");

        self.timers[class.index()] = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if handle.wake(class.mask()).is_err() {
                tracing::debug!(class = %class, "Wake dropped, service closed");
            }
        }));
    }

    fn disarm(&mut self, class: ClockClass) {
        if self.timers[class.index()].is_some() {
            tracing::debug!(class = %class, "Wake disarmed");
        }
        self.cancel_timer(class);
    }
}

impl Drop for TokioTimeSource {
    fn drop(&mut self) {
        for class in ClockClass::ALL {
            self.cancel_timer(class);
        }
    }
}

/// Logs each delivery and reports it delivered after a fixed latency.
pub struct LoggingTransport {
    handle: AlarmHandle,
    latency: Duration,
}

impl LoggingTransport {
    pub fn new(handle: AlarmHandle, latency: Duration) -> Self {
        Self { handle, latency }
    }
}

impl DeliveryTransport for LoggingTransport {
    fn deliver(&mut self, delivery: Delivery) -> Result<(), DeliveryError> {
        if self.handle.is_closed() {
            return Err(DeliveryError::Transport("alarm service closed".into()));
        }

        let Delivery { id, record } = delivery;
        tracing::info!(
            delivery_id = %id,
            class = %record.class,
            target = %record.target,
            fire_count = record.fire_count,
            "Alarm fired"
        );

        let handle = self.handle.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let _ = handle.delivery_complete(id, DeliveryOutcome::Delivered);
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Wake-resource that only logs its transitions.
#[derive(Debug, Default)]
pub struct LoggingWakeLock {
    held_for: Option<String>,
}

impl LoggingWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held_for.is_some()
    }
}

impl WakeResource for LoggingWakeLock {
    fn acquire(&mut self, attributed_to: &Target) {
        tracing::info!(principal = %attributed_to.principal, "Wake lock acquired");
        self.held_for = Some(attributed_to.principal.clone());
    }

    fn release(&mut self) {
        tracing::info!(held_for = ?self.held_for, "Wake lock released");
        self.held_for = None;
    }

    fn reattribute(&mut self, to: Option<&Target>) {
        let principal = to.map(|t| t.principal.clone());
        tracing::debug!(principal = ?principal, "Wake lock reattributed");
        self.held_for = principal.or_else(|| Some("system".to_string()));
    }
}
