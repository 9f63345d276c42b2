//! Collaborator traits the scheduler calls out to, and their shared types.
//!
//! The scheduler never blocks on any of these: arming a wake, handing an
//! alarm to the transport, and toggling the wake-resource are all expected
//! to return promptly. Delivery completion comes back later through
//! [`crate::AlarmManager::on_delivery_complete`] (or the service handle).

use std::fmt;

use alarmd_core::{AlarmRecord, ClockClass, Target};
use serde::{Deserialize, Serialize};

/// Errors a transport can report synchronously when handed an alarm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The destination is gone and will never accept deliveries again.
    #[error("delivery target was canceled")]
    Canceled,

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Final result of one delivery, reported asynchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
    Canceled,
}

/// Token identifying one in-flight delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryId(pub u64);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A triggered alarm handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Pass this back when reporting completion.
    pub id: DeliveryId,
    /// The record as triggered; `fire_count` is the advisory catch-up count.
    pub record: AlarmRecord,
}

/// Hardware/OS timer that wakes the process at an absolute time.
pub trait TimeSource: Send {
    /// Request a wake for `class` at `trigger_at` (class timebase, never negative).
    fn arm_next_wake(&mut self, class: ClockClass, trigger_at: i64);

    /// Drop any pending wake for `class`.
    fn disarm(&mut self, class: ClockClass);
}

/// Transport that delivers a triggered alarm to its target.
pub trait DeliveryTransport: Send {
    /// Start delivering. `Ok` means the delivery is now in flight and a
    /// completion for `delivery.id` will follow.
    fn deliver(&mut self, delivery: Delivery) -> Result<(), DeliveryError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "transport"
    }
}

/// Shared "keep the system awake" resource.
pub trait WakeResource: Send {
    fn acquire(&mut self, attributed_to: &Target);

    fn release(&mut self);

    /// Move blame to another target. `None` attributes it to the system.
    fn reattribute(&mut self, to: Option<&Target>);
}
