//! Alarm scheduling engine.
//!
//! [`AlarmManager`] keeps alarms in four per-class ordered lists, fires the
//! due ones when a wake signal arrives, hands them to a delivery transport
//! and holds a shared wake-resource while any delivery is outstanding.
//! [`AlarmService`] wraps the manager in a tokio task fed by a command
//! channel; [`AlarmHandle`] is the client side.

pub mod align;
pub mod delivery;
pub mod manager;
pub mod problems;
pub mod runtime;
pub mod service;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod traits;
pub mod trigger;

pub use align::AlignmentPolicy;
pub use delivery::{CompletionReport, DeliveryCoordinator, DispatchReport, InFlightSnapshot};
pub use manager::{AlarmManager, Collaborators, PrincipalEvent, WakeReport};
pub use problems::{Problem, ProblemLog, RingBuffer};
pub use runtime::{LoggingTransport, LoggingWakeLock, TokioTimeSource};
pub use service::{AlarmHandle, AlarmService, Command, CommandReceiver};
pub use snapshot::{ClassSnapshot, SchedulerSnapshot};
pub use stats::{BusyCounters, FilterSnapshot, LedgerKey, PrincipalSnapshot, StatsLedger};
pub use store::{AlarmList, AlarmStore};
pub use traits::{
    Delivery, DeliveryError, DeliveryId, DeliveryOutcome, DeliveryTransport, TimeSource,
    WakeResource,
};
pub use trigger::{ClassPass, TriggerEngine, TriggerPass};
