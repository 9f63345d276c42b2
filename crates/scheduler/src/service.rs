//! Command-channel front end for [`AlarmManager`].
//!
//! The manager lives inside a single tokio task and is only ever touched
//! from there. Callers talk to it through a cloneable [`AlarmHandle`]:
//!
//! - request/reply operations (`schedule`, `cancel`, `snapshot`, ...) are
//!   async and answer through a `oneshot` channel
//! - `wake` and `delivery_complete` are fire-and-forget and never block, so
//!   the time source and the delivery transport can call them from any thread

use alarmd_core::{AlarmError, AlarmRequest, ClassMask, Target};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::manager::{AlarmManager, PrincipalEvent};
use crate::snapshot::SchedulerSnapshot;
use crate::traits::{DeliveryId, DeliveryOutcome};

pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

/// Everything the service task can be asked to do.
#[derive(Debug)]
pub enum Command {
    Schedule {
        request: AlarmRequest,
        inexact: bool,
        reply: oneshot::Sender<Result<(), AlarmError>>,
    },
    Cancel {
        target: Target,
        reply: oneshot::Sender<bool>,
    },
    CancelPrincipal {
        principal: String,
        reply: oneshot::Sender<usize>,
    },
    CancelUser {
        user_id: u32,
        reply: oneshot::Sender<usize>,
    },
    PrincipalEvent {
        event: PrincipalEvent,
        reply: oneshot::Sender<usize>,
    },
    NextAlarm {
        reply: oneshot::Sender<Option<i64>>,
    },
    HasAlarmsFor {
        principal: String,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<SchedulerSnapshot>,
    },
    Wake(ClassMask),
    DeliveryComplete {
        id: DeliveryId,
        outcome: DeliveryOutcome,
    },
    Shutdown,
}

/// Cloneable client for a running [`AlarmService`].
#[derive(Debug, Clone)]
pub struct AlarmHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl AlarmHandle {
    /// Create a handle and the receiver the service will consume.
    ///
    /// The handle exists before the manager so that collaborators which
    /// call back into the service can be built with a clone of it.
    pub fn channel() -> (AlarmHandle, CommandReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AlarmHandle { tx }, rx)
    }

    pub async fn schedule(&self, request: AlarmRequest) -> Result<(), AlarmError> {
        self.request(|reply| Command::Schedule {
            request,
            inexact: false,
            reply,
        })
        .await?
    }

    pub async fn schedule_inexact(&self, request: AlarmRequest) -> Result<(), AlarmError> {
        self.request(|reply| Command::Schedule {
            request,
            inexact: true,
            reply,
        })
        .await?
    }

    pub async fn cancel(&self, target: Target) -> Result<bool, AlarmError> {
        self.request(|reply| Command::Cancel { target, reply }).await
    }

    pub async fn cancel_principal(&self, principal: impl Into<String>) -> Result<usize, AlarmError> {
        let principal = principal.into();
        self.request(|reply| Command::CancelPrincipal { principal, reply })
            .await
    }

    pub async fn cancel_user(&self, user_id: u32) -> Result<usize, AlarmError> {
        self.request(|reply| Command::CancelUser { user_id, reply })
            .await
    }

    pub async fn principal_event(&self, event: PrincipalEvent) -> Result<usize, AlarmError> {
        self.request(|reply| Command::PrincipalEvent { event, reply })
            .await
    }

    pub async fn next_alarm(&self) -> Result<Option<i64>, AlarmError> {
        self.request(|reply| Command::NextAlarm { reply }).await
    }

    pub async fn has_alarms_for(&self, principal: impl Into<String>) -> Result<bool, AlarmError> {
        let principal = principal.into();
        self.request(|reply| Command::HasAlarmsFor { principal, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot, AlarmError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Signal that the classes in `mask` are believed due.
    pub fn wake(&self, mask: ClassMask) -> Result<(), AlarmError> {
        self.send(Command::Wake(mask))
    }

    /// Report the final outcome of delivery `id`.
    pub fn delivery_complete(&self, id: DeliveryId, outcome: DeliveryOutcome) -> Result<(), AlarmError> {
        self.send(Command::DeliveryComplete { id, outcome })
    }

    /// Ask the service task to stop after the commands already queued.
    pub fn shutdown(&self) -> Result<(), AlarmError> {
        self.send(Command::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command) -> Result<(), AlarmError> {
        self.tx.send(command).map_err(|_| AlarmError::ServiceClosed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, AlarmError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| AlarmError::ServiceClosed)
    }
}

/// Owns the manager and applies commands to it one at a time.
pub struct AlarmService {
    manager: AlarmManager,
    rx: CommandReceiver,
}

impl AlarmService {
    pub fn new(manager: AlarmManager, rx: CommandReceiver) -> Self {
        Self { manager, rx }
    }

    pub fn spawn(self) -> JoinHandle<AlarmManager> {
        tokio::spawn(self.run())
    }

    /// Process commands until `Shutdown` or until every handle is dropped.
    /// Returns the manager so callers can inspect final state.
    pub async fn run(mut self) -> AlarmManager {
        info!("Alarm service started");
        while let Some(command) = self.rx.recv().await {
            if !self.apply(command) {
                break;
            }
        }
        info!(
            pending = self.manager.store().len(),
            in_flight = self.manager.delivery().in_flight_len(),
            "Alarm service stopped"
        );
        self.manager
    }

    /// Returns `false` when the loop should stop.
    fn apply(&mut self, command: Command) -> bool {
        let manager = &mut self.manager;
        match command {
            Command::Schedule {
                request,
                inexact,
                reply,
            } => {
                let result = if inexact {
                    manager.schedule_inexact(request)
                } else {
                    manager.schedule(request)
                };
                let _ = reply.send(result);
            }
            Command::Cancel { target, reply } => {
                let _ = reply.send(manager.cancel(&target));
            }
            Command::CancelPrincipal { principal, reply } => {
                let _ = reply.send(manager.cancel_principal(&principal));
            }
            Command::CancelUser { user_id, reply } => {
                let _ = reply.send(manager.cancel_user(user_id));
            }
            Command::PrincipalEvent { event, reply } => {
                let _ = reply.send(manager.on_principal_event(event));
            }
            Command::NextAlarm { reply } => {
                let _ = reply.send(manager.next_alarm());
            }
            Command::HasAlarmsFor { principal, reply } => {
                let _ = reply.send(manager.has_alarms_for(&principal));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(manager.snapshot());
            }
            Command::Wake(mask) => {
                manager.on_wake_signal(mask);
            }
            Command::DeliveryComplete { id, outcome } => {
                if !manager.on_delivery_complete(id, outcome) {
                    debug!(delivery_id = %id, "Completion ignored");
                }
            }
            Command::Shutdown => return false,
        }
        true
    }
}
