//! Integration tests for the command-channel service.
//!
//! Fire-and-forget commands (`wake`, `delivery_complete`) are followed by a
//! request/reply command; the channel is FIFO, so the reply proves the
//! earlier command has been applied.

use std::sync::{Arc, Mutex};

use alarmd_core::{
    AlarmError, AlarmRequest, ClassMask, ClockClass, ManualClock, SchedulerSettings, Target,
};
use alarmd_scheduler::{
    AlarmHandle, AlarmManager, AlarmService, Collaborators, Delivery, DeliveryError,
    DeliveryOutcome, DeliveryTransport, PrincipalEvent, TimeSource, WakeResource,
};

#[derive(Clone, Default)]
struct Recorder {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    wake_events: Arc<Mutex<Vec<String>>>,
    arms: Arc<Mutex<Vec<(ClockClass, i64)>>>,
}

struct MockTimeSource(Recorder);

impl TimeSource for MockTimeSource {
    fn arm_next_wake(&mut self, class: ClockClass, trigger_at: i64) {
        self.0.arms.lock().unwrap().push((class, trigger_at));
    }

    fn disarm(&mut self, _class: ClockClass) {}
}

struct MockTransport(Recorder);

impl DeliveryTransport for MockTransport {
    fn deliver(&mut self, delivery: Delivery) -> Result<(), DeliveryError> {
        self.0.deliveries.lock().unwrap().push(delivery);
        Ok(())
    }
}

struct MockWake(Recorder);

impl WakeResource for MockWake {
    fn acquire(&mut self, attributed_to: &Target) {
        self.0
            .wake_events
            .lock()
            .unwrap()
            .push(format!("acquire:{}", attributed_to.principal));
    }

    fn release(&mut self) {
        self.0.wake_events.lock().unwrap().push("release".into());
    }

    fn reattribute(&mut self, _to: Option<&Target>) {}
}

fn start(clock: &ManualClock) -> (AlarmHandle, tokio::task::JoinHandle<AlarmManager>, Recorder) {
    let recorder = Recorder::default();
    let (handle, rx) = AlarmHandle::channel();
    let manager = AlarmManager::new(
        SchedulerSettings::default(),
        Collaborators {
            clock: Arc::new(clock.clone()),
            time_source: Box::new(MockTimeSource(recorder.clone())),
            transport: Box::new(MockTransport(recorder.clone())),
            wake_resource: Box::new(MockWake(recorder.clone())),
        },
    );
    let join = AlarmService::new(manager, rx).spawn();
    (handle, join, recorder)
}

fn target(principal: &str) -> Target {
    Target::new(principal, 10_001).with_action("SYNC")
}

#[tokio::test]
async fn schedule_wake_deliver_complete() {
    let clock = ManualClock::new(50_000, 1_000);
    let (handle, join, recorder) = start(&clock);

    handle
        .schedule(AlarmRequest::repeating(
            ClockClass::ElapsedWakeup,
            1_200,
            500,
            target("com.a"),
        ))
        .await
        .unwrap();
    assert_eq!(handle.next_alarm().await.unwrap(), Some(1_200));
    assert!(handle.has_alarms_for("com.a").await.unwrap());
    assert_eq!(
        recorder.arms.lock().unwrap().as_slice(),
        &[(ClockClass::ElapsedWakeup, 1_200)]
    );

    clock.advance(300);
    handle.wake(ClockClass::ElapsedWakeup.mask()).unwrap();
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.in_flight.len(), 1);
    assert!(snap.wake_held);
    assert_eq!(snap.next_alarm, Some(1_700));

    let id = recorder.deliveries.lock().unwrap()[0].id;
    clock.advance(25);
    handle.delivery_complete(id, DeliveryOutcome::Delivered).unwrap();
    let snap = handle.snapshot().await.unwrap();
    assert!(!snap.wake_held);
    assert!(snap.in_flight.is_empty());
    assert_eq!(snap.top_filters[0].counters.aggregate_busy_ms, 25);

    assert_eq!(
        recorder.wake_events.lock().unwrap().as_slice(),
        &["acquire:com.a".to_string(), "release".to_string()]
    );

    handle.shutdown().unwrap();
    let manager = join.await.unwrap();
    assert_eq!(manager.store().len(), 1);
}

#[tokio::test]
async fn scheduling_errors_come_back_through_the_handle() {
    let clock = ManualClock::new(0, 0);
    let (handle, _join, _) = start(&clock);

    let missing = AlarmRequest {
        class: ClockClass::Rtc,
        trigger_at: 10,
        repeat_interval: 0,
        target: None,
    };
    assert!(matches!(
        handle.schedule(missing).await,
        Err(AlarmError::InvalidTarget(_))
    ));

    let zero = AlarmRequest::repeating(ClockClass::Rtc, 10, 0, target("com.a"));
    assert!(matches!(
        handle.schedule_inexact(zero).await,
        Err(AlarmError::InvalidInterval(0))
    ));
    assert_eq!(handle.next_alarm().await.unwrap(), None);
}

#[tokio::test]
async fn cancellation_paths() {
    let clock = ManualClock::new(0, 0);
    let (handle, _join, _) = start(&clock);

    for (principal, uid) in [("com.a", 10_001), ("com.b", 10_002), ("com.c", 1_010_003)] {
        handle
            .schedule(AlarmRequest::one_shot(
                ClockClass::Rtc,
                1_000,
                Target::new(principal, uid),
            ))
            .await
            .unwrap();
    }

    assert!(handle.cancel(Target::new("com.a", 10_001)).await.unwrap());
    assert!(!handle.cancel(Target::new("com.a", 10_001)).await.unwrap());
    assert_eq!(handle.cancel_user(10).await.unwrap(), 1);
    assert_eq!(handle.cancel_principal("com.b").await.unwrap(), 1);
    assert_eq!(
        handle
            .principal_event(PrincipalEvent::Restarted("com.b".into()))
            .await
            .unwrap(),
        0
    );
    assert_eq!(handle.next_alarm().await.unwrap(), None);
}

#[tokio::test]
async fn closed_service_reports_service_closed() {
    let clock = ManualClock::new(0, 0);
    let (handle, join, _) = start(&clock);

    handle.shutdown().unwrap();
    join.await.unwrap();

    assert!(handle.is_closed());
    assert!(matches!(handle.next_alarm().await, Err(AlarmError::ServiceClosed)));
    assert!(matches!(
        handle.wake(ClassMask::all()),
        Err(AlarmError::ServiceClosed)
    ));
}

#[tokio::test]
async fn dropping_every_handle_stops_the_service() {
    let clock = ManualClock::new(0, 0);
    let (handle, join, _) = start(&clock);
    handle
        .schedule(AlarmRequest::one_shot(ClockClass::Rtc, 5, target("com.a")))
        .await
        .unwrap();
    drop(handle);

    let manager = join.await.unwrap();
    assert_eq!(manager.store().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completions_from_other_threads_release_once() {
    let clock = ManualClock::new(0, 0);
    let (handle, _join, recorder) = start(&clock);

    for i in 0..8 {
        handle
            .schedule(AlarmRequest::one_shot(
                ClockClass::ElapsedWakeup,
                i,
                target(&format!("com.p{i}")),
            ))
            .await
            .unwrap();
    }
    clock.advance(100);
    handle.wake(ClassMask::wakeup()).unwrap();
    assert_eq!(handle.snapshot().await.unwrap().in_flight.len(), 8);

    let ids: Vec<_> = recorder
        .deliveries
        .lock()
        .unwrap()
        .iter()
        .map(|d| d.id)
        .collect();
    let threads: Vec<_> = ids
        .into_iter()
        .rev()
        .map(|id| {
            let handle = handle.clone();
            std::thread::spawn(move || {
                handle.delivery_complete(id, DeliveryOutcome::Delivered).unwrap();
                // Duplicate completion must be harmless.
                handle.delivery_complete(id, DeliveryOutcome::Delivered).unwrap();
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let snap = handle.snapshot().await.unwrap();
    assert!(snap.in_flight.is_empty());
    assert!(!snap.wake_held);
    assert_eq!(snap.total_problems, 8);

    let events = recorder.wake_events.lock().unwrap().clone();
    assert_eq!(events.iter().filter(|e| e.starts_with("acquire")).count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "release").count(), 1);
    assert_eq!(events.last().map(String::as_str), Some("release"));
}
