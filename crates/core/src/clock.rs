//! Clock classes, wake bitmasks, and the clock sources they compare against.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// One of the four independent scheduling domains.
///
/// `Rtc*` classes compare against wall-clock millis, `Elapsed*` classes
/// against monotonic millis since boot. The discriminant doubles as the
/// bit position in a [`ClassMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockClass {
    RtcWakeup = 0,
    Rtc = 1,
    ElapsedWakeup = 2,
    Elapsed = 3,
}

impl ClockClass {
    /// All classes in trigger-pass order.
    pub const ALL: [ClockClass; 4] = [
        ClockClass::RtcWakeup,
        ClockClass::Rtc,
        ClockClass::ElapsedWakeup,
        ClockClass::Elapsed,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether delivery is expected to bring the device out of low power.
    pub fn is_wakeup(self) -> bool {
        matches!(self, ClockClass::RtcWakeup | ClockClass::ElapsedWakeup)
    }

    /// Whether trigger times are expressed in wall-clock millis.
    pub fn is_wall_clock(self) -> bool {
        matches!(self, ClockClass::RtcWakeup | ClockClass::Rtc)
    }

    pub fn mask(self) -> ClassMask {
        ClassMask(1 << self.index())
    }

    pub fn label(self) -> &'static str {
        match self {
            ClockClass::RtcWakeup => "RTC_WAKEUP",
            ClockClass::Rtc => "RTC",
            ClockClass::ElapsedWakeup => "ELAPSED_WAKEUP",
            ClockClass::Elapsed => "ELAPSED",
        }
    }
}

impl fmt::Display for ClockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bitmask carried by a wake signal: which clock classes are believed due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClassMask(pub u32);

impl ClassMask {
    /// Set when the wall clock was changed underneath the time source.
    pub const TIME_CHANGED: ClassMask = ClassMask(1 << 16);

    pub const fn empty() -> Self {
        ClassMask(0)
    }

    pub fn all() -> Self {
        ClockClass::ALL
            .iter()
            .fold(Self::empty(), |mask, class| mask.with(*class))
    }

    /// `RTC_WAKEUP | ELAPSED_WAKEUP`.
    pub fn wakeup() -> Self {
        ClockClass::RtcWakeup.mask() | ClockClass::ElapsedWakeup.mask()
    }

    /// `RTC | ELAPSED`.
    pub fn non_wakeup() -> Self {
        ClockClass::Rtc.mask() | ClockClass::Elapsed.mask()
    }

    pub fn with(self, class: ClockClass) -> Self {
        ClassMask(self.0 | class.mask().0)
    }

    pub fn contains(self, class: ClockClass) -> bool {
        self.0 & class.mask().0 != 0
    }

    pub fn time_changed(self) -> bool {
        self.0 & Self::TIME_CHANGED.0 != 0
    }

    /// Due classes in trigger-pass order.
    pub fn classes(self) -> impl Iterator<Item = ClockClass> {
        ClockClass::ALL
            .into_iter()
            .filter(move |class| self.contains(*class))
    }
}

impl From<ClockClass> for ClassMask {
    fn from(class: ClockClass) -> Self {
        class.mask()
    }
}

impl std::ops::BitOr for ClassMask {
    type Output = ClassMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        ClassMask(self.0 | rhs.0)
    }
}

// ── Clock sources ───────────────────────────────────────────────────

/// Source of "now" for both timebases.
pub trait Clock: Send + Sync {
    /// Wall-clock millis since the Unix epoch.
    fn wall_millis(&self) -> i64;

    /// Monotonic millis since boot.
    fn elapsed_millis(&self) -> i64;

    /// "Now" in the timebase of `class`.
    fn now(&self, class: ClockClass) -> i64 {
        if class.is_wall_clock() {
            self.wall_millis()
        } else {
            self.elapsed_millis()
        }
    }

    /// Offset that converts a wall-clock time into the monotonic timebase
    /// (`elapsed = wall - skew`).
    fn wall_to_elapsed_skew(&self) -> i64 {
        self.wall_millis() - self.elapsed_millis()
    }
}

/// Clock backed by the host: chrono for wall time, `Instant` for elapsed.
#[derive(Debug, Clone)]
pub struct SystemClock {
    boot: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn elapsed_millis(&self) -> i64 {
        i64::try_from(self.boot.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Hand-driven clock for tests and simulations. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    wall: Arc<AtomicI64>,
    elapsed: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(wall_millis: i64, elapsed_millis: i64) -> Self {
        Self {
            wall: Arc::new(AtomicI64::new(wall_millis)),
            elapsed: Arc::new(AtomicI64::new(elapsed_millis)),
        }
    }

    /// Move both timebases forward together.
    pub fn advance(&self, millis: i64) {
        self.wall.fetch_add(millis, Ordering::SeqCst);
        self.elapsed.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump the wall clock without touching elapsed time (a clock-set event).
    pub fn set_wall(&self, millis: i64) {
        self.wall.store(millis, Ordering::SeqCst);
    }

    pub fn set_elapsed(&self, millis: i64) {
        self.elapsed.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn wall_millis(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }

    fn elapsed_millis(&self) -> i64 {
        self.elapsed.load(Ordering::SeqCst)
    }
}
