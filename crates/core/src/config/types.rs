use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmRequest, Target};
use crate::clock::ClockClass;

/// Fifteen minutes: the granularity inexact repeating alarms are aligned to.
pub const DEFAULT_QUANTUM_MS: i64 = 15 * 60 * 1000;

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for the alarm daemon.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlarmConfig {
    /// Scheduling engine tunables.
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Settings for the daemon's built-in delivery transport.
    #[serde(default)]
    pub delivery: DeliverySettings,

    /// Alarms scheduled by the daemon at startup.
    #[serde(default)]
    pub alarms: Vec<SeedAlarm>,
}

// ── Section configs ─────────────────────────────────────────────────

/// Scheduler section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Alignment quantum for inexact repeating alarms, millis.
    #[serde(default = "default_quantum_ms")]
    pub quantum_ms: i64,

    /// Alarms triggered later than this are reported as late.
    #[serde(default = "default_late_alarm_threshold_ms")]
    pub late_alarm_threshold_ms: i64,

    /// Upper bound on the advisory fire count handed to the transport.
    /// `None` keeps the raw catch-up count.
    #[serde(default)]
    pub fire_count_cap: Option<u64>,

    /// Number of entries in the "top busiest filters" view.
    #[serde(default = "default_top_filters")]
    pub top_filters: usize,

    /// Capacity of the recent-problems log.
    #[serde(default = "default_problem_log_capacity")]
    pub problem_log_capacity: usize,
}

fn default_quantum_ms() -> i64 {
    DEFAULT_QUANTUM_MS
}

fn default_late_alarm_threshold_ms() -> i64 {
    10_000
}

fn default_top_filters() -> usize {
    10
}

fn default_problem_log_capacity() -> usize {
    64
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            quantum_ms: default_quantum_ms(),
            late_alarm_threshold_ms: default_late_alarm_threshold_ms(),
            fire_count_cap: None,
            top_filters: default_top_filters(),
            problem_log_capacity: default_problem_log_capacity(),
        }
    }
}

/// Delivery section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySettings {
    /// How long the logging transport waits before reporting completion.
    #[serde(default = "default_simulated_latency_ms")]
    pub simulated_latency_ms: u64,
}

fn default_simulated_latency_ms() -> u64 {
    250
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            simulated_latency_ms: default_simulated_latency_ms(),
        }
    }
}

/// An alarm declared in the config file, relative to startup time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAlarm {
    pub principal: String,

    #[serde(default = "default_seed_uid")]
    pub uid: u32,

    pub action: Option<String>,

    pub component: Option<String>,

    pub class: ClockClass,

    /// Trigger this many millis after startup, in the class's timebase.
    #[serde(default)]
    pub delay_ms: i64,

    /// 0 = one-shot.
    #[serde(default)]
    pub interval_ms: i64,

    /// Route through quantum alignment instead of exact scheduling.
    #[serde(default)]
    pub inexact: bool,
}

fn default_seed_uid() -> u32 {
    10_000
}

impl SeedAlarm {
    pub fn target(&self) -> Target {
        Target {
            principal: self.principal.clone(),
            uid: self.uid,
            action: self.action.clone(),
            component: self.component.clone(),
            request_code: 0,
        }
    }

    /// Build the request given "now" in this alarm's timebase.
    pub fn request(&self, now: i64) -> AlarmRequest {
        AlarmRequest::repeating(
            self.class,
            now.saturating_add(self.delay_ms),
            self.interval_ms,
            self.target(),
        )
    }
}
