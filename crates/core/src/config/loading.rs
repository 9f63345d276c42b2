use std::path::Path;

use super::types::{AlarmConfig, DeliverySettings, SchedulerSettings};
use crate::error::AlarmError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

impl AlarmConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, AlarmError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AlarmError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults with no seeded alarms.
    pub fn local() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            delivery: DeliverySettings::default(),
            alarms: Vec::new(),
        }
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `ALARMD_SECTION_KEY` overrides `section.key`.
    /// - `ALARMD_SCHEDULER_QUANTUM_MS` → `scheduler.quantum_ms`
    /// - `ALARMD_SCHEDULER_LATE_ALARM_THRESHOLD_MS` → `scheduler.late_alarm_threshold_ms`
    /// - `ALARMD_SCHEDULER_FIRE_COUNT_CAP` → `scheduler.fire_count_cap`
    /// - `ALARMD_DELIVERY_SIMULATED_LATENCY_MS` → `delivery.simulated_latency_ms`
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parsed::<i64>("ALARMD_SCHEDULER_QUANTUM_MS") {
            self.scheduler.quantum_ms = v;
        }
        if let Some(v) = env_parsed::<i64>("ALARMD_SCHEDULER_LATE_ALARM_THRESHOLD_MS") {
            self.scheduler.late_alarm_threshold_ms = v;
        }
        if let Some(v) = env_parsed::<u64>("ALARMD_SCHEDULER_FIRE_COUNT_CAP") {
            self.scheduler.fire_count_cap = Some(v);
        }
        if let Some(v) = env_parsed::<u64>("ALARMD_DELIVERY_SIMULATED_LATENCY_MS") {
            self.delivery.simulated_latency_ms = v;
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  scheduler:  quantum_ms={}, late_threshold_ms={}, fire_count_cap={:?}",
            self.scheduler.quantum_ms,
            self.scheduler.late_alarm_threshold_ms,
            self.scheduler.fire_count_cap
        );
        tracing::info!(
            "  delivery:   simulated_latency_ms={}",
            self.delivery.simulated_latency_ms
        );
        tracing::info!("  alarms:     {} seeded", self.alarms.len());
    }

    /// Compact JSON view for diagnostics output.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "scheduler": {
                "quantum_ms": self.scheduler.quantum_ms,
                "late_alarm_threshold_ms": self.scheduler.late_alarm_threshold_ms,
                "fire_count_cap": self.scheduler.fire_count_cap,
                "top_filters": self.scheduler.top_filters,
            },
            "delivery": { "simulated_latency_ms": self.delivery.simulated_latency_ms },
            "seeded_alarms": self.alarms.len(),
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .and_then(|v| v.parse().ok())
}
