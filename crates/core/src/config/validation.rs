use super::types::AlarmConfig;
use crate::error::AlarmError;

impl AlarmConfig {
    /// Validate the config: scheduler bounds and every seeded alarm.
    pub fn validate(&self) -> Result<(), AlarmError> {
        self.validate_scheduler()?;
        self.validate_alarms()?;
        Ok(())
    }

    fn validate_scheduler(&self) -> Result<(), AlarmError> {
        let s = &self.scheduler;
        if s.quantum_ms <= 0 {
            return Err(AlarmError::Config(format!(
                "scheduler.quantum_ms must be positive, got {}",
                s.quantum_ms
            )));
        }
        if s.top_filters == 0 {
            return Err(AlarmError::Config(
                "scheduler.top_filters must be at least 1".into(),
            ));
        }
        if s.problem_log_capacity == 0 {
            return Err(AlarmError::Config(
                "scheduler.problem_log_capacity must be at least 1".into(),
            ));
        }
        if s.fire_count_cap == Some(0) {
            return Err(AlarmError::Config(
                "scheduler.fire_count_cap must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    fn validate_alarms(&self) -> Result<(), AlarmError> {
        for (i, alarm) in self.alarms.iter().enumerate() {
            if alarm.principal.trim().is_empty() {
                return Err(AlarmError::Config(format!(
                    "alarms[{i}] has an empty principal"
                )));
            }
            if alarm.interval_ms < 0 {
                return Err(AlarmError::Config(format!(
                    "alarms[{i}] ({}) has negative interval_ms {}",
                    alarm.principal, alarm.interval_ms
                )));
            }
            if alarm.inexact && alarm.interval_ms == 0 {
                return Err(AlarmError::Config(format!(
                    "alarms[{i}] ({}) is inexact but has no interval",
                    alarm.principal
                )));
            }
        }
        Ok(())
    }
}
