use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::ClockClass;
use crate::error::AlarmError;

/// Uids are partitioned into per-user ranges of this size.
pub const PER_USER_RANGE: u32 = 100_000;

/// Destination of a scheduled alarm and the principal that owns it.
///
/// Two targets are the same alarm slot when every field matches; scheduling
/// against an equal target replaces the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    /// Owning principal (package name).
    pub principal: String,
    /// Creator uid; the user id is derived from it.
    pub uid: u32,
    pub action: Option<String>,
    pub component: Option<String>,
    #[serde(default)]
    pub request_code: i32,
}

impl Target {
    pub fn new(principal: impl Into<String>, uid: u32) -> Self {
        Self {
            principal: principal.into(),
            uid,
            action: None,
            component: None,
            request_code: 0,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_request_code(mut self, request_code: i32) -> Self {
        self.request_code = request_code;
        self
    }

    pub fn user_id(&self) -> u32 {
        self.uid / PER_USER_RANGE
    }

    /// The (action, component) bucket used for fine-grained statistics.
    pub fn filter_key(&self) -> FilterKey {
        FilterKey {
            action: self.action.clone(),
            component: self.component.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), AlarmError> {
        if self.principal.trim().is_empty() {
            return Err(AlarmError::InvalidTarget(
                "target has an empty principal".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.principal)?;
        if let Some(action) = &self.action {
            write!(f, " act={action}")?;
        }
        if let Some(component) = &self.component {
            write!(f, " cmp={component}")?;
        }
        Ok(())
    }
}

/// (action, destination-component) identity pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct FilterKey {
    pub action: Option<String>,
    pub component: Option<String>,
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.action, &self.component) {
            (Some(a), Some(c)) => write!(f, "act={a} cmp={c}"),
            (Some(a), None) => write!(f, "act={a}"),
            (None, Some(c)) => write!(f, "cmp={c}"),
            (None, None) => f.write_str("(unnamed)"),
        }
    }
}

/// One scheduled alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub class: ClockClass,
    /// Trigger time in the class's own timebase, millis.
    pub trigger_at: i64,
    /// 0 for one-shot alarms.
    pub repeat_interval: i64,
    /// Only meaningful between trigger computation and re-enqueue.
    pub fire_count: u64,
    pub target: Target,
}

impl AlarmRecord {
    pub fn new(class: ClockClass, trigger_at: i64, repeat_interval: i64, target: Target) -> Self {
        Self {
            class,
            trigger_at,
            repeat_interval,
            fire_count: 0,
            target,
        }
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat_interval > 0
    }
}

/// A schedule request as it arrives at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub class: ClockClass,
    pub trigger_at: i64,
    #[serde(default)]
    pub repeat_interval: i64,
    pub target: Option<Target>,
}

impl AlarmRequest {
    pub fn one_shot(class: ClockClass, trigger_at: i64, target: Target) -> Self {
        Self::repeating(class, trigger_at, 0, target)
    }

    pub fn repeating(class: ClockClass, trigger_at: i64, repeat_interval: i64, target: Target) -> Self {
        Self {
            class,
            trigger_at,
            repeat_interval,
            target: Some(target),
        }
    }

    /// Validate the request and turn it into a record. Nothing is mutated
    /// when this fails.
    pub fn into_record(self) -> Result<AlarmRecord, AlarmError> {
        let target = self
            .target
            .ok_or_else(|| AlarmError::InvalidTarget("request has no target".into()))?;
        target.validate()?;
        if self.repeat_interval < 0 {
            return Err(AlarmError::InvalidInterval(self.repeat_interval));
        }
        Ok(AlarmRecord::new(
            self.class,
            self.trigger_at,
            self.repeat_interval,
            target,
        ))
    }
}
