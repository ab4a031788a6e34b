//! Scheduler configuration structures.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{
    AppResult, DemotePolicy, PreemptPolicy, PriorityPolicy, ResourceKey, SharedPolicy,
    StandbyPolicy,
    DEFAULT_COMPLETION_BUFFER, DEFAULT_SCHEDULER_NAME,
};

/// Environment variable naming the scheduler.
pub const ENV_NAME: &str = "TICKET_LOT_NAME";
/// Environment variable selecting the built-in policy.
pub const ENV_POLICY: &str = "TICKET_LOT_POLICY";
/// Environment variable sizing the completion broadcast.
pub const ENV_COMPLETION_BUFFER: &str = "TICKET_LOT_COMPLETION_BUFFER";
/// Environment variable sizing the in-memory audit trail.
pub const ENV_AUDIT_CAPACITY: &str = "TICKET_LOT_AUDIT_CAPACITY";

/// Built-in policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// [`PreemptPolicy`]: newest ticket wins.
    #[default]
    Preempt,
    /// [`DemotePolicy`]: newest wins, displaced queued tickets wait in standby.
    Demote,
    /// [`StandbyPolicy`]: first come, first served, no preemption.
    Standby,
    /// [`PriorityPolicy`]: preempt only equal or lower priority.
    Priority,
}

impl PolicyKind {
    /// Instantiate the policy.
    #[must_use]
    pub fn build<K: ResourceKey>(self) -> SharedPolicy<K> {
        match self {
            Self::Preempt => Arc::new(PreemptPolicy),
            Self::Demote => Arc::new(DemotePolicy),
            Self::Standby => Arc::new(StandbyPolicy),
            Self::Priority => Arc::new(PriorityPolicy),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preempt" => Ok(Self::Preempt),
            "demote" => Ok(Self::Demote),
            "standby" => Ok(Self::Standby),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown policy `{other}`")),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name used in tracing spans.
    pub name: String,
    /// Built-in admission policy.
    pub policy: PolicyKind,
    /// Capacity of the completion broadcast; slow observers beyond this lag.
    pub completion_buffer: usize,
    /// Keep an in-memory audit trail of this many events.
    pub audit_capacity: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SCHEDULER_NAME.to_string(),
            policy: PolicyKind::default(),
            completion_buffer: DEFAULT_COMPLETION_BUFFER,
            audit_capacity: None,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// A description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.completion_buffer == 0 {
            return Err("completion_buffer must be greater than 0".into());
        }
        if self.audit_capacity == Some(0) {
            return Err("audit_capacity must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from a variable lookup, starting from defaults.
    ///
    /// # Errors
    ///
    /// Unparseable values or validation failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(name) = lookup(ENV_NAME) {
            cfg.name = name;
        }
        if let Some(policy) = lookup(ENV_POLICY) {
            cfg.policy = policy.parse()?;
        }
        if let Some(buffer) = lookup(ENV_COMPLETION_BUFFER) {
            cfg.completion_buffer = buffer
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_COMPLETION_BUFFER}: {e}"))?;
        }
        if let Some(capacity) = lookup(ENV_AUDIT_CAPACITY) {
            cfg.audit_capacity = Some(
                capacity
                    .trim()
                    .parse()
                    .map_err(|e| format!("{ENV_AUDIT_CAPACITY}: {e}"))?,
            );
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading a `.env`
    /// file first if one exists.
    ///
    /// # Errors
    ///
    /// Unparseable values or validation failure.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is fine; only real variables matter then.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok()).map_err(anyhow::Error::msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_kind_from_str() {
        assert_eq!("Standby".parse::<PolicyKind>(), Ok(PolicyKind::Standby));
        assert_eq!(" priority ".parse::<PolicyKind>(), Ok(PolicyKind::Priority));
        assert!("fastest".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn test_from_lookup_overrides_defaults() {
        let cfg = SchedulerConfig::from_lookup(|key| match key {
            ENV_POLICY => Some("demote".into()),
            ENV_AUDIT_CAPACITY => Some("64".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.policy, PolicyKind::Demote);
        assert_eq!(cfg.audit_capacity, Some(64));
        assert_eq!(cfg.name, DEFAULT_SCHEDULER_NAME);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = SchedulerConfig::from_lookup(|key| {
            (key == ENV_COMPLETION_BUFFER).then(|| "many".into())
        })
        .unwrap_err();
        assert!(err.starts_with(ENV_COMPLETION_BUFFER));
    }
}
