//! Resolution of named intervals and schedule groups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::timer::CronTrigger;

/// Schedule resolution errors.
///
/// Any single bad group aborts resolution for the whole configuration set;
/// partially-resolved schedules are never returned.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A group references an interval name that is not defined.
    #[error("schedule group '{group}' references unknown interval '{interval}'")]
    UnknownInterval {
        /// Offending group name.
        group: String,
        /// The missing interval name.
        interval: String,
    },

    /// An interval expression failed to parse.
    #[error("schedule group '{group}' has invalid cron expression '{expression}': {source}")]
    InvalidExpression {
        /// Offending group name.
        group: String,
        /// The expression that failed to parse.
        expression: String,
        /// Parser error.
        source: cron::error::Error,
    },
}

fn default_method() -> String {
    "full".to_string()
}

/// One named schedule group: a collection method bound to a named interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Collection method label (default: "full").
    #[serde(default = "default_method")]
    pub method: String,
    /// Name of the interval this group runs on.
    pub interval: String,
}

/// Named intervals and the groups referencing them.
///
/// The `Default` value is the built-in schedule: a single "stats" group
/// running every ten minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Interval name → cron expression (6-field, seconds first).
    #[serde(default)]
    pub intervals: HashMap<String, String>,
    /// Group name → group spec.
    #[serde(default)]
    pub groups: HashMap<String, GroupSpec>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let intervals = HashMap::from([("standard".to_string(), "0 */10 * * * *".to_string())]);
        let groups = HashMap::from([(
            "stats".to_string(),
            GroupSpec {
                method: default_method(),
                interval: "standard".to_string(),
            },
        )]);
        Self { intervals, groups }
    }
}

/// A resolved group, ready to arm.
#[derive(Debug, Clone)]
pub struct ScheduleGroup {
    /// Group name.
    pub name: String,
    /// Collection method label.
    pub method: String,
    /// Parsed recurring trigger.
    pub trigger: CronTrigger,
}

/// Resolve every group against the interval table.
///
/// Resolution is pure: no timers are armed and nothing is spawned.
///
/// # Errors
/// Returns `ScheduleError` naming the first offending group if any interval
/// reference is missing or any expression fails to parse.
pub fn resolve(config: &ScheduleConfig) -> Result<HashMap<String, ScheduleGroup>, ScheduleError> {
    let mut resolved = HashMap::with_capacity(config.groups.len());

    for (name, spec) in &config.groups {
        let expression =
            config
                .intervals
                .get(&spec.interval)
                .ok_or_else(|| ScheduleError::UnknownInterval {
                    group: name.clone(),
                    interval: spec.interval.clone(),
                })?;

        let trigger =
            CronTrigger::parse(expression).map_err(|source| ScheduleError::InvalidExpression {
                group: name.clone(),
                expression: expression.clone(),
                source,
            })?;

        resolved.insert(
            name.clone(),
            ScheduleGroup {
                name: name.clone(),
                method: spec.method.clone(),
                trigger,
            },
        );
    }

    Ok(resolved)
}
