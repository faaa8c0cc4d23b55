//! Configuration errors for the reboot core.
//!
//! Every constructor in this crate validates its input up front and returns
//! one of these. Nothing here is produced once tasks are running.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("check interval {0:?} is below the minimum of 5s")]
    IntervalTooShort(Duration),

    #[error("check interval {0:?} exceeds the maximum of 1h")]
    IntervalTooLong(Duration),

    #[error("probe timeout {timeout:?} must be non-zero and not exceed the check interval {interval:?}")]
    InvalidProbeTimeout { timeout: Duration, interval: Duration },

    #[error("{field} must be at least 1")]
    InvalidStreak { field: &'static str },

    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    #[error("group '{0}' has no conditions")]
    NoConditions(String),

    #[error("no groups configured")]
    NoGroups,

    #[error("wanted states must not be empty")]
    EmptyWantedStates,

    #[error("unknown state name '{0}'")]
    UnknownState(String),

    #[error("state '{0}' is listed more than once in wanted states")]
    DuplicateState(String),

    #[error("unknown evaluator '{0}' (expected 'and' or 'or')")]
    UnknownEvaluator(String),

    #[error("invalid time window: {0}")]
    InvalidTimeWindow(String),

    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("reboot request channel is closed")]
    ClosedChannel,

    #[error("safe minimum uptime {0:?} must not be below 1h")]
    UptimeThresholdTooLow(Duration),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
