//! Probe preconditions
//!
//! A precondition decides whether a condition may run its checker right now.
//! It never touches condition state; a skipped probe is simply not counted.

use crate::error::{ConfigError, ConfigResult};
use crate::ports::Precondition;
use chrono::{Local, Timelike};
use std::sync::Arc;

/// Precondition that never blocks probing
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPrecondition;

impl Precondition for AlwaysPrecondition {
    fn allowed(&self) -> bool {
        true
    }
}

/// Source of the current hour of day (0..=23)
pub trait HourClock: Send + Sync {
    fn current_hour(&self) -> u32;
}

/// Local wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl HourClock for LocalClock {
    fn current_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// Only allow probing inside `[from_hour, to_hour)`, wrapping past midnight
/// when `from_hour > to_hour`.
#[derive(Clone)]
pub struct TimeWindowPrecondition {
    from_hour: u32,
    to_hour: u32,
    clock: Arc<dyn HourClock>,
}

impl TimeWindowPrecondition {
    pub fn new(from_hour: u32, to_hour: u32) -> ConfigResult<Self> {
        Self::with_clock(from_hour, to_hour, Arc::new(LocalClock))
    }

    pub fn with_clock(from_hour: u32, to_hour: u32, clock: Arc<dyn HourClock>) -> ConfigResult<Self> {
        if from_hour > 23 {
            return Err(ConfigError::InvalidTimeWindow(format!(
                "from hour {} is not in [0, 23]",
                from_hour
            )));
        }
        if to_hour > 23 {
            return Err(ConfigError::InvalidTimeWindow(format!(
                "to hour {} is not in [0, 23]",
                to_hour
            )));
        }
        if from_hour == to_hour {
            return Err(ConfigError::InvalidTimeWindow(
                "from and to hour must not be identical".to_string(),
            ));
        }

        Ok(Self {
            from_hour,
            to_hour,
            clock,
        })
    }

    pub fn from_hour(&self) -> u32 {
        self.from_hour
    }

    pub fn to_hour(&self) -> u32 {
        self.to_hour
    }

    fn contains(&self, hour: u32) -> bool {
        let (mut hour, mut to) = (hour, self.to_hour);
        if self.from_hour > self.to_hour {
            to += 24;
            if hour < self.from_hour {
                hour += 24;
            }
        }
        hour >= self.from_hour && hour < to
    }
}

impl Precondition for TimeWindowPrecondition {
    fn allowed(&self) -> bool {
        self.contains(self.clock.current_hour())
    }
}

impl std::fmt::Debug for TimeWindowPrecondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWindowPrecondition")
            .field("from_hour", &self.from_hour)
            .field("to_hour", &self.to_hour)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FixedClock;

    fn window(from: u32, to: u32, hour: u32) -> bool {
        TimeWindowPrecondition::with_clock(from, to, Arc::new(FixedClock::new(hour)))
            .unwrap()
            .allowed()
    }

    #[test]
    fn test_always_allows() {
        assert!(AlwaysPrecondition.allowed());
    }

    #[test]
    fn test_window_boundaries() {
        assert!(window(0, 2, 1));
        assert!(window(0, 2, 0), "from hour is inclusive");
        assert!(!window(0, 2, 2), "to hour is exclusive");
        assert!(!window(0, 2, 14));
    }

    #[test]
    fn test_overnight_window() {
        assert!(window(18, 2, 0));
        assert!(window(18, 2, 18));
        assert!(window(18, 2, 23));
        assert!(window(18, 2, 1));
        assert!(!window(18, 2, 2));
        assert!(!window(18, 2, 4));
        assert!(!window(18, 2, 14));
    }

    #[test]
    fn test_evaluation_does_not_mutate_window() {
        let clock = Arc::new(FixedClock::new(20));
        let pre = TimeWindowPrecondition::with_clock(18, 2, clock.clone()).unwrap();
        assert!(pre.allowed());
        assert!(pre.allowed());
        assert_eq!(pre.from_hour(), 18);
        assert_eq!(pre.to_hour(), 2);

        clock.set(10);
        assert!(!pre.allowed());
    }

    #[test]
    fn test_invalid_windows_rejected() {
        assert!(TimeWindowPrecondition::new(24, 2).is_err());
        assert!(TimeWindowPrecondition::new(2, 24).is_err());
        assert!(TimeWindowPrecondition::new(5, 5).is_err());
    }
}
