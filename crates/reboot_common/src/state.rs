//! Condition states and the transition table
//!
//! States are plain values. [`transition`] is a pure function of the current
//! state, the probe event and the streak thresholds; the owning
//! [`Condition`](crate::condition::Condition) applies the result and performs
//! the side effects (timestamping, logging, metrics, notification).
//!
//! ```text
//!              success (streak met)           failure
//!   Initial ──────────────────────► Healthy ──────────► RebootNeeded
//!      │                              ▲                   │    ▲
//!      │ success/failure              │ success streak    │    │ failure streak
//!      ▼                              │                   │    │
//!   Uncertain(s, f) ──────────────────┘◄──── success ─────┘    │
//!      └───────────────────────────────────────────────────────┘
//!
//!   any state ── error ──► Error ── success ──► Uncertain(0, 0)
//!                            └──── failure ──► RebootNeeded
//! ```

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a state variant, as used in configuration and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateName {
    Initial,
    Uncertain,
    Healthy,
    RebootNeeded,
    Error,
}

impl StateName {
    pub const ALL: [StateName; 5] = [
        StateName::Initial,
        StateName::Uncertain,
        StateName::Healthy,
        StateName::RebootNeeded,
        StateName::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Uncertain => "uncertain",
            Self::Healthy => "healthy",
            Self::RebootNeeded => "reboot_needed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initial" => Ok(Self::Initial),
            "uncertain" => Ok(Self::Uncertain),
            "healthy" | "ok" | "no_reboot_needed" => Ok(Self::Healthy),
            "reboot_needed" | "reboot" => Ok(Self::RebootNeeded),
            "error" => Ok(Self::Error),
            _ => Err(ConfigError::UnknownState(s.to_string())),
        }
    }
}

/// Current state of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionState {
    Initial,
    /// Hysteresis dwell: consecutive outcomes since entering this state
    Uncertain {
        success_streak: u32,
        failure_streak: u32,
    },
    /// No reboot needed
    Healthy,
    RebootNeeded,
    /// The checker could not produce a verdict
    Error,
}

impl ConditionState {
    /// Fresh uncertain state with zeroed streaks
    pub fn uncertain() -> Self {
        Self::Uncertain {
            success_streak: 0,
            failure_streak: 0,
        }
    }

    pub fn name(&self) -> StateName {
        match self {
            Self::Initial => StateName::Initial,
            Self::Uncertain { .. } => StateName::Uncertain,
            Self::Healthy => StateName::Healthy,
            Self::RebootNeeded => StateName::RebootNeeded,
            Self::Error => StateName::Error,
        }
    }
}

impl Default for ConditionState {
    fn default() -> Self {
        Self::Initial
    }
}

/// Outcome of one probe invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    Success,
    Failure,
    Error,
}

/// Streak thresholds of a condition, both at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    streak_until_ok: u32,
    streak_until_reboot: u32,
}

impl Thresholds {
    pub fn new(streak_until_ok: u32, streak_until_reboot: u32) -> ConfigResult<Self> {
        if streak_until_ok < 1 {
            return Err(ConfigError::InvalidStreak {
                field: "streak_until_ok",
            });
        }
        if streak_until_reboot < 1 {
            return Err(ConfigError::InvalidStreak {
                field: "streak_until_reboot",
            });
        }
        Ok(Self {
            streak_until_ok,
            streak_until_reboot,
        })
    }

    pub fn streak_until_ok(&self) -> u32 {
        self.streak_until_ok
    }

    pub fn streak_until_reboot(&self) -> u32 {
        self.streak_until_reboot
    }
}

/// Result of applying an event to a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changes
    Stay,
    /// Streak counters moved inside `Uncertain`; not a state change
    Count(ConditionState),
    /// Full replacement of the state
    Enter(ConditionState),
}

/// The transition table.
pub fn transition(state: ConditionState, event: ProbeEvent, thresholds: Thresholds) -> Transition {
    use ConditionState as S;
    use ProbeEvent as E;

    match (state, event) {
        (S::Error, E::Error) => Transition::Stay,
        (_, E::Error) => Transition::Enter(S::Error),

        (S::Initial, E::Success) => {
            if thresholds.streak_until_ok > 1 {
                Transition::Enter(S::uncertain())
            } else {
                Transition::Enter(S::Healthy)
            }
        }
        (S::Initial, E::Failure) => {
            if thresholds.streak_until_reboot > 1 {
                Transition::Enter(S::uncertain())
            } else {
                Transition::Enter(S::RebootNeeded)
            }
        }

        (S::Uncertain { success_streak, .. }, E::Success) => {
            let success_streak = success_streak + 1;
            if success_streak >= thresholds.streak_until_ok {
                Transition::Enter(S::Healthy)
            } else {
                Transition::Count(S::Uncertain {
                    success_streak,
                    failure_streak: 0,
                })
            }
        }
        (S::Uncertain { failure_streak, .. }, E::Failure) => {
            let failure_streak = failure_streak + 1;
            if failure_streak >= thresholds.streak_until_reboot {
                Transition::Enter(S::RebootNeeded)
            } else {
                Transition::Count(S::Uncertain {
                    success_streak: 0,
                    failure_streak,
                })
            }
        }

        (S::Healthy, E::Success) => Transition::Stay,
        (S::Healthy, E::Failure) => Transition::Enter(S::RebootNeeded),

        (S::RebootNeeded, E::Success) => Transition::Enter(S::uncertain()),
        (S::RebootNeeded, E::Failure) => Transition::Stay,

        (S::Error, E::Success) => Transition::Enter(S::uncertain()),
        (S::Error, E::Failure) => Transition::Enter(S::RebootNeeded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ok: u32, reboot: u32) -> Thresholds {
        Thresholds::new(ok, reboot).unwrap()
    }

    fn uncertain(s: u32, f: u32) -> ConditionState {
        ConditionState::Uncertain {
            success_streak: s,
            failure_streak: f,
        }
    }

    #[test]
    fn test_initial_transitions() {
        let state = ConditionState::Initial;
        assert_eq!(
            transition(state, ProbeEvent::Success, t(3, 3)),
            Transition::Enter(uncertain(0, 0))
        );
        assert_eq!(
            transition(state, ProbeEvent::Success, t(1, 3)),
            Transition::Enter(ConditionState::Healthy)
        );
        assert_eq!(
            transition(state, ProbeEvent::Failure, t(3, 3)),
            Transition::Enter(uncertain(0, 0))
        );
        assert_eq!(
            transition(state, ProbeEvent::Failure, t(3, 1)),
            Transition::Enter(ConditionState::RebootNeeded)
        );
        assert_eq!(
            transition(state, ProbeEvent::Error, t(3, 3)),
            Transition::Enter(ConditionState::Error)
        );
    }

    #[test]
    fn test_uncertain_counts_streaks() {
        assert_eq!(
            transition(uncertain(0, 0), ProbeEvent::Success, t(3, 3)),
            Transition::Count(uncertain(1, 0))
        );
        assert_eq!(
            transition(uncertain(2, 0), ProbeEvent::Success, t(3, 3)),
            Transition::Enter(ConditionState::Healthy)
        );
        assert_eq!(
            transition(uncertain(0, 1), ProbeEvent::Failure, t(3, 3)),
            Transition::Count(uncertain(0, 2))
        );
        assert_eq!(
            transition(uncertain(0, 2), ProbeEvent::Failure, t(3, 3)),
            Transition::Enter(ConditionState::RebootNeeded)
        );
        assert_eq!(
            transition(uncertain(2, 0), ProbeEvent::Error, t(3, 3)),
            Transition::Enter(ConditionState::Error)
        );
    }

    #[test]
    fn test_opposite_outcome_restarts_streak() {
        assert_eq!(
            transition(uncertain(2, 0), ProbeEvent::Failure, t(3, 3)),
            Transition::Count(uncertain(0, 1))
        );
        assert_eq!(
            transition(uncertain(0, 2), ProbeEvent::Success, t(3, 3)),
            Transition::Count(uncertain(1, 0))
        );
    }

    #[test]
    fn test_healthy_transitions() {
        let state = ConditionState::Healthy;
        assert_eq!(transition(state, ProbeEvent::Success, t(3, 3)), Transition::Stay);
        assert_eq!(
            transition(state, ProbeEvent::Failure, t(3, 3)),
            Transition::Enter(ConditionState::RebootNeeded)
        );
        assert_eq!(
            transition(state, ProbeEvent::Error, t(3, 3)),
            Transition::Enter(ConditionState::Error)
        );
    }

    #[test]
    fn test_reboot_needed_transitions() {
        let state = ConditionState::RebootNeeded;
        assert_eq!(
            transition(state, ProbeEvent::Success, t(1, 1)),
            Transition::Enter(uncertain(0, 0))
        );
        assert_eq!(transition(state, ProbeEvent::Failure, t(3, 3)), Transition::Stay);
        assert_eq!(
            transition(state, ProbeEvent::Error, t(3, 3)),
            Transition::Enter(ConditionState::Error)
        );
    }

    #[test]
    fn test_error_transitions() {
        let state = ConditionState::Error;
        assert_eq!(
            transition(state, ProbeEvent::Success, t(1, 1)),
            Transition::Enter(uncertain(0, 0))
        );
        assert_eq!(
            transition(state, ProbeEvent::Failure, t(3, 3)),
            Transition::Enter(ConditionState::RebootNeeded)
        );
        assert_eq!(transition(state, ProbeEvent::Error, t(3, 3)), Transition::Stay);
    }

    #[test]
    fn test_only_table_targets_reachable() {
        let states = [
            ConditionState::Initial,
            uncertain(0, 0),
            uncertain(1, 0),
            uncertain(0, 1),
            ConditionState::Healthy,
            ConditionState::RebootNeeded,
            ConditionState::Error,
        ];
        let events = [ProbeEvent::Success, ProbeEvent::Failure, ProbeEvent::Error];

        for state in states {
            for event in events {
                if let Transition::Enter(next) = transition(state, event, t(2, 2)) {
                    let allowed = match event {
                        ProbeEvent::Error => next == ConditionState::Error,
                        ProbeEvent::Success => {
                            matches!(next, ConditionState::Healthy) || next == uncertain(0, 0)
                        }
                        ProbeEvent::Failure => {
                            matches!(next, ConditionState::RebootNeeded) || next == uncertain(0, 0)
                        }
                    };
                    assert!(allowed, "{:?} + {:?} -> {:?}", state, event, next);
                }
            }
        }
    }

    #[test]
    fn test_thresholds_reject_zero() {
        assert!(Thresholds::new(0, 1).is_err());
        assert!(Thresholds::new(1, 0).is_err());
        assert!(Thresholds::new(1, 1).is_ok());
    }

    #[test]
    fn test_state_name_parsing() {
        assert_eq!("reboot_needed".parse::<StateName>().unwrap(), StateName::RebootNeeded);
        assert_eq!("Reboot".parse::<StateName>().unwrap(), StateName::RebootNeeded);
        assert_eq!("ok".parse::<StateName>().unwrap(), StateName::Healthy);
        assert_eq!("ERROR".parse::<StateName>().unwrap(), StateName::Error);
        assert!("broken".parse::<StateName>().is_err());

        for name in StateName::ALL {
            assert_eq!(name.as_str().parse::<StateName>().unwrap(), name);
        }
    }
}
