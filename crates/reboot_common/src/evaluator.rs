//! Group-level reboot verdicts
//!
//! An evaluator looks at every condition of a group and decides whether the
//! group should ask for a reboot. A condition *satisfies* the wanted states
//! when its current state is listed and it has held that state for at least
//! the listed duration.

use crate::condition::{Condition, StateSnapshot};
use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};
use crate::state::StateName;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const AND_EVALUATOR: &str = "and";
pub const OR_EVALUATOR: &str = "or";

/// Non-empty mapping of state -> minimum dwell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WantedStates(BTreeMap<StateName, Duration>);

impl WantedStates {
    pub fn new(wants: BTreeMap<StateName, Duration>) -> ConfigResult<Self> {
        if wants.is_empty() {
            return Err(ConfigError::EmptyWantedStates);
        }
        Ok(Self(wants))
    }

    /// Build from configuration strings, e.g. `{"reboot_needed": "0s"}`
    pub fn parse(args: &HashMap<String, String>) -> ConfigResult<Self> {
        let mut wants = BTreeMap::new();
        for (key, duration) in args {
            let state = key.parse::<StateName>()?;
            // Aliases of one state would otherwise race on map order.
            if wants.insert(state, parse_duration(duration)?).is_some() {
                return Err(ConfigError::DuplicateState(state.to_string()));
            }
        }
        Self::new(wants)
    }

    /// The default: reboot as soon as a condition needs it
    pub fn reboot_needed() -> Self {
        Self(BTreeMap::from([(StateName::RebootNeeded, Duration::ZERO)]))
    }

    pub fn is_satisfied_by(&self, snapshot: &StateSnapshot) -> bool {
        self.0
            .get(&snapshot.name())
            .map(|min_dwell| snapshot.dwell >= *min_dwell)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateName, &Duration)> {
        self.0.iter()
    }
}

impl fmt::Display for WantedStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(state, dwell)| format!("{}>={:?}", state, dwell))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Aggregation strategy of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvaluator {
    /// Every condition must satisfy the wanted states
    And(WantedStates),
    /// At least one condition must satisfy the wanted states
    Or(WantedStates),
}

impl StateEvaluator {
    /// Construction-time dispatch on the configured kind
    pub fn from_kind(kind: &str, wants: WantedStates) -> ConfigResult<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            AND_EVALUATOR => Ok(Self::And(wants)),
            OR_EVALUATOR => Ok(Self::Or(wants)),
            _ => Err(ConfigError::UnknownEvaluator(kind.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::And(_) => AND_EVALUATOR,
            Self::Or(_) => OR_EVALUATOR,
        }
    }

    pub fn wanted_states(&self) -> &WantedStates {
        match self {
            Self::And(wants) | Self::Or(wants) => wants,
        }
    }

    /// Verdict over a list of snapshots, in order
    pub fn evaluate<I>(&self, snapshots: I) -> bool
    where
        I: IntoIterator<Item = StateSnapshot>,
    {
        let mut snapshots = snapshots.into_iter();
        match self {
            Self::And(wants) => snapshots.all(|s| wants.is_satisfied_by(&s)),
            Self::Or(wants) => snapshots.any(|s| wants.is_satisfied_by(&s)),
        }
    }

    /// Verdict over the live state of a group's conditions
    pub fn should_reboot(&self, conditions: &[Arc<Condition>]) -> bool {
        // Lazy: AND stops reading at the first miss, OR at the first hit.
        self.evaluate(conditions.iter().map(|c| c.current_state()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConditionState;

    fn snap(state: ConditionState, secs: u64) -> StateSnapshot {
        StateSnapshot {
            state,
            dwell: Duration::from_secs(secs),
        }
    }

    fn wants(pairs: &[(StateName, u64)]) -> WantedStates {
        WantedStates::new(
            pairs
                .iter()
                .map(|(s, d)| (*s, Duration::from_secs(*d)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_wanted_states_rejected() {
        assert_eq!(
            WantedStates::new(BTreeMap::new()),
            Err(ConfigError::EmptyWantedStates)
        );
        assert_eq!(
            WantedStates::parse(&HashMap::new()),
            Err(ConfigError::EmptyWantedStates)
        );
    }

    #[test]
    fn test_parse_wanted_states() {
        let args = HashMap::from([
            ("reboot_needed".to_string(), "1h".to_string()),
            ("error".to_string(), "2d".to_string()),
        ]);
        let parsed = WantedStates::parse(&args).unwrap();
        assert_eq!(
            parsed,
            wants(&[(StateName::RebootNeeded, 3600), (StateName::Error, 172_800)])
        );

        let bad = HashMap::from([("sleepy".to_string(), "1h".to_string())]);
        assert!(WantedStates::parse(&bad).is_err());
        let bad = HashMap::from([("error".to_string(), "soon".to_string())]);
        assert!(WantedStates::parse(&bad).is_err());
    }

    #[test]
    fn test_aliases_of_one_state_rejected() {
        let args = HashMap::from([
            ("ok".to_string(), "1h".to_string()),
            ("healthy".to_string(), "0s".to_string()),
        ]);
        for _ in 0..50 {
            assert_eq!(
                WantedStates::parse(&args),
                Err(ConfigError::DuplicateState("healthy".to_string()))
            );
        }

        let args = HashMap::from([
            ("reboot".to_string(), "0s".to_string()),
            ("REBOOT_NEEDED".to_string(), "0s".to_string()),
        ]);
        assert_eq!(
            WantedStates::parse(&args),
            Err(ConfigError::DuplicateState("reboot_needed".to_string()))
        );
    }

    #[test]
    fn test_dwell_must_be_reached() {
        let w = wants(&[(StateName::RebootNeeded, 60)]);
        assert!(!w.is_satisfied_by(&snap(ConditionState::RebootNeeded, 59)));
        assert!(w.is_satisfied_by(&snap(ConditionState::RebootNeeded, 60)));
        assert!(!w.is_satisfied_by(&snap(ConditionState::Healthy, 600)));
    }

    #[test]
    fn test_and_requires_all() {
        let eval = StateEvaluator::And(wants(&[(StateName::RebootNeeded, 0)]));
        assert!(eval.evaluate(vec![
            snap(ConditionState::RebootNeeded, 0),
            snap(ConditionState::RebootNeeded, 5),
        ]));
        assert!(!eval.evaluate(vec![
            snap(ConditionState::RebootNeeded, 0),
            snap(ConditionState::Healthy, 5),
        ]));
        assert!(!eval.evaluate(vec![
            snap(ConditionState::Error, 0),
            snap(ConditionState::RebootNeeded, 5),
        ]));
    }

    #[test]
    fn test_and_matches_any_listed_state_per_condition() {
        let eval = StateEvaluator::And(wants(&[
            (StateName::RebootNeeded, 0),
            (StateName::Error, 3600),
        ]));
        assert!(eval.evaluate(vec![
            snap(ConditionState::RebootNeeded, 0),
            snap(ConditionState::Error, 7200),
        ]));
        assert!(!eval.evaluate(vec![
            snap(ConditionState::RebootNeeded, 0),
            snap(ConditionState::Error, 60),
        ]));
    }

    #[test]
    fn test_or_requires_one() {
        let eval = StateEvaluator::Or(wants(&[(StateName::RebootNeeded, 0)]));
        assert!(eval.evaluate(vec![
            snap(ConditionState::Healthy, 0),
            snap(ConditionState::RebootNeeded, 0),
        ]));
        assert!(!eval.evaluate(vec![
            snap(ConditionState::Healthy, 0),
            snap(ConditionState::uncertain(), 0),
        ]));
        assert!(!eval.evaluate(Vec::new()));
    }

    #[test]
    fn test_verdict_is_order_independent() {
        let snaps = vec![
            snap(ConditionState::Healthy, 10),
            snap(ConditionState::RebootNeeded, 10),
            snap(ConditionState::Error, 10),
        ];
        let mut reversed = snaps.clone();
        reversed.reverse();

        for eval in [
            StateEvaluator::And(wants(&[(StateName::RebootNeeded, 0)])),
            StateEvaluator::Or(wants(&[(StateName::RebootNeeded, 0)])),
        ] {
            assert_eq!(eval.evaluate(snaps.clone()), eval.evaluate(reversed.clone()));
        }
    }

    #[test]
    fn test_from_kind() {
        let w = WantedStates::reboot_needed();
        assert_eq!(StateEvaluator::from_kind("AND", w.clone()).unwrap().kind(), "and");
        assert_eq!(StateEvaluator::from_kind("or", w.clone()).unwrap().kind(), "or");
        assert!(matches!(
            StateEvaluator::from_kind("xor", w),
            Err(ConfigError::UnknownEvaluator(_))
        ));
    }

    #[test]
    fn test_display_lists_states_in_order() {
        let w = wants(&[(StateName::RebootNeeded, 0), (StateName::Error, 60)]);
        assert_eq!(w.to_string(), "{reboot_needed>=0ns, error>=60s}");
    }
}
