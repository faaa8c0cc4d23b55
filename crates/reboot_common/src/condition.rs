//! A monitored condition: one checker, one precondition, one state machine.
//!
//! The condition's scheduling loop is the only writer of its state. Readers
//! (the group's evaluator) take a consistent `(state, dwell)` snapshot under
//! the same lock.

use crate::duration::format_duration;
use crate::error::{ConfigError, ConfigResult};
use crate::metrics::RebootMetrics;
use crate::ports::{Checker, Precondition};
use crate::state::{transition, ConditionState, ProbeEvent, StateName, Thresholds, Transition};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Scheduling and hysteresis settings of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionSettings {
    pub check_interval: Duration,
    /// Defaults to `check_interval` when unset
    pub probe_timeout: Option<Duration>,
    pub streak_until_ok: u32,
    pub streak_until_reboot: u32,
}

impl ConditionSettings {
    pub fn new(check_interval: Duration, streak_until_ok: u32, streak_until_reboot: u32) -> Self {
        Self {
            check_interval,
            probe_timeout: None,
            streak_until_ok,
            streak_until_reboot,
        }
    }
}

/// Notification published when a condition fully changes state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub condition: String,
    pub from: StateName,
    pub to: StateName,
    pub at: DateTime<Utc>,
}

/// Point-in-time view of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub state: ConditionState,
    /// Time spent in the current state
    pub dwell: Duration,
}

impl StateSnapshot {
    pub fn name(&self) -> StateName {
        self.state.name()
    }
}

struct Inner {
    state: ConditionState,
    since: Instant,
    changed_at: DateTime<Utc>,
}

pub struct Condition {
    name: String,
    checker: Arc<dyn Checker>,
    precondition: Arc<dyn Precondition>,
    check_interval: Duration,
    probe_timeout: Duration,
    thresholds: Thresholds,
    metrics: Arc<RebootMetrics>,
    inner: Mutex<Inner>,
}

impl Condition {
    pub fn new(
        checker: Arc<dyn Checker>,
        precondition: Arc<dyn Precondition>,
        settings: ConditionSettings,
        metrics: Arc<RebootMetrics>,
    ) -> ConfigResult<Self> {
        let name = checker.name().to_string();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName("checker"));
        }

        if settings.check_interval < MIN_CHECK_INTERVAL {
            return Err(ConfigError::IntervalTooShort(settings.check_interval));
        }
        if settings.check_interval > MAX_CHECK_INTERVAL {
            return Err(ConfigError::IntervalTooLong(settings.check_interval));
        }

        let probe_timeout = settings.probe_timeout.unwrap_or(settings.check_interval);
        if probe_timeout.is_zero() || probe_timeout > settings.check_interval {
            return Err(ConfigError::InvalidProbeTimeout {
                timeout: probe_timeout,
                interval: settings.check_interval,
            });
        }

        let thresholds = Thresholds::new(settings.streak_until_ok, settings.streak_until_reboot)?;

        metrics
            .condition_state
            .with_label_values(&[StateName::Initial.as_str(), &name])
            .set(1.0);

        Ok(Self {
            name,
            checker,
            precondition,
            check_interval: settings.check_interval,
            probe_timeout,
            thresholds,
            metrics,
            inner: Mutex::new(Inner {
                state: ConditionState::Initial,
                since: Instant::now(),
                changed_at: Utc::now(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Current state and how long it has been held
    pub fn current_state(&self) -> StateSnapshot {
        let inner = self.lock();
        StateSnapshot {
            state: inner.state,
            dwell: inner.since.elapsed(),
        }
    }

    /// Wall-clock time of the last full transition
    pub fn last_change(&self) -> DateTime<Utc> {
        self.lock().changed_at
    }

    pub fn success(&self) -> Option<StateChange> {
        self.apply(ProbeEvent::Success)
    }

    pub fn failure(&self) -> Option<StateChange> {
        self.apply(ProbeEvent::Failure)
    }

    pub fn error(&self, err: &anyhow::Error) -> Option<StateChange> {
        let change = self.apply(ProbeEvent::Error);
        if change.is_some() {
            error!("'{}' encountered error: {:#}", self.name, err);
        } else {
            debug!("'{}' still failing: {:#}", self.name, err);
        }
        change
    }

    fn apply(&self, event: ProbeEvent) -> Option<StateChange> {
        let mut inner = self.lock();
        let next = match transition(inner.state, event, self.thresholds) {
            Transition::Stay => return None,
            Transition::Count(next) => {
                inner.state = next;
                return None;
            }
            Transition::Enter(next) => next,
        };

        let from = inner.state.name();
        inner.state = next;
        inner.since = Instant::now();
        inner.changed_at = Utc::now();
        let at = inner.changed_at;
        drop(inner);

        info!(
            "Updating state for checker '{}' from '{}' -> '{}'",
            self.name,
            from,
            next.name()
        );
        self.metrics.record_transition(&self.name, from, next.name());

        Some(StateChange {
            condition: self.name.clone(),
            from,
            to: next.name(),
            at,
        })
    }

    /// Run one scheduled probe, honoring the precondition and the probe timeout
    pub async fn check(&self, cancel: &CancellationToken) -> Option<StateChange> {
        self.metrics.record_check(&self.name);

        if !self.precondition.allowed() {
            debug!("Precondition not met, not invoking checker {}", self.name);
            return None;
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return None,
            outcome = timeout(self.probe_timeout, self.checker.is_healthy()) => outcome,
        };

        match outcome {
            Ok(Ok(true)) => self.success(),
            Ok(Ok(false)) => self.failure(),
            Ok(Err(e)) => self.error(&e),
            Err(_) => self.error(&anyhow::anyhow!(
                "checker did not answer within {:?}",
                self.probe_timeout
            )),
        }
    }

    /// Probe immediately, then every `check_interval`, until cancelled
    pub async fn run(self: Arc<Self>, updates: mpsc::Sender<StateChange>, cancel: CancellationToken) {
        let thresholds = self.thresholds();
        debug!(
            "Condition '{}' probing every {}, ok after {}, reboot after {}",
            self.name,
            format_duration(self.check_interval()),
            thresholds.streak_until_ok(),
            thresholds.streak_until_reboot()
        );

        let mut ticker = interval(self.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(change) = self.check(&cancel).await {
                        publish(&updates, change);
                    }
                }
            }
        }

        debug!("Condition '{}' stopped", self.name);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent even if a holder panicked: every write is a
        // single assignment.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("check_interval", &self.check_interval)
            .field("probe_timeout", &self.probe_timeout)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

fn publish(updates: &mpsc::Sender<StateChange>, change: StateChange) {
    match updates.try_send(change) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(change)) => {
            debug!(
                "Evaluation already pending, dropping notification from '{}'",
                change.condition
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
