//! Groups: conditions that share one evaluator
//!
//! A group owns its conditions' probing loops and a supervisory loop. The
//! supervisory loop re-evaluates whenever a condition changes state and on a
//! periodic tick, so dwell-time requirements are met even when nothing
//! changes. A positive verdict becomes a [`RebootRequest`] for the controller.

use crate::condition::{Condition, StateChange};
use crate::error::{ConfigError, ConfigResult};
use crate::evaluator::StateEvaluator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);

/// A group asking the controller to reboot the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootRequest {
    pub group: String,
    pub requested_at: DateTime<Utc>,
}

impl RebootRequest {
    pub fn now(group: &str) -> Self {
        Self {
            group: group.to_string(),
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct Group {
    name: String,
    conditions: Vec<Arc<Condition>>,
    evaluator: StateEvaluator,
    requests: mpsc::Sender<RebootRequest>,
    tick_interval: Duration,
}

impl Group {
    pub fn new(
        name: &str,
        conditions: Vec<Arc<Condition>>,
        evaluator: StateEvaluator,
        requests: mpsc::Sender<RebootRequest>,
    ) -> ConfigResult<Self> {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName("group"));
        }
        if conditions.is_empty() {
            return Err(ConfigError::NoConditions(name.to_string()));
        }
        if requests.is_closed() {
            return Err(ConfigError::ClosedChannel);
        }

        Ok(Self {
            name: name.to_string(),
            conditions,
            evaluator,
            requests,
            tick_interval: DEFAULT_TICK_INTERVAL,
        })
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> ConfigResult<Self> {
        if tick_interval.is_zero() {
            return Err(ConfigError::IntervalTooShort(tick_interval));
        }
        self.tick_interval = tick_interval;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conditions(&self) -> &[Arc<Condition>] {
        &self.conditions
    }

    pub fn evaluator(&self) -> &StateEvaluator {
        &self.evaluator
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Current verdict of the evaluator over live condition state
    pub fn evaluate(&self) -> bool {
        self.evaluator.should_reboot(&self.conditions)
    }

    /// Spawn the probing loops and the supervisory loop into `tasks`
    pub fn start(self, tasks: &mut JoinSet<()>, cancel: &CancellationToken) {
        let (updates_tx, updates_rx) = mpsc::channel(self.conditions().len());

        for condition in self.conditions() {
            tasks.spawn(condition.clone().run(updates_tx.clone(), cancel.clone()));
        }
        drop(updates_tx);

        info!(
            "Starting group '{}' with {} condition(s), evaluator '{}' wanting {}",
            self.name,
            self.conditions().len(),
            self.evaluator().kind(),
            self.evaluator().wanted_states()
        );
        tasks.spawn(self.supervise(updates_rx, cancel.clone()));
    }

    async fn supervise(self, mut updates: mpsc::Receiver<StateChange>, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(change) = updates.recv() => {
                    debug!(
                        "Group '{}' notified: '{}' {} -> {}",
                        self.name, change.condition, change.from, change.to
                    );
                }
                _ = ticker.tick() => {}
            }

            if !self.evaluate() {
                continue;
            }

            match self.requests.try_send(RebootRequest::now(&self.name)) {
                Ok(()) => info!("Group '{}' requests a reboot", self.name),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Reboot request already pending, group '{}'", self.name);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("Reboot controller gone, stopping group '{}'", self.name);
                    break;
                }
            }
        }

        debug!("Group '{}' stopped", self.name);
    }
}
