//! Reboot controller
//!
//! Owns every group task, receives their reboot requests and decides whether
//! the machine may actually be rebooted. The only gate is system uptime: a
//! freshly booted machine is never rebooted again, which stops reboot loops.
//! When the uptime cannot be read the gate stays open.

use crate::duration::format_duration;
use crate::error::{ConfigError, ConfigResult};
use crate::group::{Group, RebootRequest};
use crate::metrics::RebootMetrics;
use crate::ports::{Journal, JournalEntry, NoopJournal, Reboot, UptimeSource};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SAFE_MIN_UPTIME: Duration = Duration::from_secs(4 * 60 * 60);
pub const MIN_SAFE_MIN_UPTIME: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How a controller run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The reboot primitive succeeded on behalf of `group`
    Rebooted { group: String },
    /// Shutdown signal received; nothing was rebooted
    Interrupted,
    /// Every request sender went away
    Stopped,
}

pub struct RebootController {
    groups: Vec<Group>,
    requests: mpsc::Receiver<RebootRequest>,
    reboot: Arc<dyn Reboot>,
    uptime: Arc<dyn UptimeSource>,
    journal: Arc<dyn Journal>,
    metrics: Arc<RebootMetrics>,
    safe_min_uptime: Duration,
    grace_period: Duration,
    warned_unsafe: bool,
}

impl RebootController {
    pub fn new(
        groups: Vec<Group>,
        requests: mpsc::Receiver<RebootRequest>,
        reboot: Arc<dyn Reboot>,
        uptime: Arc<dyn UptimeSource>,
        metrics: Arc<RebootMetrics>,
    ) -> ConfigResult<Self> {
        if groups.is_empty() {
            return Err(ConfigError::NoGroups);
        }

        Ok(Self {
            groups,
            requests,
            reboot,
            uptime,
            journal: Arc::new(NoopJournal),
            metrics,
            safe_min_uptime: DEFAULT_SAFE_MIN_UPTIME,
            grace_period: DEFAULT_GRACE_PERIOD,
            warned_unsafe: false,
        })
    }

    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_safe_min_uptime(mut self, safe_min_uptime: Duration) -> ConfigResult<Self> {
        if safe_min_uptime < MIN_SAFE_MIN_UPTIME {
            return Err(ConfigError::UptimeThresholdTooLow(safe_min_uptime));
        }
        self.safe_min_uptime = safe_min_uptime;
        Ok(self)
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn safe_min_uptime(&self) -> Duration {
        self.safe_min_uptime
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Whether the machine has been up long enough to be rebooted
    pub fn is_safe_to_reboot(&self) -> bool {
        match self.uptime.uptime() {
            Ok(uptime) => {
                self.metrics
                    .system_uptime_seconds
                    .set(i64::try_from(uptime.as_secs()).unwrap_or(i64::MAX));
                uptime >= self.safe_min_uptime
            }
            Err(e) => {
                warn!("Could not read system uptime, assuming it is safe to reboot: {:#}", e);
                true
            }
        }
    }

    /// Run until a reboot succeeded or SIGINT/SIGTERM arrives
    pub async fn run(self) -> RunOutcome {
        self.run_until(shutdown_signal()).await
    }

    /// Run until a reboot succeeded or `shutdown` completes
    pub async fn run_until<F>(mut self, shutdown: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        info!(
            "Reboot controller running {} group(s), safe minimum uptime {}",
            self.groups().len(),
            format_duration(self.safe_min_uptime())
        );
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        for group in std::mem::take(&mut self.groups) {
            group.start(&mut tasks, &cancel);
        }

        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping without reboot");
                    break RunOutcome::Interrupted;
                }
                request = self.requests.recv() => match request {
                    Some(request) => {
                        if self.try_reboot(&request).await {
                            break RunOutcome::Rebooted { group: request.group };
                        }
                    }
                    None => {
                        warn!("No group can request a reboot anymore, stopping");
                        break RunOutcome::Stopped;
                    }
                },
            }
        };

        cancel.cancel();
        self.drain(&mut tasks).await;

        if matches!(outcome, RunOutcome::Rebooted { .. }) {
            // Give the system time to take us down before returning.
            sleep(self.grace_period).await;
        }
        outcome
    }

    /// Handle one request; true when the reboot primitive succeeded
    async fn try_reboot(&mut self, request: &RebootRequest) -> bool {
        info!("Group '{}' requested a reboot", request.group);
        self.metrics.record_reboot_request(&request.group);

        if !self.is_safe_to_reboot() {
            if self.warned_unsafe {
                debug!(
                    "Refusing reboot requested by '{}', uptime below {}",
                    request.group,
                    format_duration(self.safe_min_uptime)
                );
            } else {
                warn!(
                    "Refusing reboot requested by '{}': uptime below {}, will retry on the next request",
                    request.group,
                    format_duration(self.safe_min_uptime)
                );
                self.warned_unsafe = true;
            }
            return false;
        }

        let entry = JournalEntry::reboot_requested(&request.group);
        if let Err(e) = self.journal.record(&entry).await {
            warn!("Could not write journal entry '{}': {:#}", entry, e);
        }

        info!("Rebooting on behalf of group '{}'", request.group);
        match self.reboot.reboot().await {
            Ok(()) => true,
            Err(e) => {
                error!("Reboot failed: {:#}", e);
                self.metrics.record_invocation_error();
                false
            }
        }
    }

    async fn drain(&self, tasks: &mut JoinSet<()>) {
        let joined = timeout(self.grace_period, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!("Task panicked: {}", e);
                    }
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                "{} task(s) did not stop within {:?}, aborting",
                tasks.len(),
                self.grace_period
            );
            tasks.abort_all();
        }
    }
}

impl std::fmt::Debug for RebootController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebootController")
            .field("groups", &self.groups.len())
            .field("safe_min_uptime", &self.safe_min_uptime)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
