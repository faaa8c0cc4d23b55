//! Build the runtime object graph from configuration
//!
//! Every kind-based choice (checker, precondition, evaluator, reboot
//! primitive, journal) is made here, once. Value validation is left to the
//! core constructors; errors are wrapped with the group/condition they came
//! from.

use crate::checkers::{build_checker, parse_args};
use crate::client_pool::ClientPool;
use crate::config::{ConditionConfig, Config, GroupConfig};
use crate::journal::FileJournal;
use crate::reboot::{DryRunReboot, SystemctlReboot};
use anyhow::{bail, Context, Result};
use reboot_common::{
    parse_duration, AlwaysPrecondition, Condition, ConditionSettings, Group, Journal,
    NoopJournal, Precondition, Reboot, RebootController, RebootMetrics, RebootRequest,
    StateEvaluator, TimeWindowPrecondition, UptimeSource, WantedStates,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const ALWAYS_PRECONDITION: &str = "always";
pub const TIME_WINDOW_PRECONDITION: &str = "time_window";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindowArgs {
    pub from: u32,
    pub to: u32,
}

pub fn build_precondition(kind: Option<&str>, args: &toml::Table) -> Result<Arc<dyn Precondition>> {
    let precondition: Arc<dyn Precondition> = match kind.unwrap_or(ALWAYS_PRECONDITION) {
        ALWAYS_PRECONDITION => Arc::new(AlwaysPrecondition),
        TIME_WINDOW_PRECONDITION => {
            let window: TimeWindowArgs = parse_args(TIME_WINDOW_PRECONDITION, args)?;
            Arc::new(TimeWindowPrecondition::new(window.from, window.to)?)
        }
        other => bail!(
            "Unknown precondition '{}', expected '{}' or '{}'",
            other,
            ALWAYS_PRECONDITION,
            TIME_WINDOW_PRECONDITION
        ),
    };
    Ok(precondition)
}

pub fn build_condition(
    config: &ConditionConfig,
    pool: &ClientPool,
    metrics: &Arc<RebootMetrics>,
) -> Result<Arc<Condition>> {
    let checker = build_checker(&config.checker, &config.checker_args, pool)?;
    let precondition = build_precondition(config.precondition.as_deref(), &config.precondition_args)?;

    let mut settings = ConditionSettings::new(
        parse_duration(&config.check_interval).context("Invalid 'check_interval'")?,
        config.streak_until_ok,
        config.streak_until_reboot,
    );
    settings.probe_timeout = config
        .probe_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()
        .context("Invalid 'probe_timeout'")?;

    let condition = Condition::new(checker, precondition, settings, metrics.clone())?;
    Ok(Arc::new(condition))
}

pub fn build_evaluator(config: &GroupConfig) -> Result<StateEvaluator> {
    let wants = WantedStates::parse(&config.wanted_states).context("Invalid 'wanted_states'")?;
    Ok(StateEvaluator::from_kind(&config.evaluator, wants)?)
}

pub fn build_group(
    config: &GroupConfig,
    pool: &ClientPool,
    metrics: &Arc<RebootMetrics>,
    requests: mpsc::Sender<RebootRequest>,
) -> Result<Group> {
    let conditions = config
        .conditions
        .iter()
        .enumerate()
        .map(|(i, condition)| {
            build_condition(condition, pool, metrics).with_context(|| {
                format!("Condition #{} ('{}')", i + 1, condition.checker)
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let tick_interval = parse_duration(&config.tick_interval).context("Invalid 'tick_interval'")?;
    let group = Group::new(&config.name, conditions, build_evaluator(config)?, requests)?
        .with_tick_interval(tick_interval)?;
    Ok(group)
}

pub fn build_journal(config: &Config) -> Result<Arc<dyn Journal>> {
    match &config.journal_file {
        Some(path) => Ok(Arc::new(FileJournal::new(path)?)),
        None => Ok(Arc::new(NoopJournal)),
    }
}

pub fn build_reboot(dry_run: bool) -> Arc<dyn Reboot> {
    if dry_run {
        Arc::new(DryRunReboot)
    } else {
        Arc::new(SystemctlReboot)
    }
}

/// Assemble the controller and everything beneath it
pub fn build_controller(
    config: &Config,
    reboot: Arc<dyn Reboot>,
    uptime: Arc<dyn UptimeSource>,
    metrics: Arc<RebootMetrics>,
) -> Result<RebootController> {
    config.validate()?;

    // HTTP clients live as long as the checkers holding them.
    let pool = ClientPool::new();
    let (tx, rx) = mpsc::channel(config.groups.len().max(1));

    let groups = config
        .groups
        .iter()
        .map(|group| {
            build_group(group, &pool, &metrics, tx.clone())
                .with_context(|| format!("Could not build group '{}'", group.name))
        })
        .collect::<Result<Vec<_>>>()?;
    drop(tx);

    let controller = RebootController::new(groups, rx, reboot, uptime, metrics)?
        .with_safe_min_uptime(config.safe_min_uptime()?)?
        .with_journal(build_journal(config)?);
    Ok(controller)
}
