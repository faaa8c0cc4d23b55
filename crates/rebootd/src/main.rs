//! rebootd - Conditional reboot daemon
//!
//! Watches reboot conditions and reboots the machine when its groups agree.

use anyhow::{bail, Context, Result};
use clap::Parser;
use reboot_common::{Reboot, RebootMetrics, RunOutcome};
use rebootd::metrics_server::{bind, run_heartbeat, run_textfile_dumper, serve};
use rebootd::uptime::SystemUptime;
use rebootd::{wiring, Cli, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const VERIFY_REBOOT_DELAY: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    info!("rebootd v{} starting", VERSION);

    let reboot = wiring::build_reboot(cli.dry_run);
    if cli.verify_reboot {
        return verify_reboot(reboot).await;
    }

    run(cli, reboot).await
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn verify_reboot(reboot: Arc<dyn Reboot>) -> Result<()> {
    warn!("Verifying whether reboot works. This will (most likely) reboot your machine.");
    warn!("You have {:?} to abort by pressing CTRL+C.", VERIFY_REBOOT_DELAY);
    tokio::time::sleep(VERIFY_REBOOT_DELAY).await;

    reboot.reboot().await.context("Reboot returned error")?;
    bail!("Reboot apparently did not work as expected");
}

async fn run(cli: Cli, reboot: Arc<dyn Reboot>) -> Result<()> {
    let config = Config::load(&cli.config)?;
    config.log_summary();

    let metrics = Arc::new(RebootMetrics::new().context("Failed to register metrics")?);
    metrics.record_start(VERSION);

    let controller = wiring::build_controller(&config, reboot, Arc::new(SystemUptime), metrics.clone())
        .context("Invalid configuration")?;

    let cancel = CancellationToken::new();
    let mut exporters = JoinSet::new();
    exporters.spawn(run_heartbeat(metrics.clone(), cancel.clone()));

    if let Some(addr) = &config.metrics_listen_addr {
        let listener = bind(addr).await?;
        let (metrics, cancel) = (metrics.clone(), cancel.clone());
        exporters.spawn(async move {
            if let Err(e) = serve(listener, metrics, cancel).await {
                error!("{:#}", e);
            }
        });
    } else if let Some(dir) = &config.metrics_dir {
        exporters.spawn(run_textfile_dumper(dir.clone(), metrics.clone(), cancel.clone()));
    } else {
        warn!("Neither metrics server nor metrics dumping configured");
    }

    info!("Starting conditions...");
    let outcome = controller.run().await;

    cancel.cancel();
    while exporters.join_next().await.is_some() {}

    match outcome {
        RunOutcome::Rebooted { group } => {
            info!("Reboot issued on behalf of group '{}'", group);
            Ok(())
        }
        RunOutcome::Interrupted => {
            info!("Shutting down gracefully");
            Ok(())
        }
        RunOutcome::Stopped => bail!("All groups stopped unexpectedly"),
    }
}
