//! Reboot primitives
//!
//! `systemctl reboot`, through sudo unless the daemon already runs as root,
//! and a dry-run variant that only logs.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reboot_common::Reboot;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Reboots via systemd
#[derive(Debug, Default)]
pub struct SystemctlReboot;

impl SystemctlReboot {
    /// Program and arguments to run for the given privilege level
    fn command_line(root: bool) -> (&'static str, Vec<&'static str>) {
        if root {
            ("systemctl", vec!["reboot"])
        } else {
            ("sudo", vec!["-n", "systemctl", "reboot"])
        }
    }
}

#[async_trait]
impl Reboot for SystemctlReboot {
    async fn reboot(&self) -> Result<()> {
        let root = is_root();
        if root {
            info!("Running as root, attempting direct reboot...");
        } else {
            info!("Not running as root, rebooting system via sudo...");
        }

        let (program, args) = Self::command_line(root);
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", program))?;

        if !output.status.success() {
            bail!(
                "{} {} exited with {}: {}",
                program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Logs instead of rebooting
#[derive(Debug, Default)]
pub struct DryRunReboot;

#[async_trait]
impl Reboot for DryRunReboot {
    async fn reboot(&self) -> Result<()> {
        warn!("[DRY RUN] Would reboot the system now");
        Ok(())
    }
}

fn is_root() -> bool {
    #[cfg(unix)]
    {
        use nix::unistd::Uid;
        Uid::effective().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}
