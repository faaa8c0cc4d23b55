//! needrestart checker
//!
//! Runs `needrestart -b` (batch mode) and looks at two of its lines:
//!
//! ```text
//! NEEDRESTART-KSTA: 3
//! NEEDRESTART-SVC: systemd-journald.service
//! ```
//!
//! `KSTA` is the kernel status: 0 unknown, 1 current, 2 ABI compatible
//! upgrade pending, 3 version upgrade pending. Any `SVC` line is a service
//! running outdated binaries.
//!
//! Once a reboot is detected the answer is cached: the condition can only
//! clear by actually rebooting.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reboot_common::Checker;
use regex::Regex;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tracing::{debug, error, info};

pub const NEEDRESTART_CHECKER: &str = "needrestart";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeedrestartArgs {
    /// Kernel status above this value means a reboot is needed (1 or 2)
    #[serde(default = "default_min_ksta")]
    pub min_ksta: u8,

    /// Whether outdated services alone require a reboot
    #[serde(default = "default_reboot_on_svc")]
    pub reboot_on_svc: bool,
}

fn default_min_ksta() -> u8 {
    1
}

fn default_reboot_on_svc() -> bool {
    true
}

impl Default for NeedrestartArgs {
    fn default() -> Self {
        Self {
            min_ksta: default_min_ksta(),
            reboot_on_svc: default_reboot_on_svc(),
        }
    }
}

/// Source of `needrestart -b` output
#[async_trait]
pub trait NeedrestartSource: Send + Sync {
    async fn output(&self) -> Result<String>;
}

/// Runs the real binary
pub struct NeedrestartCommand;

#[async_trait]
impl NeedrestartSource for NeedrestartCommand {
    async fn output(&self) -> Result<String> {
        let output = Command::new("needrestart")
            .arg("-b")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to run needrestart")?;

        if !output.status.success() {
            bail!(
                "needrestart exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// What one needrestart run reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Updates {
    pub kernel: bool,
    pub services: bool,
}

pub struct NeedrestartChecker {
    source: Box<dyn NeedrestartSource>,
    ksta: Regex,
    min_ksta: u8,
    reboot_on_svc: bool,
    reboot_needed: AtomicBool,
}

impl NeedrestartChecker {
    pub fn from_args(args: NeedrestartArgs) -> Result<Self> {
        Self::with_source(args, Box::new(NeedrestartCommand))
    }

    pub fn with_source(args: NeedrestartArgs, source: Box<dyn NeedrestartSource>) -> Result<Self> {
        if !(1..=2).contains(&args.min_ksta) {
            bail!("'min_ksta' must be 1 or 2, got {}", args.min_ksta);
        }

        Ok(Self {
            source,
            ksta: Regex::new(r"NEEDRESTART-KSTA:\s*(\d+)").context("Invalid KSTA pattern")?,
            min_ksta: args.min_ksta,
            reboot_on_svc: args.reboot_on_svc,
            reboot_needed: AtomicBool::new(false),
        })
    }

    /// Parse batch output
    pub fn detect_updates(&self, output: &str) -> Updates {
        let mut updates = Updates::default();

        if let Some(caps) = self.ksta.captures(output) {
            match caps[1].parse::<u8>() {
                Ok(ksta) if ksta > self.min_ksta => {
                    info!("Kernel update detected (KSTA {})", ksta);
                    updates.kernel = true;
                }
                Ok(ksta) => debug!("Kernel is current (KSTA {})", ksta),
                Err(e) => error!("Could not parse 'NEEDRESTART-KSTA': {}", e),
            }
        }

        if output.lines().any(|line| line.starts_with("NEEDRESTART-SVC:")) {
            info!("Service updates detected");
            updates.services = true;
        }

        updates
    }

    fn needs_reboot(&self, updates: Updates) -> bool {
        updates.kernel || (self.reboot_on_svc && updates.services)
    }
}

#[async_trait]
impl Checker for NeedrestartChecker {
    fn name(&self) -> &str {
        NEEDRESTART_CHECKER
    }

    async fn is_healthy(&self) -> Result<bool> {
        if self.reboot_needed.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let output = self.source.output().await?;
        let needed = self.needs_reboot(self.detect_updates(&output));
        if needed {
            self.reboot_needed.store(true, Ordering::SeqCst);
        }
        Ok(!needed)
    }
}
