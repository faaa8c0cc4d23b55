//! System uptime from sysinfo

use anyhow::{bail, Result};
use reboot_common::UptimeSource;
use std::time::Duration;
use sysinfo::System;

/// Uptime of the running kernel
#[derive(Debug, Default)]
pub struct SystemUptime;

impl UptimeSource for SystemUptime {
    fn uptime(&self) -> Result<Duration> {
        // sysinfo reports 0 when /proc/uptime (or its equivalent) is unreadable.
        let secs = System::uptime();
        if secs == 0 {
            bail!("system uptime unavailable");
        }
        Ok(Duration::from_secs(secs))
    }
}
