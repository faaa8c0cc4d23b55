//! CLI - Command-line argument parsing

use crate::config::CONFIG_PATH;
use clap::Parser;
use std::path::PathBuf;

/// Conditional reboot daemon
#[derive(Debug, Parser)]
#[command(name = "rebootd")]
#[command(about = "Reboots the machine once configured conditions say it needs one", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Read configuration from this file
    #[arg(long, default_value = CONFIG_PATH)]
    pub config: PathBuf,

    /// Print debug statements
    #[arg(long)]
    pub debug: bool,

    /// Never reboot, only log what would happen
    #[arg(long, conflicts_with = "verify_reboot")]
    pub dry_run: bool,

    /// Test the reboot primitive. CAUTION: this will try to reboot the machine
    #[arg(long)]
    pub verify_reboot: bool,
}
