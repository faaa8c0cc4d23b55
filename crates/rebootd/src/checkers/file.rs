//! Marker file checker
//!
//! Debian and Ubuntu drop `/var/run/reboot-required` when an installed
//! package wants a reboot. Unhealthy while the file exists.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reboot_common::Checker;
use serde::Deserialize;
use std::path::PathBuf;

pub const FILE_CHECKER: &str = "file";
pub const DEFAULT_MARKER: &str = "/var/run/reboot-required";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileArgs {
    #[serde(default = "default_path")]
    pub path: PathBuf,
}

fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_MARKER)
}

#[derive(Debug)]
pub struct FileChecker {
    name: String,
    path: PathBuf,
}

impl FileChecker {
    pub fn from_args(args: FileArgs) -> Self {
        Self {
            name: format!("{} - {}", FILE_CHECKER, args.path.display()),
            path: args.path,
        }
    }
}

#[async_trait]
impl Checker for FileChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_healthy(&self) -> Result<bool> {
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .with_context(|| format!("Failed to stat {}", self.path.display()))?;
        Ok(!exists)
    }
}
