//! DNS resolution checker
//!
//! Healthy when `host` resolves to at least one address (or, with
//! `want_resolvable = false`, when it does not). A lookup that does not
//! finish within `timeout` counts as unresolvable.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reboot_common::{parse_duration, Checker};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::debug;

pub const DNS_CHECKER: &str = "dns";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsArgs {
    pub host: String,

    #[serde(default = "default_timeout")]
    pub timeout: String,

    #[serde(default = "default_want_resolvable")]
    pub want_resolvable: bool,
}

fn default_timeout() -> String {
    "5s".to_string()
}

fn default_want_resolvable() -> bool {
    true
}

#[derive(Debug)]
pub struct DnsChecker {
    name: String,
    host: String,
    timeout: Duration,
    want_resolvable: bool,
}

impl DnsChecker {
    pub fn from_args(args: DnsArgs) -> Result<Self> {
        let host = args.host.trim();
        if host.is_empty() {
            bail!("Empty 'host' supplied");
        }
        let lookup_timeout = parse_duration(&args.timeout)?;
        if lookup_timeout.is_zero() {
            bail!("'timeout' must be positive");
        }

        Ok(Self {
            name: format!("{} - {}", DNS_CHECKER, host),
            host: host.to_string(),
            timeout: lookup_timeout,
            want_resolvable: args.want_resolvable,
        })
    }

    async fn resolvable(&self) -> bool {
        // Port 0: only the host part is resolved.
        match timeout(self.timeout, lookup_host((self.host.as_str(), 0))).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                debug!("{} did not resolve: {}", self.host, e);
                false
            }
            Err(_) => {
                debug!("{} did not resolve within {:?}", self.host, self.timeout);
                false
            }
        }
    }
}

#[async_trait]
impl Checker for DnsChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_healthy(&self) -> Result<bool> {
        Ok(self.resolvable().await == self.want_resolvable)
    }
}
