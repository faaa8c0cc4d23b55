//! TCP reachability checker
//!
//! Healthy when connecting to `address` succeeds (or, with
//! `want_reachable = false`, when it fails). A connection that does not
//! complete within `timeout` counts as unreachable.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reboot_common::{parse_duration, Checker};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub const TCP_CHECKER: &str = "tcp";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpArgs {
    /// `host:port`
    pub address: String,

    #[serde(default = "default_timeout")]
    pub timeout: String,

    #[serde(default = "default_want_reachable")]
    pub want_reachable: bool,
}

fn default_timeout() -> String {
    "5s".to_string()
}

fn default_want_reachable() -> bool {
    true
}

#[derive(Debug)]
pub struct TcpChecker {
    name: String,
    address: String,
    timeout: Duration,
    want_reachable: bool,
}

impl TcpChecker {
    pub fn from_args(args: TcpArgs) -> Result<Self> {
        if args.address.trim().is_empty() {
            bail!("Empty 'address' supplied");
        }
        let connect_timeout = parse_duration(&args.timeout)?;
        if connect_timeout.is_zero() {
            bail!("'timeout' must be positive");
        }

        Ok(Self {
            name: format!("{} - {}", TCP_CHECKER, args.address),
            address: args.address,
            timeout: connect_timeout,
            want_reachable: args.want_reachable,
        })
    }

    async fn reachable(&self) -> bool {
        match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("{} unreachable: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!("{} did not answer within {:?}", self.address, self.timeout);
                false
            }
        }
    }
}

#[async_trait]
impl Checker for TcpChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_healthy(&self) -> Result<bool> {
        Ok(self.reachable().await == self.want_reachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn args(address: &str, want_reachable: bool) -> TcpArgs {
        TcpArgs {
            address: address.to_string(),
            timeout: "1s".to_string(),
            want_reachable,
        }
    }

    #[tokio::test]
    async fn test_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        assert!(TcpChecker::from_args(args(&addr, true)).unwrap().is_healthy().await.unwrap());
        assert!(!TcpChecker::from_args(args(&addr, false)).unwrap().is_healthy().await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(!TcpChecker::from_args(args(&addr, true)).unwrap().is_healthy().await.unwrap());
        assert!(TcpChecker::from_args(args(&addr, false)).unwrap().is_healthy().await.unwrap());
    }

    #[test]
    fn test_rejects_bad_args() {
        assert!(TcpChecker::from_args(args(" ", true)).is_err());
        let mut bad = args("127.0.0.1:22", true);
        bad.timeout = "0s".to_string();
        assert!(TcpChecker::from_args(bad).is_err());
    }
}
