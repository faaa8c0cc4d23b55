//! Concrete checkers
//!
//! Each checker answers one question about the machine: does it need a
//! reboot? "Healthy" means no. The kind is picked once, at wiring time, from
//! the `checker` field of a condition; its options come from `checker_args`.

pub mod dns;
pub mod file;
pub mod needrestart;
pub mod prometheus;
pub mod tcp;

use crate::client_pool::ClientPool;
use anyhow::{bail, Context, Result};
use reboot_common::Checker;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub use dns::DnsChecker;
pub use file::FileChecker;
pub use needrestart::NeedrestartChecker;
pub use prometheus::PrometheusChecker;
pub use tcp::TcpChecker;

/// Known checker kinds
pub const CHECKER_KINDS: [&str; 5] = [
    needrestart::NEEDRESTART_CHECKER,
    file::FILE_CHECKER,
    dns::DNS_CHECKER,
    tcp::TCP_CHECKER,
    prometheus::PROMETHEUS_CHECKER,
];

/// Build the checker named `kind` from its arguments
pub fn build_checker(kind: &str, args: &toml::Table, pool: &ClientPool) -> Result<Arc<dyn Checker>> {
    let checker: Arc<dyn Checker> = match kind {
        needrestart::NEEDRESTART_CHECKER => Arc::new(NeedrestartChecker::from_args(parse_args(kind, args)?)?),
        file::FILE_CHECKER => Arc::new(FileChecker::from_args(parse_args(kind, args)?)),
        dns::DNS_CHECKER => Arc::new(DnsChecker::from_args(parse_args(kind, args)?)?),
        tcp::TCP_CHECKER => Arc::new(TcpChecker::from_args(parse_args(kind, args)?)?),
        prometheus::PROMETHEUS_CHECKER => {
            Arc::new(PrometheusChecker::from_args(parse_args(kind, args)?, pool)?)
        }
        other => bail!(
            "Unknown checker '{}', expected one of: {}",
            other,
            CHECKER_KINDS.join(", ")
        ),
    };
    Ok(checker)
}

/// Decode a `*_args` table into the typed options of `kind`
pub fn parse_args<T: DeserializeOwned>(kind: &str, args: &toml::Table) -> Result<T> {
    toml::Value::Table(args.clone())
        .try_into()
        .with_context(|| format!("Invalid arguments for '{}'", kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(toml_str: &str) -> toml::Table {
        toml_str.parse().unwrap()
    }

    #[test]
    fn test_builds_every_kind() {
        let pool = ClientPool::new();
        let cases = [
            ("needrestart", ""),
            ("file", "path = \"/run/reboot-required\""),
            ("dns", "host = \"localhost\""),
            ("tcp", "address = \"127.0.0.1:22\""),
            ("prometheus", "name = \"alerts\"\naddress = \"http://prom:9090\"\n[queries]\nfiring = \"ALERTS\""),
        ];
        for (kind, args) in cases {
            let checker = build_checker(kind, &table(args), &pool).unwrap();
            assert!(checker.name().starts_with(kind), "{} -> {}", kind, checker.name());
        }
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_unknown_kind_and_bad_args() {
        let pool = ClientPool::new();
        let err = build_checker("kafka", &toml::Table::new(), &pool).err().unwrap();
        assert!(err.to_string().contains("Unknown checker 'kafka'"));

        let err = build_checker("needrestart", &table("min_ksta = \"two\""), &pool)
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("Invalid arguments for 'needrestart'"));
    }
}
