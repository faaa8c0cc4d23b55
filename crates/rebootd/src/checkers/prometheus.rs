//! Prometheus query checker
//!
//! Runs each configured instant query against `<address>/api/v1/query`.
//! With `want_response = true` (default) the checker is healthy when every
//! query returns at least one sample; with `false`, when every query returns
//! none. Typical use: `ALERTS{alertname="RebootRequired"}` with
//! `want_response = false`.

use crate::client_pool::{ClientKey, ClientPool, HttpClient};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reboot_common::Checker;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const PROMETHEUS_CHECKER: &str = "prometheus";
const QUERY_PATH: &str = "/api/v1/query";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusArgs {
    pub name: String,
    pub address: String,

    /// Query name -> PromQL
    pub queries: BTreeMap<String, String>,

    #[serde(default = "default_want_response", alias = "wantResponse")]
    pub want_response: bool,

    #[serde(default)]
    pub tls_client_cert: Option<PathBuf>,

    #[serde(default)]
    pub tls_client_key: Option<PathBuf>,
}

fn default_want_response() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: Vec<serde_json::Value>,
}

#[derive(Debug)]
pub struct PrometheusChecker {
    name: String,
    client: HttpClient,
    queries: BTreeMap<String, String>,
    want_response: bool,
}

impl PrometheusChecker {
    pub fn from_args(args: PrometheusArgs, pool: &ClientPool) -> Result<Self> {
        if args.name.trim().is_empty() {
            bail!("No 'name' supplied");
        }
        if args.address.trim().is_empty() {
            bail!("Empty 'address' supplied");
        }
        if args.queries.is_empty() {
            bail!("No 'queries' supplied");
        }

        let key = ClientKey {
            address: args.address.trim_end_matches('/').to_string(),
            tls_client_cert: args.tls_client_cert,
            tls_client_key: args.tls_client_key,
        };
        let client = pool
            .client(&key)
            .context("Could not build prometheus client")?;

        Ok(Self {
            name: format!("{} - {}", PROMETHEUS_CHECKER, args.name),
            client,
            queries: args.queries,
            want_response: args.want_response,
        })
    }

    /// Number of samples the query returned
    async fn query(&self, name: &str, query: &str) -> Result<usize> {
        let response: QueryResponse = self.client.get_json(QUERY_PATH, &[("query", query)]).await?;

        for warning in &response.warnings {
            warn!("Warning for query '{}': {}", name, warning);
        }

        if response.status != "success" {
            bail!(
                "status '{}': {}",
                response.status,
                response.error.unwrap_or_default()
            );
        }

        let data = response.data.context("response carries no data")?;
        if data.result_type != "vector" {
            bail!("expected a vector result, got '{}'", data.result_type);
        }
        Ok(data.result.len())
    }

    fn evaluate_response(&self, samples: usize) -> bool {
        if self.want_response {
            samples > 0
        } else {
            samples == 0
        }
    }
}

#[async_trait]
impl Checker for PrometheusChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_healthy(&self) -> Result<bool> {
        for (name, query) in &self.queries {
            let samples = self
                .query(name, query)
                .await
                .with_context(|| format!("Query '{}' returned error", name))?;
            debug!("Query '{}' returned {} sample(s)", name, samples);

            if !self.evaluate_response(samples) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
