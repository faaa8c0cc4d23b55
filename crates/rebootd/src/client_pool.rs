//! Shared HTTP clients for query checkers
//!
//! Checkers that talk to the same endpoint with the same client certificate
//! share one `reqwest::Client` (and with it one connection pool). The pool is
//! created by the wiring code and handed to checker constructors.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
    pub max_attempts: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 250,
            factor: 2.0,
            max_ms: 2000,
            max_attempts: 4,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt + 1`
    pub fn calculate_backoff(&self, attempt: usize) -> Duration {
        let backoff = (self.base_ms as f64 * self.factor.powi(attempt as i32)).min(self.max_ms as f64);
        Duration::from_millis(backoff as u64)
    }
}

/// Identity of a pooled client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub address: String,
    pub tls_client_cert: Option<PathBuf>,
    pub tls_client_key: Option<PathBuf>,
}

impl ClientKey {
    pub fn plain(address: &str) -> Self {
        Self {
            address: address.trim_end_matches('/').to_string(),
            tls_client_cert: None,
            tls_client_key: None,
        }
    }
}

/// HTTP client bound to one base address, retrying transient failures
#[derive(Debug, Clone)]
pub struct HttpClient {
    base: String,
    client: reqwest::Client,
    backoff: BackoffConfig,
}

impl HttpClient {
    pub fn base(&self) -> &str {
        &self.base
    }

    /// GET `<base><path>` with query parameters and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base, path);

        for attempt in 0..self.backoff.max_attempts {
            let last = attempt + 1 == self.backoff.max_attempts;
            match self.client.get(&url).query(query).send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .with_context(|| format!("Failed to decode response from {}", url));
                }
                Ok(response) if response.status().is_client_error() || last => {
                    return Err(anyhow!("{} returned {}", url, response.status()));
                }
                Ok(response) => {
                    warn!("{} returned {}, retrying...", url, response.status());
                }
                Err(e) if last || !is_retryable(&e) => {
                    return Err(anyhow!("Request to {} failed: {}", url, e));
                }
                Err(e) => {
                    warn!("Error contacting {}: {}, retrying...", url, e);
                }
            }

            let backoff = self.backoff.calculate_backoff(attempt);
            debug!("Backing off for {:?} before retry", backoff);
            sleep(backoff).await;
        }

        Err(anyhow!("Failed to contact {} after {} attempts", url, self.backoff.max_attempts))
    }
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.status().map(|s| s.is_server_error()).unwrap_or(false)
}

/// One client per distinct [`ClientKey`]
#[derive(Debug, Default)]
pub struct ClientPool {
    clients: Mutex<HashMap<ClientKey, HttpClient>>,
    backoff: BackoffConfig,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backoff(backoff: BackoffConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            backoff,
        }
    }

    /// Return the client for `key`, building it on first use
    pub fn client(&self, key: &ClientKey) -> Result<HttpClient> {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(key) {
            return Ok(client.clone());
        }

        let client = HttpClient {
            base: key.address.trim_end_matches('/').to_string(),
            client: build_client(key)?,
            backoff: self.backoff.clone(),
        };
        clients.insert(key.clone(), client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_client(key: &ClientKey) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);

    let builder = match (&key.tls_client_cert, &key.tls_client_key) {
        (Some(cert), Some(tls_key)) => {
            let mut identity_pem = std::fs::read(cert)
                .with_context(|| format!("Failed to read client cert: {}", cert.display()))?;
            let key_pem = std::fs::read(tls_key)
                .with_context(|| format!("Failed to read client key: {}", tls_key.display()))?;
            identity_pem.extend_from_slice(&key_pem);

            let identity = reqwest::Identity::from_pem(&identity_pem)
                .context("Failed to create client identity")?;
            info!("Using client certificate {} for {}", cert.display(), key.address);
            builder.identity(identity)
        }
        (None, None) => builder,
        _ => {
            return Err(anyhow!(
                "'tls_client_cert' and 'tls_client_key' must be given together for {}",
                key.address
            ))
        }
    };

    builder
        .build()
        .with_context(|| format!("Failed to build HTTP client for {}", key.address))
}
