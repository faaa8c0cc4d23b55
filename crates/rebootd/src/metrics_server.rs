//! Metrics exposition
//!
//! Either an HTTP endpoint (`GET /metrics`) or a node_exporter textfile
//! (`<dir>/rebootd.prom`, rewritten every minute). A heartbeat gauge is
//! refreshed on the same period so stale exports are easy to alert on.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use reboot_common::RebootMetrics;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

pub const TEXTFILE_NAME: &str = "rebootd.prom";
pub const DUMP_INTERVAL: Duration = Duration::from_secs(60);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

type MetricsState = Arc<RebootMetrics>;

pub fn router(metrics: MetricsState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
        .layer(TraceLayer::new_for_http())
}

async fn metrics_handler(State(metrics): State<MetricsState>) -> impl IntoResponse {
    match metrics.export() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], body),
        Err(e) => {
            error!("Could not encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, TEXT_FORMAT)],
                e.to_string(),
            )
        }
    }
}

/// Bind the metrics listener; done before any task starts so a bad address
/// fails start-up
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid metrics address {}", addr))?;
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind metrics server to {}", addr))
}

/// Serve `/metrics` until cancelled
pub async fn serve(listener: TcpListener, metrics: MetricsState, cancel: CancellationToken) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Starting metrics server at http://{}/metrics", addr);
    }

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Metrics server failed")
}

/// Write the daemon's metrics to `path` atomically (temp file + rename)
pub fn write_textfile(path: &Path, metrics: &RebootMetrics) -> Result<()> {
    let body = metrics.export_own().context("Could not encode metrics")?;

    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
    Ok(())
}

/// Rewrite `<dir>/rebootd.prom` every minute until cancelled
pub async fn run_textfile_dumper(dir: PathBuf, metrics: MetricsState, cancel: CancellationToken) {
    let path = dir.join(TEXTFILE_NAME);
    info!("Dumping metrics to {}", path.display());

    let mut ticker = interval(DUMP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = write_textfile(&path, &metrics) {
                    error!("Could not dump metrics: {:#}", e);
                }
            }
        }
    }

    debug!("Metrics dumper stopped");
}

/// Refresh the heartbeat gauge every minute until cancelled
pub async fn run_heartbeat(metrics: MetricsState, cancel: CancellationToken) {
    let mut ticker = interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => metrics.heartbeat(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(RebootMetrics::new().unwrap());
        metrics.record_reboot_request("updates");

        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, metrics, cancel.clone()));

        let response = reqwest::get(format!("http://{}/metrics", addr)).await.unwrap();
        assert!(response.status().is_success());
        let body = response.text().await.unwrap();
        assert!(body.contains("rebootd_reboot_requests_total{group=\"updates\"} 1"));

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        assert!(bind("not an address").await.is_err());
    }

    #[test]
    fn test_write_textfile_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TEXTFILE_NAME);
        let metrics = RebootMetrics::new().unwrap();

        write_textfile(&path, &metrics).unwrap();
        metrics.record_invocation_error();
        write_textfile(&path, &metrics).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("rebootd_invocation_errors_total 1"));
        assert!(!dir.path().join("rebootd.prom.tmp").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_on_cancel() {
        let metrics = Arc::new(RebootMetrics::new().unwrap());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(metrics.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(metrics.heartbeat_timestamp.get() > 0.0);

        cancel.cancel();
        task.await.unwrap();
    }
}
