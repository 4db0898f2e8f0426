//! TCP reachability probe.
//!
//! Parameters:
//! - `host` (required)
//! - `port` (required)
//! - `timeout_ms` (optional, default 5000)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::{Probe, ProbeOutcome};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;

pub struct TcpConnect;

#[async_trait]
impl Probe for TcpConnect {
    fn name(&self) -> &'static str {
        "tcp_connect"
    }

    async fn run(&self, params: &serde_json::Value, _run_id: i64) -> ProbeOutcome {
        let Some(host) = params.get("host").and_then(|v| v.as_str()) else {
            return ProbeOutcome::error("missing 'host' parameter");
        };
        let Some(port) = params.get("port").and_then(|v| v.as_u64()) else {
            return ProbeOutcome::error("missing 'port' parameter");
        };
        if port == 0 || port > u64::from(u16::MAX) {
            return ProbeOutcome::error(format!("port {port} out of range"));
        }
        let timeout_ms = params
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let address = format!("{host}:{port}");
        let started = Instant::now();
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(Ok(_stream)) => ProbeOutcome::success(serde_json::json!({
                "connect_ms": started.elapsed().as_millis() as u64,
            })),
            Ok(Err(e)) => ProbeOutcome::error(format!("connect to {address} failed: {e}")),
            Err(_) => ProbeOutcome::error(format!("connect to {address} timed out after {timeout_ms}ms")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultStatus;

    #[tokio::test]
    async fn connects_to_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let params = serde_json::json!({ "host": "127.0.0.1", "port": port });
        let outcome = TcpConnect.run(&params, 1).await;
        assert_eq!(outcome.status, ResultStatus::Success);
        assert!(outcome.data["connect_ms"].is_u64());
    }

    #[tokio::test]
    async fn missing_host_is_an_error() {
        let outcome = TcpConnect.run(&serde_json::json!({ "port": 80 }), 1).await;
        assert_eq!(outcome.status, ResultStatus::Error);
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let params = serde_json::json!({ "host": "127.0.0.1", "port": port, "timeout_ms": 2000 });
        let outcome = TcpConnect.run(&params, 1).await;
        assert_eq!(outcome.status, ResultStatus::Error);
    }
}
