//! UDP liveness responder.
//!
//! Answers `version` datagrams with `1` and anything else with `N/A`.
//! Disabled unless both `responder.listen_ip` and `responder.listen_port`
//! are configured.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ConfigStore;

pub async fn run(config: Arc<ConfigStore>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let (Ok(ip), Ok(port)) = (
        config.ip("responder", "listen_ip"),
        config.port("responder", "listen_port"),
    ) else {
        warn!("UDP responder address is not configured, not running");
        return Ok(());
    };

    let socket = UdpSocket::bind((ip, port)).await?;
    info!(ip = %ip, port, "Starting UDP responder");

    let mut buf = [0u8; 1500];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = received?;
                let request = std::str::from_utf8(&buf[..len]).unwrap_or("").trim();
                let response: &[u8] = if request == "version" { b"1" } else { b"N/A" };
                if let Err(e) = socket.send_to(response, peer).await {
                    warn!(peer = %peer, error = %e, "Unable to answer a responder probe");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("UDP responder shutting down");
                    break;
                }
            }
        }
    }
    Ok(())
}
