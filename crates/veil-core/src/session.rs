//! Connection Session
//!
//! One live tunnel: the server it was established against, when it came
//! up, and how much traffic has crossed it.

use crate::server::VpnServer;
use std::time::Duration;
use tokio::time::Instant;

/// A live tunnel.
///
/// Owned by the session manager; callers only ever receive copies.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    /// Server the tunnel was established against
    server: VpnServer,
    /// When the tunnel came up
    start_time: Instant,
    /// Bytes sent through the tunnel
    bytes_sent: u64,
    /// Bytes received through the tunnel
    bytes_received: u64,
}

impl ConnectionSession {
    /// Start a session now with zeroed counters
    pub(crate) fn start(server: VpnServer) -> Self {
        Self {
            server,
            start_time: Instant::now(),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Server the tunnel was established against
    pub fn server(&self) -> &VpnServer {
        &self.server
    }

    /// When the tunnel came up
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Time since the tunnel came up
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Bytes sent
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Accumulate traffic. Counters saturate instead of wrapping.
    pub(crate) fn record_traffic(&mut self, sent: u64, received: u64) {
        self.bytes_sent = self.bytes_sent.saturating_add(sent);
        self.bytes_received = self.bytes_received.saturating_add(received);
    }
}

/// Format a byte count, e.g. "1.50 MB"
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.2} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Format whole seconds as "HH:MM:SS"
pub fn format_elapsed(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::TransportProtocol;

    fn session() -> ConnectionSession {
        ConnectionSession::start(VpnServer::new(
            "sg-1",
            "Singapore",
            "SG",
            "10.0.0.1",
            TransportProtocol::WireGuard,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed() {
        let session = session();
        assert_eq!(session.elapsed(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(session.elapsed().as_secs(), 90);
    }

    #[tokio::test]
    async fn test_traffic_accumulates() {
        let mut session = session();
        session.record_traffic(1000, 2000);
        session.record_traffic(500, 500);

        assert_eq!(session.bytes_sent(), 1500);
        assert_eq!(session.bytes_received(), 2500);
    }

    #[tokio::test]
    async fn test_traffic_saturates() {
        let mut session = session();
        session.record_traffic(u64::MAX, 1);
        session.record_traffic(10, 1);

        assert_eq!(session.bytes_sent(), u64::MAX);
        assert_eq!(session.bytes_received(), 2);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 / 2), "1.50 MB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3725), "01:02:05");
    }
}
