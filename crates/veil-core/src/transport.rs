//! Tunnel Transport
//!
//! The seam between the session core and whatever actually moves packets.
//! The core only needs to ask a transport to bring a tunnel up for a given
//! server and to tear it down again; everything protocol-specific lives
//! behind [`TunnelTransport`].
//!
//! A [`SimulatedTransport`] is provided for the CLI and tests. It sleeps a
//! fixed delay and then replays scripted outcomes.

use crate::server::VpnServer;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("No network connectivity: {0}")]
    NoConnectivity(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Server error (code {code})")]
    Server { code: u16 },

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("Invalid certificate: {0}")]
    CertificateInvalid(String),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Establishes and tears down the actual tunnel.
///
/// Implementations must bound the duration of `connect` themselves and
/// report [`TransportError::Timeout`] when that bound is exceeded.
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    /// Bring a tunnel up to `server`
    async fn connect(&self, server: &VpnServer) -> Result<(), TransportError>;

    /// Tear the tunnel down.
    ///
    /// Must succeed when no tunnel is active.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Short-lived reachability check consulted before retrying timeouts
pub trait ConnectivityProbe: Send + Sync {
    /// Is the network reachable right now?
    fn is_reachable(&self) -> bool;
}

/// Probe that always reports the network as reachable
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

impl ConnectivityProbe for AlwaysReachable {
    fn is_reachable(&self) -> bool {
        true
    }
}

impl<F> ConnectivityProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_reachable(&self) -> bool {
        self()
    }
}

/// Fixed-delay stand-in for a real tunnel.
///
/// # Usage
///
/// ```rust,ignore
/// let transport = SimulatedTransport::new(Duration::from_millis(500));
/// transport.push_connect_result(Err(TransportError::Server { code: 503 }));
///
/// // First connect fails with 503, later ones succeed
/// ```
pub struct SimulatedTransport {
    /// Time spent in each connect
    connect_delay: Duration,
    /// Scripted connect outcomes, consumed front to back
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    /// Error returned by every disconnect
    disconnect_error: Mutex<Option<TransportError>>,
    /// Is a tunnel up?
    up: AtomicBool,
    /// Connect calls made
    connects: AtomicU64,
    /// Disconnect calls made
    disconnects: AtomicU64,
}

impl SimulatedTransport {
    /// Create a transport that succeeds after `connect_delay`
    pub fn new(connect_delay: Duration) -> Self {
        Self {
            connect_delay,
            script: Mutex::new(VecDeque::new()),
            disconnect_error: Mutex::new(None),
            up: AtomicBool::new(false),
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
        }
    }

    /// Create a transport that succeeds immediately
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Queue the outcome of a future connect.
    ///
    /// Once the queue is drained, connects succeed.
    pub fn push_connect_result(&self, result: Result<(), TransportError>) {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(result);
    }

    /// Make every disconnect report `error` (the tunnel still goes down)
    pub fn fail_disconnect_with(&self, error: TransportError) {
        *self.disconnect_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    /// Is a tunnel up?
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Number of connect calls
    pub fn connect_calls(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of disconnect calls
    pub fn disconnect_calls(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl TunnelTransport for SimulatedTransport {
    async fn connect(&self, server: &VpnServer) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated tunnel to {} ({})", server.endpoint(), server.protocol);

        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Ok(()));

        if outcome.is_ok() {
            self.up.store(true, Ordering::SeqCst);
            info!("Simulated tunnel up: {}", server.id);
        }
        outcome
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.up.store(false, Ordering::SeqCst);

        match self.disconnect_error.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
