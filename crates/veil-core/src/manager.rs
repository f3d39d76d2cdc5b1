//! Connection Session Manager
//!
//! Drives the connect/disconnect lifecycle against a [`TunnelTransport`]
//! and owns the single active [`ConnectionSession`].
//!
//! # State Machine
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                           Connecting --err--> Error --acknowledge--> Disconnected
//! Connected --disconnect--> Disconnecting --> Disconnected
//! Connected --transport failure--> Error
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let catalog = Arc::new(ServerCatalog::with_fallback());
//! let manager = ConnectionSessionManager::new(
//!     catalog,
//!     Arc::new(SimulatedTransport::default()),
//!     ResilienceController::with_defaults(),
//! );
//!
//! // Best server from the catalog
//! let session = manager.connect(None).await?;
//!
//! manager.update_traffic(1024, 4096);
//! println!("{}", manager.connection_summary());
//!
//! manager.disconnect().await?;
//! ```
//!
//! # Concurrency
//!
//! Status and session live behind one mutex. Every check-and-transition
//! happens inside a single critical section and the lock is never held
//! across an `.await`, so concurrent callers are rejected rather than
//! interleaved. Only `connect` and `disconnect` suspend.

use crate::catalog::ServerCatalog;
use crate::resilience::{ErrorClass, ResilienceController, RetryDecision};
use crate::server::VpnServer;
use crate::session::{format_bytes, format_elapsed, ConnectionSession};
use crate::transport::{TransportError, TunnelTransport};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No tunnel
    Disconnected,
    /// Connect in flight
    Connecting,
    /// Tunnel up
    Connected,
    /// Teardown in flight
    Disconnecting,
    /// Last connect or live tunnel failed
    Error(ErrorClass),
}

impl ConnectionStatus {
    /// Check if a tunnel is up
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Check if in an error state
    pub fn is_error(&self) -> bool {
        matches!(self, ConnectionStatus::Error(_))
    }

    /// Human status label
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Disconnecting => write!(f, "Disconnecting"),
            ConnectionStatus::Error(class) => write!(f, "Error: {}", class),
        }
    }
}

/// Session manager errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("No available servers")]
    NoAvailableServers,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection already in progress")]
    AlreadyInProgress,

    #[error("Cannot disconnect while a connect is in progress")]
    ConnectInProgress,

    #[error("Disconnect already in progress")]
    DisconnectInProgress,

    #[error("Connection failed ({class}): {source}")]
    Transport {
        class: ErrorClass,
        #[source]
        source: TransportError,
    },

    #[error("Fatal connection error ({class}): {source}")]
    Fatal {
        class: ErrorClass,
        #[source]
        source: TransportError,
    },
}

impl ConnectionError {
    /// Transport failure class, if this came from the transport
    pub fn error_class(&self) -> Option<ErrorClass> {
        match self {
            ConnectionError::Transport { class, .. } | ConnectionError::Fatal { class, .. } => {
                Some(*class)
            }
            _ => None,
        }
    }

    /// Must not be retried; surface to the user
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectionError::Fatal { .. })
    }

    /// Caller misuse (operation rejected by the state machine)
    pub fn is_guard(&self) -> bool {
        matches!(
            self,
            ConnectionError::AlreadyConnected
                | ConnectionError::AlreadyInProgress
                | ConnectionError::ConnectInProgress
                | ConnectionError::DisconnectInProgress
        )
    }
}

/// Snapshot of the manager for display
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSummary {
    /// Is a tunnel up?
    pub is_connected: bool,
    /// Human status label
    pub status_label: String,
    /// Server descriptor, empty without a session
    pub server: String,
    /// Whole seconds since the tunnel came up
    pub elapsed_seconds: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Average download rate (KB/s)
    pub download_kbps: f64,
    /// Average upload rate (KB/s)
    pub upload_kbps: f64,
}

impl ConnectionSummary {
    fn project(status: ConnectionStatus, session: Option<&ConnectionSession>) -> Self {
        let Some(session) = session else {
            return Self {
                is_connected: status.is_connected(),
                status_label: status.label(),
                server: String::new(),
                elapsed_seconds: 0,
                bytes_sent: 0,
                bytes_received: 0,
                download_kbps: 0.0,
                upload_kbps: 0.0,
            };
        };

        let elapsed_seconds = session.elapsed().as_secs();
        let (download_kbps, upload_kbps) = if elapsed_seconds == 0 {
            (0.0, 0.0)
        } else {
            let secs = elapsed_seconds as f64;
            (
                session.bytes_received() as f64 / secs / 1024.0,
                session.bytes_sent() as f64 / secs / 1024.0,
            )
        };

        Self {
            is_connected: status.is_connected(),
            status_label: status.label(),
            server: session.server().descriptor(),
            elapsed_seconds,
            bytes_sent: session.bytes_sent(),
            bytes_received: session.bytes_received(),
            download_kbps,
            upload_kbps,
        }
    }
}

impl std::fmt::Display for ConnectionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.server.is_empty() {
            return write!(f, "VPN: {}", self.status_label);
        }

        write!(
            f,
            "VPN: {} | {} | {} | ↓ {} ({:.1} KB/s) | ↑ {} ({:.1} KB/s)",
            self.status_label,
            self.server,
            format_elapsed(self.elapsed_seconds),
            format_bytes(self.bytes_received),
            self.download_kbps,
            format_bytes(self.bytes_sent),
            self.upload_kbps,
        )
    }
}

/// Mutable manager state
struct SessionState {
    status: ConnectionStatus,
    session: Option<ConnectionSession>,
}

/// Connection session manager
///
/// Construct one per application and share it with `Arc`.
pub struct ConnectionSessionManager {
    /// Candidate servers
    catalog: Arc<ServerCatalog>,
    /// Tunnel implementation
    transport: Arc<dyn TunnelTransport>,
    /// Failure classification and retry advice
    resilience: ResilienceController,
    /// Status and active session
    state: Mutex<SessionState>,
    /// Status stream
    status_tx: watch::Sender<ConnectionStatus>,
}

impl ConnectionSessionManager {
    /// Create a new manager
    pub fn new(
        catalog: Arc<ServerCatalog>,
        transport: Arc<dyn TunnelTransport>,
        resilience: ResilienceController,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);

        Self {
            catalog,
            transport,
            resilience,
            state: Mutex::new(SessionState {
                status: ConnectionStatus::Disconnected,
                session: None,
            }),
            status_tx,
        }
    }

    /// Get the catalog
    pub fn catalog(&self) -> &Arc<ServerCatalog> {
        &self.catalog
    }

    /// Get the resilience controller
    pub fn resilience(&self) -> &ResilienceController {
        &self.resilience
    }

    /// Get current status
    pub fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    /// Check if a tunnel is up
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Copy of the active session
    pub fn session(&self) -> Option<ConnectionSession> {
        self.lock().session.clone()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Connect to `server`, or to the catalog's best server when `None`.
    ///
    /// Runs to completion once the tunnel connect has started; there is no
    /// cancellation.
    pub async fn connect(&self, server: Option<VpnServer>) -> Result<ConnectionSession, ConnectionError> {
        let server = {
            let mut state = self.lock();
            match state.status {
                ConnectionStatus::Connecting => return Err(ConnectionError::AlreadyInProgress),
                ConnectionStatus::Connected => return Err(ConnectionError::AlreadyConnected),
                ConnectionStatus::Disconnecting => return Err(ConnectionError::DisconnectInProgress),
                ConnectionStatus::Disconnected | ConnectionStatus::Error(_) => {}
            }

            let Some(server) = server.or_else(|| self.catalog.select_best_server()) else {
                warn!("Connect requested but no server is available");
                return Err(ConnectionError::NoAvailableServers);
            };

            self.transition(&mut state, ConnectionStatus::Connecting);
            server
        };

        info!("Connecting to {} ({}, {})", server.display_name, server.endpoint(), server.protocol);

        match self.transport.connect(&server).await {
            Ok(()) => {
                let session = ConnectionSession::start(server);
                let mut state = self.lock();
                state.session = Some(session.clone());
                self.transition(&mut state, ConnectionStatus::Connected);

                info!("Connected to {}", session.server().id);
                Ok(session)
            }
            Err(e) => {
                let class = self.resilience.classify(&e);
                error!("Connection to {} failed: {} ({})", server.id, e, class);

                let mut state = self.lock();
                state.session = None;
                self.transition(&mut state, ConnectionStatus::Error(class));

                if class.is_recoverable() {
                    Err(ConnectionError::Transport { class, source: e })
                } else {
                    Err(ConnectionError::Fatal { class, source: e })
                }
            }
        }
    }

    /// Connect, retrying recoverable failures as advised by the
    /// resilience controller.
    ///
    /// Sleeps the advised backoff between attempts. Returns the last error
    /// once the controller gives up.
    pub async fn connect_with_retry(
        &self,
        server: Option<VpnServer>,
    ) -> Result<ConnectionSession, ConnectionError> {
        loop {
            let err = match self.connect(server.clone()).await {
                Ok(session) => {
                    self.resilience.reset();
                    return Ok(session);
                }
                Err(err) => err,
            };

            let Some(class) = err.error_class() else {
                self.resilience.reset();
                return Err(err);
            };

            match self.resilience.record_failure(class) {
                RetryDecision::Retry(attempt) => {
                    warn!(
                        "Reconnecting in {}s (attempt {} failed: {})",
                        attempt.next_delay_secs, attempt.attempt_number, class
                    );
                    tokio::time::sleep(attempt.next_delay()).await;
                }
                RetryDecision::GiveUp { attempts, class } => {
                    error!("Connection failed after {} attempt(s): {}", attempts, class);
                    return Err(err);
                }
            }
        }
    }

    /// Disconnect.
    ///
    /// Succeeds immediately when already disconnected. From `Error` this
    /// acknowledges the failure. Transport teardown is best effort: a
    /// teardown error is logged and the manager still ends `Disconnected`.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        {
            let mut state = self.lock();
            match state.status {
                ConnectionStatus::Disconnected => return Ok(()),
                ConnectionStatus::Connecting => return Err(ConnectionError::ConnectInProgress),
                ConnectionStatus::Disconnecting => return Err(ConnectionError::DisconnectInProgress),
                ConnectionStatus::Connected | ConnectionStatus::Error(_) => {
                    self.transition(&mut state, ConnectionStatus::Disconnecting);
                }
            }
        }

        info!("Disconnecting VPN");

        if let Err(e) = self.transport.disconnect().await {
            warn!("Tunnel teardown failed, tunnel resources may have leaked: {}", e);
        }

        let mut state = self.lock();
        state.session = None;
        self.transition(&mut state, ConnectionStatus::Disconnected);

        info!("VPN disconnected");
        Ok(())
    }

    /// Acknowledge an error without touching the transport.
    ///
    /// Returns `false` when not in `Error`.
    pub fn acknowledge_error(&self) -> bool {
        let mut state = self.lock();
        if !state.status.is_error() {
            return false;
        }

        state.session = None;
        self.transition(&mut state, ConnectionStatus::Disconnected);
        true
    }

    /// The transport lost a live tunnel.
    ///
    /// When connected, the session is discarded and the status moves to
    /// `Error`. Ignored in any other state.
    pub fn report_transport_failure(&self, error: TransportError) -> ErrorClass {
        let class = self.resilience.classify(&error);
        let mut state = self.lock();

        if !state.status.is_connected() {
            debug!("Ignoring transport failure while {}: {}", state.status, error);
            return class;
        }

        error!("Tunnel lost: {} ({})", error, class);
        state.session = None;
        self.transition(&mut state, ConnectionStatus::Error(class));
        class
    }

    /// Add traffic to the active session. No-op unless connected.
    pub fn update_traffic(&self, sent: u64, received: u64) {
        let mut state = self.lock();
        if !state.status.is_connected() {
            return;
        }

        if let Some(session) = state.session.as_mut() {
            session.record_traffic(sent, received);
        }
    }

    /// Current status, server, elapsed time and rates
    pub fn connection_summary(&self) -> ConnectionSummary {
        let state = self.lock();
        ConnectionSummary::project(state.status, state.session.as_ref())
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, state: &mut SessionState, next: ConnectionStatus) {
        debug!("Status: {} -> {}", state.status, next);
        state.status = next;
        self.status_tx.send_replace(next);
    }
}
