//! Veil - VPN Client Session Core
//!
//! Server selection, connection state machine, traffic accounting and
//! retry policy shared by the client front ends. Actual packet transport
//! is delegated to an injected [`TunnelTransport`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 ConnectionSessionManager                  │
//! │                                                           │
//! │  ┌───────────────┐   ┌────────────────┐   ┌────────────┐  │
//! │  │ ServerCatalog │──▶│ Session state  │◀──│ Resilience │  │
//! │  │  (selection)  │   │ (one session)  │   │ Controller │  │
//! │  └───────────────┘   └───────┬────────┘   └────────────┘  │
//! │                              │                            │
//! └──────────────────────────────│────────────────────────────┘
//!                                │ connect / disconnect
//!                                ▼
//!                     ┌────────────────────┐
//!                     │  TunnelTransport   │
//!                     │ (WireGuard, etc.)  │
//!                     └────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Deterministic selection**: score, then ping, then id
//! - **Single active session**: concurrent commands are rejected, never interleaved
//! - **Classified failures**: fatal security errors are never retried
//! - **Capped backoff**: `min(2^n, 30)` seconds between attempts

mod catalog;
mod config;
mod manager;
mod resilience;
mod server;
mod session;
mod transport;

pub use catalog::{CatalogSnapshot, ServerCatalog, DEFAULT_QUICK_CONNECT_LIMIT};
pub use config::{ConfigError, ConfigFormat, VeilConfig};
pub use manager::{ConnectionError, ConnectionSessionManager, ConnectionStatus, ConnectionSummary};
pub use resilience::{
    ErrorClass, ResilienceController, RetryAttempt, RetryDecision, RetryPolicy,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_SECS,
};
pub use server::{flag_for, TransportProtocol, VpnServer};
pub use session::{format_bytes, format_elapsed, ConnectionSession};
pub use transport::{AlwaysReachable, ConnectivityProbe, SimulatedTransport, TransportError, TunnelTransport};
