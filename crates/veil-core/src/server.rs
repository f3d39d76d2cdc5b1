//! VPN Servers
//!
//! Immutable server records as delivered by a catalog refresh, plus the
//! hard-coded fallback list used when no remote list is available.
//!
//! # Fallback Servers
//!
//! | Id | Location | Protocol |
//! |----|----------|----------|
//! | sg-1 | Singapore | WireGuard |
//! | de-1 | Germany (Frankfurt) | WireGuard |
//! | us-1 | USA (New York) | OpenVPN |
//! | jp-1 | Japan (Tokyo) | Shadowsocks |
//! | uk-1 | United Kingdom (London) | WireGuard |
//! | nl-1 | Netherlands (Amsterdam) | V2Ray |

use serde::{Deserialize, Serialize};

/// Tunnel protocol spoken by a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    WireGuard,
    OpenVpn,
    Shadowsocks,
    V2Ray,
}

impl TransportProtocol {
    /// Get all protocols
    pub fn all() -> &'static [TransportProtocol] {
        &[
            TransportProtocol::WireGuard,
            TransportProtocol::OpenVpn,
            TransportProtocol::Shadowsocks,
            TransportProtocol::V2Ray,
        ]
    }

    /// Get protocol display name
    pub fn name(&self) -> &'static str {
        match self {
            TransportProtocol::WireGuard => "WireGuard",
            TransportProtocol::OpenVpn => "OpenVPN",
            TransportProtocol::Shadowsocks => "Shadowsocks",
            TransportProtocol::V2Ray => "V2Ray",
        }
    }

    /// Conventional listening port
    pub fn default_port(&self) -> u16 {
        match self {
            TransportProtocol::WireGuard => 51820,
            TransportProtocol::OpenVpn => 1194,
            TransportProtocol::Shadowsocks => 8388,
            TransportProtocol::V2Ray => 443,
        }
    }
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A candidate VPN server and its live metrics.
///
/// Values are replaced wholesale on every catalog refresh and never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnServer {
    /// Unique id within a catalog snapshot
    pub id: String,
    /// Display name
    pub display_name: String,
    /// ISO 3166 country code
    pub country_code: String,
    /// Flag glyph
    pub flag: String,
    /// Server address
    pub ip: String,
    /// Server port
    pub port: u16,
    /// Tunnel protocol
    pub protocol: TransportProtocol,
    /// Is the server accepting connections?
    #[serde(default = "default_true")]
    pub is_available: bool,
    /// Desirability, 0-100, higher is better
    pub performance_score: u8,
    /// Last measured round trip (ms)
    pub ping_ms: u32,
    /// Current load, 0-100
    pub load_percent: u8,
}

fn default_true() -> bool {
    true
}

impl VpnServer {
    /// Create an available server with neutral metrics
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        country_code: impl Into<String>,
        ip: impl Into<String>,
        protocol: TransportProtocol,
    ) -> Self {
        let country_code = country_code.into();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            flag: flag_for(&country_code),
            country_code,
            ip: ip.into(),
            port: protocol.default_port(),
            protocol,
            is_available: true,
            performance_score: 50,
            ping_ms: 0,
            load_percent: 0,
        }
    }

    /// Set metrics
    pub fn with_metrics(mut self, performance_score: u8, ping_ms: u32, load_percent: u8) -> Self {
        self.performance_score = performance_score.min(100);
        self.ping_ms = ping_ms;
        self.load_percent = load_percent.min(100);
        self
    }

    /// Set availability
    pub fn with_availability(mut self, is_available: bool) -> Self {
        self.is_available = is_available;
        self
    }

    /// Set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Human descriptor, e.g. "🇸🇬 Singapore"
    pub fn descriptor(&self) -> String {
        if self.flag.is_empty() {
            self.display_name.clone()
        } else {
            format!("{} {}", self.flag, self.display_name)
        }
    }

    /// "ip:port"
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Get the hard-coded fallback list
    pub fn fallback_servers() -> Vec<VpnServer> {
        vec![
            VpnServer::new("sg-1", "Singapore", "SG", "103.253.144.10", TransportProtocol::WireGuard)
                .with_metrics(95, 25, 32),
            VpnServer::new("de-1", "Germany (Frankfurt)", "DE", "185.186.78.1", TransportProtocol::WireGuard)
                .with_metrics(95, 45, 41),
            VpnServer::new("us-1", "USA (New York)", "US", "192.169.69.1", TransportProtocol::OpenVpn)
                .with_metrics(88, 120, 63),
            VpnServer::new("jp-1", "Japan (Tokyo)", "JP", "103.231.88.1", TransportProtocol::Shadowsocks)
                .with_metrics(90, 70, 55),
            VpnServer::new("uk-1", "United Kingdom (London)", "GB", "178.62.1.1", TransportProtocol::WireGuard)
                .with_metrics(85, 50, 48),
            VpnServer::new("nl-1", "Netherlands (Amsterdam)", "NL", "185.107.56.1", TransportProtocol::V2Ray)
                .with_metrics(80, 40, 72),
        ]
    }
}

/// Regional indicator flag for a two-letter country code.
///
/// Returns an empty string for anything that is not two ASCII letters.
pub fn flag_for(country_code: &str) -> String {
    if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }

    country_code
        .to_ascii_uppercase()
        .chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}
