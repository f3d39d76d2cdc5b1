//! Configuration
//!
//! Session-core settings loaded from TOML or JSON, plus the seed server
//! list the catalog starts from before any remote refresh.
//!
//! ```toml
//! quick_connect_limit = 4
//! simulated_connect_delay_ms = 500
//!
//! [retry]
//! max_attempts = 5
//! max_delay_secs = 30
//!
//! [[servers]]
//! id = "sg-1"
//! display_name = "Singapore"
//! country_code = "SG"
//! flag = "🇸🇬"
//! ip = "103.253.144.10"
//! port = 51820
//! protocol = "wireguard"
//! performance_score = 95
//! ping_ms = 25
//! load_percent = 32
//! ```

use crate::catalog::{ServerCatalog, DEFAULT_QUICK_CONNECT_LIMIT};
use crate::resilience::{ResilienceController, RetryPolicy};
use crate::server::VpnServer;
use crate::transport::{ConnectivityProbe, SimulatedTransport};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Session-core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VeilConfig {
    /// Entries in the quick-connect list
    #[serde(default = "default_quick_connect_limit")]
    pub quick_connect_limit: usize,
    /// Delay of the simulated transport (ms)
    #[serde(default = "default_connect_delay_ms")]
    pub simulated_connect_delay_ms: u64,
    /// Retry limits
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Seed servers
    #[serde(default = "VpnServer::fallback_servers")]
    pub servers: Vec<VpnServer>,
}

fn default_quick_connect_limit() -> usize {
    DEFAULT_QUICK_CONNECT_LIMIT
}

fn default_connect_delay_ms() -> u64 {
    500
}

impl Default for VeilConfig {
    fn default() -> Self {
        Self {
            quick_connect_limit: DEFAULT_QUICK_CONNECT_LIMIT,
            simulated_connect_delay_ms: default_connect_delay_ms(),
            retry: RetryPolicy::default(),
            servers: VpnServer::fallback_servers(),
        }
    }
}

impl VeilConfig {
    /// Load from file, format chosen by extension (`.toml` or `.json`)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_str_format(&content, format)
    }

    /// Load from string in the given format
    pub fn from_str_format(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config = match format {
            ConfigFormat::Toml => Self::from_toml(content)?,
            ConfigFormat::Json => Self::from_json(content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse JSON
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Export as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quick_connect_limit == 0 {
            return Err(ConfigError::Invalid("quick_connect_limit must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.max_delay_secs == 0 {
            return Err(ConfigError::Invalid("retry.max_delay_secs must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.id.as_str()) {
                return Err(ConfigError::DuplicateServer(server.id.clone()));
            }
        }
        Ok(())
    }

    /// Catalog seeded with the configured servers
    pub fn build_catalog(&self) -> ServerCatalog {
        ServerCatalog::with_servers(self.servers.clone())
            .with_quick_connect_limit(self.quick_connect_limit)
    }

    /// Resilience controller with the configured limits
    pub fn build_resilience(&self, probe: Arc<dyn ConnectivityProbe>) -> ResilienceController {
        ResilienceController::new(self.retry, probe)
    }

    /// Simulated transport with the configured delay
    pub fn build_simulated_transport(&self) -> SimulatedTransport {
        SimulatedTransport::new(Duration::from_millis(self.simulated_connect_delay_ms))
    }
}

/// Configuration format
#[derive(Debug, Clone, Copy)]
pub enum ConfigFormat {
    Toml,
    Json,
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported config format")]
    UnsupportedFormat,

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Duplicate server id: {0}")]
    DuplicateServer(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::AlwaysReachable;

    #[test]
    fn test_default_config() {
        let config = VeilConfig::default();

        assert_eq!(config.quick_connect_limit, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_delay_secs, 30);
        assert_eq!(config.servers.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = VeilConfig::from_str_format("", ConfigFormat::Toml).unwrap();
        assert_eq!(config, VeilConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
            quick_connect_limit = 2

            [retry]
            max_attempts = 3

            [[servers]]
            id = "sg-1"
            display_name = "Singapore"
            country_code = "SG"
            flag = ""
            ip = "1.2.3.4"
            port = 51820
            protocol = "wireguard"
            performance_score = 95
            ping_ms = 25
            load_percent = 32
        "#;
        let config = VeilConfig::from_str_format(toml, ConfigFormat::Toml).unwrap();

        assert_eq!(config.quick_connect_limit, 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay_secs, 30);
        assert_eq!(config.servers.len(), 1);
        assert!(config.servers[0].is_available);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = VeilConfig::default();
        let parsed = VeilConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = VeilConfig::default();
        let parsed = VeilConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = VeilConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = VeilConfig::default();
        config.quick_connect_limit = 0;
        assert!(config.validate().is_err());

        let mut config = VeilConfig::default();
        config.servers.push(config.servers[0].clone());
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateServer(id)) if id == "sg-1"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = VeilConfig::load(Path::new("veil.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat));
    }

    #[test]
    fn test_build_components() {
        let mut config = VeilConfig::default();
        config.quick_connect_limit = 3;
        config.retry.max_delay_secs = 10;

        let catalog = config.build_catalog();
        assert_eq!(catalog.quick_connect_default().len(), 3);

        let resilience = config.build_resilience(Arc::new(AlwaysReachable));
        assert_eq!(resilience.next_delay(5).as_secs(), 10);
    }
}
