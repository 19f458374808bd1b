//! Configuration management
//!
//! Defaults, then an optional file, then `GBGATE__SECTION__KEY` environment
//! variables.

use crate::domain::shared::{GatewayError, Result};
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sip: SipConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    pub bind_address: String,
    pub bind_port: u16,
    /// GB28181 id the gateway presents in From headers
    pub server_id: String,
    /// Host written into Via/From; discovered when unset
    pub host: Option<String>,
    pub user_agent: String,
    /// Reuse this Via branch on every outbound request
    pub fixed_branch: Option<String>,
    /// `Expires` carried on responses
    pub response_expires: u32,
    /// Poll the catalog every Nth keepalive; 0 disables polling
    pub catalog_poll_interval: u64,
    pub recv_buffer: usize,
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 5061,
            server_id: "31011500002000000001".to_string(),
            host: None,
            user_agent: "QVS".to_string(),
            fixed_branch: None,
            response_expires: 3600,
            catalog_poll_interval: 5,
            recv_buffer: 2048,
        }
    }
}

impl SipConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.bind_port)
            .parse()
            .map_err(|e| {
                GatewayError::Config(format!(
                    "invalid bind address {}:{}: {}",
                    self.bind_address, self.bind_port, e
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Where `start(log_enabled = true)` duplicates the log
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: "out.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus listener, disabled when unset
    pub listen: Option<SocketAddr>,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("GBGATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sip.bind_port, 5061);
        assert_eq!(config.sip.server_id, "31011500002000000001");
        assert_eq!(config.sip.user_agent, "QVS");
        assert_eq!(config.sip.catalog_poll_interval, 5);
        assert_eq!(config.logging.file, "out.log");
        assert!(config.metrics.listen.is_none());
        assert_eq!(
            config.sip.bind_addr().unwrap(),
            "0.0.0.0:5061".parse().unwrap()
        );
    }

    #[test]
    fn test_load_partial_file() {
        let path = std::env::temp_dir().join(format!("gbgate-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[sip]\nbind_port = 15060\nhost = \"192.168.1.10\"").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.sip.bind_port, 15060);
        assert_eq!(config.sip.host.as_deref(), Some("192.168.1.10"));
        assert_eq!(config.sip.user_agent, "QVS");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/gbgate.toml"))).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_invalid_bind_address() {
        let sip = SipConfig {
            bind_address: "not-an-ip".to_string(),
            ..SipConfig::default()
        };
        assert!(matches!(sip.bind_addr(), Err(GatewayError::Config(_))));
    }
}
