//! Configuration loading and constants.
//!
//! Loads the gateway's configuration document from a TOML file and defines
//! the ambient constants (cache headers, defaults) that are not themselves
//! configurable.

use const_format::formatcp;
use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::nntp::types::ServerDef;

/// Article responses never change once a Message-ID exists, so a single
/// long, public, cacheable response is correct for every successful request.
pub const HTTP_CACHE_MAX_AGE_SECS: u32 = 2_592_000;

pub const CACHE_CONTROL_ARTICLE: &str =
    formatcp!("public, max-age={}", HTTP_CACHE_MAX_AGE_SECS);

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "usenet_gateway=info,tower_http=info";

/// Default path to the configuration document.
pub const DEFAULT_CONFIG_PATH: &str = "config/gateway.toml";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_idle_conn_expiry_secs() -> u64 {
    60
}

fn default_newsgroup() -> String {
    "alt.binaries.misc".to_string()
}

fn default_article_size_limit() -> u64 {
    4 * 1024 * 1024
}

fn default_connections() -> u32 {
    50
}

/// The gateway's configuration document (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(rename = "nntp_servers")]
    pub nntp_servers: Vec<NntpServerEntry>,
    #[serde(default = "default_idle_conn_expiry_secs")]
    pub idle_conn_expiry_secs: u64,
    #[serde(default = "default_newsgroup")]
    pub default_newsgroup: String,
    #[serde(default = "default_article_size_limit")]
    pub article_size_limit: u64,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

/// A single upstream NNTP server entry, as written in the config document.
#[derive(Debug, Clone, Deserialize)]
pub struct NntpServerEntry {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub posting: bool,
    #[serde(default = "default_connections")]
    pub connections: u32,
}

impl From<&NntpServerEntry> for ServerDef {
    fn from(entry: &NntpServerEntry) -> Self {
        ServerDef {
            host: entry.host.clone(),
            port: entry.port,
            user: entry.user.clone(),
            pass: entry.pass.clone(),
            tls: entry.tls,
            posting: entry.posting,
            connections: entry.connections,
        }
    }
}

impl GatewayConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&contents)?;

        if config.nntp_servers.is_empty() {
            return Err(ConfigError::Validation(
                "no NNTP servers configured; add at least one [[nntp_servers]] entry".to_string(),
            ));
        }

        if config.cert_file.is_some() != config.key_file.is_some() {
            return Err(ConfigError::Validation(
                "cert_file and key_file must both be set to enable TLS, or both omitted"
                    .to_string(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[nntp_servers]]
            host = "news.example.com"
            port = 119
            "#
        )
        .unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 80);
        assert_eq!(config.idle_conn_expiry_secs, 60);
        assert_eq!(config.default_newsgroup, "alt.binaries.misc");
        assert_eq!(config.article_size_limit, 4 * 1024 * 1024);
        assert_eq!(config.nntp_servers[0].connections, 50);
    }

    #[test]
    fn load_rejects_empty_server_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"0.0.0.0\"").unwrap();

        let err = GatewayConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn load_rejects_partial_tls_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            cert_file = "cert.pem"
            [[nntp_servers]]
            host = "news.example.com"
            port = 119
            "#
        )
        .unwrap();

        let err = GatewayConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
