//! Relayer configuration, loaded from TOML.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use gmp_sync::{ClientTls, SourceConfig};
use gmp_types::ChainConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level relayer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
    /// Base URL of the GMP API.
    pub gmp_api_url: String,
    /// Log transactions instead of broadcasting them.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// Directory holding the `latestTask-{chain}.json` checkpoint files.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional `limit` for task fetches.
    pub page_size: Option<u32>,
    /// Client certificate for the GMP API.
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// Mutual TLS settings. Paths are resolved relative to the working directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_dry_run() -> bool {
    true
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./checkpoints")
}

fn default_request_timeout_ms() -> u64 {
    20_000
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

impl RelayerConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = read(path.as_ref())?;
        let content = String::from_utf8(content).map_err(|e| {
            ConfigError::Invalid(format!("{} is not UTF-8: {e}", path.as_ref().display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.gmp_api_url)
            .map_err(|e| ConfigError::Invalid(format!("gmp_api_url: {e}")))?;
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        if self.chains.is_empty() {
            return Err(ConfigError::Invalid("at least one [[chains]] entry is required".into()));
        }

        let mut names = HashSet::new();
        for chain in &self.chains {
            if chain.name.trim().is_empty() {
                return Err(ConfigError::Invalid("chain name must not be empty".into()));
            }
            if !names.insert(chain.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate chain '{}'", chain.name)));
            }
            Url::parse(&chain.rpc_url)
                .map_err(|e| ConfigError::Invalid(format!("chain '{}' rpc_url: {e}", chain.name)))?;
            if chain.gateway_address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chain '{}' has no gateway_address",
                    chain.name
                )));
            }
            if chain.poll_interval_ms == 0 || chain.confirmation_poll_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "chain '{}' intervals must be positive",
                    chain.name
                )));
            }
            if chain.confirmation_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "chain '{}' confirmation_attempts must be positive",
                    chain.name
                )));
            }
        }
        Ok(())
    }

    /// Chains to run. An empty filter selects all of them.
    pub fn select_chains(&self, filter: &[String]) -> Result<Vec<ChainConfig>> {
        if let Some(unknown) = filter
            .iter()
            .find(|name| !self.chains.iter().any(|c| &c.name == *name))
        {
            return Err(ConfigError::Invalid(format!("unknown chain '{unknown}'")));
        }
        Ok(self
            .chains
            .iter()
            .filter(|c| filter.is_empty() || filter.contains(&c.name))
            .cloned()
            .collect())
    }

    /// Task source settings, reading the client certificate if configured.
    pub fn source_config(&self) -> Result<SourceConfig> {
        let tls = match self.tls {
            Some(ref tls) => Some(ClientTls {
                cert_pem: read(&tls.cert_path)?,
                key_pem: read(&tls.key_path)?,
                accept_invalid_certs: tls.accept_invalid_certs,
            }),
            None => None,
        };
        Ok(SourceConfig {
            base_url: self.gmp_api_url.clone(),
            page_size: self.page_size,
            request_timeout_ms: self.request_timeout_ms,
            tls,
        })
    }
}
