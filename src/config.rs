// Configuration - Where to connect, what to watch, where to keep records
//
// Loaded from a TOML file with a `[monitor]` section, an optional `[altnet]`
// section whose keys override `[monitor]` when the test network is selected,
// and a `[nicknames]` table for display.

use crate::client::RpcClientConfig;
use crate::ledger::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SERVER: &str = "https://s1.ripple.com:51234";
pub const DEFAULT_ALTNET_SERVER: &str = "https://s.altnet.rippletest.net:51234";
pub const DEFAULT_CONFIG_PATH: &str = "conf/ledgerwatch.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No addresses to monitor: pass them as arguments or set monitor.addresses")]
    NoAddresses,

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

/// One section of the file. Every key is optional so `[altnet]` can
/// override only what it mentions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Section {
    server: Option<String>,
    addresses: Option<Vec<String>>,
    store_path: Option<PathBuf>,
    record_format: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

impl Section {
    fn override_with(&mut self, other: Section) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.addresses.is_some() {
            self.addresses = other.addresses;
        }
        if other.store_path.is_some() {
            self.store_path = other.store_path;
        }
        if other.record_format.is_some() {
            self.record_format = other.record_format;
        }
        if other.poll_interval_ms.is_some() {
            self.poll_interval_ms = other.poll_interval_ms;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    monitor: Section,
    altnet: Option<Section>,
    #[serde(default)]
    nicknames: HashMap<String, String>,
}

// ============================================================================
// NICKNAMES
// ============================================================================

/// Human-friendly names for known addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nicknames(HashMap<Address, String>);

impl Nicknames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: impl Into<Address>, nickname: &str) {
        self.0.insert(address.into(), nickname.to_string());
    }

    pub fn get(&self, address: &Address) -> Option<&str> {
        self.0.get(address).map(String::as_str)
    }

    /// `nickname:address` when known, the bare address otherwise
    pub fn display(&self, address: &Address) -> String {
        match self.get(address) {
            Some(nickname) => format!("{}:{}", nickname, address),
            None => address.to_string(),
        }
    }
}

// ============================================================================
// MONITOR CONFIG
// ============================================================================

/// Resolved configuration for a monitoring run
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// JSON-RPC URL of the node
    pub server: String,
    /// Addresses to watch
    pub addresses: Vec<Address>,
    /// Directory of the sled delivery store
    pub store_path: PathBuf,
    /// When set, one JSON file per transaction is the delivery record
    pub record_format: Option<String>,
    /// Interval between new-ledger polls
    pub poll_interval_ms: u64,
    /// HTTP timeout per request
    pub request_timeout_secs: u64,
    pub nicknames: Nicknames,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            addresses: Vec::new(),
            store_path: PathBuf::from("ledgerwatch.db"),
            record_format: None,
            poll_interval_ms: 3500,
            request_timeout_secs: 30,
            nicknames: Nicknames::new(),
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and resolve a configuration file
    pub fn load(path: &Path, altnet: bool) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, altnet)
    }

    /// Resolve configuration from TOML text
    pub fn from_toml_str(text: &str, altnet: bool) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;

        let mut section = file.monitor;
        if altnet {
            let overrides = file.altnet.unwrap_or_default();
            if overrides.server.is_none() {
                section.server = Some(DEFAULT_ALTNET_SERVER.to_string());
            }
            section.override_with(overrides);
        }

        let defaults = Self::default();
        let mut nicknames = Nicknames::new();
        for (address, nickname) in &file.nicknames {
            nicknames.insert(address.as_str(), nickname);
        }

        Ok(Self {
            server: section.server.unwrap_or(defaults.server),
            addresses: section
                .addresses
                .unwrap_or_default()
                .into_iter()
                .map(Address::from)
                .collect(),
            store_path: section.store_path.unwrap_or(defaults.store_path),
            record_format: section.record_format,
            poll_interval_ms: section.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            request_timeout_secs: section
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            nicknames,
        })
    }

    pub fn with_server(mut self, server: &str) -> Self {
        self.server = server.to_string();
        self
    }

    /// Replace the configured addresses, unless `addresses` is empty
    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Address>,
    {
        let addresses: Vec<Address> = addresses.into_iter().map(Into::into).collect();
        if !addresses.is_empty() {
            self.addresses = addresses;
        }
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn with_record_format(mut self, format: &str) -> Self {
        self.record_format = Some(format.to_string());
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }
        if self.server.trim().is_empty() {
            return Err(ConfigError::InvalidValue("server cannot be empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("poll_interval_ms cannot be 0".to_string()));
        }
        Ok(())
    }

    /// Settings for the JSON-RPC client
    pub fn rpc_config(&self) -> RpcClientConfig {
        RpcClientConfig::new(&self.server)
            .with_poll_interval_ms(self.poll_interval_ms)
            .with_request_timeout_secs(self.request_timeout_secs)
    }
}
