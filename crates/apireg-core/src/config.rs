//! Configuration system for apireg.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $APIREG_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/apireg/config.toml
//!   3. ~/.config/apireg/config.toml

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::api::{Environment, Version};
use crate::wire::{
    DEFAULT_MULTICAST_GROUP, DEFAULT_MULTICAST_PORT, LIFESPAN_MULTIPLIER, PURGE_INTERVAL_SECS,
    RESEND_INTERVAL_SECS,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub network: NetworkConfig,
    pub registry: RegistrySettings,
    /// Services the daemon announces on start.
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// IPv4 multicast group.
    pub group: Ipv4Addr,
    /// UDP port shared by every peer in the group.
    pub port: u16,
    /// Address of the interface to join on. 0.0.0.0 = let the OS choose.
    pub interface: Ipv4Addr,
    /// IP_MULTICAST_TTL. 1 keeps announcements on the local segment.
    pub multicast_ttl: u32,
    /// Deliver our own datagrams back to sockets on this host.
    /// Needed for peers sharing a machine.
    pub multicast_loop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub environment: Environment,
    pub resend_interval_secs: u64,
    /// 0 disables the periodic sweep. Expired entries are still dropped on read.
    pub purge_interval_secs: u64,
    /// Registration lifespan in resend intervals.
    pub lifespan_multiplier: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub version: Version,
    pub port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_MULTICAST_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            multicast_ttl: 1,
            multicast_loop: true,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            environment: Environment::All,
            resend_interval_secs: RESEND_INTERVAL_SECS,
            purge_interval_secs: PURGE_INTERVAL_SECS,
            lifespan_multiplier: LIFESPAN_MULTIPLIER,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("apireg")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RegistryConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RegistryConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("APIREG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RegistryConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply APIREG_* overrides. `lookup` is `std::env::var` outside tests.
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("APIREG_NETWORK__GROUP") {
            if let Ok(addr) = v.parse() {
                self.network.group = addr;
            }
        }
        if let Some(v) = lookup("APIREG_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Some(v) = lookup("APIREG_NETWORK__INTERFACE") {
            if let Ok(addr) = v.parse() {
                self.network.interface = addr;
            }
        }
        if let Some(v) = lookup("APIREG_REGISTRY__ENVIRONMENT") {
            if let Ok(env) = v.parse() {
                self.registry.environment = env;
            }
        }
        if let Some(v) = lookup("APIREG_REGISTRY__RESEND_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.registry.resend_interval_secs = secs;
            }
        }
        if let Some(v) = lookup("APIREG_REGISTRY__PURGE_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.registry.purge_interval_secs = secs;
            }
        }
    }
}
