//! Configuration management for sooper-surface
//!
//! Handles loading, defaults, CLI overrides and hot-reloading of the YAML
//! configuration file.

pub mod watcher;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub use watcher::ConfigWatcher;

/// File looked up in the working directory first
pub const LOCAL_CONFIG: &str = "sooper-surface.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<EndpointConfig>,
    pub listen: ListenConfig,
    pub sync: SyncConfig,
    pub ui: UiConfig,
}

/// Looper engine endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_engine_port")]
    pub port: u16,
    /// Address prefix of the loop controls
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_engine_port(),
            prefix: default_prefix(),
        }
    }
}

/// Optional gain-control endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

/// Local reply socket; port 0 picks a free port
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Poll sweep interval (hot-reloadable)
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_ms: u64,
    /// Push interval requested from the engine
    #[serde(default = "default_register_interval")]
    pub register_interval_ms: u32,
    /// Pause between ping and registration
    #[serde(default = "default_handshake_wait")]
    pub handshake_wait_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: default_refresh_rate(),
            register_interval_ms: default_register_interval(),
            handshake_wait_ms: default_handshake_wait(),
        }
    }
}

impl SyncConfig {
    pub fn refresh_rate(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms)
    }

    pub fn handshake_wait(&self) -> Duration {
        Duration::from_millis(self.handshake_wait_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct UiConfig {
    /// Show raw state codes in the table
    #[serde(default)]
    pub state_debug: bool,
    /// Redraw the table continuously instead of opening the prompt
    #[serde(default)]
    pub monitor: bool,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub osc_host: Option<String>,
    pub osc_port: Option<u16>,
    pub refresh_rate_ms: Option<u64>,
    pub aux_host: Option<String>,
    pub aux_port: Option<u16>,
    pub state_debug: bool,
    pub monitor: bool,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load from an explicit path, or from the default location if present
    ///
    /// Returns the file actually read, if any, so it can be watched.
    pub async fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::load(path).await?;
            return Ok((config, Some(path.to_path_buf())));
        }

        match default_path() {
            Some(path) => {
                let config = Self::load(&path).await?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, o: &Overrides) {
        if let Some(host) = &o.osc_host {
            self.engine.host = host.clone();
        }
        if let Some(port) = o.osc_port {
            self.engine.port = port;
        }
        if let Some(rate) = o.refresh_rate_ms {
            self.sync.refresh_rate_ms = rate;
        }
        if o.aux_host.is_some() || o.aux_port.is_some() {
            let current = self.auxiliary.take();
            let host = o
                .aux_host
                .clone()
                .or_else(|| current.as_ref().map(|a| a.host.clone()))
                .unwrap_or_else(default_host);
            let port = o.aux_port.or(current.map(|a| a.port)).unwrap_or(0);
            self.auxiliary = Some(EndpointConfig { host, port });
        }
        self.ui.state_debug |= o.state_debug;
        self.ui.monitor |= o.monitor;
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.engine.host.is_empty() {
            bail!("engine.host cannot be empty");
        }
        if self.engine.port == 0 {
            bail!("engine.port cannot be 0");
        }
        if !self.engine.prefix.starts_with('/') {
            bail!(
                "engine.prefix must start with '/' (got '{}')",
                self.engine.prefix
            );
        }
        if let Some(aux) = &self.auxiliary {
            if aux.host.is_empty() {
                bail!("auxiliary.host cannot be empty");
            }
            if aux.port == 0 {
                bail!("auxiliary.port cannot be 0");
            }
        }
        if self.listen.host.is_empty() {
            bail!("listen.host cannot be empty");
        }
        if self.sync.refresh_rate_ms == 0 {
            bail!("sync.refresh_rate_ms must be greater than 0");
        }
        if self.sync.register_interval_ms > i32::MAX as u32 {
            bail!("sync.register_interval_ms is too large");
        }
        Ok(())
    }
}

/// First existing default config file
pub fn default_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("sooper-surface").join("config.yaml"))
        .filter(|p| p.is_file())
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_listen_host() -> String { "0.0.0.0".to_string() }
fn default_engine_port() -> u16 { 9951 }
fn default_prefix() -> String { "/sl".to_string() }
fn default_refresh_rate() -> u64 { 200 }
fn default_register_interval() -> u32 { 100 }
fn default_handshake_wait() -> u64 { 300 }
