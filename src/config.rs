// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Daemon configuration, stored as JSON in `~/.assetd/config.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::download::{ClientIdentity, HttpTransport};

/// Default port of the intake server.
pub const DEFAULT_PORT: u16 = 62485;

/// Default content service.
pub const DEFAULT_SERVER: &str = "https://www.blenderkit.com";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    /// Base URL used for relative variant URLs
    pub server: String,
    /// Sent as `system-id` with every request
    pub system_id: String,
    pub addon_version: String,
    pub platform_version: String,
    pub connect_timeout_secs: u64,
    /// Total timeout of the metadata call. Downloads are unbounded.
    pub metadata_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let identity = ClientIdentity::default();
        Self {
            port: DEFAULT_PORT,
            bind_address: "127.0.0.1".to_string(),
            server: DEFAULT_SERVER.to_string(),
            system_id: identity.system_id,
            addon_version: identity.addon_version,
            platform_version: identity.platform_version,
            connect_timeout_secs: 10,
            metadata_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Identity headers sent to the content service.
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            system_id: self.system_id.clone(),
            addon_version: self.addon_version.clone(),
            platform_version: self.platform_version.clone(),
        }
    }

    /// Build the HTTP transport for this configuration.
    pub fn transport(&self) -> Result<HttpTransport> {
        let transport = HttpTransport::new(
            self.identity(),
            Duration::from_secs(self.connect_timeout_secs),
            Duration::from_secs(self.metadata_timeout_secs),
        )
        .context("Failed to build HTTP client")?;
        Ok(transport.with_server(&self.server))
    }
}

/// Directory holding the config file, created on first use.
pub fn get_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    let config_dir = home.join(".assetd");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    }
    Ok(config_dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.json"))
}

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path()?;
    let content = serde_json::to_string_pretty(config)?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
