use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lark_core::rpc::RpcConfig;
use log::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_CAPACITY: usize = 1000;
pub const DEFAULT_VOLUME: u8 = 80;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    pub rpc: RpcConfig,
    /// Forward launches to an already running instance
    pub single_instance: bool,
    /// Lines kept for `Software.GetLog`
    pub log_capacity: usize,
    pub volume: u8,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            single_instance: true,
            log_capacity: DEFAULT_LOG_CAPACITY,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl AppSettings {
    /// `settings.json` in the per-user config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lark").join("settings.json"))
    }

    /// Settings from the default location, or defaults
    pub fn load() -> Self {
        Self::default_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Settings from `path`. A missing or unreadable file gives the defaults.
    pub fn load_from(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!("No settings at {}: {}", path.display(), e);
                return Self::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Ignoring invalid settings in {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Writes to the default location, logging failures
    pub fn save(&self) {
        let result = Self::default_path()
            .context("No config directory on this system")
            .and_then(|path| self.save_to(&path));
        if let Err(e) = result {
            warn!("Settings not saved: {:#}", e);
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Cannot write {}", path.display()))
    }
}
