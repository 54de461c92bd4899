//! The CLI's named-server configuration.
//!
//! Kubeconfig-style contexts in `~/.clinica/config.yaml` (overridable via
//! `CLINICA_CONFIG`). A context names a clinic server and optionally the
//! tenant it is scoped to; credentials and tokens are never written here.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};

/// One named clinic server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Context {
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl Context {
    pub fn new(server_url: impl Into<String>, tenant: Option<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            tenant,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub current_context: Option<String>,
    pub contexts: HashMap<String, Context>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = serde_yaml::from_str(&content)
            .with_context(|| format!("malformed config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("CLINICA_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().context("could not find home directory")?;
        Ok(home.join(".clinica").join("config.yaml"))
    }

    pub fn get_current_context(&self) -> Option<(&String, &Context)> {
        self.current_context
            .as_ref()
            .and_then(|name| self.contexts.get(name).map(|ctx| (name, ctx)))
    }
}
