//! Client configuration.
//!
//! The backend advertises a set of capabilities (version control, project
//! management, deployment). They are fixed when the client is constructed
//! and read from `ClientConfig` at call time.

use serde::Deserialize;
use thiserror::Error;

/// Base URL used when `SLYD_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:9001";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SLYD_CAPABILITIES is not a valid capabilities object: {0}")]
    Capabilities(String),

    #[error("SLYD_URL must not be empty")]
    EmptyBaseUrl,
}

/// Features the backend supports.
///
/// Only `version_control` changes client behaviour. The project flags are
/// informational: they are parsed so callers can hide operations the backend
/// will refuse, but the client still sends every request it is asked to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Gates `edit_project`, which is a no-op when this is off.
    pub version_control: bool,
    pub create_projects: bool,
    pub delete_projects: bool,
    pub rename_projects: bool,
    pub deploy_projects: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            version_control: false,
            create_projects: true,
            delete_projects: true,
            rename_projects: true,
            deploy_projects: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: String,
    pub capabilities: Capabilities,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Read `SLYD_URL` and `SLYD_CAPABILITIES` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`], with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("SLYD_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        let capabilities = match lookup("SLYD_CAPABILITIES") {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Capabilities(e.to_string()))?,
            None => Capabilities::default(),
        };
        Ok(Self::new(base_url.trim()).with_capabilities(capabilities))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Root of the projects API: `{base_url}/projects`.
    pub fn api_root(&self) -> String {
        format!("{}/projects", self.base_url)
    }
}
