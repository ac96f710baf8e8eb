//! Configuration for productionapp-control.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "productionapp.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PRODUCTIONAPP_";

/// Top-level configuration for the control service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Project every deployment belongs to.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Automation engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `productionapp.toml` in the current directory (if present)
    /// 3. Environment variables with `PRODUCTIONAPP_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::from_file(CONFIG_FILE)
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

fn default_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5050)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Project configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Project name shared by every deployment stack.
    #[serde(default = "default_project_name")]
    pub name: String,
}

fn default_project_name() -> String {
    "productionapp-platform".to_owned()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
        }
    }
}

/// Automation engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Which engine implementation to use.
    #[serde(default)]
    pub engine_type: EngineType,

    /// Path to the `pulumi` binary.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Directory holding one generated program per stack.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// State backend URL (e.g. `file:///var/lib/productionapp/state`).
    ///
    /// When unset, the CLI's own login state is used.
    pub backend_url: Option<String>,

    /// Passphrase for the stack secrets provider.
    pub passphrase: Option<SecretString>,

    /// Resource type token of the deployment component.
    #[serde(default = "default_component_type")]
    pub component_type: String,
}

fn default_binary() -> PathBuf {
    PathBuf::from("pulumi")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/var/lib/productionapp/stacks")
}

fn default_component_type() -> String {
    "productionapp:index:Deployment".to_owned()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_type: EngineType::default(),
            binary: default_binary(),
            work_dir: default_work_dir(),
            backend_url: None,
            passphrase: None,
            component_type: default_component_type(),
        }
    }
}

/// Type of automation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    /// Drive the `pulumi` CLI.
    #[default]
    Cli,

    /// In-memory engine for testing.
    Mock,
}
