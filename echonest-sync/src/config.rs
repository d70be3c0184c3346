//! Configuration
//!
//! Precedence: command line > environment > `~/.echonest-sync.yaml` > defaults.
//! Clap already folds the environment into the parsed arguments.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use echonest_core::sync::DEFAULT_DRIFT_THRESHOLD_SECS;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Config file looked up in the home directory when `--config` isn't given
const DEFAULT_CONFIG_FILE: &str = ".echonest-sync.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Server URL required (--server, ECHONEST_SERVER, or config file)")]
    MissingServer,

    #[error("API token required (--token, ECHONEST_TOKEN, or config file)")]
    MissingToken,

    #[error("Drift threshold must be a non-negative number of seconds, got {0}")]
    InvalidDriftThreshold(f64),
}

/// Sync your local Spotify with an EchoNest server
#[derive(Debug, Parser)]
#[command(name = "echonest-sync", version)]
pub struct Cli {
    /// EchoNest server URL
    #[arg(short, long, env = "ECHONEST_SERVER")]
    pub server: Option<String>,

    /// API bearer token
    #[arg(short, long, env = "ECHONEST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Seconds of drift tolerated before re-seeking (default 3)
    #[arg(short, long, env = "ECHONEST_DRIFT_THRESHOLD")]
    pub drift_threshold: Option<f64>,

    /// Config file path (default ~/.echonest-sync.yaml)
    #[arg(short, long = "config", value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Contents of the YAML config file; every key is optional
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub server: Option<String>,
    pub token: Option<String>,
    pub drift_threshold: Option<f64>,
}

/// Fully resolved settings handed to the sync engine
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: String,
    pub token: String,
    pub drift_threshold: f64,
}

impl Config {
    /// Merge the command line (with environment) over the config file
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let server = cli
            .server
            .clone()
            .or(file.server)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingServer)?;

        let token = cli
            .token
            .clone()
            .or(file.token)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let drift_threshold = cli
            .drift_threshold
            .or(file.drift_threshold)
            .unwrap_or(DEFAULT_DRIFT_THRESHOLD_SECS);
        if !drift_threshold.is_finite() || drift_threshold < 0.0 {
            return Err(ConfigError::InvalidDriftThreshold(drift_threshold));
        }

        Ok(Self {
            server,
            token,
            drift_threshold,
        })
    }
}

/// Load the config for this invocation
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    let file = cli
        .config_path
        .clone()
        .or_else(default_config_path)
        .and_then(|path| read_config_file(&path))
        .unwrap_or_default();

    Config::resolve(cli, file)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
}

/// Read a YAML config file. A missing file is silently skipped; a broken
/// one is logged and skipped.
pub fn read_config_file(path: &Path) -> Option<FileConfig> {
    if !path.exists() {
        return None;
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    if contents.trim().is_empty() {
        return Some(FileConfig::default());
    }

    match serde_yaml::from_str(&contents) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}
