//! Service configuration, read from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StrokeError;

pub const DEFAULT_CONFIG_PATH: &str = "config/stroke_api.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrokeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
    /// Filter results kept per memo before the oldest is evicted.
    #[serde(default = "default_memo_capacity")]
    pub memo_capacity: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            memo_capacity: default_memo_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_workers() -> usize {
    2
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/stroke_data.parquet")
}

fn default_memo_capacity() -> usize {
    256
}

impl StrokeConfig {
    pub fn from_toml(content: &str) -> Result<Self, StrokeError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StrokeError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| StrokeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, StrokeError> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let config = Self::load_from_file(path)?;
        log::info!("config loaded from {:?}", path);
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
