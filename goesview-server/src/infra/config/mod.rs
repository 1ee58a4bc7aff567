//! Server configuration: resolved model plus the loader that layers
//! defaults, an optional TOML file, environment variables and CLI flags.

pub mod loader;
pub mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigOverrides};

use std::path::PathBuf;
use std::time::Duration;

use goesview_core::PreviewConfig;
use serde::Serialize;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_CACHE_DIR: &str = "./thumbnails";
pub const DEFAULT_CHANNEL_MAP: &str = "./goes16.map.json";
pub const DEFAULT_STATIC_DIR: &str = "./public";
pub const DEFAULT_CHANNEL_RELOAD_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where the resolved values came from.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Read-only tree of full-resolution images.
    pub source_root: PathBuf,
    /// Directory holding `<key>.jpg` previews; created on startup.
    pub cache_dir: PathBuf,
    /// JSON channel table reloaded in place.
    pub channel_map: PathBuf,
    /// Front-end assets served for every non-API path.
    pub static_dir: PathBuf,
    pub channel_reload_secs: u64,
    pub preview: PreviewConfig,
    #[serde(skip)]
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Config rooted at `source_root` with every other knob at its default.
    pub fn with_source_root(source_root: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
            source_root: source_root.into(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            channel_map: PathBuf::from(DEFAULT_CHANNEL_MAP),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            channel_reload_secs: DEFAULT_CHANNEL_RELOAD_SECS,
            preview: PreviewConfig::default(),
            metadata: ConfigMetadata::default(),
        }
    }

    pub fn channel_reload_interval(&self) -> Duration {
        Duration::from_secs(self.channel_reload_secs)
    }

    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }

    /// Canonicalize the source and cache roots so every later prefix check
    /// compares absolute paths. Call after `ensure_directories`.
    pub fn normalize_paths(&mut self) -> anyhow::Result<()> {
        self.source_root = std::fs::canonicalize(&self.source_root)?;
        self.cache_dir = std::fs::canonicalize(&self.cache_dir)?;
        Ok(())
    }
}
