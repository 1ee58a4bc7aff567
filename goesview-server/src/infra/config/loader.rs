use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::sources::{EnvConfig, FileConfig};
use super::{
    Config, ConfigMetadata, DEFAULT_CACHE_DIR, DEFAULT_CHANNEL_MAP, DEFAULT_CHANNEL_RELOAD_SECS,
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_STATIC_DIR, ServerConfig,
};

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["goesview.toml", "config/goesview.toml"];

/// Values given on the command line. They win over everything else.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub source_root: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub channel_map: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_file_loaded: bool,
    overrides: ConfigOverrides,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file {path} does not exist")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("source_root is not configured (set GOESVIEW_SOURCE_ROOT or --source-root)")]
    MissingSourceRoot,
    #[error("source_root must be an absolute path, got {path}")]
    RelativeSourceRoot { path: PathBuf },
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
    #[error("jpeg_quality must be between 1 and 100, got {value}")]
    JpegQuality { value: u8 },
    #[error("failed to prepare directories: {source}")]
    Filesystem {
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

/// Load `.env` (or `path`) into the process environment. A missing file is
/// not an error; a malformed one is.
pub fn load_env_file(path: Option<&Path>) -> Result<bool, ConfigLoadError> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|_| true),
        None => dotenvy::dotenv().map(|_| true),
    };
    match loaded {
        Ok(loaded) => Ok(loaded),
        Err(dotenvy::Error::Io(_)) => Ok(false),
        Err(err) => Err(ConfigLoadError::EnvFile(err)),
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_env_file_loaded(mut self, loaded: bool) -> Self {
        self.env_file_loaded = loaded;
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolve, validate and prepare the configuration from the live
    /// environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let mut load = self.compose(EnvConfig::gather())?;
        load.config
            .ensure_directories()
            .and_then(|()| load.config.normalize_paths())
            .map_err(|source| ConfigLoadError::Filesystem { source })?;
        Ok(load)
    }

    /// Layer defaults, file, `env` and CLI overrides, then validate. Touches
    /// the filesystem only to read the config file.
    pub fn compose(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = Vec::new();
        let (file, config_path) = self.load_file_config(&env)?;
        if config_path.is_none() {
            warnings.push("no goesview.toml found; using environment and defaults".to_string());
        }
        let file = file.unwrap_or_default();
        let overrides = &self.overrides;

        let server = ServerConfig {
            host: overrides
                .host
                .clone()
                .or(env.host.clone())
                .or(file.server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides
                .port
                .or(env.port)
                .or(file.server.port)
                .unwrap_or(DEFAULT_PORT),
        };

        let source_root = overrides
            .source_root
            .clone()
            .or(env.source_root.clone())
            .or(file.paths.source_root)
            .ok_or(ConfigLoadError::MissingSourceRoot)?;
        if !source_root.is_absolute() {
            return Err(ConfigLoadError::RelativeSourceRoot { path: source_root });
        }

        let mut preview = file.preview.unwrap_or_default();
        env.apply_preview(&mut preview);

        let config = Config {
            server,
            source_root,
            cache_dir: overrides
                .cache_dir
                .clone()
                .or(env.cache_dir.clone())
                .or(file.paths.cache_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            channel_map: overrides
                .channel_map
                .clone()
                .or(env.channel_map.clone())
                .or(file.paths.channel_map)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHANNEL_MAP)),
            static_dir: overrides
                .static_dir
                .clone()
                .or(env.static_dir.clone())
                .or(file.paths.static_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            channel_reload_secs: env
                .channel_reload_secs
                .or(file.channel_reload_secs)
                .unwrap_or(DEFAULT_CHANNEL_RELOAD_SECS),
            preview,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: self.env_file_loaded,
            },
        };

        validate(&config)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self.config_path.clone().or(env.config_path.clone());
        let path = match explicit {
            Some(path) if !path.exists() => return Err(ConfigLoadError::MissingConfig { path }),
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok((Some(file), Some(path)))
    }
}

fn validate(config: &Config) -> Result<(), ConfigLoadError> {
    let preview = &config.preview;
    let zero = [
        ("preview.target_width", preview.target_width == 0),
        ("preview.workers", preview.workers == 0),
        ("preview.dispatch.max_starts", preview.dispatch.max_starts == 0),
        ("preview.dispatch.window_ms", preview.dispatch.window_ms == 0),
        ("preview.scan_interval_secs", preview.scan_interval_secs == 0),
        ("preview.max_decode_mb", preview.max_decode_mb == 0),
        ("channel_reload_secs", config.channel_reload_secs == 0),
    ];
    if let Some((field, _)) = zero.into_iter().find(|(_, is_zero)| *is_zero) {
        return Err(ConfigLoadError::ZeroValue { field });
    }
    if !(1..=100).contains(&preview.jpeg_quality) {
        return Err(ConfigLoadError::JpegQuality {
            value: preview.jpeg_quality,
        });
    }
    Ok(())
}
