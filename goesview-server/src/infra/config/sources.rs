use std::path::PathBuf;

use goesview_core::PreviewConfig;
use serde::{Deserialize, Serialize};

/// Raw configuration as written in `goesview.toml`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub paths: FilePathsConfig,
    pub channel_reload_secs: Option<u64>,
    pub preview: Option<PreviewConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_map: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

/// Values read from `GOESVIEW_*` environment variables.
///
/// Host, port and the path settings are also CLI flags with env fallbacks;
/// they are gathered here too so library callers without a CLI still see them.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub source_root: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub channel_map: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub channel_reload_secs: Option<u64>,
    pub scan_interval_secs: Option<u64>,
    pub workers: Option<usize>,
    pub max_starts: Option<u32>,
    pub window_ms: Option<u64>,
    pub target_width: Option<u32>,
    pub jpeg_quality: Option<u8>,
    pub extensions: Option<Vec<String>>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: path_var("GOESVIEW_CONFIG"),
            host: std::env::var("GOESVIEW_HOST").ok(),
            port: parse_var("GOESVIEW_PORT"),
            source_root: path_var("GOESVIEW_SOURCE_ROOT"),
            cache_dir: path_var("GOESVIEW_CACHE_DIR"),
            channel_map: path_var("GOESVIEW_CHANNEL_MAP"),
            static_dir: path_var("GOESVIEW_STATIC_DIR"),
            channel_reload_secs: parse_var("GOESVIEW_CHANNEL_RELOAD_SECS"),
            scan_interval_secs: parse_var("GOESVIEW_SCAN_INTERVAL_SECS"),
            workers: parse_var("GOESVIEW_WORKERS"),
            max_starts: parse_var("GOESVIEW_DISPATCH_MAX_STARTS"),
            window_ms: parse_var("GOESVIEW_DISPATCH_WINDOW_MS"),
            target_width: parse_var("GOESVIEW_THUMBNAIL_WIDTH"),
            jpeg_quality: parse_var("GOESVIEW_JPEG_QUALITY"),
            extensions: parse_csv_var("GOESVIEW_EXTENSIONS"),
        }
    }

    /// Layer the preview knobs present in the environment over `preview`.
    pub fn apply_preview(&self, preview: &mut PreviewConfig) {
        if let Some(value) = self.scan_interval_secs {
            preview.scan_interval_secs = value;
        }
        if let Some(value) = self.workers {
            preview.workers = value;
        }
        if let Some(value) = self.max_starts {
            preview.dispatch.max_starts = value;
        }
        if let Some(value) = self.window_ms {
            preview.dispatch.window_ms = value;
        }
        if let Some(value) = self.target_width {
            preview.target_width = value;
        }
        if let Some(value) = self.jpeg_quality {
            preview.jpeg_quality = value;
        }
        if let Some(value) = &self.extensions {
            preview.extensions = value.clone();
        }
    }
}

fn path_var(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

fn parse_csv_var(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| {
        raw.split(',')
            .filter_map(|part| {
                let trimmed = part.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect()
    })
}
