//! Tuning knobs for preview generation, dispatch and scanning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Image extensions recognized in the source tree (compared case-insensitively).
///
/// Kept in one place so the listing endpoint and the reconciliation scanner
/// agree on what counts as a previewable file.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Owned copy of [`DEFAULT_IMAGE_EXTENSIONS`] for config deserialisation.
pub fn default_image_extensions_vec() -> Vec<String> {
    DEFAULT_IMAGE_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn host_parallelism() -> usize {
    num_cpus::get().max(2)
}

/// Knobs for preview generation, the render queue and reconciliation.
///
/// Every field carries a default so deployments only spell out what they
/// change.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Width in pixels of every generated preview; height follows the aspect ratio.
    pub target_width: u32,
    /// JPEG quality for encoded previews (1-100).
    pub jpeg_quality: u8,
    /// Upper bound on decoder allocations per image, in MiB.
    pub max_decode_mb: u64,
    /// Extensions treated as source images.
    pub extensions: Vec<String>,
    /// Number of long-lived render worker threads.
    pub workers: usize,
    /// Dispatch rate limit.
    pub dispatch: DispatchConfig,
    /// Seconds between reconciliation scans.
    pub scan_interval_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            target_width: 200,
            jpeg_quality: 85,
            max_decode_mb: 1024,
            extensions: default_image_extensions_vec(),
            workers: host_parallelism(),
            dispatch: DispatchConfig::default(),
            scan_interval_secs: 60 * 60,
        }
    }
}

impl PreviewConfig {
    /// Period between reconciliation passes.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

/// At most `max_starts` render jobs start per `window_ms` window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Job starts allowed per window.
    pub max_starts: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_starts: host_parallelism() as u32,
            window_ms: 1_000,
        }
    }
}

impl DispatchConfig {
    /// Window length as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}
