//! Render worker: decode one source image, resize it to the preview width and
//! publish it atomically as a JPEG.

pub mod workers;

pub use workers::RenderWorkers;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageReader, Limits};
use tracing::debug;

use crate::config::PreviewConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result reported by a render worker. Failures are values, never panics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The preview was written to the destination.
    Rendered,
    /// Decode, encode or write failed; carries the reason.
    Failed(String),
}

/// One unit of decode/resize/encode work. Implementations run on render
/// worker threads and must not share mutable state with their caller.
pub trait Renderer: Send + Sync + 'static {
    /// Render `source` into a preview at `destination`.
    fn render(&self, source: &Path, destination: &Path) -> RenderOutcome;
}

/// [`Renderer`] backed by the `image` crate.
#[derive(Clone, Debug)]
pub struct ImageRenderer {
    target_width: u32,
    jpeg_quality: u8,
    max_alloc_bytes: u64,
}

impl ImageRenderer {
    /// Renderer producing `target_width`-wide JPEGs at `jpeg_quality`.
    pub fn new(target_width: u32, jpeg_quality: u8, max_decode_mb: u64) -> Self {
        Self {
            target_width: target_width.max(1),
            jpeg_quality: jpeg_quality.clamp(1, 100),
            max_alloc_bytes: max_decode_mb.saturating_mul(1024 * 1024),
        }
    }

    /// Renderer described by `config`.
    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(config.target_width, config.jpeg_quality, config.max_decode_mb)
    }

    fn render_preview(&self, source: &Path, destination: &Path) -> Result<(u32, u32), BoxError> {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc_bytes);

        let mut reader = ImageReader::open(source)?.with_guessed_format()?;
        reader.limits(limits);
        let decoded = reader.decode()?;

        let (width, height) = preview_dimensions(decoded.width(), decoded.height(), self.target_width);
        let resized = decoded
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8();

        atomic_write_jpeg_rgb8(destination, width, height, resized.as_raw(), self.jpeg_quality)?;
        Ok((width, height))
    }
}

impl Renderer for ImageRenderer {
    fn render(&self, source: &Path, destination: &Path) -> RenderOutcome {
        match self.render_preview(source, destination) {
            Ok((width, height)) => {
                debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    width,
                    height,
                    "rendered preview"
                );
                RenderOutcome::Rendered
            }
            Err(err) => RenderOutcome::Failed(err.to_string()),
        }
    }
}

/// Width is pinned to `target_width`; height keeps the source aspect ratio.
pub fn preview_dimensions(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    if width == 0 {
        return (target_width, 1);
    }
    let scaled = (height as f64 * target_width as f64 / width as f64).round() as u32;
    (target_width, scaled.max(1))
}

/// Atomically write an RGB8 image as JPEG to the given output path.
///
/// The encoded bytes land in a sibling temp file which is fsynced and then
/// renamed over the destination, so a cache entry is either absent or
/// complete. The parent directory is fsynced on a best-effort basis.
pub fn atomic_write_jpeg_rgb8(
    output_path: &Path,
    width: u32,
    height: u32,
    rgb_bytes: &[u8],
    quality: u8,
) -> Result<(), BoxError> {
    let parent = output_path
        .parent()
        .ok_or_else(|| format!("{} has no parent directory", output_path.display()))?;
    std::fs::create_dir_all(parent)?;

    let tmp_path = parent.join(temp_file_name());
    let written = (|| -> Result<(), BoxError> {
        let mut file = BufWriter::new(File::create(&tmp_path)?);
        JpegEncoder::new_with_quality(&mut file, quality).encode(
            rgb_bytes,
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;
        let file = file.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = written.and_then(|()| std::fs::rename(&tmp_path, output_path).map_err(Into::into)) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }

    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

const TEMP_SUFFIX: &str = ".tmp";

/// Fixed-length hidden name, independent of the destination, so a
/// destination that fits the filesystem's name limit always has a temp
/// sibling that fits too.
fn temp_file_name() -> String {
    format!(".{}{TEMP_SUFFIX}", uuid::Uuid::new_v4().simple())
}

/// Returns true for names produced by [`atomic_write_jpeg_rgb8`] as temp files.
pub fn is_temp_artifact(file_name: &str) -> bool {
    file_name
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(TEMP_SUFFIX))
        .is_some_and(|id| id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit()))
}
