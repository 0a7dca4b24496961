//! Per-item image transforms
//!
//! The pipeline only talks to the [`ImageTransform`] capability. The
//! [`ProcessingEngine`] implements it on top of the codec crates; tests swap
//! in fakes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::config::{AnimFormat, ResizeConfig, TranscodeConfig, TransformPolicy};
use crate::error::{Result, AnimBatchError, ErrorContext};

pub mod animation;
pub mod encode;
pub mod filter;
pub mod formats;
pub mod metadata;
pub mod resize;

pub use animation::*;
pub use encode::*;
pub use filter::*;
pub use formats::*;
pub use metadata::*;
pub use resize::*;

/// One source file of a batch and where its result goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    pub file_name: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

impl WorkItem {
    /// The destination mirrors the source file name exactly
    pub fn new<S: Into<String>>(file_name: S, source_dir: &Path, destination_dir: &Path) -> Self {
        let file_name = file_name.into();
        Self {
            source_path: source_dir.join(&file_name),
            destination_path: destination_dir.join(&file_name),
            file_name,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

/// Description of a successfully written item
#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    pub file_name: String,
    pub destination_path: PathBuf,
    /// Container actually written (may differ from the file extension)
    pub format: AnimFormat,
    pub width: u32,
    pub frame_height: u32,
    pub pages: u32,
    pub source_bytes: u64,
    pub bytes_written: u64,
    #[serde(with = "duration_ms")]
    pub processing_time: Duration,
}

/// Capability that opens animated images and produces transformed outputs
#[async_trait]
pub trait ImageTransform: Send + Sync {
    /// Read metadata of the animation at `path`
    async fn probe(&self, path: &Path) -> Result<ImageMetadata>;

    /// Shrink every frame to fit the bounds, keep the container format
    async fn resize(&self, item: &WorkItem, bounds: &ResizeConfig) -> Result<TransformReport>;

    /// Re-encode the whole animation into the configured container
    async fn transcode(&self, item: &WorkItem, config: &TranscodeConfig) -> Result<TransformReport>;

    /// Run the transform selected by `policy`
    async fn apply(&self, item: &WorkItem, policy: &TransformPolicy) -> Result<TransformReport> {
        match policy {
            TransformPolicy::Resize(bounds) => self.resize(item, bounds).await,
            TransformPolicy::Transcode(config) => self.transcode(item, config).await,
        }
    }
}

/// Codec-backed implementation of [`ImageTransform`]
pub struct ProcessingEngine {
    resizer: Arc<ImageResizer>,
}

impl ProcessingEngine {
    /// Create a new processing engine
    pub fn new() -> Self {
        Self {
            resizer: Arc::new(ImageResizer::new()),
        }
    }

    /// Create an engine resampling with `filter`
    pub fn with_filter(filter: FilterType) -> Self {
        Self {
            resizer: Arc::new(ImageResizer::with_filter(filter)),
        }
    }

    /// Read and decode all frames of a source file
    async fn open(&self, path: &Path) -> Result<(AnimatedImage, ImageMetadata)> {
        debug!("Opening animation: {:?}", path);

        let bytes = fs::read(path).await
            .map_err(|e| AnimBatchError::source_unreadable(
                format!("Failed to read file: {}", e),
                Some(path.to_path_buf()),
            ))?;
        let file_size = bytes.len() as u64;

        let (anim, meta) = tokio::task::spawn_blocking(move || -> Result<(AnimatedImage, ImageMetadata)> {
            let anim = AnimatedImage::decode(&bytes)?;
            let meta = anim.metadata(file_size);
            Ok((anim, meta))
        })
        .await?
        .with_file_context(path.to_path_buf())?;

        debug!(
            "Loaded {:?}: {} {}x{} x{} pages, loop {}, palette depth {:?}",
            path, meta.format, meta.width, meta.frame_height(), meta.pages,
            meta.loop_count, meta.palette_bit_depth
        );

        Ok((anim, meta))
    }

    /// Write an encoded buffer in one go
    async fn write(&self, destination: &Path, data: Vec<u8>) -> Result<u64> {
        let len = data.len() as u64;
        fs::write(destination, data).await
            .map_err(|e| AnimBatchError::destination_write(destination.to_path_buf(), e))?;
        Ok(len)
    }
}

impl Default for ProcessingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageTransform for ProcessingEngine {
    async fn probe(&self, path: &Path) -> Result<ImageMetadata> {
        let (_, meta) = self.open(path).await?;
        Ok(meta)
    }

    async fn resize(&self, item: &WorkItem, bounds: &ResizeConfig) -> Result<TransformReport> {
        let start_time = Instant::now();
        let (anim, meta) = self.open(&item.source_path).await?;

        // The output container follows the destination extension
        let format = detect_format_from_path(&item.destination_path)?;
        let options = EncodeOptions::preserving(format, &meta);

        let resizer = Arc::clone(&self.resizer);
        let bounds = *bounds;
        let source_meta = meta.clone();
        let (data, (width, frame_height), pages) = tokio::task::spawn_blocking(move || -> Result<_> {
            let resized = resizer.resize_animation(&anim, &source_meta, &bounds)?;
            let data = encode(&resized, &options)?;
            Ok((data, resized.frame_dimensions(), resized.page_count()))
        })
        .await?
        .with_file_context(item.source_path.clone())?;

        let bytes_written = self.write(&item.destination_path, data).await?;

        Ok(TransformReport {
            file_name: item.file_name.clone(),
            destination_path: item.destination_path.clone(),
            format,
            width,
            frame_height,
            pages,
            source_bytes: meta.file_size,
            bytes_written,
            processing_time: start_time.elapsed(),
        })
    }

    async fn transcode(&self, item: &WorkItem, config: &TranscodeConfig) -> Result<TransformReport> {
        let start_time = Instant::now();
        let (mut anim, meta) = self.open(&item.source_path).await?;

        let format = if config.force { config.target_format } else { meta.format };
        if let Some(delay_ms) = config.delay_ms {
            anim.set_delay(delay_ms);
        }
        let options = EncodeOptions::for_transcode(config, format, &meta);
        debug!("Transcoding {} -> {} with {:?}", item.file_name, format, options);

        let (width, frame_height) = anim.frame_dimensions();
        let pages = anim.page_count();

        // Encode fully before touching the destination
        let data = tokio::task::spawn_blocking(move || encode(&anim, &options))
            .await?
            .with_file_context(item.source_path.clone())?;

        let bytes_written = self.write(&item.destination_path, data).await?;

        Ok(TransformReport {
            file_name: item.file_name.clone(),
            destination_path: item.destination_path.clone(),
            format,
            width,
            frame_height,
            pages,
            source_bytes: meta.file_size,
            bytes_written,
            processing_time: start_time.elapsed(),
        })
    }
}

/// Serializes a `Duration` as whole milliseconds
pub(crate) mod duration_ms {
    use std::time::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
