//! Fit-inside resizing of animated sequences

use image::imageops;
use tracing::debug;

use crate::config::ResizeConfig;
use crate::error::{Result, AnimBatchError};
use crate::processing::animation::{AnimFrame, AnimatedImage};
use crate::processing::metadata::ImageMetadata;

/// Resampling filters available for frame resizing
#[derive(Debug, Clone, Copy, Default)]
pub enum FilterType {
    /// Nearest neighbor (fastest, lowest quality)
    Nearest,
    /// Triangle (linear interpolation)
    Triangle,
    /// Catmull-Rom cubic spline
    CatmullRom,
    /// Lanczos with radius 3 (high quality, recommended)
    #[default]
    Lanczos3,
}

impl From<FilterType> for imageops::FilterType {
    fn from(filter: FilterType) -> Self {
        match filter {
            FilterType::Nearest => imageops::FilterType::Nearest,
            FilterType::Triangle => imageops::FilterType::Triangle,
            FilterType::CatmullRom => imageops::FilterType::CatmullRom,
            FilterType::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// Target box for a whole animation: the frame bounds replicated over every page
pub fn resize_targets(meta: &ImageMetadata, bounds: &ResizeConfig) -> (u32, u32) {
    (bounds.max_width, bounds.max_height.saturating_mul(meta.pages.max(1)))
}

/// Shrink `width` x `frame_height` to fit inside the bounds.
///
/// Aspect ratio is preserved and frames are never enlarged.
pub fn fit_inside(width: u32, frame_height: u32, bounds: &ResizeConfig) -> Result<(u32, u32)> {
    if width == 0 || frame_height == 0 {
        return Err(AnimBatchError::transform(
            format!("Cannot resize an empty frame ({}x{})", width, frame_height),
            None,
        ));
    }
    bounds.validate()?;

    let scale = (bounds.max_width as f64 / width as f64)
        .min(bounds.max_height as f64 / frame_height as f64)
        .min(1.0);

    let new_width = ((width as f64 * scale).round() as u32).clamp(1, bounds.max_width);
    let new_height = ((frame_height as f64 * scale).round() as u32).clamp(1, bounds.max_height);
    Ok((new_width, new_height))
}

/// Frame resizer shared by every item of a resize batch
pub struct ImageResizer {
    filter: FilterType,
}

impl ImageResizer {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    /// Create a resizer with custom filter
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }

    /// Resize every frame of `anim` to fit inside `bounds`
    pub fn resize_animation(
        &self,
        anim: &AnimatedImage,
        meta: &ImageMetadata,
        bounds: &ResizeConfig,
    ) -> Result<AnimatedImage> {
        let (box_width, box_height) = resize_targets(meta, bounds);
        let (target_width, target_height) = fit_inside(meta.width, meta.frame_height(), bounds)?;

        debug!(
            "Resizing {} frames {}x{} -> {}x{} (box {}x{}) using {:?}",
            meta.pages,
            meta.width,
            meta.frame_height(),
            target_width,
            target_height,
            box_width,
            box_height,
            self.filter
        );

        let filter: imageops::FilterType = self.filter.into();
        let frames = anim
            .frames
            .iter()
            .map(|frame| AnimFrame {
                image: if frame.image.dimensions() == (target_width, target_height) {
                    frame.image.clone()
                } else {
                    imageops::resize(&frame.image, target_width, target_height, filter)
                },
                delay_ms: frame.delay_ms,
            })
            .collect();

        Ok(AnimatedImage {
            format: anim.format,
            frames,
            info: anim.info.clone(),
        })
    }
}

impl Default for ImageResizer {
    fn default() -> Self {
        Self::new()
    }
}
