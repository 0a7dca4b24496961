//! Transform policies applied to every item of a batch

use serde::{Deserialize, Serialize};
use crate::config::AnimFormat;
use crate::error::{Result, AnimBatchError};

/// Largest accepted bound for either output dimension
pub const MAX_DIMENSION: u32 = 32768;

/// Which transform a batch applies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransformPolicy {
    /// Downsample every frame, keep the container format
    Resize(ResizeConfig),

    /// Re-encode the whole animation into another container
    Transcode(TranscodeConfig),
}

impl TransformPolicy {
    /// Short name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resize(_) => "resize",
            Self::Transcode(_) => "transcode",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Resize(config) => config.validate(),
            Self::Transcode(config) => config.validate(),
        }
    }
}

/// Spatial bounds for the resize policy.
///
/// Frames are shrunk to fit inside `max_width` x `max_height` with their
/// aspect ratio preserved. Frames already inside the bounds are left at
/// their native size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResizeConfig {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            max_width: 100,
            max_height: 100,
        }
    }
}

impl ResizeConfig {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self { max_width, max_height }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0
            || self.max_width > MAX_DIMENSION
            || self.max_height == 0
            || self.max_height > MAX_DIMENSION
        {
            return Err(AnimBatchError::invalid_parameters(format!(
                "Bounds must be between 1-{}, got {}x{}",
                MAX_DIMENSION, self.max_width, self.max_height
            )));
        }
        Ok(())
    }
}

/// Encoder settings for the transcode policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeConfig {
    /// Container written to the destination
    pub target_format: AnimFormat,

    /// Output quality (0-100), WebP only
    pub quality: u8,

    /// Lossless WebP encoding
    pub lossless: bool,

    /// Near-lossless WebP encoding
    pub near_lossless: bool,

    /// Sharp RGB to YUV conversion for WebP
    pub smart_subsample: bool,

    /// Compression effort: 0-6 for WebP, 0-10 for GIF
    pub effort: u8,

    /// Palette size for GIF output (None = derived from the source palette)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<u16>,

    /// Total number of plays, 0 = forever (None = keep the source value)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<u16>,

    /// Delay applied to every frame in milliseconds (None = keep source delays)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u32>,

    /// Always write `target_format`, even when the source container differs.
    /// When false the source container is kept.
    pub force: bool,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self::webp()
    }
}

impl TranscodeConfig {
    /// Lossy animated WebP at quality 60, effort 4
    pub fn webp() -> Self {
        Self {
            target_format: AnimFormat::WebP,
            quality: 60,
            lossless: false,
            near_lossless: false,
            smart_subsample: false,
            effort: 4,
            colors: None,
            loop_count: None,
            delay_ms: None,
            force: true,
        }
    }

    /// Palette GIF at effort 7
    pub fn gif() -> Self {
        Self {
            target_format: AnimFormat::Gif,
            effort: 7,
            ..Self::webp()
        }
    }

    /// Set the output quality
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Set the encoder effort
    pub fn effort(mut self, effort: u8) -> Self {
        self.effort = effort;
        self
    }

    /// Set an explicit palette size
    pub fn colors(mut self, colors: u16) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.quality > 100 {
            return Err(AnimBatchError::invalid_parameters(
                format!("Quality must be between 0-100, got {}", self.quality)
            ));
        }

        let max_effort = self.target_format.max_effort();
        if self.effort > max_effort {
            return Err(AnimBatchError::invalid_parameters(format!(
                "Effort for {} must be between 0-{}, got {}",
                self.target_format, max_effort, self.effort
            )));
        }

        if let Some(colors) = self.colors {
            if !(2..=256).contains(&colors) {
                return Err(AnimBatchError::invalid_parameters(
                    format!("Colors must be between 2-256, got {}", colors)
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_bounds_validation() {
        assert!(ResizeConfig::new(100, 100).validate().is_ok());
        assert!(ResizeConfig::new(0, 100).validate().is_err());
        assert!(ResizeConfig::new(100, MAX_DIMENSION + 1).validate().is_err());
    }

    #[test]
    fn test_transcode_validation() {
        assert!(TranscodeConfig::webp().validate().is_ok());
        assert!(TranscodeConfig::gif().validate().is_ok());

        assert!(TranscodeConfig::webp().quality(101).validate().is_err());
        // 7 is a valid GIF effort but out of range for WebP
        assert!(TranscodeConfig::webp().effort(7).validate().is_err());
        assert!(TranscodeConfig::gif().effort(10).validate().is_ok());

        assert!(TranscodeConfig::gif().colors(1).validate().is_err());
        assert!(TranscodeConfig::gif().colors(16).validate().is_ok());
    }

    #[test]
    fn test_policy_tagging() {
        let policy = TransformPolicy::Resize(ResizeConfig::new(64, 48));
        let toml_str = toml::to_string(&policy).unwrap();
        assert!(toml_str.contains("type = \"resize\""));
        assert_eq!(policy.name(), "resize");
    }
}
