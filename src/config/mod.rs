//! Configuration management for animbatch

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{Result, AnimBatchError};

pub mod policy;
pub use policy::*;

/// Default number of items in flight at once
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Main configuration structure
///
/// A `Config` is an immutable value for the duration of a run: the pipeline
/// takes it by reference and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directories and concurrency
    pub pipeline: PipelineConfig,

    /// Which transform every item goes through
    pub policy: TransformPolicy,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::resize_preset()
    }
}

/// Directory layout and admission window for a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory scanned (non-recursively) for source animations
    pub source_dir: PathBuf,

    /// Directory receiving the transformed files
    pub destination_dir: PathBuf,

    /// Maximum number of items processed at the same time
    pub concurrency: usize,
}

impl PipelineConfig {
    pub fn new<P: Into<PathBuf>>(source_dir: P, destination_dir: P) -> Self {
        Self {
            source_dir: source_dir.into(),
            destination_dir: destination_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the in-flight limit
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Animated container formats handled by the pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AnimFormat {
    Gif,
    WebP,
}

impl AnimFormat {
    /// Get file extension for this format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }

    /// Get MIME type for this format
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Highest accepted encoder effort for this format
    pub fn max_effort(self) -> u8 {
        match self {
            Self::Gif => 10,
            Self::WebP => 6,
        }
    }
}

impl std::fmt::Display for AnimFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl Config {
    /// Downsample animations in place of format: `./source-gif2gif` to `./destination-gif2gif`
    pub fn resize_preset() -> Self {
        Self {
            pipeline: PipelineConfig::new("source-gif2gif", "destination-gif2gif"),
            policy: TransformPolicy::Resize(ResizeConfig::default()),
            logging: LoggingConfig::default(),
        }
    }

    /// Re-encode animations as WebP: `./source` to `./destination`
    pub fn transcode_preset() -> Self {
        Self {
            pipeline: PipelineConfig::new("source", "destination"),
            policy: TransformPolicy::Transcode(TranscodeConfig::webp()),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| AnimBatchError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(AnimBatchError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let content = match extension.to_lowercase().as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| AnimBatchError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| AnimBatchError::config(format!("YAML serialization failed: {}", e)))?,
            _ => return Err(AnimBatchError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| AnimBatchError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            return Err(AnimBatchError::config(
                "Concurrency must be greater than 0"
            ));
        }

        if self.pipeline.source_dir == self.pipeline.destination_dir {
            return Err(AnimBatchError::config(
                "Source and destination directories must differ"
            ));
        }

        self.policy.validate()
            .map_err(|e| AnimBatchError::config(format!("Invalid policy: {}", e)))
    }
}
