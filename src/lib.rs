//! animbatch - Batch resizer and transcoder for animated images
//!
//! Reads a source directory, keeps the visible `gif`/`webp` files, and runs
//! every one of them through a resize or transcode policy with bounded
//! concurrency. A failing file never stops the rest of the batch; each file
//! ends up as one entry of the [`BatchResult`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use animbatch::{BatchPipeline, Config, ProcessingEngine};
//!
//! # async fn run() -> animbatch::Result<()> {
//! let pipeline = BatchPipeline::new(Config::resize_preset(), Arc::new(ProcessingEngine::new()));
//! let result = pipeline.run().await?;
//!
//! println!("{} of {} files converted", result.succeeded(), result.total());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod processing;
pub mod parallel;

// Re-export commonly used types
pub use config::{AnimFormat, Config, ResizeConfig, TranscodeConfig, TransformPolicy};
pub use error::{Result, AnimBatchError, ErrorKind};
pub use processing::{ImageTransform, ProcessingEngine, TransformReport, WorkItem};
pub use parallel::{BatchPipeline, BatchResult, ItemOutcome, ProgressTracker};

use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging to stderr.
///
/// `level` is an `EnvFilter` directive such as `"info"`; `RUST_LOG` takes
/// precedence when set. Stdout stays free for reports. Calling this more
/// than once keeps the first subscriber.
pub fn init_logging(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if installed.is_ok() {
        debug!("animbatch v{} logging initialized", VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging("debug", false);
        init_logging("not a [valid filter", true);
    }
}
