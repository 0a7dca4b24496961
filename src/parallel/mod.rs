//! Batch pipeline: directory scan, filtering, bounded dispatch and aggregation

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use console::style;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AnimBatchError, ErrorKind, Result};
use crate::processing::{duration_ms, filter_entries, ImageTransform, TransformReport, WorkItem};

pub mod dispatcher;
pub mod progress;

pub use dispatcher::*;
pub use progress::*;

/// Runs one configured batch against an [`ImageTransform`]
pub struct BatchPipeline {
    config: Config,
    transform: Arc<dyn ImageTransform>,
    progress_tracker: Arc<ProgressTracker>,
}

impl BatchPipeline {
    /// Create a new pipeline. The configuration is fixed for the whole run.
    pub fn new(config: Config, transform: Arc<dyn ImageTransform>) -> Self {
        Self {
            config,
            transform,
            progress_tracker: Arc::new(ProgressTracker::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tracker observing the dispatch; subscribe before calling [`run`](Self::run)
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress_tracker)
    }

    /// Process every eligible file of the source directory.
    ///
    /// Setup problems (invalid configuration, directories that cannot be
    /// created or listed) return `Err`. Per-file problems never do; they
    /// become [`ItemOutcome::Failed`] entries in the result.
    pub async fn run(&self) -> Result<BatchResult> {
        let start_time = Instant::now();
        self.config.validate()?;

        let pipeline = &self.config.pipeline;
        info!(
            "Starting {} batch: {:?} -> {:?} (concurrency {})",
            self.config.policy.name(),
            pipeline.source_dir,
            pipeline.destination_dir,
            pipeline.concurrency
        );

        self.prepare_directories().await?;
        let items = self.list_items().await?;
        info!("Found {} files to process", items.len());

        self.progress_tracker.start(items.len());

        let transform = Arc::clone(&self.transform);
        let policy = Arc::new(self.config.policy.clone());
        let tracker = Arc::clone(&self.progress_tracker);
        let results = dispatch(
            items.clone(),
            pipeline.concurrency,
            Some(Arc::clone(&self.progress_tracker)),
            move |item: WorkItem| {
                let transform = Arc::clone(&transform);
                let policy = Arc::clone(&policy);
                let tracker = Arc::clone(&tracker);
                async move {
                    let report = transform.apply(&item, &policy).await?;
                    tracker.add_bytes(report.bytes_written);
                    debug!("Wrote {} ({} bytes)", item.file_name, report.bytes_written);
                    Ok::<_, AnimBatchError>(report)
                }
            },
        )
        .await;

        let outcomes = items
            .into_iter()
            .zip(results)
            .map(|(item, result)| match result {
                Ok(report) => ItemOutcome::Succeeded(report),
                Err(error) => {
                    warn!("Failed to process {}: {}", item.file_name, error);
                    ItemOutcome::Failed(ItemFailure::new(item, &error))
                }
            })
            .collect();

        self.progress_tracker.complete_batch();

        Ok(BatchResult {
            outcomes,
            elapsed: start_time.elapsed(),
        })
    }

    /// Create the source and destination directories when absent
    pub async fn prepare_directories(&self) -> Result<()> {
        for dir in [&self.config.pipeline.source_dir, &self.config.pipeline.destination_dir] {
            fs::create_dir_all(dir).await
                .map_err(|e| setup_error(dir, "create directory", e))?;
        }
        Ok(())
    }

    /// List eligible files of the source directory as work items.
    ///
    /// The scan is not recursive. Entries that are not regular files (or
    /// symlinks to one) are dropped before name filtering.
    pub async fn list_items(&self) -> Result<Vec<WorkItem>> {
        let source_dir = &self.config.pipeline.source_dir;
        let mut entries = fs::read_dir(source_dir).await
            .map_err(|e| setup_error(source_dir, "read directory", e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await
            .map_err(|e| setup_error(source_dir, "read directory", e))?
        {
            if !is_regular_file(&entry).await {
                debug!("Skipping non-file entry {:?}", entry.path());
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!("Skipping file with non UTF-8 name {:?}", raw),
            }
        }
        names.sort();

        let selected = filter_entries(&names);
        debug!("{} of {} entries selected", selected.len(), names.len());
        warn_on_duplicates(&selected);

        Ok(selected
            .into_iter()
            .map(|name| WorkItem::new(name, source_dir, &self.config.pipeline.destination_dir))
            .collect())
    }
}

async fn is_regular_file(entry: &fs::DirEntry) -> bool {
    match entry.file_type().await {
        Ok(file_type) if file_type.is_symlink() => fs::metadata(entry.path())
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false),
        Ok(file_type) => file_type.is_file(),
        Err(_) => false,
    }
}

/// Names differing only by case collide on case-insensitive filesystems
fn warn_on_duplicates(names: &[String]) {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in names {
        if let Some(previous) = seen.insert(name.to_lowercase(), name) {
            warn!(
                "Files {:?} and {:?} may write the same destination file",
                previous, name
            );
        }
    }
}

fn setup_error(dir: &Path, action: &str, err: std::io::Error) -> AnimBatchError {
    AnimBatchError::IoError(std::io::Error::new(
        err.kind(),
        format!("Failed to {} {}: {}", action, dir.display(), err),
    ))
}

/// Why a single item failed
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item: WorkItem,
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemFailure {
    pub fn new(item: WorkItem, error: &AnimBatchError) -> Self {
        Self {
            item,
            kind: error.kind(),
            message: error.user_message(),
        }
    }
}

/// Terminal state of one work item
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded(TransformReport),
    Failed(ItemFailure),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn file_name(&self) -> &str {
        match self {
            Self::Succeeded(report) => &report.file_name,
            Self::Failed(failure) => &failure.item.file_name,
        }
    }
}

/// Result of a batch, one outcome per selected file in listing order
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub outcomes: Vec<ItemOutcome>,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn reports(&self) -> impl Iterator<Item = &TransformReport> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            ItemOutcome::Succeeded(report) => Some(report),
            ItemOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            ItemOutcome::Failed(failure) => Some(failure),
            ItemOutcome::Succeeded(_) => None,
        })
    }

    /// Total size of the sources that were converted successfully
    pub fn total_source_bytes(&self) -> u64 {
        self.reports().map(|report| report.source_bytes).sum()
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.reports().map(|report| report.bytes_written).sum()
    }

    /// Get compression ratio
    pub fn compression_ratio(&self) -> f64 {
        let written = self.total_bytes_written();
        if written == 0 {
            return 1.0;
        }
        self.total_source_bytes() as f64 / written as f64
    }

    /// Get size reduction percentage
    pub fn size_reduction(&self) -> f64 {
        let source = self.total_source_bytes();
        if source == 0 {
            return 0.0;
        }
        let reduction = source.saturating_sub(self.total_bytes_written());
        (reduction as f64 / source as f64) * 100.0
    }

    /// Process exit code: 0 when nothing failed, 2 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 { 0 } else { 2 }
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!();
        println!("{}", style("Batch Summary:").bold());
        println!("  {}: {}", style("Processed").green(), self.succeeded());
        if self.failed() > 0 {
            println!("  {}: {}", style("Failed").red(), self.failed());
        }
        println!("  {}: {:.2}s", style("Duration").blue(), self.elapsed.as_secs_f64());

        if self.succeeded() > 0 {
            println!(
                "  {}: {:.2}MB → {:.2}MB",
                style("Size").cyan(),
                self.total_source_bytes() as f64 / 1024.0 / 1024.0,
                self.total_bytes_written() as f64 / 1024.0 / 1024.0
            );
            println!(
                "  {}: {:.1}x ({:.1}% reduction)",
                style("Compression").cyan(),
                self.compression_ratio(),
                self.size_reduction()
            );
        }

        if self.failed() > 0 {
            println!();
            println!("{}", style("Errors:").red().bold());
            for failure in self.failures() {
                println!("  {}: {}", failure.item.file_name, failure.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use crate::config::{AnimFormat, PipelineConfig, ResizeConfig, TranscodeConfig, TransformPolicy};
    use crate::processing::ImageMetadata;

    /// Records calls and fails any file whose name contains "bad"
    #[derive(Default)]
    struct FakeTransform {
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransform {
        fn report(item: &WorkItem, format: AnimFormat) -> TransformReport {
            TransformReport {
                file_name: item.file_name.clone(),
                destination_path: item.destination_path.clone(),
                format,
                width: 10,
                frame_height: 10,
                pages: 2,
                source_bytes: 200,
                bytes_written: 100,
                processing_time: Duration::ZERO,
            }
        }

        fn outcome(&self, item: &WorkItem, format: AnimFormat) -> Result<TransformReport> {
            self.calls.lock().unwrap().push(item.file_name.clone());
            if item.file_name.contains("bad") {
                return Err(AnimBatchError::source_unreadable("corrupt", Some(item.source_path.clone())));
            }
            std::fs::write(&item.destination_path, b"out")?;
            Ok(Self::report(item, format))
        }
    }

    #[async_trait]
    impl ImageTransform for FakeTransform {
        async fn probe(&self, _path: &Path) -> Result<ImageMetadata> {
            Err(AnimBatchError::source_unreadable("not used", None))
        }

        async fn resize(&self, item: &WorkItem, _bounds: &ResizeConfig) -> Result<TransformReport> {
            self.outcome(item, AnimFormat::Gif)
        }

        async fn transcode(&self, item: &WorkItem, config: &TranscodeConfig) -> Result<TransformReport> {
            self.outcome(item, config.target_format)
        }
    }

    fn config_in(dir: &TempDir, policy: TransformPolicy) -> Config {
        Config {
            pipeline: PipelineConfig::new(dir.path().join("src"), dir.path().join("dst")).concurrency(2),
            policy,
            ..Config::default()
        }
    }

    fn touch(dir: &Path, names: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        for name in names {
            std::fs::write(dir.join(name), b"data").unwrap();
        }
    }

    #[tokio::test]
    async fn test_empty_source_creates_destination() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, TransformPolicy::Resize(ResizeConfig::default()));
        let pipeline = BatchPipeline::new(config, Arc::new(FakeTransform::default()));

        let result = pipeline.run().await.unwrap();
        assert_eq!(result.total(), 0);
        assert_eq!(result.exit_code(), 0);
        assert!(dir.path().join("src").is_dir());
        assert!(dir.path().join("dst").is_dir());
    }

    #[tokio::test]
    async fn test_only_eligible_files_are_dispatched() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        touch(&source, &["b.webp", "a.gif", ".hidden.gif", "c.txt", "README"]);
        std::fs::create_dir_all(source.join("nested.gif")).unwrap();

        let fake = Arc::new(FakeTransform::default());
        let config = config_in(&dir, TransformPolicy::Resize(ResizeConfig::default()));
        let result = BatchPipeline::new(config, fake.clone()).run().await.unwrap();

        let names: Vec<&str> = result.outcomes.iter().map(|o| o.file_name()).collect();
        assert_eq!(names, vec!["a.gif", "b.webp"]);
        let mut calls = fake.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["a.gif", "b.webp"]);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_siblings() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("src"), &["a.gif", "bad.gif", "c.webp", "d.GIF"]);

        let config = config_in(&dir, TransformPolicy::Transcode(TranscodeConfig::webp()));
        let pipeline = BatchPipeline::new(config, Arc::new(FakeTransform::default()));
        let tracker = pipeline.progress();
        let result = pipeline.run().await.unwrap();

        assert_eq!(result.total(), 4);
        assert_eq!(result.succeeded(), 3);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.exit_code(), 2);

        let failure = result.failures().next().unwrap();
        assert_eq!(failure.item.file_name, "bad.gif");
        assert_eq!(failure.kind, ErrorKind::SourceUnreadable);

        // Successful items wrote their destination under the source name
        for name in ["a.gif", "c.webp", "d.GIF"] {
            assert!(dir.path().join("dst").join(name).exists());
        }
        assert!(!dir.path().join("dst").join("bad.gif").exists());

        let state = tracker.get_state();
        assert!(state.peak_in_flight <= 2);
        assert_eq!(state.bytes_written, 300);
    }

    #[tokio::test]
    async fn test_invalid_config_is_setup_error() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, TransformPolicy::Resize(ResizeConfig::default()));
        config.pipeline.concurrency = 0;

        let err = BatchPipeline::new(config, Arc::new(FakeTransform::default()))
            .run()
            .await
            .unwrap_err();
        assert!(!err.is_item_failure());
    }

    #[tokio::test]
    async fn test_unlistable_source_is_setup_error() {
        let dir = TempDir::new().unwrap();
        // A regular file where the source directory should be
        let blocker = dir.path().join("src");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let config = config_in(&dir, TransformPolicy::Resize(ResizeConfig::default()));
        let err = BatchPipeline::new(config, Arc::new(FakeTransform::default()))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, AnimBatchError::IoError(_)));
    }

    #[test]
    fn test_batch_result_statistics() {
        let item = WorkItem::new("a.gif", Path::new("in"), Path::new("out"));
        let failed = WorkItem::new("b.gif", Path::new("in"), Path::new("out"));
        let result = BatchResult {
            outcomes: vec![
                ItemOutcome::Succeeded(FakeTransform::report(&item, AnimFormat::WebP)),
                ItemOutcome::Failed(ItemFailure::new(
                    failed,
                    &AnimBatchError::transform("encode", Some(PathBuf::from("in/b.gif"))),
                )),
            ],
            elapsed: Duration::from_millis(1500),
        };

        assert_eq!(result.compression_ratio(), 2.0);
        assert_eq!(result.size_reduction(), 50.0);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["outcomes"][0]["status"], "succeeded");
        assert_eq!(json["outcomes"][0]["format"], "webp");
        assert_eq!(json["outcomes"][1]["status"], "failed");
        assert_eq!(json["outcomes"][1]["kind"], "transform_failure");
    }
}
