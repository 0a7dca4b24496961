//! animbatch CLI - batch resize and transcode of animated GIF/WebP images

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::info;

use animbatch::parallel::ProgressUpdate;
use animbatch::{
    init_logging, AnimFormat, BatchPipeline, Config, ProcessingEngine, ProgressTracker,
    TranscodeConfig, TransformPolicy,
};

/// Exit code for runs that could not start
const EXIT_SETUP_ERROR: i32 = 1;

/// animbatch - Batch resizer and transcoder for animated images
#[derive(Parser)]
#[command(
    name = "animbatch",
    version,
    about = "Batch resize and transcode animated GIF and WebP images",
    long_about = "animbatch scans a source directory for animated GIF and WebP files and writes \
                  a resized or re-encoded copy of each one, under the same file name, to a \
                  destination directory. Files are processed concurrently; a file that fails \
                  is reported and never stops the rest of the batch."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print the batch report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Shrink animations to fit inside a bounding box, keeping their format
    Resize {
        #[command(flatten)]
        dirs: DirArgs,

        /// Maximum frame width in pixels
        #[arg(long, value_name = "PIXELS")]
        max_width: Option<u32>,

        /// Maximum frame height in pixels
        #[arg(long, value_name = "PIXELS")]
        max_height: Option<u32>,
    },
    /// Re-encode animations into another container format
    Transcode {
        #[command(flatten)]
        dirs: DirArgs,

        /// Output container
        #[arg(short, long, value_enum, value_name = "FORMAT")]
        format: Option<CliFormat>,

        /// Output quality (0-100, WebP only)
        #[arg(short, long, value_name = "QUALITY")]
        quality: Option<u8>,

        /// Encode WebP losslessly
        #[arg(long)]
        lossless: bool,

        /// Request near-lossless WebP
        #[arg(long)]
        near_lossless: bool,

        /// Use sharp RGB to YUV conversion for WebP
        #[arg(long)]
        smart_subsample: bool,

        /// Encoder effort (WebP 0-6, GIF 0-10)
        #[arg(short, long, value_name = "LEVEL")]
        effort: Option<u8>,

        /// GIF palette size (2-256); defaults to the source palette size
        #[arg(long, value_name = "COUNT")]
        colors: Option<u16>,

        /// Total number of plays for the output, 0 loops forever
        #[arg(long = "loop", value_name = "COUNT")]
        loop_count: Option<u16>,

        /// Replace every frame delay (milliseconds)
        #[arg(long = "delay", value_name = "MS")]
        delay_ms: Option<u32>,

        /// Keep the source container instead of converting
        #[arg(long)]
        keep_format: bool,
    },
    /// Run a batch described by a configuration file
    Run {
        /// Configuration file (.toml, .yaml)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Use YAML format instead of TOML
        #[arg(long)]
        yaml: bool,

        /// Write the transcode preset instead of the resize preset
        #[arg(long)]
        transcode: bool,
    },
    /// Validate configuration file
    CheckConfig {
        /// Configuration file to validate
        file: PathBuf,
    },
}

/// Directory and concurrency overrides shared by the batch commands
#[derive(Args)]
struct DirArgs {
    /// Source directory (scanned non-recursively)
    #[arg(short, long, value_name = "DIR")]
    source: Option<PathBuf>,

    /// Destination directory
    #[arg(short, long, value_name = "DIR")]
    destination: Option<PathBuf>,

    /// Maximum number of files processed at once
    #[arg(short, long, value_name = "COUNT")]
    concurrency: Option<usize>,
}

impl DirArgs {
    fn apply(self, config: &mut Config) {
        if let Some(source) = self.source {
            config.pipeline.source_dir = source;
        }
        if let Some(destination) = self.destination {
            config.pipeline.destination_dir = destination;
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency;
        }
    }
}

/// CLI-compatible container enum
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliFormat {
    Webp,
    Gif,
}

impl From<CliFormat> for AnimFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Webp => AnimFormat::WebP,
            CliFormat::Gif => AnimFormat::Gif,
        }
    }
}

/// How results and logs are presented
struct OutputOptions {
    json: bool,
    verbose: bool,
    quiet: bool,
}

impl OutputOptions {
    fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            configured
        }
    }

    fn show_progress(&self) -> bool {
        !self.json && !self.quiet
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = OutputOptions {
        json: cli.json,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let code = match execute(cli.command, &output).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            EXIT_SETUP_ERROR
        }
    };

    process::exit(code);
}

/// Run a command and return the process exit code
async fn execute(command: Commands, output: &OutputOptions) -> anyhow::Result<i32> {
    match command {
        Commands::Resize { dirs, max_width, max_height } => {
            let mut config = Config::resize_preset();
            if let TransformPolicy::Resize(bounds) = &mut config.policy {
                bounds.max_width = max_width.unwrap_or(bounds.max_width);
                bounds.max_height = max_height.unwrap_or(bounds.max_height);
            }
            dirs.apply(&mut config);
            run_batch(config, output).await
        }
        Commands::Transcode {
            dirs,
            format,
            quality,
            lossless,
            near_lossless,
            smart_subsample,
            effort,
            colors,
            loop_count,
            delay_ms,
            keep_format,
        } => {
            let mut transcode = match format.map(AnimFormat::from) {
                Some(AnimFormat::Gif) => TranscodeConfig::gif(),
                _ => TranscodeConfig::webp(),
            };
            transcode.quality = quality.unwrap_or(transcode.quality);
            transcode.effort = effort.unwrap_or(transcode.effort);
            transcode.lossless |= lossless;
            transcode.near_lossless |= near_lossless;
            transcode.smart_subsample |= smart_subsample;
            transcode.colors = colors;
            transcode.loop_count = loop_count;
            transcode.delay_ms = delay_ms;
            transcode.force = !keep_format;

            let mut config = Config::transcode_preset();
            config.policy = TransformPolicy::Transcode(transcode);
            dirs.apply(&mut config);
            run_batch(config, output).await
        }
        Commands::Run { config: path } => {
            let config = Config::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            run_batch(config, output).await
        }
        Commands::ExampleConfig { output: path, yaml, transcode } => {
            generate_example_config(path, yaml, transcode)?;
            Ok(0)
        }
        Commands::CheckConfig { file } => {
            check_config(&file)?;
            Ok(0)
        }
    }
}

/// Run one batch and report it; 0 when every file succeeded, 2 otherwise
async fn run_batch(config: Config, output: &OutputOptions) -> anyhow::Result<i32> {
    init_logging(output.log_level(&config.logging.level), config.logging.json_format);

    info!(
        "Running {} batch from {:?} to {:?}",
        config.policy.name(),
        config.pipeline.source_dir,
        config.pipeline.destination_dir
    );

    let pipeline = BatchPipeline::new(config, Arc::new(ProcessingEngine::new()));
    let progress = if output.show_progress() {
        Some(spawn_progress_bar(pipeline.progress()))
    } else {
        None
    };

    let result = pipeline.run().await.context("Batch could not be started")?;

    if let Some(handle) = progress {
        let _ = handle.await;
    }

    let state = pipeline.progress().get_state();
    info!(
        "{}, {} (peak concurrency {})",
        state.status_text(),
        state.speed_text(),
        state.peak_in_flight
    );

    if output.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !output.quiet {
        result.print_summary();
    }

    Ok(result.exit_code())
}

/// Drive a progress bar from the tracker's update stream
fn spawn_progress_bar(tracker: Arc<ProgressTracker>) -> JoinHandle<()> {
    let mut receiver = tracker.subscribe();
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(ProgressUpdate::Started { total_items }) => bar.set_length(total_items as u64),
                Ok(ProgressUpdate::ItemStarted { label }) => {
                    bar.set_message(format!("{} (eta {})", label, tracker.get_state().eta_text()));
                }
                Ok(ProgressUpdate::ItemCompleted { label, success, .. }) => {
                    if !success {
                        bar.println(format!("{} {}", style("✗").red(), label));
                    }
                    bar.inc(1);
                }
                Ok(ProgressUpdate::BatchCompleted { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            }
        }
        bar.finish_and_clear();
    })
}

/// Generate example configuration file
fn generate_example_config(output: Option<PathBuf>, yaml: bool, transcode: bool) -> anyhow::Result<()> {
    let path = output.unwrap_or_else(|| {
        PathBuf::from(if yaml { "animbatch.yaml" } else { "animbatch.toml" })
    });
    let config = if transcode {
        Config::transcode_preset()
    } else {
        Config::resize_preset()
    };
    config.to_file(&path)?;

    println!(
        "{}: Generated example {} configuration: {}",
        style("Success").green().bold(),
        config.policy.name(),
        path.display()
    );

    Ok(())
}

/// Validate configuration file
fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.validate()?;

    println!("{}: Configuration file is valid", style("Success").green().bold());
    println!("  Policy: {}", config.policy.name());
    println!("  Source: {}", config.pipeline.source_dir.display());
    println!("  Destination: {}", config.pipeline.destination_dir.display());
    println!("  Concurrency: {}", config.pipeline.concurrency);

    Ok(())
}
