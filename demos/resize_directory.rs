//! Resize every animation of a directory with the library API
//!
//! cargo run --example resize_directory -- <source> <destination>

use std::env;
use std::sync::Arc;

use animbatch::{init_logging, BatchPipeline, Config, ProcessingEngine, TransformPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info", false);

    // Start from the resize preset and point it at the given directories
    let mut config = Config::resize_preset();
    let mut args = env::args().skip(1);
    if let Some(source) = args.next() {
        config.pipeline.source_dir = source.into();
    }
    if let Some(destination) = args.next() {
        config.pipeline.destination_dir = destination.into();
    }
    config.pipeline.concurrency = 4;

    if let TransformPolicy::Resize(bounds) = &mut config.policy {
        bounds.max_width = 320;
        bounds.max_height = 240;
    }

    let pipeline = BatchPipeline::new(config, Arc::new(ProcessingEngine::new()));
    let result = pipeline.run().await?;

    for report in result.reports() {
        println!(
            "{} -> {}x{} ({} frames, {} bytes)",
            report.file_name, report.width, report.frame_height, report.pages, report.bytes_written
        );
    }
    for failure in result.failures() {
        println!("{} failed: {}", failure.item.file_name, failure.message);
    }

    result.print_summary();

    Ok(())
}
