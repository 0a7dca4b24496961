//! Descriptive metadata read from animated sources

use std::io::Cursor;
use serde::Serialize;

use crate::config::AnimFormat;
use crate::error::{Result, AnimBatchError};

/// Palette size used when the source reports no palette depth
pub const DEFAULT_COLOR_COUNT: u16 = 256;

/// Attributes of a source animation, read fresh for every work item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    /// Actual container format (sniffed, not taken from the extension)
    pub format: AnimFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Height of all pages stacked vertically
    pub height: u32,
    /// Number of frames
    pub pages: u32,
    /// Per-page height as reported by the container (GIF only)
    pub page_height: Option<u32>,
    /// Total number of plays, 0 = forever
    pub loop_count: u16,
    /// Display delay of every frame in milliseconds
    pub delays_ms: Vec<u32>,
    /// Bits per palette index (GIF only)
    pub palette_bit_depth: Option<u8>,
    /// Source file size in bytes
    pub file_size: u64,
}

impl ImageMetadata {
    /// Height of a single frame.
    ///
    /// Uses the reported page height when present, otherwise divides the
    /// stacked height by the page count.
    pub fn frame_height(&self) -> u32 {
        match self.page_height {
            Some(height) if height > 0 => height,
            _ => self.height / self.pages.max(1),
        }
    }

    /// Palette size to target when re-encoding this source
    pub fn color_count(&self) -> u16 {
        color_count_for(self.palette_bit_depth)
    }
}

/// `2^bits` for a positive palette depth, 256 otherwise
pub fn color_count_for(palette_bit_depth: Option<u8>) -> u16 {
    match palette_bit_depth {
        Some(bits) if bits > 0 => 1u16 << bits.min(8),
        _ => DEFAULT_COLOR_COUNT,
    }
}

/// Container-level fields that frame decoding does not expose
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInfo {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub page_height: Option<u32>,
    pub loop_count: u16,
    pub palette_bit_depth: Option<u8>,
}

/// Read loop count, canvas and palette information from an encoded file
pub fn read_container_info(bytes: &[u8], format: AnimFormat) -> Result<ContainerInfo> {
    match format {
        AnimFormat::Gif => read_gif_info(bytes),
        AnimFormat::WebP => read_webp_info(bytes),
    }
}

fn read_gif_info(bytes: &[u8]) -> Result<ContainerInfo> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);

    let mut decoder = options
        .read_info(Cursor::new(bytes))
        .map_err(|e| AnimBatchError::source_unreadable(format!("Invalid GIF header: {}", e), None))?;

    let canvas_width = u32::from(decoder.width());
    let canvas_height = u32::from(decoder.height());
    let global_colors = decoder.global_palette().map(|palette| palette.len() / 3);

    // Reading the first frame descriptor walks past the application
    // extension that carries the loop count.
    let local_colors = decoder
        .next_frame_info()
        .map_err(|e| AnimBatchError::source_unreadable(format!("Invalid GIF frame: {}", e), None))?
        .and_then(|frame| frame.palette.as_ref().map(|palette| palette.len() / 3));

    let loop_count = plays_from_repeat(decoder.repeat());

    Ok(ContainerInfo {
        canvas_width,
        canvas_height,
        page_height: Some(canvas_height),
        loop_count,
        palette_bit_depth: global_colors.or(local_colors).and_then(palette_depth),
    })
}

fn read_webp_info(bytes: &[u8]) -> Result<ContainerInfo> {
    let decoder = image_webp::WebPDecoder::new(Cursor::new(bytes))
        .map_err(|e| AnimBatchError::source_unreadable(format!("Invalid WebP container: {}", e), None))?;

    let (canvas_width, canvas_height) = decoder.dimensions();
    let loop_count = match decoder.loop_count() {
        image_webp::LoopCount::Forever => 0,
        image_webp::LoopCount::Times(count) => count.get(),
    };

    Ok(ContainerInfo {
        canvas_width,
        canvas_height,
        page_height: None,
        loop_count,
        palette_bit_depth: None,
    })
}

/// Total plays for a GIF repeat setting.
///
/// A GIF without a NETSCAPE extension reads as `Finite(0)` and plays once;
/// `Finite(n)` repeats n times after the first play.
pub fn plays_from_repeat(repeat: gif::Repeat) -> u16 {
    match repeat {
        gif::Repeat::Infinite => 0,
        gif::Repeat::Finite(repeats) => repeats.saturating_add(1),
    }
}

/// GIF repeat setting for a total play count; `None` means no extension
pub fn repeat_for_plays(plays: u16) -> Option<gif::Repeat> {
    match plays {
        0 => Some(gif::Repeat::Infinite),
        1 => None,
        plays => Some(gif::Repeat::Finite(plays - 1)),
    }
}

/// Bits needed to index a palette of `colors` entries
fn palette_depth(colors: usize) -> Option<u8> {
    match colors {
        0 => None,
        1 => Some(1),
        n => Some((usize::BITS - (n - 1).leading_zeros()) as u8),
    }
}
