//! Fully decoded animated sequences

use std::io::Cursor;
use image::{AnimationDecoder, Frames, RgbaImage};
use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use tracing::debug;

use crate::config::AnimFormat;
use crate::error::{Result, AnimBatchError};
use crate::processing::formats::detect_format_from_header;
use crate::processing::metadata::{read_container_info, ContainerInfo, ImageMetadata};

/// One composited frame of an animation
#[derive(Debug, Clone)]
pub struct AnimFrame {
    pub image: RgbaImage,
    pub delay_ms: u32,
}

/// Every frame of an animation held in memory, plus container information
#[derive(Debug, Clone)]
pub struct AnimatedImage {
    pub format: AnimFormat,
    pub frames: Vec<AnimFrame>,
    pub info: ContainerInfo,
}

impl AnimatedImage {
    /// Decode all pages of an encoded GIF or WebP
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let format = detect_format_from_header(bytes)?;
        let info = read_container_info(bytes, format)?;

        let frames = match format {
            AnimFormat::Gif => {
                let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(decode_error)?;
                collect(decoder.into_frames())?
            }
            AnimFormat::WebP => {
                let decoder = WebPDecoder::new(Cursor::new(bytes)).map_err(decode_error)?;
                collect(decoder.into_frames())?
            }
        };

        if frames.is_empty() {
            return Err(AnimBatchError::source_unreadable("Animation has no frames", None));
        }

        debug!("Decoded {} {} frames", frames.len(), format);

        Ok(Self { format, frames, info })
    }

    /// Width and height of a single frame
    pub fn frame_dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(|frame| frame.image.dimensions())
            .unwrap_or((0, 0))
    }

    pub fn page_count(&self) -> u32 {
        self.frames.len() as u32
    }

    pub fn delays_ms(&self) -> Vec<u32> {
        self.frames.iter().map(|frame| frame.delay_ms).collect()
    }

    /// Describe this animation the way a metadata read reports it
    pub fn metadata(&self, file_size: u64) -> ImageMetadata {
        let (width, frame_height) = self.frame_dimensions();
        let pages = self.page_count();

        ImageMetadata {
            format: self.format,
            width,
            height: frame_height * pages,
            pages,
            page_height: self.info.page_height,
            loop_count: self.info.loop_count,
            delays_ms: self.delays_ms(),
            palette_bit_depth: self.info.palette_bit_depth,
            file_size,
        }
    }

    /// Replace every frame delay with `delay_ms`
    pub fn set_delay(&mut self, delay_ms: u32) {
        for frame in &mut self.frames {
            frame.delay_ms = delay_ms;
        }
    }
}

fn collect(frames: Frames<'_>) -> Result<Vec<AnimFrame>> {
    let frames = frames.collect_frames().map_err(decode_error)?;

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let delay_ms = if denom == 0 { 0 } else { numer / denom };
            AnimFrame {
                image: frame.into_buffer(),
                delay_ms,
            }
        })
        .collect())
}

fn decode_error(err: image::ImageError) -> AnimBatchError {
    AnimBatchError::source_unreadable(format!("Failed to decode frames: {}", err), None)
}
