//! Whole-animation encoders producing in-memory buffers

use std::borrow::Cow;
use color_quant::NeuQuant;
use webp_animation::{
    AnimParams, Encoder as WebpEncoder, EncoderOptions, EncodingConfig, EncodingType,
    LossyEncodingConfig,
};

use crate::config::{AnimFormat, TranscodeConfig};
use crate::error::{Result, AnimBatchError};
use crate::processing::animation::{AnimFrame, AnimatedImage};
use crate::processing::metadata::{repeat_for_plays, ImageMetadata, DEFAULT_COLOR_COUNT};

/// GIF encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GifOptions {
    /// Palette entries per frame (2-256)
    pub colors: u16,
    /// Total plays, 0 = forever
    pub loop_count: u16,
    /// 0-10, higher samples more pixels when building palettes
    pub effort: u8,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            colors: DEFAULT_COLOR_COUNT,
            loop_count: 0,
            effort: 7,
        }
    }
}

/// Animated WebP encoder settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebpOptions {
    pub quality: u8,
    pub lossless: bool,
    pub near_lossless: bool,
    pub smart_subsample: bool,
    /// 0-6, maps to the libwebp method
    pub effort: u8,
    /// Total plays, 0 = forever
    pub loop_count: u16,
}

impl Default for WebpOptions {
    fn default() -> Self {
        Self {
            quality: 75,
            lossless: false,
            near_lossless: false,
            smart_subsample: false,
            effort: 4,
            loop_count: 0,
        }
    }
}

/// Encoder selection plus its settings
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOptions {
    Gif(GifOptions),
    WebP(WebpOptions),
}

impl EncodeOptions {
    pub fn format(&self) -> AnimFormat {
        match self {
            Self::Gif(_) => AnimFormat::Gif,
            Self::WebP(_) => AnimFormat::WebP,
        }
    }

    /// Encoder defaults for `format`, keeping the source loop count
    pub fn preserving(format: AnimFormat, meta: &ImageMetadata) -> Self {
        match format {
            AnimFormat::Gif => Self::Gif(GifOptions {
                loop_count: meta.loop_count,
                ..GifOptions::default()
            }),
            AnimFormat::WebP => Self::WebP(WebpOptions {
                loop_count: meta.loop_count,
                ..WebpOptions::default()
            }),
        }
    }

    /// Merge transcode settings with what the source reports
    pub fn for_transcode(config: &TranscodeConfig, format: AnimFormat, meta: &ImageMetadata) -> Self {
        let loop_count = config.loop_count.unwrap_or(meta.loop_count);
        let effort = config.effort.min(format.max_effort());

        match format {
            AnimFormat::Gif => Self::Gif(GifOptions {
                colors: config.colors.unwrap_or_else(|| meta.color_count()),
                loop_count,
                effort,
            }),
            AnimFormat::WebP => Self::WebP(WebpOptions {
                quality: config.quality,
                lossless: config.lossless,
                near_lossless: config.near_lossless,
                smart_subsample: config.smart_subsample,
                effort,
                loop_count,
            }),
        }
    }
}

/// Encode every frame of `anim` into a single buffer
pub fn encode(anim: &AnimatedImage, options: &EncodeOptions) -> Result<Vec<u8>> {
    match options {
        EncodeOptions::Gif(gif_options) => encode_gif(anim, gif_options),
        EncodeOptions::WebP(webp_options) => encode_webp(anim, webp_options),
    }
}

fn encode_gif(anim: &AnimatedImage, options: &GifOptions) -> Result<Vec<u8>> {
    let (width, height) = anim.frame_dimensions();
    let width = u16::try_from(width)
        .map_err(|_| AnimBatchError::transform(format!("Width {} exceeds GIF limits", width), None))?;
    let height = u16::try_from(height)
        .map_err(|_| AnimBatchError::transform(format!("Height {} exceeds GIF limits", height), None))?;

    let sample_factor = sample_factor_for(options.effort);
    let colors = options.colors.clamp(2, DEFAULT_COLOR_COUNT);

    let mut buffer = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut buffer, width, height, &[]).map_err(gif_error)?;

        if let Some(repeat) = repeat_for_plays(options.loop_count) {
            encoder.set_repeat(repeat).map_err(gif_error)?;
        }

        for frame in &anim.frames {
            let gif_frame = quantize_frame(frame, width, height, colors, sample_factor);
            encoder.write_frame(&gif_frame).map_err(gif_error)?;
        }
    }

    Ok(buffer)
}

/// Build an indexed frame with its own palette of at most `colors` entries.
///
/// Pixels below half opacity map to a reserved transparent index.
fn quantize_frame(
    frame: &AnimFrame,
    width: u16,
    height: u16,
    colors: u16,
    sample_factor: i32,
) -> gif::Frame<'static> {
    let pixels = frame.image.as_raw();
    let has_transparency = pixels.chunks_exact(4).any(|p| p[3] < 128);
    let palette_size = if has_transparency { colors - 1 } else { colors }.max(2);

    let quantizer = NeuQuant::new(sample_factor, usize::from(palette_size), pixels);
    let mut palette = quantizer.color_map_rgb();

    let transparent = if has_transparency {
        let index = (palette.len() / 3) as u8;
        palette.extend_from_slice(&[0, 0, 0]);
        Some(index)
    } else {
        None
    };

    let indices: Vec<u8> = pixels
        .chunks_exact(4)
        .map(|p| match transparent {
            Some(index) if p[3] < 128 => index,
            _ => quantizer.index_of(p) as u8,
        })
        .collect();

    gif::Frame {
        width,
        height,
        buffer: Cow::Owned(indices),
        palette: Some(palette),
        transparent,
        delay: centiseconds(frame.delay_ms),
        dispose: gif::DisposalMethod::Background,
        ..gif::Frame::default()
    }
}

fn encode_webp(anim: &AnimatedImage, options: &WebpOptions) -> Result<Vec<u8>> {
    let dimensions = anim.frame_dimensions();

    // The binding has no separate near-lossless level, so both go lossless
    let encoding_type = if options.lossless || options.near_lossless {
        EncodingType::Lossless
    } else {
        EncodingType::Lossy(LossyEncodingConfig {
            use_sharp_yuv: options.smart_subsample,
            ..LossyEncodingConfig::default()
        })
    };

    let encoder_options = EncoderOptions {
        anim_params: AnimParams {
            loop_count: i32::from(options.loop_count),
        },
        encoding_config: Some(EncodingConfig {
            encoding_type,
            quality: f32::from(options.quality),
            method: usize::from(options.effort),
        }),
        ..EncoderOptions::default()
    };

    let mut encoder = WebpEncoder::new_with_options(dimensions, encoder_options).map_err(webp_error)?;

    // Timestamps must increase, so zero delays advance by one millisecond
    let mut timestamp_ms: i32 = 0;
    for frame in &anim.frames {
        encoder.add_frame(frame.image.as_raw(), timestamp_ms).map_err(webp_error)?;
        let delay = i32::try_from(frame.delay_ms.max(1)).unwrap_or(i32::MAX);
        timestamp_ms = timestamp_ms.saturating_add(delay);
    }

    let data = encoder.finalize(timestamp_ms).map_err(webp_error)?;
    Ok(data.to_vec())
}

/// NeuQuant sample factor: effort 10 samples every pixel, effort 0 every 30th
fn sample_factor_for(effort: u8) -> i32 {
    let effort = i32::from(effort.min(10));
    30 - effort * 29 / 10
}

fn centiseconds(delay_ms: u32) -> u16 {
    u16::try_from(delay_ms.saturating_add(5) / 10).unwrap_or(u16::MAX)
}

fn gif_error(err: gif::EncodingError) -> AnimBatchError {
    AnimBatchError::transform(format!("GIF encoding failed: {}", err), None)
}

fn webp_error(err: webp_animation::Error) -> AnimBatchError {
    AnimBatchError::transform(format!("WebP encoding failed: {:?}", err), None)
}
