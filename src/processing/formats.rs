//! Animated format detection

use std::path::Path;
use crate::config::AnimFormat;
use crate::error::{Result, AnimBatchError};

/// Detect the container format from a file extension
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<AnimFormat> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| AnimBatchError::transform(
            "Output path has no extension to infer a format from",
            Some(path.to_path_buf()),
        ))?;

    format_from_extension(extension).ok_or_else(|| AnimBatchError::transform(
        format!("Unsupported output extension: {}", extension),
        Some(path.to_path_buf()),
    ))
}

/// Map an extension (any case) to a supported format
pub fn format_from_extension(extension: &str) -> Option<AnimFormat> {
    match extension.to_lowercase().as_str() {
        "gif" => Some(AnimFormat::Gif),
        "webp" => Some(AnimFormat::WebP),
        _ => None,
    }
}

/// Detect the container format from the file header (magic bytes).
///
/// Files are sniffed rather than trusted by extension: a transcode run
/// leaves WebP content behind `.gif` names.
pub fn detect_format_from_header(data: &[u8]) -> Result<AnimFormat> {
    if infer::image::is_gif(data) {
        return Ok(AnimFormat::Gif);
    }

    if infer::image::is_webp(data) {
        return Ok(AnimFormat::WebP);
    }

    let detected = infer::get(data)
        .map(|kind| kind.mime_type())
        .unwrap_or("unknown");

    Err(AnimBatchError::source_unreadable(
        format!("Not an animated GIF or WebP (detected: {})", detected),
        None,
    ))
}

/// Extensions accepted as batch input
pub fn supported_input_formats() -> &'static [&'static str] {
    &["gif", "webp"]
}

/// Check if a file extension is supported for input
pub fn is_supported_input_format(extension: &str) -> bool {
    supported_input_formats()
        .iter()
        .any(|&fmt| fmt.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection_from_path() {
        assert_eq!(detect_format_from_path("out/a.gif").unwrap(), AnimFormat::Gif);
        assert_eq!(detect_format_from_path("out/B.WEBP").unwrap(), AnimFormat::WebP);
        assert!(detect_format_from_path("out/c.png").is_err());
        assert!(detect_format_from_path("out/noext").is_err());
    }

    #[test]
    fn test_format_detection_from_header() {
        assert_eq!(
            detect_format_from_header(b"GIF89a\x01\x00\x01\x00\x00\x00\x00").unwrap(),
            AnimFormat::Gif
        );
        assert_eq!(
            detect_format_from_header(b"RIFF\x00\x00\x00\x00WEBPVP8X").unwrap(),
            AnimFormat::WebP
        );

        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];
        let err = detect_format_from_header(&png_header).unwrap_err();
        assert!(err.to_string().contains("image/png"));
    }

    #[test]
    fn test_supported_formats() {
        assert!(is_supported_input_format("gif"));
        assert!(is_supported_input_format("WebP"));
        assert!(!is_supported_input_format("png"));
    }
}
