//! Photo transcoding for inline transport in remote documents.
//!
//! Local photos are downsized, re-encoded as JPEG and embedded as a
//! `data:image/jpeg;base64,...` URI so a log entry stays a single document.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use serde::{Deserialize, Serialize};

use crate::models::LOCAL_PHOTO_SCHEME;
use crate::{Error, Result};

/// Prefix of every transcoded payload.
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Size and quality bounds for transcoded photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    /// Maximum output width in pixels. Narrower images are not upscaled.
    pub max_width: u32,
    /// JPEG quality, 1 to 100.
    pub jpeg_quality: u8,
    /// Largest accepted data URI, in bytes.
    pub max_inline_bytes: usize,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            max_width: 800,
            jpeg_quality: 50,
            max_inline_bytes: 1_000_000,
        }
    }
}

/// Turns a local image reference into an inline string.
#[async_trait]
pub trait ImageTranscoder: Send + Sync {
    async fn transcode(&self, reference: &str) -> Result<String>;
}

/// Transcoder producing size-bounded JPEG data URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegDataUriTranscoder {
    options: TranscodeOptions,
}

impl JpegDataUriTranscoder {
    pub const fn new(options: TranscodeOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> TranscodeOptions {
        self.options
    }
}

#[async_trait]
impl ImageTranscoder for JpegDataUriTranscoder {
    async fn transcode(&self, reference: &str) -> Result<String> {
        let path = local_path(reference);
        let options = self.options;
        tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path).map_err(|error| {
                Error::Image(format!("Failed to read {}: {error}", path.display()))
            })?;
            encode_data_uri(&bytes, options)
        })
        .await
        .map_err(|error| Error::Image(format!("Transcoding task failed: {error}")))?
    }
}

/// Filesystem path of a `file://` URI or plain path.
pub fn local_path(reference: &str) -> PathBuf {
    Path::new(
        reference
            .strip_prefix(LOCAL_PHOTO_SCHEME)
            .unwrap_or(reference),
    )
    .to_path_buf()
}

/// Decode, downsize and re-encode image bytes as a JPEG data URI.
pub fn encode_data_uri(source_bytes: &[u8], options: TranscodeOptions) -> Result<String> {
    if source_bytes.is_empty() {
        return Err(Error::Image("Source image is empty".to_string()));
    }
    if options.max_width == 0 {
        return Err(Error::Image(
            "Maximum width must be greater than zero".to_string(),
        ));
    }

    let source = image::load_from_memory(source_bytes)
        .map_err(|error| Error::Image(format!("Failed to decode image: {error}")))?;

    let (width, height) = source.dimensions();
    let resized = if width <= options.max_width {
        source
    } else {
        let scaled_height = (u64::from(height) * u64::from(options.max_width) / u64::from(width))
            .max(1);
        let scaled_height = u32::try_from(scaled_height).unwrap_or(u32::MAX);
        source.resize(
            options.max_width,
            scaled_height,
            image::imageops::FilterType::Triangle,
        )
    };

    // JPEG has no alpha channel.
    let rgb = image::DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut cursor = Cursor::new(Vec::new());
    let quality = options.jpeg_quality.clamp(1, 100);
    JpegEncoder::new_with_quality(&mut cursor, quality)
        .encode_image(&rgb)
        .map_err(|error| Error::Image(format!("Failed to encode JPEG: {error}")))?;

    let encoded = format!("{JPEG_DATA_URI_PREFIX}{}", STANDARD.encode(cursor.into_inner()));
    if encoded.len() > options.max_inline_bytes {
        return Err(Error::Image(format!(
            "Encoded photo is {} bytes, over the {} byte limit",
            encoded.len(),
            options.max_inline_bytes
        )));
    }
    Ok(encoded)
}
