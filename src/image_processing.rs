//! Upload pre-processing: validation, downscaling with size-targeted re-encoding,
//! previews and dimension probes.
//!
//! Validation is a pure check that reports every violation at once. Everything that
//! decodes pixels runs on the blocking pool; each call is independent and nothing is
//! cached between calls.

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::error::{EncodingError, ImageFormatHint};
use image::{ColorType, DynamicImage, GenericImageView, ImageError, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const QUALITY_FLOOR: f32 = 0.1;
const QUALITY_STEP_PCT: u8 = 10;
const QUALITY_FLOOR_PCT: u8 = 10;

#[derive(Debug, Error)]
pub enum ImageProcessingError {
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("could not encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("invalid compression options: {0}")]
    InvalidOptions(String),
    #[error("image task failed: {0}")]
    Task(String),
}

/// An uploaded file: declared MIME type plus raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), content_type: content_type.into(), bytes }
    }
}

// --- Validation ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    pub max_size_mb: f64,
    pub allowed_types: Vec<String>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_size_mb: 10.0,
            allowed_types: ["image/jpeg", "image/jpg", "image/png", "image/webp"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Checks declared type and byte size, collecting every violation.
pub fn validate(file: &UploadedFile, options: &ValidationOptions) -> ValidationReport {
    let mut errors = Vec::new();

    let max_bytes = options.max_size_mb * 1024.0 * 1024.0;
    if file.bytes.len() as f64 > max_bytes {
        errors.push(format!("File size must be less than {}MB", options.max_size_mb));
    }

    let declared = file.content_type.trim();
    if !options.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(declared)) {
        errors.push(format!("File type must be one of: {}", options.allowed_types.join(", ")));
    }

    ValidationReport { is_valid: errors.is_empty(), errors }
}

// --- Compression ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: f32,
    pub max_size_kb: u32,
    pub output_format: OutputFormat,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            quality: 0.8,
            max_size_kb: 500,
            output_format: OutputFormat::Jpeg,
        }
    }
}

impl CompressionOptions {
    pub fn validate(&self) -> Result<(), ImageProcessingError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ImageProcessingError::InvalidOptions(
                "maxWidth and maxHeight must be positive".to_string(),
            ));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(ImageProcessingError::InvalidOptions(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        if self.max_size_kb == 0 {
            return Err(ImageProcessingError::InvalidOptions("maxSizeKB must be positive".to_string()));
        }
        Ok(())
    }

    fn max_bytes(&self) -> usize {
        self.max_size_kb as usize * 1024
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedImage {
    pub name: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: f32,
    pub original_size: usize,
}

impl CompressedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn data_url(&self) -> String {
        data_url(&self.content_type, &self.bytes)
    }
}

/// Largest size fitting inside `max_width` x `max_height` with the same aspect
/// ratio. Never upscales.
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let (mut w, mut h) = (f64::from(width), f64::from(height));
    if w > f64::from(max_width) {
        h = h * f64::from(max_width) / w;
        w = f64::from(max_width);
    }
    if h > f64::from(max_height) {
        w = w * f64::from(max_height) / h;
        h = f64::from(max_height);
    }
    ((w.round() as u32).max(1), (h.round() as u32).max(1))
}

/// Decode, downscale, then re-encode, stepping quality down by 0.1 while the
/// output exceeds `max_size_kb`. Stops at quality 0.1 with whatever that gives.
pub async fn compress(
    file: UploadedFile,
    options: CompressionOptions,
) -> Result<CompressedImage, ImageProcessingError> {
    options.validate()?;
    tokio::task::spawn_blocking(move || compress_blocking(&file, &options))
        .await
        .map_err(|e| ImageProcessingError::Task(e.to_string()))?
}

fn compress_blocking(
    file: &UploadedFile,
    options: &CompressionOptions,
) -> Result<CompressedImage, ImageProcessingError> {
    let img = image::load_from_memory(&file.bytes).map_err(ImageProcessingError::Decode)?;
    let (orig_w, orig_h) = img.dimensions();
    let (width, height) = scaled_dimensions(orig_w, orig_h, options.max_width, options.max_height);

    let resized = if (width, height) == (orig_w, orig_h) {
        img
    } else {
        debug!(orig_w, orig_h, width, height, "Resizing image");
        img.resize_exact(width, height, FilterType::Triangle)
    };

    let mut quality_pct = ((options.quality * 100.0).round() as u8).clamp(QUALITY_FLOOR_PCT, 100);
    let bytes = loop {
        let encoded = encode(&resized, options.output_format, quality_pct)?;
        debug!(quality = quality_pct, size_bytes = encoded.len(), "Encoded image");
        if encoded.len() <= options.max_bytes() || quality_pct <= QUALITY_FLOOR_PCT {
            break encoded;
        }
        quality_pct = quality_pct.saturating_sub(QUALITY_STEP_PCT).max(QUALITY_FLOOR_PCT);
    };

    info!(
        name = %file.name,
        original_size = file.bytes.len(),
        size_bytes = bytes.len(),
        quality = quality_pct,
        width,
        height,
        "Compressed image"
    );

    Ok(CompressedImage {
        name: with_extension(&file.name, options.output_format.extension()),
        content_type: options.output_format.mime_type().to_string(),
        bytes,
        width,
        height,
        quality: f32::from(quality_pct) / 100.0,
        original_size: file.bytes.len(),
    })
}

fn encode(img: &DynamicImage, format: OutputFormat, quality_pct: u8) -> Result<Vec<u8>, ImageProcessingError> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality_pct)
                .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                .map_err(ImageProcessingError::Encode)?;
        }
        OutputFormat::Webp => {
            let rgba = img.to_rgba8();
            let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                .encode_simple(false, f32::from(quality_pct))
                .map_err(|e| {
                    ImageProcessingError::Encode(ImageError::Encoding(EncodingError::new(
                        ImageFormatHint::Exact(ImageFormat::WebP),
                        format!("{:?}", e),
                    )))
                })?;
            buf.extend_from_slice(&encoded);
        }
    }
    Ok(buf)
}

fn with_extension(name: &str, extension: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };
    let stem = if stem.is_empty() { "image" } else { stem };
    format!("{}.{}", stem, extension)
}

// --- Probes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// `data:` URL of the original bytes. Fails if they do not decode as an image.
pub async fn preview(file: UploadedFile) -> Result<String, ImageProcessingError> {
    tokio::task::spawn_blocking(move || {
        let format = image::guess_format(&file.bytes).map_err(ImageProcessingError::Decode)?;
        image::load_from_memory_with_format(&file.bytes, format).map_err(ImageProcessingError::Decode)?;
        Ok(data_url(mime_for(format), &file.bytes))
    })
    .await
    .map_err(|e| ImageProcessingError::Task(e.to_string()))?
}

/// Width and height from the image header.
pub async fn dimensions(file: &UploadedFile) -> Result<Dimensions, ImageProcessingError> {
    let bytes = file.bytes.clone();
    tokio::task::spawn_blocking(move || {
        let (width, height) = image::io::Reader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageProcessingError::Decode(image::ImageError::IoError(e)))?
            .into_dimensions()
            .map_err(ImageProcessingError::Decode)?;
        Ok(Dimensions { width, height })
    })
    .await
    .map_err(|e| ImageProcessingError::Task(e.to_string()))?
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Best-effort format sniff used when a client omits the content type.
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    Some(mime_for(format)).filter(|mime| mime.starts_with("image/"))
}
