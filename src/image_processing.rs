use image::{
    DynamicImage, ImageFormat,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    imageops::FilterType,
};
use serde::Serialize;

pub const JPEG_QUALITY: u8 = 90;
pub const WEBP_QUALITY: f32 = 80.0;

/// Largest side a resize may ask for. Webp cannot store more than 16383.
pub const MAX_OUTPUT_DIMENSION: u32 = 16_383;
/// Total pixel budget of a resize target, about 160 MB of RGBA.
pub const MAX_OUTPUT_PIXELS: u64 = 40_000_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Png,
    Jpeg,
}

impl OutputFormat {
    /// Parses a user supplied format name. `None` means the name was not
    /// recognised; callers decide the fallback.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "webp" => Some(Self::Webp),
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeSpec {
    #[default]
    Original,
    /// Exact target size; aspect ratio is not preserved.
    Exact { width: u32, height: u32 },
}

/// Whether `width`x`height` is a resize target this service will allocate.
pub fn dimensions_supported(width: u32, height: u32) -> bool {
    width > 0
        && height > 0
        && width <= MAX_OUTPUT_DIMENSION
        && height <= MAX_OUTPUT_DIMENSION
        && u64::from(width) * u64::from(height) <= MAX_OUTPUT_PIXELS
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("decode image failed: {0}")]
    Decode(String),
    #[error("unsupported dimensions {width}x{height}")]
    UnsupportedDimensions { width: u32, height: u32 },
    #[error("encode {format} failed: {message}")]
    Encode { format: &'static str, message: String },
}

/// Decodes `bytes`, optionally resizes to the exact target and re-encodes in
/// `format`.
pub fn transform(
    bytes: &[u8],
    resize: ResizeSpec,
    format: OutputFormat,
) -> Result<Vec<u8>, ProcessingError> {
    if let ResizeSpec::Exact { width, height } = resize {
        if !dimensions_supported(width, height) {
            return Err(ProcessingError::UnsupportedDimensions { width, height });
        }
    }
    let image = decode_image(bytes)?;
    let image = match resize {
        ResizeSpec::Original => image,
        ResizeSpec::Exact { width, height } => {
            image.resize_exact(width, height, FilterType::Lanczos3)
        }
    };
    encode(&image, format)
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ProcessingError> {
    let decoded = match detect_mime_type(bytes).and_then(mime_to_format) {
        Some(format) => image::load_from_memory_with_format(bytes, format),
        None => image::load_from_memory(bytes),
    };
    decoded.map_err(|err| ProcessingError::Decode(err.to_string()))
}

pub fn encode(image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, ProcessingError> {
    let mut output = Vec::new();
    let result = match format {
        OutputFormat::Webp => return encode_webp(image),
        OutputFormat::Png => image.write_with_encoder(PngEncoder::new(&mut output)),
        OutputFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY)),
    };
    result.map_err(|err| ProcessingError::Encode {
        format: format.as_str(),
        message: err.to_string(),
    })?;
    Ok(output)
}

/// Lossy webp through libwebp; the `image` crate only writes lossless webp.
fn encode_webp(image: &DynamicImage) -> Result<Vec<u8>, ProcessingError> {
    let encoded = if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height())
            .encode_simple(false, WEBP_QUALITY)
    } else {
        let rgb = image.to_rgb8();
        webp::Encoder::from_rgb(&rgb, rgb.width(), rgb.height())
            .encode_simple(false, WEBP_QUALITY)
    };
    encoded
        .map(|memory| memory.to_vec())
        .map_err(|err| ProcessingError::Encode {
            format: OutputFormat::Webp.as_str(),
            message: format!("{err:?}"),
        })
}

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}

pub fn mime_to_format(mime_type: &str) -> Option<ImageFormat> {
    match mime_type {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        "image/bmp" => Some(ImageFormat::Bmp),
        _ => None,
    }
}
