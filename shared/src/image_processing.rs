use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader, Limits};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::capabilities::{CapturedImage, ImageFormat, InlineImage, MAX_IMAGE_SIZE_BYTES};
use crate::MAX_PROCESSED_DIMENSION;

#[derive(Debug, Error)]
pub enum ImageProcessingError {
    #[error("captured image carries no pixel payload")]
    MissingPayload,

    #[error("input bytes empty")]
    EmptyInput,

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("failed to decode image: {source}")]
    Decode {
        #[from]
        source: image::ImageError,
    },

    #[error("image too large: {width}x{height}, max edge {max_dimension}")]
    ImageTooLarge {
        width: u32,
        height: u32,
        max_dimension: u32,
    },

    #[error("jpeg encoding failed: width={width}, height={height}, reason={reason}")]
    JpegEncode {
        width: u32,
        height: u32,
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub struct ProcessingConfig {
    pub max_input_bytes: usize,
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
    pub target_edge: u32,
    pub jpeg_quality: u8,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: MAX_IMAGE_SIZE_BYTES,
            max_dimension: 12_000,
            max_alloc_bytes: 512 * 1024 * 1024,
            target_edge: MAX_PROCESSED_DIMENSION,
            jpeg_quality: 85,
        }
    }
}

/// Turns a captured still into the inline payload sent with an inference request.
#[derive(Clone, Debug, Default)]
pub struct ImageProcessor {
    config: ProcessingConfig,
}

impl ImageProcessor {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ProcessingConfig::default())
    }

    #[instrument(skip(self, image), fields(uri = image.uri(), input_size = image.file_size()))]
    pub fn prepare_for_inference(
        &self,
        image: &CapturedImage,
    ) -> Result<InlineImage, ImageProcessingError> {
        let raw_bytes = image.data().ok_or(ImageProcessingError::MissingPayload)?;

        let result = self.prepare_bytes(raw_bytes);
        match &result {
            Ok(inline) => debug!(
                mime_type = %inline.mime_type,
                output_size = inline.len(),
                "payload prepared"
            ),
            Err(e) => warn!(error = %e, "payload preparation failed"),
        }
        result
    }

    fn prepare_bytes(&self, raw_bytes: &[u8]) -> Result<InlineImage, ImageProcessingError> {
        if raw_bytes.is_empty() {
            return Err(ImageProcessingError::EmptyInput);
        }

        if raw_bytes.len() > self.config.max_input_bytes {
            return Err(ImageProcessingError::InputTooLarge {
                size: raw_bytes.len(),
                max_size: self.config.max_input_bytes,
            });
        }

        let format =
            ImageFormat::from_magic_bytes(raw_bytes).ok_or(ImageProcessingError::UnsupportedFormat)?;

        // No HEIC decoder is linked; the remote model accepts it as-is.
        if format == ImageFormat::Heic {
            return Ok(InlineImage::new(format.mime_type(), raw_bytes.to_vec()));
        }

        let (width, height) = read_dimensions(raw_bytes)?;
        if width > self.config.max_dimension || height > self.config.max_dimension {
            return Err(ImageProcessingError::ImageTooLarge {
                width,
                height,
                max_dimension: self.config.max_dimension,
            });
        }

        if width.max(height) <= self.config.target_edge {
            return Ok(InlineImage::new(format.mime_type(), raw_bytes.to_vec()));
        }

        let img = decode_image(&self.config, raw_bytes)?;
        let resized = img.resize(
            self.config.target_edge,
            self.config.target_edge,
            FilterType::Triangle,
        );
        debug!(
            from_width = width,
            from_height = height,
            to_width = resized.width(),
            to_height = resized.height(),
            "downscaled frame"
        );

        let encoded = encode_jpeg(&resized, self.config.jpeg_quality)?;
        Ok(InlineImage::new(ImageFormat::Jpeg.mime_type(), encoded))
    }
}

fn read_dimensions(raw_bytes: &[u8]) -> Result<(u32, u32), ImageProcessingError> {
    let reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| ImageProcessingError::Decode { source: e.into() })?;

    if reader.format().is_none() {
        return Err(ImageProcessingError::UnsupportedFormat);
    }

    Ok(reader.into_dimensions()?)
}

fn decode_image(
    config: &ProcessingConfig,
    raw_bytes: &[u8],
) -> Result<DynamicImage, ImageProcessingError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| ImageProcessingError::Decode { source: e.into() })?;

    reader.limits(limits);

    Ok(reader.decode()?)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageProcessingError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    if width == 0 || height == 0 {
        return Err(ImageProcessingError::JpegEncode {
            width,
            height,
            reason: "zero dimension".into(),
        });
    }

    let mut buffer = Vec::with_capacity((width * height * 3) as usize / 10);
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);

    encoder
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| ImageProcessingError::JpegEncode {
            width,
            height,
            reason: e.to_string(),
        })?;

    if !buffer.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Err(ImageProcessingError::JpegEncode {
            width,
            height,
            reason: "invalid jpeg magic bytes".into(),
        });
    }

    Ok(buffer)
}
