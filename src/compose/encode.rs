use std::io::Cursor;

use anyhow::Context as _;
use image::{
    ExtendedColorType, ImageEncoder as _,
    codecs::{
        avif::AvifEncoder,
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
    },
};

use crate::{
    compose::composite::{flatten_to_rgb8, unpremultiply_in_place},
    foundation::{
        config::{DEFAULT_COMPRESSION_LEVEL, DEFAULT_QUALITY, ImageFormat, PipelineConfig},
        error::{ForgeError, ForgeResult},
    },
};

const JPEG_BACKGROUND: [u8; 3] = [255, 255, 255];
const AVIF_SPEED: u8 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Output encoding plus its tuning knob.
pub struct EncodeSettings {
    /// Target format.
    pub format: ImageFormat,
    /// JPEG/AVIF quality, 1-100.
    pub quality: u8,
    /// PNG compression level, 0-9.
    pub compression_level: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: DEFAULT_QUALITY,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl EncodeSettings {
    /// Settings taken from a (normalized) pipeline config.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            format: cfg.image_format,
            quality: cfg.quality.clamp(1, 100),
            compression_level: cfg.compression_level.min(9),
        }
    }
}

fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Encode a premultiplied RGBA8 canvas. Deterministic for identical inputs.
pub fn encode_image(
    width: u32,
    height: u32,
    rgba8_premul: &[u8],
    settings: &EncodeSettings,
) -> ForgeResult<Vec<u8>> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| ForgeError::validation("canvas size overflow"))?;
    if rgba8_premul.len() != expected || expected == 0 {
        return Err(ForgeError::validation(
            "encode_image expects a non-empty buffer matching width*height*4",
        ));
    }

    let mut out = Cursor::new(Vec::new());
    match settings.format {
        ImageFormat::Png => {
            let mut straight = rgba8_premul.to_vec();
            unpremultiply_in_place(&mut straight);
            PngEncoder::new_with_quality(
                &mut out,
                png_compression(settings.compression_level),
                FilterType::Adaptive,
            )
            .write_image(&straight, width, height, ExtendedColorType::Rgba8)
            .context("encode png")?;
        }
        ImageFormat::Jpeg => {
            let rgb = flatten_to_rgb8(rgba8_premul, JPEG_BACKGROUND);
            JpegEncoder::new_with_quality(&mut out, settings.quality.clamp(1, 100))
                .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
                .context("encode jpeg")?;
        }
        ImageFormat::Avif => {
            let mut straight = rgba8_premul.to_vec();
            unpremultiply_in_place(&mut straight);
            AvifEncoder::new_with_speed_quality(&mut out, AVIF_SPEED, settings.quality.clamp(1, 100))
                .write_image(&straight, width, height, ExtendedColorType::Rgba8)
                .context("encode avif")?;
        }
    }
    Ok(out.into_inner())
}

#[cfg(test)]
#[path = "../../tests/unit/compose/encode.rs"]
mod tests;
