//! Frame encoders.
//!
//! Normally the PNG format is best suited (lower size at better quality)
//! for office applications with text and JPEG for graphic ones with images;
//! PNG is lossless as opposed to JPEG, WebP can be either. `Auto` settles
//! the question per frame by encoding both and keeping the smaller payload.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder};

use rdbridge_core::{BridgeError, FrameFormat, ImageEncoding, ImageQuality};

use crate::surface::Bitmap;

/// Encoder selection resolved from the session policy for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    Png,
    Jpeg(ImageQuality),
    Webp(ImageQuality),
    Auto(ImageQuality),
}

impl Encoder {
    /// Resolve the policy encoding and effective quality for one frame.
    pub fn from_policy(encoding: ImageEncoding, quality: ImageQuality) -> Self {
        match encoding {
            ImageEncoding::Png => Encoder::Png,
            ImageEncoding::Jpeg => Encoder::Jpeg(quality),
            ImageEncoding::Webp => Encoder::Webp(quality),
            ImageEncoding::Auto => Encoder::Auto(quality),
        }
    }

    /// Encode the bitmap, returning the chosen format, the quality to
    /// report in frame metadata, and the payload.
    ///
    /// PNG is lossless, so any PNG outcome reports `Highest` regardless of
    /// the requested quality.
    pub fn encode(
        &self,
        bitmap: &Bitmap,
    ) -> Result<(FrameFormat, ImageQuality, Vec<u8>), BridgeError> {
        match *self {
            Encoder::Png => Ok((FrameFormat::Png, ImageQuality::Highest, encode_png(bitmap)?)),
            Encoder::Jpeg(quality) => Ok((
                FrameFormat::Jpeg,
                quality,
                encode_jpeg(bitmap, quality.percent() as u8)?,
            )),
            Encoder::Webp(quality) => Ok((
                FrameFormat::Webp,
                quality,
                encode_webp(bitmap, quality.percent() as f32)?,
            )),
            Encoder::Auto(quality) => {
                let png = encode_png(bitmap)?;
                let jpeg = encode_jpeg(bitmap, quality.percent() as u8)?;
                if png.len() <= jpeg.len() {
                    Ok((FrameFormat::Png, ImageQuality::Highest, png))
                } else {
                    Ok((FrameFormat::Jpeg, quality, jpeg))
                }
            }
        }
    }
}

/// Lossless PNG.
pub fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>, BridgeError> {
    let mut out = Cursor::new(Vec::new());
    PngEncoder::new(&mut out)
        .write_image(
            bitmap.as_raw(),
            bitmap.width(),
            bitmap.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| BridgeError::Encode {
            format: FrameFormat::Png,
            reason: e.to_string(),
        })?;
    Ok(out.into_inner())
}

/// JPEG at the given quality (1..=100). JPEG has no alpha channel, so the
/// bitmap is flattened to RGB first.
pub fn encode_jpeg(bitmap: &Bitmap, quality: u8) -> Result<Vec<u8>, BridgeError> {
    let rgb = DynamicImage::ImageRgba8(bitmap.clone()).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| BridgeError::Encode {
            format: FrameFormat::Jpeg,
            reason: e.to_string(),
        })?;
    Ok(out.into_inner())
}

/// Lossy WebP at the given quality (0.0..=100.0).
pub fn encode_webp(bitmap: &Bitmap, quality: f32) -> Result<Vec<u8>, BridgeError> {
    let encoder = webp::Encoder::from_rgba(bitmap.as_raw(), bitmap.width(), bitmap.height());
    let memory = encoder.encode(quality);
    if memory.is_empty() {
        return Err(BridgeError::Encode {
            format: FrameFormat::Webp,
            reason: "encoder produced no output".into(),
        });
    }
    Ok(memory.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, pixel: [u8; 4]) -> Bitmap {
        Bitmap::from_pixel(width, height, Rgba(pixel))
    }

    /// Pseudo-random noise compresses terribly as PNG, well enough as JPEG.
    fn noisy(width: u32, height: u32) -> Bitmap {
        let mut seed = 0x2545f491u32;
        Bitmap::from_fn(width, height, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let [a, b, c, _] = seed.to_le_bytes();
            Rgba([a, b, c, 255])
        })
    }

    #[test]
    fn png_roundtrips_losslessly() {
        let bitmap = solid(16, 8, [12, 200, 34, 255]);
        let payload = encode_png(&bitmap).unwrap();
        let decoded = image::load_from_memory_with_format(&payload, image::ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn jpeg_stays_close_on_solid_color() {
        let bitmap = solid(16, 16, [100, 150, 200, 255]);
        let payload = encode_jpeg(&bitmap, 75).unwrap();
        let decoded = image::load_from_memory_with_format(&payload, image::ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        for pixel in decoded.pixels() {
            assert!((pixel[0] as i32 - 100).abs() < 16);
            assert!((pixel[1] as i32 - 150).abs() < 16);
            assert!((pixel[2] as i32 - 200).abs() < 16);
        }
    }

    #[test]
    fn webp_produces_output() {
        let bitmap = solid(16, 16, [1, 2, 3, 255]);
        let payload = encode_webp(&bitmap, 50.0).unwrap();
        assert!(!payload.is_empty());
        // RIFF container magic.
        assert_eq!(&payload[0..4], b"RIFF");
    }

    #[test]
    fn auto_prefers_png_for_flat_regions() {
        let bitmap = solid(64, 64, [255, 255, 255, 255]);
        let (format, quality, _) = Encoder::Auto(ImageQuality::High)
            .encode(&bitmap)
            .unwrap();
        assert_eq!(format, FrameFormat::Png);
        // The PNG winner reports lossless quality.
        assert_eq!(quality, ImageQuality::Highest);
    }

    #[test]
    fn auto_prefers_jpeg_for_noise() {
        let bitmap = noisy(64, 64);
        let (format, quality, _) = Encoder::Auto(ImageQuality::High)
            .encode(&bitmap)
            .unwrap();
        assert_eq!(format, FrameFormat::Jpeg);
        assert_eq!(quality, ImageQuality::High);
    }

    #[test]
    fn forced_png_reports_highest_quality() {
        let bitmap = solid(8, 8, [0, 0, 0, 255]);
        let (format, quality, _) =
            Encoder::from_policy(ImageEncoding::Png, ImageQuality::Low)
                .encode(&bitmap)
                .unwrap();
        assert_eq!(format, FrameFormat::Png);
        assert_eq!(quality, ImageQuality::Highest);
    }
}
