//! Image decoding and tensor layout for the classifier.
//!
//! The model takes a `(1, 3, 224, 224)` `f32` tensor: one image, RGB
//! channels first, pixel values scaled to `[0, 1]`.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use ndarray::Array4;
use thiserror::Error;
use tracing::debug;

use crate::config::{MODEL_CHANNELS, MODEL_IMAGE_SIZE};

/// Errors that can occur while turning bytes into a model input
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// The payload is empty
    #[error("empty image payload")]
    Empty,
    /// Neither format sniffing nor the declared MIME type could decode it
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decode `bytes` and lay them out as the model's input tensor.
///
/// The format is sniffed from the bytes first. When that fails and
/// `mime_hint` names a known image format, decoding is retried with it.
///
/// # Errors
///
/// Returns `PreprocessError` if the payload is empty or cannot be decoded.
pub fn preprocess(bytes: &[u8], mime_hint: Option<&str>) -> Result<Array4<f32>, PreprocessError> {
    let image = decode(bytes, mime_hint)?;
    Ok(to_tensor(&image))
}

fn decode(bytes: &[u8], mime_hint: Option<&str>) -> Result<DynamicImage, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::Empty);
    }

    match image::load_from_memory(bytes) {
        Ok(img) => Ok(img),
        Err(sniff_err) => {
            let Some(format) = mime_hint.and_then(ImageFormat::from_mime_type) else {
                return Err(sniff_err.into());
            };
            debug!(?format, error = %sniff_err, "Format sniffing failed, using declared type");
            Ok(image::load_from_memory_with_format(bytes, format)?)
        }
    }
}

/// Resize to the model's square input and convert to a CHW tensor.
#[must_use]
pub fn to_tensor(image: &DynamicImage) -> Array4<f32> {
    let side = MODEL_IMAGE_SIZE;
    let rgb = image::imageops::resize(&image.to_rgb8(), side, side, FilterType::CatmullRom);

    let side = side as usize;
    Array4::from_shape_fn((1, MODEL_CHANNELS, side, side), |(_, c, y, x)| {
        // x, y < 224 so the casts are lossless
        f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    // One 8-bit step, for resampling rounding
    const TOLERANCE: f32 = 1.5 / 255.0;

    fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format)?;
        Ok(buf.into_inner())
    }

    #[test]
    fn test_output_shape_is_fixed() -> Result<(), Box<dyn std::error::Error>> {
        for (w, h) in [(1, 1), (640, 480), (100, 900)] {
            let img = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            let bytes = encode(&img, ImageFormat::Png)?;
            let tensor = preprocess(&bytes, None)?;
            assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        }
        Ok(())
    }

    #[test]
    fn test_channels_are_rgb_and_scaled() -> Result<(), Box<dyn std::error::Error>> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([255, 0, 51])));
        let bytes = encode(&img, ImageFormat::Png)?;
        let tensor = preprocess(&bytes, Some("image/png"))?;

        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < TOLERANCE);
        assert!(tensor[[0, 1, 10, 10]].abs() < TOLERANCE);
        assert!((tensor[[0, 2, 10, 10]] - 0.2).abs() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_alpha_is_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 255, 0, 10])));
        let bytes = encode(&img, ImageFormat::Png)?;
        let tensor = preprocess(&bytes, None)?;
        assert_eq!(tensor.shape()[1], 3);
        assert!((tensor[[0, 1, 0, 0]] - 1.0).abs() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(preprocess(&[], None), Err(PreprocessError::Empty)));
        assert!(matches!(
            preprocess(b"definitely not an image", Some("image/jpeg")),
            Err(PreprocessError::Decode(_))
        ));
    }
}
