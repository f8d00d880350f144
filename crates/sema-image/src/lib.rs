//! Image decoding for the sema ecosystem.
//!
//! Wraps the `image` crate to decode compressed frames (MJPEG, PNG, BMP)
//! into RGB tensors from `sema-base`. The segmentation pipeline consumes
//! 8-bit RGB only, so every source format is normalized here.
//!
//! Decoded images use HWC layout: `[height, width, 3]`.

pub mod error;

pub use error::ImageError;

use sema_base::Tensor;

/// Decodes an image from raw bytes into an RGB8 tensor.
///
/// The image format is auto-detected by the `image` crate. Grayscale,
/// alpha and high-bit-depth inputs are converted to 8-bit RGB.
///
/// # Errors
///
/// Returns `ImageError::Decode` if the data is invalid or the format is
/// unsupported, `ImageError::Tensor` if tensor construction fails.
pub fn decode_rgb(data: &[u8]) -> Result<Tensor<u8>, ImageError> {
    let img = crates_image::load_from_memory(data)?;
    let rgb = img.into_rgb8();
    let (width, height) = rgb.dimensions();
    let shape = vec![height as usize, width as usize, 3];
    Ok(Tensor::new(shape, rgb.into_raw())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates_image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, 7u8])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode test image");
        bytes
    }

    #[test]
    fn test_decode_rgb_shape_and_pixels() {
        let bytes = png_bytes(4, 3);
        let tensor = decode_rgb(&bytes).unwrap();
        assert_eq!(tensor.shape, vec![3, 4, 3]);
        // Pixel (x=2, y=1) lives at (y * width + x) * 3
        let idx = (1 * 4 + 2) * 3;
        assert_eq!(&tensor.data[idx..idx + 3], &[2, 1, 7]);
    }

    #[test]
    fn test_decode_rgb_rejects_garbage() {
        let result = decode_rgb(&[0u8, 1, 2, 3]);
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }
}
