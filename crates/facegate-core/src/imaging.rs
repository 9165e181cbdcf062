//! Decoded input images and the pixel views the gates need.

use image::{imageops, RgbImage};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// An immutable decoded RGB image owned by a single request.
#[derive(Clone)]
pub struct Image {
    rgb: RgbImage,
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl Image {
    /// Wrap an already-decoded RGB buffer.
    pub fn from_rgb(rgb: RgbImage) -> Result<Self, ImageError> {
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(ImageError::Empty {
                width: rgb.width(),
                height: rgb.height(),
            });
        }
        Ok(Self { rgb })
    }

    /// Decode an encoded image (JPEG, PNG, ...) from memory.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        Self::from_rgb(image::load_from_memory(bytes)?.to_rgb8())
    }

    /// Decode an image file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        Self::from_rgb(image::open(path)?.to_rgb8())
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// BT.601 luma plane as a row-major `width * height` byte buffer.
    ///
    /// Uses the same fixed-point weights as OpenCV's `RGB2GRAY`, which the
    /// blur thresholds are calibrated against.
    pub fn grayscale(&self) -> Vec<u8> {
        self.rgb.pixels().map(|p| bt601_luma(p.0)).collect()
    }

    /// Crop away `1/margin_divisor` of the width and height on every side.
    ///
    /// A divisor of 8 keeps the middle 75% in both directions. Images too
    /// small to crop are returned unchanged.
    pub fn center_crop(&self, margin_divisor: u32) -> Image {
        let (w, h) = (self.width(), self.height());
        if margin_divisor == 0 {
            return self.clone();
        }
        let x0 = w / margin_divisor;
        let y0 = h / margin_divisor;
        let x1 = w * (margin_divisor - 1) / margin_divisor;
        let y1 = h * (margin_divisor - 1) / margin_divisor;
        if x1 <= x0 || y1 <= y0 {
            return self.clone();
        }
        let cropped = imageops::crop_imm(&self.rgb, x0, y0, x1 - x0, y1 - y0).to_image();
        Image { rgb: cropped }
    }
}

const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

/// `0.299 R + 0.587 G + 0.114 B`, rounded half up.
fn bt601_luma([r, g, b]: [u8; 3]) -> u8 {
    let y = (r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + (1 << (LUMA_SHIFT - 1)))
        >> LUMA_SHIFT;
    y.min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_empty_image_rejected() {
        let err = Image::from_rgb(RgbImage::new(0, 10)).unwrap_err();
        assert!(matches!(err, ImageError::Empty { width: 0, height: 10 }));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            Image::decode(b"not an image"),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn test_grayscale_length() {
        let img = Image::from_rgb(RgbImage::from_pixel(8, 4, Rgb([10, 20, 30]))).unwrap();
        assert_eq!(img.grayscale().len(), 32);
    }

    #[test]
    fn test_grayscale_uses_bt601_weights() {
        let img = Image::from_rgb(RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([100, 72, 60])
            } else {
                Rgb([72, 100, 60])
            }
        }))
        .unwrap();
        // 0.299*100 + 0.587*72 + 0.114*60 = 79.0; 0.299*72 + 0.587*100 + 0.114*60 = 87.1
        assert_eq!(img.grayscale(), vec![79, 87]);
    }

    #[test]
    fn test_grayscale_extremes() {
        assert_eq!(bt601_luma([255, 255, 255]), 255);
        assert_eq!(bt601_luma([0, 0, 0]), 0);
        assert_eq!(bt601_luma([255, 0, 0]), 76);
        assert_eq!(bt601_luma([0, 255, 0]), 150);
        assert_eq!(bt601_luma([0, 0, 255]), 29);
    }

    #[test]
    fn test_center_crop_keeps_middle_75_percent() {
        let img = Image::from_rgb(RgbImage::from_fn(80, 40, |x, y| {
            if x < 10 || x >= 70 || y < 5 || y >= 35 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        }))
        .unwrap();

        let crop = img.center_crop(8);
        assert_eq!((crop.width(), crop.height()), (60, 30));
        assert!(crop.as_rgb().pixels().all(|p| *p == Rgb([0, 0, 255])));
    }

    #[test]
    fn test_center_crop_tiny_image_unchanged() {
        let img = Image::from_rgb(RgbImage::new(1, 1)).unwrap();
        let crop = img.center_crop(8);
        assert_eq!((crop.width(), crop.height()), (1, 1));
    }
}
