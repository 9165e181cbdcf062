//! Sharpness scoring via variance of the Laplacian.

use crate::imaging::Image;
use crate::outcome::{ErrorCode, GateFailure, GateResult};

/// Variance of the 4-neighbour Laplacian response over a grayscale buffer.
///
/// Borders are handled by reflecting about the edge pixel (`dcba|bcd`), so
/// every pixel contributes. Returns 0.0 for empty or undersized buffers.
pub fn laplacian_variance(gray: &[u8], width: u32, height: u32) -> f64 {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || gray.len() < w * h {
        return 0.0;
    }

    let reflect = |i: isize, n: usize| -> usize {
        if n == 1 {
            return 0;
        }
        let n = n as isize;
        let r = if i < 0 {
            -i
        } else if i >= n {
            2 * n - 2 - i
        } else {
            i
        };
        r as usize
    };
    let at = |x: isize, y: isize| -> f64 { gray[reflect(y, h) * w + reflect(x, w)] as f64 };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h as isize {
        for x in 0..w as isize {
            let response =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let n = (w * h) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Sharpness score of an image.
pub fn sharpness(image: &Image) -> f64 {
    laplacian_variance(&image.grayscale(), image.width(), image.height())
}

/// Fail with `BLUR_DETECTED` when the sharpness score is below `threshold`.
pub fn check_blur(image: &Image, threshold: f64) -> GateResult<f64> {
    let score = sharpness(image);
    if score < threshold {
        return Err(GateFailure::new(
            ErrorCode::BlurDetected,
            format!("Image is too blurry (score: {score:.0} < {threshold:.0})."),
        ));
    }
    tracing::debug!(score, threshold, "blur check passed");
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn checkerboard(size: u32, cell: u32) -> Image {
        Image::from_rgb(RgbImage::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_uniform_image_has_zero_variance() {
        let gray = vec![128u8; 64 * 48];
        assert_eq!(laplacian_variance(&gray, 64, 48), 0.0);
    }

    #[test]
    fn test_undersized_buffer_scores_zero() {
        assert_eq!(laplacian_variance(&[1, 2, 3], 4, 4), 0.0);
        assert_eq!(laplacian_variance(&[], 0, 0), 0.0);
    }

    #[test]
    fn test_single_pixel_image() {
        assert_eq!(laplacian_variance(&[200], 1, 1), 0.0);
    }

    #[test]
    fn test_reflection_border_on_ramp() {
        // A horizontal linear ramp has zero Laplacian in the interior; the
        // reflected border columns produce the only non-zero responses.
        let w = 10u32;
        let h = 3u32;
        let gray: Vec<u8> = (0..h).flat_map(|_| (0..w).map(|x| (x * 10) as u8)).collect();
        let score = laplacian_variance(&gray, w, h);
        assert!(score > 0.0);
    }

    #[test]
    fn test_sharp_edges_score_higher_than_smooth() {
        let sharp = sharpness(&checkerboard(64, 4));
        let smooth = sharpness(&checkerboard(64, 32));
        assert!(sharp > smooth, "sharp {sharp} <= smooth {smooth}");
    }

    #[test]
    fn test_check_blur_rejects_flat_image() {
        let flat = Image::from_rgb(RgbImage::from_pixel(32, 32, Rgb([90, 90, 90]))).unwrap();
        let err = check_blur(&flat, 22.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::BlurDetected);
        assert!(err.reason.contains("score: 0 < 22"), "{}", err.reason);
    }

    /// Vertical 4 px stripes of two colours whose luma differs by 8.
    fn low_contrast_stripes() -> Image {
        Image::from_rgb(RgbImage::from_fn(64, 64, |x, _| {
            if (x / 4) % 2 == 0 {
                Rgb([100, 72, 60])
            } else {
                Rgb([72, 100, 60])
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_low_contrast_stripes_score() {
        // 15 boundaries give 30 of 64 columns a +/-8 response: 64 * 30 / 64.
        let score = sharpness(&low_contrast_stripes());
        assert!((score - 30.0).abs() < 1e-9, "score {score}");
        assert!(check_blur(&low_contrast_stripes(), 50.0).is_err());
        assert!(check_blur(&low_contrast_stripes(), 22.0).is_ok());
    }

    #[test]
    fn test_check_blur_passes_checkerboard() {
        let score = check_blur(&checkerboard(64, 4), 50.0).unwrap();
        assert!(score > 50.0);
    }
}
