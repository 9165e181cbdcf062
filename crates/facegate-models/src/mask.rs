//! Two-class mask classifier (ViT export, labels `[mask, no_mask]`).

use crate::{load_session, ModelError};
use facegate_core::{CollaboratorError, Image, MaskClassifier, MaskProbabilities};
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const MASK_INPUT_SIZE: usize = 224;
const MASK_MEAN: f32 = 0.5;
const MASK_STD: f32 = 0.5;

pub struct OnnxMaskClassifier {
    session: Mutex<Session>,
}

impl OnnxMaskClassifier {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let session = load_session(model_path.as_ref(), "mask")?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    pub fn predict(&self, region: &Image) -> Result<MaskProbabilities, ModelError> {
        let input = preprocess(region);
        let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("mask logits: {e}")))?;

        softmax_pair(logits)
    }
}

impl MaskClassifier for OnnxMaskClassifier {
    fn classify(&self, region: &Image) -> Result<MaskProbabilities, CollaboratorError> {
        Ok(self.predict(region)?)
    }
}

/// Resize to 224x224 RGB and scale each channel to [-1, 1].
fn preprocess(image: &Image) -> Array4<f32> {
    let size = MASK_INPUT_SIZE;
    let resized = imageops::resize(
        image.as_rgb(),
        size as u32,
        size as u32,
        FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            tensor[[0, c, y, x]] = (pixel[c] as f32 / 255.0 - MASK_MEAN) / MASK_STD;
        }
    }
    tensor
}

fn softmax_pair(logits: &[f32]) -> Result<MaskProbabilities, ModelError> {
    let [mask, no_mask] = logits else {
        return Err(ModelError::InferenceFailed(format!(
            "expected 2 mask logits, got {}",
            logits.len()
        )));
    };
    let max = mask.max(*no_mask);
    let e_mask = (mask - max).exp();
    let e_no_mask = (no_mask - max).exp();
    let sum = e_mask + e_no_mask;
    Ok(MaskProbabilities {
        mask: e_mask / sum,
        no_mask: e_no_mask / sum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_preprocess_shape_and_range() {
        let img = Image::from_rgb(RgbImage::from_pixel(50, 80, Rgb([255, 0, 0]))).unwrap();
        let tensor = preprocess(&img);
        assert_eq!(tensor.shape(), &[1, 3, MASK_INPUT_SIZE, MASK_INPUT_SIZE]);
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 10, 10]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_pair() {
        let even = softmax_pair(&[0.0, 0.0]).unwrap();
        assert!((even.mask - 0.5).abs() < 1e-6);

        let masked = softmax_pair(&[4.0, -2.0]).unwrap();
        assert!(masked.mask > 0.99);
        assert!((masked.mask + masked.no_mask - 1.0).abs() < 1e-6);

        // Large logits must not overflow.
        let big = softmax_pair(&[1000.0, 999.0]).unwrap();
        assert!(big.mask.is_finite() && big.mask > 0.7);
    }

    #[test]
    fn test_softmax_rejects_wrong_arity() {
        assert!(matches!(
            softmax_pair(&[0.1, 0.2, 0.7]),
            Err(ModelError::InferenceFailed(_))
        ));
    }
}
