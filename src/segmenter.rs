use image::{GrayImage, Luma, RgbImage};
use ndarray::Array2;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mask::Mask;

/// Region-of-interest segmentation of one frame
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Binary region mask, at the model's output resolution
    pub mask: Mask,
    /// Raw per-pixel scores the mask was derived from, `[height, width]`
    pub scores: Array2<f32>,
}

pub trait Segmenter {
    fn infer(&mut self, frame: &RgbImage) -> Result<Segmentation>;
}

impl<S: Segmenter + ?Sized> Segmenter for Box<S> {
    #[inline]
    fn infer(&mut self, frame: &RgbImage) -> Result<Segmentation> {
        (**self).infer(frame)
    }
}

/// Opaque network returning a `[height, width]` score map for a frame
pub trait ScoreModel {
    fn run(&mut self, frame: &RgbImage) -> Result<Array2<f32>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Scores above the threshold are set, without one any positive score is
    pub threshold: Option<f32>,
    /// The model already applies the sigmoid
    pub sigmoid_included: bool,
    /// Square dilation kernel size
    pub dilate_kernel: Option<u8>,
    /// Number of dilation passes with `dilate_kernel`
    pub dilate_iterations: u32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            threshold: Some(0.5),
            sigmoid_included: true,
            dilate_kernel: None,
            dilate_iterations: 1,
        }
    }
}

pub struct ScoreMapSegmenter<M> {
    model: M,
    config: MaskConfig,
}

impl<M: ScoreModel> ScoreMapSegmenter<M> {
    pub fn new(model: M, config: MaskConfig) -> Self {
        Self { model, config }
    }

    fn postprocess(&self, scores: Array2<f32>) -> Result<Segmentation> {
        let (h, w) = scores.dim();
        if h == 0 || w == 0 {
            return Err(Error::ModelOutput(vec![h, w]));
        }

        if scores.iter().any(|v| !v.is_finite()) {
            return Err(Error::Segmenter("score map has non-finite values".into()));
        }

        let scores = if self.config.sigmoid_included {
            scores
        } else {
            scores.mapv(|v| 1.0 / (1.0 + (-v).exp()))
        };

        let threshold = self.config.threshold.unwrap_or(0.0);
        let image = GrayImage::from_fn(w as u32, h as u32, |x, y| {
            if scores[[y as usize, x as usize]] > threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        });

        let mut mask = Mask::from_gray(image);
        if let Some(kernel) = self.config.dilate_kernel {
            for _ in 0..self.config.dilate_iterations {
                mask = mask.dilated(kernel);
            }
        }

        Ok(Segmentation { mask, scores })
    }
}

impl<M: ScoreModel> Segmenter for ScoreMapSegmenter<M> {
    fn infer(&mut self, frame: &RgbImage) -> Result<Segmentation> {
        let scores = self.model.run(frame)?;

        self.postprocess(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct FixedScores(Array2<f32>);

    impl ScoreModel for FixedScores {
        fn run(&mut self, _frame: &RgbImage) -> Result<Array2<f32>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_threshold() {
        let scores = array![[0.1, 0.6, 0.4], [0.9, 0.5, 0.0]];
        let mut seg = ScoreMapSegmenter::new(FixedScores(scores), MaskConfig::default());

        let out = seg.infer(&RgbImage::new(30, 20)).unwrap();
        assert_eq!(out.mask.extent().height, 2);
        assert_eq!(out.mask.extent().width, 3);
        assert!(out.mask.is_set(1, 0) && out.mask.is_set(0, 1));
        assert!(!out.mask.is_set(1, 1) && !out.mask.is_set(0, 0));
        assert_eq!(out.scores[[1, 0]], 0.9);
    }

    #[test]
    fn test_sigmoid_and_dilation() {
        let mut scores = Array2::from_elem((7, 7), -5.0);
        scores[[3, 3]] = 2.0;
        let config = MaskConfig {
            sigmoid_included: false,
            dilate_kernel: Some(3),
            ..Default::default()
        };
        let mut seg = ScoreMapSegmenter::new(FixedScores(scores), config);

        let out = seg.infer(&RgbImage::new(7, 7)).unwrap();
        assert!(out.mask.is_set(2, 2) && out.mask.is_set(4, 4));
        assert!(!out.mask.is_set(1, 3));
    }

    #[test]
    fn test_repeated_dilation() {
        let mut scores = Array2::zeros((9, 9));
        scores[[4, 4]] = 1.0;
        let config = MaskConfig {
            dilate_kernel: Some(3),
            dilate_iterations: 2,
            ..Default::default()
        };
        let mut seg = ScoreMapSegmenter::new(FixedScores(scores), config);

        let out = seg.infer(&RgbImage::new(9, 9)).unwrap();
        assert!(out.mask.is_set(2, 2) && out.mask.is_set(6, 6));
        assert!(!out.mask.is_set(1, 4) && !out.mask.is_set(4, 7));
    }

    #[test]
    fn test_zero_iterations_skip_dilation() {
        let mut scores = Array2::zeros((5, 5));
        scores[[2, 2]] = 1.0;
        let config = MaskConfig {
            dilate_kernel: Some(3),
            dilate_iterations: 0,
            ..Default::default()
        };
        let mut seg = ScoreMapSegmenter::new(FixedScores(scores), config);

        let out = seg.infer(&RgbImage::new(5, 5)).unwrap();
        assert!(out.mask.is_set(2, 2));
        assert!(!out.mask.is_set(1, 2));
    }

    #[test]
    fn test_non_finite_scores() {
        let mut scores = Array2::zeros((2, 2));
        scores[[0, 1]] = f32::NAN;
        let mut seg = ScoreMapSegmenter::new(FixedScores(scores), MaskConfig::default());

        assert!(matches!(seg.infer(&RgbImage::new(2, 2)), Err(Error::Segmenter(_))));
    }

    #[test]
    fn test_empty_scores() {
        let mut seg = ScoreMapSegmenter::new(FixedScores(Array2::zeros((0, 4))), MaskConfig::default());
        assert!(matches!(seg.infer(&RgbImage::new(4, 4)), Err(Error::ModelOutput(_))));
    }
}
