use image::RgbImage;
use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::detection::Detection;
use crate::error::{Error, Result};
use crate::nms::{non_max_suppression, NmsConfig};

/// Object detector over a batch of equally sized canvases.
///
/// Returns one list per canvas, in canvas order, with boxes in canvas
/// pixel coordinates.
pub trait Detector {
    fn infer(&mut self, canvases: &[RgbImage]) -> Result<Vec<Vec<Detection>>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    #[inline]
    fn infer(&mut self, canvases: &[RgbImage]) -> Result<Vec<Vec<Detection>>> {
        (**self).infer(canvases)
    }
}

/// Opaque network: `[batch, 3, height, width]` RGB in `[0, 1]` to
/// `[batch, predictions, 5 + classes]` rows of `cx, cy, w, h, objectness, scores..`
pub trait InferenceModel {
    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<Array3<f32>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoloConfig {
    pub confidence_threshold: f32,
    pub nms: NmsConfig,
    /// Keep only these class ids
    pub classes: Option<Vec<u32>>,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.01,
            nms: NmsConfig::default(),
            classes: None,
        }
    }
}

impl YoloConfig {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            ..Default::default()
        }
    }

    #[inline]
    fn accepts(&self, class: u32) -> bool {
        match &self.classes {
            Some(classes) => classes.contains(&class),
            None => true,
        }
    }
}

pub struct YoloDetector<M> {
    model: M,
    config: YoloConfig,
}

impl<M: InferenceModel> YoloDetector<M> {
    pub fn new(model: M, config: YoloConfig) -> Self {
        Self { model, config }
    }

    #[inline]
    pub fn config(&self) -> &YoloConfig {
        &self.config
    }

    fn postprocess(&self, view: ArrayView3<'_, f32>, nbatches: usize) -> Result<Vec<Vec<Detection>>> {
        let shape = view.shape();
        if shape[2] < 6 {
            return Err(Error::ModelOutput(shape.to_vec()));
        }

        if shape[0] != nbatches {
            return Err(Error::BatchMismatch {
                expected: nbatches,
                got: shape[0],
            });
        }

        let mut results = Vec::with_capacity(nbatches);

        for batch in view.outer_iter() {
            let mut dets = Vec::new();

            for pred in batch.outer_iter() {
                let objectness = pred[4];
                if !(objectness > self.config.confidence_threshold) {
                    continue;
                }

                let bbox = BBox::xywh(pred[0], pred[1], pred[2], pred[3]).as_ltrb();

                // multi-label: one detection per class above threshold
                for (class, score) in pred.iter().skip(5).enumerate() {
                    let confidence = objectness * score;
                    let class = class as u32;

                    if confidence > self.config.confidence_threshold && self.config.accepts(class) {
                        dets.push(Detection::new(bbox, confidence, class));
                    }
                }
            }

            let kept = non_max_suppression(&dets, &self.config.nms);
            results.push(kept.into_iter().map(|(_, det)| det).collect());
        }

        Ok(results)
    }
}

/// Packs canvases into an NCHW `[0, 1]` tensor
pub fn canvases_to_tensor(canvases: &[RgbImage]) -> Result<Array4<f32>> {
    let (width, height) = match canvases.first() {
        Some(canvas) => canvas.dimensions(),
        None => return Ok(Array4::zeros((0, 3, 0, 0))),
    };

    let plane = (width * height) as usize;
    let mut data = Vec::with_capacity(canvases.len() * 3 * plane);

    for (idx, canvas) in canvases.iter().enumerate() {
        if canvas.dimensions() != (width, height) {
            return Err(Error::Detector(format!(
                "canvas {} is {:?}, expected {:?}",
                idx,
                canvas.dimensions(),
                (width, height)
            )));
        }

        for c in 0..3 {
            data.extend(canvas.pixels().map(|px| px[c] as f32 / 255.0));
        }
    }

    let shape = (canvases.len(), 3, height as usize, width as usize);

    Ok(Array4::from_shape_vec(shape, data)?)
}

impl<M: InferenceModel> Detector for YoloDetector<M> {
    fn infer(&mut self, canvases: &[RgbImage]) -> Result<Vec<Vec<Detection>>> {
        if canvases.is_empty() {
            return Ok(Vec::new());
        }

        let input = canvases_to_tensor(canvases)?;
        let predictions = self.model.run(input.view())?;

        self.postprocess(predictions.view(), canvases.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;
    use ndarray::array;

    struct FixedModel(Array3<f32>);

    impl InferenceModel for FixedModel {
        fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<Array3<f32>> {
            assert_eq!(input.shape()[1], 3);
            Ok(self.0.clone())
        }
    }

    fn canvases(n: usize) -> Vec<RgbImage> {
        (0..n).map(|_| RgbImage::from_pixel(8, 4, Rgb([255, 0, 51]))).collect()
    }

    #[test]
    fn test_tensor_layout() {
        let t = canvases_to_tensor(&canvases(2)).unwrap();
        assert_eq!(t.shape(), &[2, 3, 4, 8]);
        assert_eq!(t[[1, 0, 3, 7]], 1.0);
        assert_eq!(t[[1, 1, 0, 0]], 0.0);
        assert_abs_diff_eq!(t[[0, 2, 2, 2]], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_multi_label() {
        let preds = array![[
            [50.0, 40.0, 20.0, 10.0, 0.8, 0.9, 0.5],
            [10.0, 10.0, 4.0, 4.0, 0.9, 0.001, 0.001],
        ]];
        let mut detector = YoloDetector::new(FixedModel(preds), YoloConfig::new(0.3));

        let out = detector.infer(&canvases(1)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);

        let first = out[0][0];
        assert_eq!(first.class, 0);
        assert_abs_diff_eq!(first.confidence, 0.72, epsilon = 1e-6);
        assert_eq!(first.bbox().as_slice(), &[40.0, 35.0, 60.0, 45.0]);
        assert_eq!(out[0][1].class, 1);
    }

    #[test]
    fn test_class_filter() {
        let preds = array![[[50.0, 40.0, 20.0, 10.0, 0.8, 0.9, 0.5]]];
        let config = YoloConfig {
            classes: Some(vec![1]),
            ..YoloConfig::new(0.3)
        };
        let mut detector = YoloDetector::new(FixedModel(preds), config);

        let out = detector.infer(&canvases(1)).unwrap();
        assert_eq!(out[0].len(), 1);
        assert_eq!(out[0][0].class, 1);
    }

    #[test]
    fn test_batch_mismatch() {
        let preds = Array3::zeros((1, 3, 7));
        let mut detector = YoloDetector::new(FixedModel(preds), YoloConfig::default());

        assert!(matches!(
            detector.infer(&canvases(2)),
            Err(Error::BatchMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_bad_output_shape() {
        let preds = Array3::zeros((1, 3, 4));
        let mut detector = YoloDetector::new(FixedModel(preds), YoloConfig::default());

        assert!(matches!(detector.infer(&canvases(1)), Err(Error::ModelOutput(_))));
    }
}
