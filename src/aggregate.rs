use image::RgbImage;
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::detector::Detector;
use crate::error::{Error, Result};
use crate::frame::FrameDetections;
use crate::nms::{non_max_suppression, NmsConfig};
use crate::transform::prepare_window;
use crate::window::{Extent, Window};

/// Runs the detector over the windows of one frame and stitches the results
/// into frame space.
#[derive(Debug, Clone)]
pub struct Aggregator {
    window_size: Extent,
    fill: [u8; 3],
    max_batch: usize,
    second_nms: Option<NmsConfig>,
}

impl Aggregator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            window_size: config.window_size,
            fill: config.fill,
            max_batch: config.max_batch,
            second_nms: config.second_nms.clone(),
        }
    }

    /// Frame-space detections of `windows`, in window order, each tagged with
    /// its origin window.
    ///
    /// A detector failure on any batch fails the whole frame.
    pub fn detect<D: Detector + ?Sized>(
        &self,
        frame: &RgbImage,
        windows: &[Window],
        detector: &mut D,
    ) -> Result<FrameDetections> {
        let mut out = FrameDetections::new();
        if windows.is_empty() {
            return Ok(out);
        }

        let prepared = windows
            .par_iter()
            .map(|w| prepare_window(frame, w, self.window_size, self.fill))
            .collect::<Result<Vec<_>>>()?;

        let (canvases, params): (Vec<_>, Vec<_>) = prepared.into_iter().unzip();

        let (frame_w, frame_h) = frame.dimensions();
        let batch = if self.max_batch == 0 {
            canvases.len()
        } else {
            self.max_batch
        };

        for (chunk, chunk_params) in canvases.chunks(batch).zip(params.chunks(batch)) {
            let results = detector.infer(chunk)?;
            if results.len() != chunk.len() {
                return Err(Error::BatchMismatch {
                    expected: chunk.len(),
                    got: results.len(),
                });
            }

            for (dets, param) in results.into_iter().zip(chunk_params) {
                for det in dets {
                    let bbox = param.reproject(&det.bbox());

                    if !bbox.is_finite() || !det.confidence.is_finite() {
                        log::debug!("dropping non-finite detection from window {:?}", param.window);
                        continue;
                    }

                    let bbox = bbox.clip(frame_w as f32, frame_h as f32);
                    if bbox.is_degenerate() {
                        log::debug!("dropping degenerate detection {:?}", bbox.as_slice());
                        continue;
                    }

                    out.push(param.window, det.with_bbox(bbox));
                }
            }
        }

        if let Some(nms) = &self.second_nms {
            let before = out.len();
            out = non_max_suppression(&out.detections, nms)
                .into_iter()
                .map(|(idx, det)| (out.windows[idx], det))
                .collect();

            log::trace!("second nms kept {} of {} detections", out.len(), before);
        }

        Ok(out)
    }
}
