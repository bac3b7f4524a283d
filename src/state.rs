//! Per-sequence INIT / STEADY state and ROI mask fusion.

use crate::bbox::{BBox, Ltrb};
use crate::mask::Mask;
use crate::track::Track;
use crate::window::Extent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Full-frame tiling while the tracker is seeded, nothing is emitted
    Init,
    /// Windows follow the fused ROI mask, detections are emitted
    Steady,
}

#[derive(Debug, Clone)]
pub struct SequenceState {
    frame_index: usize,
    frame_delay: usize,
    fused_mask: Option<Mask>,
}

impl SequenceState {
    pub fn new(frame_delay: usize) -> Self {
        Self {
            frame_index: 0,
            frame_delay,
            fused_mask: None,
        }
    }

    /// Index of the frame about to be processed
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        if self.frame_index < self.frame_delay {
            Phase::Init
        } else {
            Phase::Steady
        }
    }

    /// Fused ROI mask of the last processed STEADY frame
    #[inline]
    pub fn previous_mask(&self) -> Option<&Mask> {
        self.fused_mask.as_ref()
    }

    pub(crate) fn advance(&mut self, fused_mask: Option<Mask>) {
        self.fused_mask = fused_mask;
        self.frame_index += 1;
    }
}

/// Where the windows of a STEADY frame come from
#[derive(Debug, Clone, PartialEq)]
pub enum RegionPlan {
    /// No region signal at all, tile the whole frame
    FullFrame,
    Regions(Vec<BBox<Ltrb>>),
}

#[derive(Debug, Clone)]
pub struct Fusion {
    pub mask: Option<Mask>,
    pub plan: RegionPlan,
}

/// Fuses the segmentation mask with the predicted track boxes.
///
/// Predictions are rendered at frame resolution, brought down to the
/// segmentation resolution and OR-ed into it; regions are the connected
/// components of the result. Without a segmentation the predictions alone
/// are used, and without any valid prediction the frame falls back to
/// full-frame tiling.
pub fn fuse_regions(segmentation: Option<&Mask>, predicted: &[Track], frame: Extent) -> Fusion {
    let boxes: Vec<BBox<Ltrb>> = predicted.iter().map(|t| t.bbox).collect();
    let tracked = Mask::from_boxes(&boxes, frame);

    let fused = match segmentation {
        Some(seg) => seg.union(&tracked),
        None if tracked.is_empty() => {
            return Fusion {
                mask: None,
                plan: RegionPlan::FullFrame,
            }
        }
        None => tracked,
    };

    let regions = fused.find_boxes(frame);

    Fusion {
        mask: Some(fused),
        plan: RegionPlan::Regions(regions),
    }
}
