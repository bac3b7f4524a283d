use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// Contains left-top and right-bottom corners of the bbox. Detections are in
/// canvas space straight out of a detector and in frame space after
/// reprojection.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: u32,
}

impl Detection {
    #[inline]
    pub fn new(bbox: BBox<Ltrb>, confidence: f32, class: u32) -> Self {
        Self {
            xmin: bbox.left(),
            ymin: bbox.top(),
            xmax: bbox.right(),
            ymax: bbox.bottom(),
            confidence,
            class,
        }
    }

    #[inline(always)]
    pub fn bbox(&self) -> BBox<Ltrb> {
        BBox::ltrb(self.xmin, self.ymin, self.xmax, self.ymax)
    }

    #[inline]
    pub fn with_bbox(&self, bbox: BBox<Ltrb>) -> Self {
        Self::new(bbox, self.confidence, self.class)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.bbox().area()
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox().iou(&other.bbox())
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.bbox().is_finite() && self.confidence.is_finite()
    }
}
