use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::window::Extent;

/// Declared properties of a dataset image
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    pub id: u64,
    #[serde(default)]
    pub file_name: String,
    pub height: u32,
    pub width: u32,
}

impl ImageMetadata {
    #[inline]
    pub fn extent(&self) -> Extent {
        Extent::new(self.height, self.width)
    }
}

/// COCO style detection result
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub id: usize,
    pub image_id: u64,
    pub category_id: u32,
    /// `[x, y, width, height]`
    pub bbox: [f32; 4],
    pub area: f32,
    pub score: f32,
    pub iscrowd: u8,
}

#[inline]
fn round_to(value: f32, digits: i32) -> f32 {
    let scale = 10f32.powi(digits);

    (value * scale).round() / scale
}

impl DetectionRecord {
    /// Record of a frame-space detection on a frame decoded at `decoded`
    /// resolution, rescaled to the image's declared resolution. `id` is left
    /// at 0 until the record is numbered.
    pub fn new(det: &Detection, image: &ImageMetadata, decoded: Extent) -> Self {
        let sx = if decoded.width > 0 {
            image.width as f32 / decoded.width as f32
        } else {
            1.0
        };
        let sy = if decoded.height > 0 {
            image.height as f32 / decoded.height as f32
        } else {
            1.0
        };

        let x = det.xmin * sx;
        let y = det.ymin * sy;
        let w = (det.xmax - det.xmin) * sx;
        let h = (det.ymax - det.ymin) * sy;

        Self {
            id: 0,
            image_id: image.id,
            category_id: det.class,
            bbox: [round_to(x, 3), round_to(y, 3), round_to(w, 3), round_to(h, 3)],
            area: w * h,
            score: round_to(det.confidence, 5),
            iscrowd: 0,
        }
    }
}

/// Numbers records sequentially from `start`, returns the next free id
pub fn assign_ids(records: &mut [DetectionRecord], start: usize) -> usize {
    for (offset, record) in records.iter_mut().enumerate() {
        record.id = start + offset;
    }

    start + records.len()
}
