use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// Predicted location of a live track, frame-space
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub track_id: i32,
    pub bbox: BBox<Ltrb>,
}

impl Track {
    #[inline]
    pub fn new(track_id: i32, bbox: BBox<Ltrb>) -> Self {
        Self { track_id, bbox }
    }
}
