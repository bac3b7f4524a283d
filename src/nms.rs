use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::detection::Detection;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NmsConfig {
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Replace every kept box by the confidence weighted mean of its cluster
    pub merge: bool,
    /// With `merge`, keep only boxes whose cluster has more than one member
    pub redundant: bool,
    /// Suppress across classes
    pub agnostic: bool,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.65,
            max_detections: 500,
            merge: false,
            redundant: false,
            agnostic: false,
        }
    }
}

impl NmsConfig {
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            ..Default::default()
        }
    }

    #[inline]
    fn competes(&self, a: &Detection, b: &Detection) -> bool {
        self.agnostic || a.class == b.class
    }
}

fn merged(dets: &[Detection], cluster: &[usize], base: &Detection) -> Detection {
    let mut coords = [0.0f32; 4];
    let mut wsum = 0.0;

    for &idx in cluster {
        let det = &dets[idx];
        for (acc, v) in coords.iter_mut().zip(det.bbox().as_slice()) {
            *acc += v * det.confidence;
        }
        wsum += det.confidence;
    }

    if wsum > 0.0 {
        coords.iter_mut().for_each(|c| *c /= wsum);
        base.with_bbox(BBox::assigned(&coords))
    } else {
        *base
    }
}

/// Greedy confidence ordered non-max suppression.
///
/// Returns `(source index, detection)` pairs of kept detections ordered by
/// descending confidence, ties keep input order. With `merge` the returned
/// detection carries the merged box.
pub fn non_max_suppression(dets: &[Detection], config: &NmsConfig) -> Vec<(usize, Detection)> {
    let mut order: Vec<usize> = (0..dets.len()).collect();
    order.sort_by(|&a, &b| dets[b].confidence.total_cmp(&dets[a].confidence));

    let mut suppressed = vec![false; dets.len()];
    let mut kept = Vec::new();

    for (pos, &idx) in order.iter().enumerate() {
        if suppressed[idx] {
            continue;
        }

        kept.push(idx);

        for &other in &order[pos + 1..] {
            if !suppressed[other]
                && config.competes(&dets[idx], &dets[other])
                && dets[idx].iou(&dets[other]) > config.iou_threshold
            {
                suppressed[other] = true;
            }
        }
    }

    let mut result = Vec::with_capacity(kept.len());

    for idx in kept {
        if !config.merge {
            result.push((idx, dets[idx]));
            continue;
        }

        let cluster: Vec<usize> = (0..dets.len())
            .filter(|&j| {
                j == idx
                    || (config.competes(&dets[idx], &dets[j])
                        && dets[idx].iou(&dets[j]) > config.iou_threshold)
            })
            .collect();

        if config.redundant && cluster.len() < 2 {
            continue;
        }

        result.push((idx, merged(dets, &cluster, &dets[idx])));
    }

    result.truncate(config.max_detections);
    result
}
