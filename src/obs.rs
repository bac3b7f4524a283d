//! Overlapping Box Suppression.
//!
//! Overlapping windows detect the same object more than once. A detection
//! `j` is a duplicate candidate when the part of another detection `i` that
//! falls into `j`'s neighbourhood (the intersection of `i` with a window
//! other than `i`'s own) overlaps `j` by more than the threshold.
//! Candidates are ranked by a mean of min-max normalised IOU, inverse
//! confidence and inverse area, then greedily resolved.

use crate::bbox::{BBox, Ltrb};
use crate::frame::FrameDetections;
use crate::math::min_max_normalize;
use crate::window::Window;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    /// detection explaining the duplicate
    i: usize,
    /// detection to remove
    j: usize,
    iou: f32,
}

/// Entries of `IOU[i, u, j]` above `threshold`, in `(i, u, j)` order:
/// overlap of detection `i` clipped to unique window `u` with detection `j`.
/// A detection is never clipped to its own origin window, and `i == j` is
/// skipped.
fn candidates(frame: &FrameDetections, unique: &[Window], threshold: f32) -> Vec<Candidate> {
    let boxes: Vec<BBox<Ltrb>> = frame.detections.iter().map(|d| d.bbox()).collect();
    let mut out = Vec::new();

    for (i, (origin, bbox)) in frame.windows.iter().zip(&boxes).enumerate() {
        for window in unique {
            if window == origin {
                continue;
            }

            let inter = bbox.intersection(&window.bbox());
            if inter.is_degenerate() {
                continue;
            }

            for (j, other) in boxes.iter().enumerate() {
                if i == j {
                    continue;
                }

                let iou = inter.iou(other);
                if iou > threshold {
                    out.push(Candidate { i, j, iou });
                }
            }
        }
    }

    out
}

/// Normalised component, or all zeros for a single candidate or a zero range
fn component(values: &[f32]) -> Vec<f32> {
    min_max_normalize(values).unwrap_or_else(|| vec![0.0; values.len()])
}

fn inverse_component(values: &[f32]) -> Vec<f32> {
    match min_max_normalize(values) {
        Some(norm) => norm.into_iter().map(|v| 1.0 - v).collect(),
        None => vec![0.0; values.len()],
    }
}

/// Indices of the detections to remove, ordered by removal decision
fn suppressed_indices(frame: &FrameDetections, threshold: f32) -> Vec<usize> {
    let mut unique = frame.windows.clone();
    unique.sort();
    unique.dedup();

    let candidates = candidates(frame, &unique, threshold);

    if candidates.is_empty() {
        return Vec::new();
    }

    let iou: Vec<f32> = candidates.iter().map(|c| c.iou).collect();
    let conf: Vec<f32> = candidates
        .iter()
        .map(|c| frame.detections[c.j].confidence)
        .collect();
    let area: Vec<f32> = candidates.iter().map(|c| frame.detections[c.j].area()).collect();

    let iou = component(&iou);
    let conf = inverse_component(&conf);
    let area = inverse_component(&area);

    let priority: Vec<f32> = (0..candidates.len())
        .map(|k| (iou[k] + conf[k] + area[k]) / 3.0)
        .collect();

    // stable: exact ties keep (i, u, j) generation order
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| priority[b].total_cmp(&priority[a]));

    let mut deleted = vec![false; frame.len()];
    let mut removed = Vec::new();

    for k in order {
        let Candidate { i, j, .. } = candidates[k];
        if deleted[i] || deleted[j] {
            continue;
        }

        deleted[j] = true;
        removed.push(j);
    }

    removed
}

/// Removes cross-window duplicates from `frame`.
///
/// Detections with non-finite values are dropped first. When no candidate
/// exceeds `threshold` the (finite) input is returned unchanged.
pub fn overlapping_box_suppression(mut frame: FrameDetections, threshold: f32) -> FrameDetections {
    frame.retain_finite();

    if frame.len() < 2 {
        return frame;
    }

    let removed = suppressed_indices(&frame, threshold);
    if removed.is_empty() {
        return frame;
    }

    let mut keep = vec![true; frame.len()];
    for &idx in &removed {
        keep[idx] = false;
    }

    log::trace!("obs removed {} of {} detections", removed.len(), frame.len());
    frame.retain_mask(&keep);
    frame
}
