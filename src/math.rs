use nalgebra as na;

/// Min-max normalisation into `[0, 1]`.
///
/// Returns `None` for an empty input or a zero range, callers treat that as
/// a neutral component instead of dividing by zero.
pub fn min_max_normalize(values: &[f32]) -> Option<Vec<f32>> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if !(range > 0.0) || !range.is_finite() {
        return None;
    }

    Some(values.iter().map(|v| (v - min) / range).collect())
}

#[inline]
pub fn transform_point(m: &na::Matrix3<f32>, x: f32, y: f32) -> na::Point2<f32> {
    let v = m * na::Vector3::new(x, y, 1.0);

    na::Point2::new(v.x / v.z, v.y / v.z)
}

#[inline]
pub fn translation(tx: f32, ty: f32) -> na::Matrix3<f32> {
    na::Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0)
}

#[inline]
pub fn scaling(sx: f32, sy: f32) -> na::Matrix3<f32> {
    na::Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0)
}

/// 90° clockwise rotation of a raster of height `h`: `(x, y) -> (h - y, x)`
#[inline]
pub fn rotation_cw(h: f32) -> na::Matrix3<f32> {
    na::Matrix3::new(0.0, -1.0, h, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0)
}

/// 90° counter-clockwise rotation of a raster of width `w`: `(x, y) -> (y, w - x)`,
/// the inverse of [`rotation_cw`] for the raster it produced.
#[inline]
pub fn rotation_ccw(w: f32) -> na::Matrix3<f32> {
    na::Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, w, 0.0, 0.0, 1.0)
}
