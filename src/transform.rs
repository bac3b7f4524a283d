//! Window crop / orientation / letterbox transform and its inverse.
//!
//! A window is cropped from the frame, turned 90° clockwise when its
//! orientation disagrees with the detector canvas, downscaled (never
//! upscaled) to fit the canvas keeping its aspect ratio, and pasted into the
//! top-left corner of a canvas filled with a neutral gray.

use image::{imageops, Rgb, RgbImage};
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::error::{Error, Result};
use crate::math;
use crate::window::{Extent, Window};

pub const FILL_VALUE: [u8; 3] = [114, 114, 114];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WindowTransform {
    pub window: Window,
    pub rotated: bool,
    pub resized: bool,
    /// Valid canvas area before padding
    pub unpadded_extent: Extent,
    /// Crop extent before rotation
    pub original_extent: Extent,
    /// Frame-space position of the crop's top-left corner
    pub translate: (u32, u32),
}

/// Largest extent with the aspect ratio of `src` that fits into `dst`
fn letterbox_extent(src: Extent, dst: Extent) -> Extent {
    let ratio = (dst.height as f32 / src.height as f32).min(dst.width as f32 / src.width as f32);

    Extent::new(
        ((src.height as f32 * ratio).round() as u32).clamp(1, dst.height),
        ((src.width as f32 * ratio).round() as u32).clamp(1, dst.width),
    )
}

impl WindowTransform {
    /// Transform parameters of `window` for a detector `canvas`, these only
    /// depend on the geometry, not on pixel data.
    pub fn plan(window: Window, canvas: Extent) -> Self {
        let original_extent = window.extent();
        let rotated = original_extent.is_portrait() != canvas.is_portrait();
        let oriented = if rotated {
            original_extent.transposed()
        } else {
            original_extent
        };

        let resized = !oriented.fits_in(&canvas);
        let unpadded_extent = if resized {
            letterbox_extent(oriented, canvas)
        } else {
            oriented
        };

        Self {
            window,
            rotated,
            resized,
            unpadded_extent,
            original_extent,
            translate: (window.xmin, window.ymin),
        }
    }

    /// Crop extent after the orientation turn and before the letterbox resize
    #[inline]
    pub fn oriented_extent(&self) -> Extent {
        if self.rotated {
            self.original_extent.transposed()
        } else {
            self.original_extent
        }
    }

    /// Homogeneous canvas-space to frame-space mapping: undo letterbox,
    /// undo rotation, translate by the window origin.
    pub fn canvas_to_frame(&self) -> na::Matrix3<f32> {
        let mut m = math::translation(self.translate.0 as f32, self.translate.1 as f32);

        if self.rotated {
            // the rotated crop is as wide as the original one was high
            m *= math::rotation_ccw(self.original_extent.height as f32);
        }

        if self.resized {
            let oriented = self.oriented_extent();
            m *= math::scaling(
                oriented.width as f32 / self.unpadded_extent.width as f32,
                oriented.height as f32 / self.unpadded_extent.height as f32,
            );
        }

        m
    }

    pub fn frame_to_canvas(&self) -> na::Matrix3<f32> {
        let mut m: na::Matrix3<f32> = na::Matrix3::identity();

        if self.resized {
            let oriented = self.oriented_extent();
            m *= math::scaling(
                self.unpadded_extent.width as f32 / oriented.width as f32,
                self.unpadded_extent.height as f32 / oriented.height as f32,
            );
        }

        if self.rotated {
            m *= math::rotation_cw(self.original_extent.height as f32);
        }

        m * math::translation(-(self.translate.0 as f32), -(self.translate.1 as f32))
    }

    /// Maps a canvas-space box back to frame space
    pub fn reproject(&self, bbox: &BBox<Ltrb>) -> BBox<Ltrb> {
        map_box(&self.canvas_to_frame(), bbox)
    }

    /// Maps a frame-space box onto the canvas
    pub fn project(&self, bbox: &BBox<Ltrb>) -> BBox<Ltrb> {
        map_box(&self.frame_to_canvas(), bbox)
    }
}

fn map_box(m: &na::Matrix3<f32>, bbox: &BBox<Ltrb>) -> BBox<Ltrb> {
    let a = math::transform_point(m, bbox.left(), bbox.top());
    let b = math::transform_point(m, bbox.right(), bbox.bottom());

    BBox::from_corners(a.x, a.y, b.x, b.y)
}

/// Builds the network-ready canvas for `window` together with the parameters
/// needed to map detections on it back to the frame.
pub fn prepare_window(
    frame: &RgbImage,
    window: &Window,
    canvas: Extent,
    fill: [u8; 3],
) -> Result<(RgbImage, WindowTransform)> {
    let (frame_w, frame_h) = frame.dimensions();
    let frame_extent = Extent::new(frame_h, frame_w);

    if window.is_empty() || !window.fits_in(frame_extent) {
        return Err(Error::WindowOutOfBounds {
            window: *window,
            frame: frame_extent,
        });
    }

    let params = WindowTransform::plan(*window, canvas);

    let mut crop = imageops::crop_imm(
        frame,
        window.xmin,
        window.ymin,
        window.width(),
        window.height(),
    )
    .to_image();

    if params.rotated {
        crop = imageops::rotate90(&crop);
    }

    if params.resized {
        crop = imageops::resize(
            &crop,
            params.unpadded_extent.width,
            params.unpadded_extent.height,
            imageops::FilterType::Triangle,
        );
    }

    let mut out = RgbImage::from_pixel(canvas.width, canvas.height, Rgb(fill));
    imageops::replace(&mut out, &crop, 0, 0);

    Ok((out, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const CANVAS: Extent = Extent::new(512, 512);

    fn assert_round_trip(window: Window, rotated: bool, resized: bool) {
        let params = WindowTransform::plan(window, CANVAS);
        assert_eq!(params.rotated, rotated);
        assert_eq!(params.resized, resized);

        let (x0, y0) = (window.xmin as f32, window.ymin as f32);
        let (w, h) = (window.width() as f32, window.height() as f32);
        let boxes = [
            window.bbox(),
            BBox::ltrb(x0 + 3.0, y0 + 5.5, x0 + 20.25, y0 + 40.0),
            BBox::ltrb(x0 + w * 0.5, y0 + h * 0.25, x0 + w, y0 + h * 0.75),
        ];

        for bbox in &boxes {
            let canvas_box = params.project(bbox);
            assert!(canvas_box.left() >= -1e-3 && canvas_box.top() >= -1e-3);
            assert!(canvas_box.right() <= params.unpadded_extent.width as f32 + 1e-3);
            assert!(canvas_box.bottom() <= params.unpadded_extent.height as f32 + 1e-3);

            let back = params.reproject(&canvas_box);
            for (a, b) in back.as_slice().iter().zip(bbox.as_slice()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn test_round_trip_plain() {
        assert_round_trip(Window::new(100, 50, 400, 250), false, false);
    }

    #[test]
    fn test_round_trip_rotated() {
        assert_round_trip(Window::new(10, 20, 210, 420), true, false);
    }

    #[test]
    fn test_round_trip_resized() {
        assert_round_trip(Window::new(0, 0, 1000, 600), false, true);
    }

    #[test]
    fn test_round_trip_rotated_resized() {
        assert_round_trip(Window::new(40, 0, 640, 1000), true, true);
    }

    #[test]
    fn test_matrices_are_inverse() {
        let params = WindowTransform::plan(Window::new(40, 0, 640, 1000), CANVAS);
        let product = params.frame_to_canvas() * params.canvas_to_frame();

        for (a, b) in product.iter().zip(na::Matrix3::<f32>::identity().iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_letterbox_extent() {
        let params = WindowTransform::plan(Window::new(0, 0, 1000, 600), CANVAS);
        assert_eq!(params.unpadded_extent, Extent::new(307, 512));
        assert_eq!(params.original_extent, Extent::new(600, 1000));
    }

    #[test]
    fn test_never_upscaled() {
        let params = WindowTransform::plan(Window::new(0, 0, 30, 20), CANVAS);
        assert!(!params.resized);
        assert_eq!(params.unpadded_extent, Extent::new(20, 30));
    }

    #[test]
    fn test_prepare_rotated_canvas() {
        let mut frame = RgbImage::from_pixel(20, 10, Rgb([0, 0, 0]));
        frame.put_pixel(3, 2, Rgb([255, 0, 0]));

        // 4 px wide, 6 px high crop on a square canvas is turned clockwise
        let window = Window::new(2, 1, 6, 7);
        let (canvas, params) = prepare_window(&frame, &window, Extent::new(8, 8), FILL_VALUE).unwrap();

        assert!(params.rotated);
        assert!(!params.resized);
        assert_eq!(params.unpadded_extent, Extent::new(4, 6));
        assert_eq!(canvas.dimensions(), (8, 8));
        assert_eq!(canvas.get_pixel(4, 1), &Rgb([255, 0, 0]));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(6, 0), &Rgb(FILL_VALUE));
        assert_eq!(canvas.get_pixel(0, 4), &Rgb(FILL_VALUE));

        // the marked pixel maps back onto itself
        let back = params.reproject(&BBox::ltrb(4.0, 1.0, 5.0, 2.0));
        assert_eq!(back.as_slice(), &[3.0, 2.0, 4.0, 3.0]);
    }

    #[test]
    fn test_prepare_resized_canvas() {
        let frame = RgbImage::from_pixel(64, 32, Rgb([10, 20, 30]));
        let (canvas, params) =
            prepare_window(&frame, &Window::full(Extent::new(32, 64)), Extent::new(16, 16), FILL_VALUE)
                .unwrap();

        assert!(params.resized);
        assert_eq!(params.unpadded_extent, Extent::new(8, 16));
        assert_eq!(canvas.get_pixel(15, 7), &Rgb([10, 20, 30]));
        assert_eq!(canvas.get_pixel(15, 8), &Rgb(FILL_VALUE));
    }

    #[test]
    fn test_prepare_rejects_out_of_frame_window() {
        let frame = RgbImage::new(20, 10);
        let res = prepare_window(&frame, &Window::new(15, 0, 25, 5), Extent::new(8, 8), FILL_VALUE);
        assert!(matches!(res, Err(Error::WindowOutOfBounds { .. })));

        let res = prepare_window(&frame, &Window::new(5, 5, 5, 8), Extent::new(8, 8), FILL_VALUE);
        assert!(res.is_err());
    }
}
