use std::collections::BTreeMap;

use image::{imageops, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::bbox::{BBox, Ltrb};
use crate::window::Extent;

const ON: Luma<u8> = Luma([255]);
const OFF: Luma<u8> = Luma([0]);

/// Binary region raster, pixels are either 0 or 255. The raster resolution
/// is independent of the frame it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(GrayImage);

impl Mask {
    pub fn new(extent: Extent) -> Self {
        Mask(GrayImage::new(extent.width, extent.height))
    }

    /// Wraps a gray raster, any non-zero pixel is set
    pub fn from_gray(image: GrayImage) -> Self {
        let mut image = image;
        binarize(&mut image);

        Mask(image)
    }

    #[inline]
    pub fn extent(&self) -> Extent {
        Extent::new(self.0.height(), self.0.width())
    }

    #[inline]
    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    #[inline]
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] > 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.pixels().all(|p| p[0] == 0)
    }

    /// Renders frame-space boxes onto a frame-sized mask.
    ///
    /// Boxes are clipped to `[0, W - 1] x [0, H - 1]`, the ones with no
    /// positive width or height left are dropped, and the rest fill their
    /// integer pixel span inclusively.
    pub fn from_boxes(boxes: &[BBox<Ltrb>], frame: Extent) -> Self {
        let mut mask = Mask::new(frame);
        if frame.is_empty() {
            return mask;
        }

        let (max_x, max_y) = ((frame.width - 1) as f32, (frame.height - 1) as f32);

        for bbox in boxes {
            if !bbox.is_finite() {
                log::debug!("dropping non-finite box {:?}", bbox.as_slice());
                continue;
            }

            let xmin = bbox.left().max(0.0);
            let ymin = bbox.top().max(0.0);
            let xmax = bbox.right().min(max_x);
            let ymax = bbox.bottom().min(max_y);

            if !(xmax - xmin > 0.0 && ymax - ymin > 0.0) {
                log::debug!("dropping degenerate box {:?}", bbox.as_slice());
                continue;
            }

            let (x0, y0) = (xmin as u32, ymin as u32);
            let (x1, y1) = (xmax as u32, ymax as u32);

            draw_filled_rect_mut(
                &mut mask.0,
                Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0 + 1, y1 - y0 + 1),
                ON,
            );
        }

        mask
    }

    /// Bilinear resize, any pixel touched by a set region stays set
    pub fn resized(&self, extent: Extent) -> Mask {
        if extent == self.extent() {
            return self.clone();
        }

        let mut image = imageops::resize(
            &self.0,
            extent.width,
            extent.height,
            imageops::FilterType::Triangle,
        );
        binarize(&mut image);

        Mask(image)
    }

    /// Pixel-wise OR, `other` is brought to this mask's resolution first
    pub fn union(&self, other: &Mask) -> Mask {
        let other = other.resized(self.extent());
        let mut out = self.clone();

        for (dst, src) in out.0.pixels_mut().zip(other.0.pixels()) {
            if src[0] > 0 {
                *dst = ON;
            }
        }

        out
    }

    /// Dilation with a `kernel x kernel` square structuring element
    pub fn dilated(&self, kernel: u8) -> Mask {
        if kernel < 2 {
            return self.clone();
        }

        Mask(imageproc::morphology::dilate(&self.0, Norm::LInf, kernel / 2))
    }

    /// Bounding boxes of the 8-connected set regions, scaled to `frame`
    /// resolution, in raster order of their first pixel.
    pub fn find_boxes(&self, frame: Extent) -> Vec<BBox<Ltrb>> {
        let labels = connected_components(&self.0, Connectivity::Eight, OFF);

        // label -> (xmin, ymin, xmax, ymax) in mask pixels, inclusive
        let mut spans: BTreeMap<u32, (u32, u32, u32, u32)> = BTreeMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0];
            if label == 0 {
                continue;
            }

            spans
                .entry(label)
                .and_modify(|s| {
                    s.0 = s.0.min(x);
                    s.1 = s.1.min(y);
                    s.2 = s.2.max(x);
                    s.3 = s.3.max(y);
                })
                .or_insert((x, y, x, y));
        }

        let sx = frame.width as f32 / self.0.width() as f32;
        let sy = frame.height as f32 / self.0.height() as f32;

        spans
            .values()
            .map(|&(x0, y0, x1, y1)| {
                BBox::ltrb(
                    (x0 as f32 * sx).floor(),
                    (y0 as f32 * sy).floor(),
                    ((x1 + 1) as f32 * sx).ceil().min(frame.width as f32),
                    ((y1 + 1) as f32 * sy).ceil().min(frame.height as f32),
                )
            })
            .collect()
    }
}

fn binarize(image: &mut GrayImage) {
    for p in image.pixels_mut() {
        *p = if p[0] > 0 { ON } else { OFF };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_boxes_inclusive_and_clipped() {
        let frame = Extent::new(10, 20);
        let mask = Mask::from_boxes(
            &[
                BBox::ltrb(2.0, 3.0, 4.0, 5.0),
                BBox::ltrb(15.0, -4.0, 40.0, 2.0),
                BBox::ltrb(8.0, 8.0, 8.0, 9.0),
                BBox::ltrb(-5.0, 0.0, -1.0, 3.0),
            ],
            frame,
        );

        assert!(mask.is_set(2, 3) && mask.is_set(4, 5));
        assert!(!mask.is_set(5, 5) && !mask.is_set(1, 3));
        assert!(mask.is_set(19, 0) && mask.is_set(15, 2));
        assert!(!mask.is_set(8, 8));
        assert!(!mask.is_set(0, 0));
    }

    #[test]
    fn test_find_boxes_scaled() {
        let mut image = GrayImage::new(10, 5);
        image.put_pixel(1, 1, ON);
        image.put_pixel(2, 2, ON);
        image.put_pixel(7, 3, ON);

        let boxes = Mask::from_gray(image).find_boxes(Extent::new(50, 100));

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].as_slice(), &[10.0, 10.0, 30.0, 30.0]);
        assert_eq!(boxes[1].as_slice(), &[70.0, 30.0, 80.0, 40.0]);
    }

    #[test]
    fn test_union_resizes() {
        let frame = Extent::new(40, 80);
        let tracked = Mask::from_boxes(&[BBox::ltrb(40.0, 20.0, 47.0, 27.0)], frame);

        let mut low = GrayImage::new(8, 4);
        low.put_pixel(0, 0, ON);
        let fused = Mask::from_gray(low).union(&tracked);

        assert_eq!(fused.extent(), Extent::new(4, 8));
        assert!(fused.is_set(0, 0));
        assert!(fused.is_set(4, 2));
        assert!(!fused.is_set(7, 3));
    }

    #[test]
    fn test_dilate() {
        let mut image = GrayImage::new(9, 9);
        image.put_pixel(4, 4, ON);

        let mask = Mask::from_gray(image).dilated(3);
        assert!(mask.is_set(3, 3) && mask.is_set(5, 5));
        assert!(!mask.is_set(2, 4));
    }

    #[test]
    fn test_empty() {
        let mask = Mask::new(Extent::new(4, 4));
        assert!(mask.is_empty());
        assert!(mask.find_boxes(Extent::new(8, 8)).is_empty());
    }
}
