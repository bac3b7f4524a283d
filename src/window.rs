//! Detection window geometry.
//!
//! Windows are integer, frame-space rectangles. Every window produced here is
//! non-empty and lies inside the frame it was generated for, and window lists
//! come out deduplicated and sorted by `(ymin, xmin)`.

use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// Raster size as `(height, width)`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub height: u32,
    pub width: u32,
}

impl Extent {
    #[inline]
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    #[inline]
    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    #[inline]
    pub fn transposed(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    /// This extent turned by 90° when its orientation disagrees with `other`'s.
    #[inline]
    pub fn oriented_like(&self, other: &Extent) -> Extent {
        if self.is_portrait() != other.is_portrait() {
            self.transposed()
        } else {
            *self
        }
    }

    #[inline]
    pub fn fits_in(&self, other: &Extent) -> bool {
        self.height <= other.height && self.width <= other.width
    }
}

impl From<(u32, u32)> for Extent {
    fn from((height, width): (u32, u32)) -> Self {
        Extent::new(height, width)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Window {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

impl Window {
    #[inline]
    pub const fn new(xmin: u32, ymin: u32, xmax: u32, ymax: u32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Window covering a whole frame
    #[inline]
    pub fn full(frame: Extent) -> Self {
        Self::new(0, 0, frame.width, frame.height)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.xmax.saturating_sub(self.xmin)
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.ymax.saturating_sub(self.ymin)
    }

    #[inline]
    pub fn extent(&self) -> Extent {
        Extent::new(self.height(), self.width())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.extent().is_empty()
    }

    #[inline]
    pub fn fits_in(&self, frame: Extent) -> bool {
        self.xmax <= frame.width && self.ymax <= frame.height
    }

    #[inline]
    pub fn bbox(&self) -> BBox<Ltrb> {
        BBox::ltrb(
            self.xmin as f32,
            self.ymin as f32,
            self.xmax as f32,
            self.ymax as f32,
        )
    }

    /// Smallest integer window enclosing `bbox` after clipping it to `frame`,
    /// `None` when nothing of positive area is left.
    pub fn enclosing(bbox: &BBox<Ltrb>, frame: Extent) -> Option<Self> {
        if !bbox.is_finite() {
            return None;
        }

        let clipped = bbox.clip(frame.width as f32, frame.height as f32);
        let window = Self::new(
            clipped.left().floor() as u32,
            clipped.top().floor() as u32,
            clipped.right().ceil() as u32,
            clipped.bottom().ceil() as u32,
        );

        if window.is_empty() || clipped.is_degenerate() {
            None
        } else {
            Some(window)
        }
    }

    #[inline]
    fn sort_key(&self) -> (u32, u32, u32, u32) {
        (self.ymin, self.xmin, self.ymax, self.xmax)
    }
}

fn tile_starts(origin: u32, length: u32, tile: u32) -> Vec<u32> {
    if length <= tile {
        return vec![origin];
    }

    let end = origin + length;
    let mut starts = Vec::with_capacity((length / tile + 1) as usize);
    let mut pos = origin;

    while pos + tile < end {
        starts.push(pos);
        pos += tile;
    }

    // the last tile is pulled back so it ends exactly on the border
    starts.push(end - tile);
    starts
}

/// Covers `area` with a row-major grid of `window_size` tiles. Tiles only
/// overlap where the last row / column is pulled back inside the area, an
/// area smaller than the tile gives a single tile clipped to the area.
pub fn sliding_window_tile(area: Window, window_size: Extent) -> Vec<Window> {
    if area.is_empty() || window_size.is_empty() {
        return Vec::new();
    }

    let tile_w = window_size.width.min(area.width());
    let tile_h = window_size.height.min(area.height());

    let xs = tile_starts(area.xmin, area.width(), tile_w);
    let ys = tile_starts(area.ymin, area.height(), tile_h);

    ys.iter()
        .flat_map(|&y| {
            xs.iter()
                .map(move |&x| Window::new(x, y, x + tile_w, y + tile_h))
        })
        .collect()
}

/// Window with the aspect ratio of `canvas` (turned to the region's
/// orientation) centered on `region`, shifted and clipped into the frame.
fn expand_to_aspect(region: Window, canvas: Extent, frame: Extent) -> Window {
    let canvas = canvas.oriented_like(&region.extent());
    let aspect = canvas.width as f32 / canvas.height as f32;

    let (rw, rh) = (region.width() as f32, region.height() as f32);
    let (w, h) = if rw / rh > aspect {
        (rw, (rw / aspect).ceil())
    } else {
        ((rh * aspect).ceil(), rh)
    };

    let w = (w as u32).max(region.width()).min(frame.width);
    let h = (h as u32).max(region.height()).min(frame.height);

    let center_x = region.xmin + region.width() / 2;
    let center_y = region.ymin + region.height() / 2;

    let xmin = center_x.saturating_sub(w / 2).min(frame.width - w);
    let ymin = center_y.saturating_sub(h / 2).min(frame.height - h);

    Window::new(xmin, ymin, xmin + w, ymin + h)
}

/// Converts ROI boxes into detection windows for a detector with a fixed
/// `window_size` canvas.
///
/// A region fitting the canvas (possibly after the 90° orientation turn the
/// crop unit applies) is used as is. Larger regions are expanded to the
/// canvas aspect ratio and left for letterbox downscaling when
/// `allow_resize` is set; otherwise they are tiled with canvas-sized windows
/// so the detector keeps working at native scale.
pub fn windows_from_regions(
    regions: &[BBox<Ltrb>],
    frame_height: u32,
    frame_width: u32,
    window_size: Extent,
    allow_resize: bool,
) -> Vec<Window> {
    let frame = Extent::new(frame_height, frame_width);
    if frame.is_empty() || window_size.is_empty() {
        return Vec::new();
    }

    let mut windows = Vec::with_capacity(regions.len());

    for bbox in regions {
        let region = match Window::enclosing(bbox, frame) {
            Some(region) => region,
            None => {
                log::debug!("dropping degenerate region {:?}", bbox.as_slice());
                continue;
            }
        };

        let extent = region.extent();
        if extent.oriented_like(&window_size).fits_in(&window_size) {
            windows.push(region);
        } else if allow_resize {
            windows.push(expand_to_aspect(region, window_size, frame));
        } else {
            let tile = window_size.oriented_like(&extent);
            windows.extend(sliding_window_tile(region, tile));
        }
    }

    windows.sort_by_key(Window::sort_key);
    windows.dedup();
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(region: &Window, windows: &[Window]) -> bool {
        (region.ymin..region.ymax).all(|y| {
            (region.xmin..region.xmax).all(|x| {
                windows
                    .iter()
                    .any(|w| w.xmin <= x && x < w.xmax && w.ymin <= y && y < w.ymax)
            })
        })
    }

    #[test]
    fn test_tile_covers_frame() {
        let frame = Window::new(0, 0, 1000, 700);
        let tiles = sliding_window_tile(frame, Extent::new(512, 512));

        assert_eq!(
            tiles,
            vec![
                Window::new(0, 0, 512, 512),
                Window::new(488, 0, 1000, 512),
                Window::new(0, 188, 512, 700),
                Window::new(488, 188, 1000, 700),
            ]
        );
        assert!(tiles.iter().all(|t| t.fits_in(Extent::new(700, 1000))));
        assert!(covered(&frame, &tiles));
    }

    #[test]
    fn test_tile_smaller_frame() {
        let tiles = sliding_window_tile(Window::new(0, 0, 300, 200), Extent::new(512, 512));
        assert_eq!(tiles, vec![Window::new(0, 0, 300, 200)]);
    }

    #[test]
    fn test_tile_exact_multiple() {
        let tiles = sliding_window_tile(Window::new(0, 0, 1024, 512), Extent::new(512, 512));
        assert_eq!(
            tiles,
            vec![Window::new(0, 0, 512, 512), Window::new(512, 0, 1024, 512)]
        );
    }

    #[test]
    fn test_small_regions_used_directly() {
        let regions = [
            BBox::ltrb(300.0, 40.0, 350.0, 90.0),
            BBox::ltrb(10.5, 20.2, 60.7, 80.1),
        ];
        let windows = windows_from_regions(&regions, 700, 1000, Extent::new(512, 512), true);

        assert_eq!(
            windows,
            vec![Window::new(10, 20, 61, 81), Window::new(300, 40, 350, 90)]
        );
    }

    #[test]
    fn test_degenerate_and_duplicate_regions() {
        let regions = [
            BBox::ltrb(10.0, 10.0, 10.0, 50.0),
            BBox::ltrb(2000.0, 10.0, 2100.0, 50.0),
            BBox::ltrb(f32::NAN, 10.0, 20.0, 50.0),
            BBox::ltrb(5.0, 5.0, 25.0, 25.0),
            BBox::ltrb(5.0, 5.0, 25.0, 25.0),
        ];
        let windows = windows_from_regions(&regions, 700, 1000, Extent::new(512, 512), true);

        assert_eq!(windows, vec![Window::new(5, 5, 25, 25)]);
    }

    #[test]
    fn test_large_region_expanded_with_resize() {
        let region = BBox::ltrb(100.0, 100.0, 900.0, 300.0);
        let windows = windows_from_regions(&[region], 700, 1000, Extent::new(512, 512), true);

        assert_eq!(windows.len(), 1);
        let w = windows[0];
        assert!(w.bbox().contains(&region));
        // square canvas aspect, capped by the frame height
        assert_eq!(w, Window::new(100, 0, 900, 700));
        assert!(w.fits_in(Extent::new(700, 1000)));
    }

    #[test]
    fn test_large_region_tiled_without_resize() {
        let region = BBox::ltrb(100.0, 100.0, 900.0, 300.0);
        let windows = windows_from_regions(&[region], 700, 1000, Extent::new(512, 512), false);

        assert_eq!(
            windows,
            vec![Window::new(100, 100, 612, 300), Window::new(388, 100, 900, 300)]
        );
        assert!(windows
            .iter()
            .all(|w| w.extent().fits_in(&Extent::new(512, 512))));
    }

    #[test]
    fn test_portrait_region_fits_rotated_canvas() {
        let canvas = Extent::new(384, 640);
        let region = BBox::ltrb(0.0, 0.0, 300.0, 600.0);
        let windows = windows_from_regions(&[region], 1080, 1920, canvas, false);

        assert_eq!(windows, vec![Window::new(0, 0, 300, 600)]);
    }

    #[test]
    fn test_regions_are_covered() {
        let canvas = Extent::new(384, 640);
        let frame = Extent::new(1080, 1920);
        let regions = [
            BBox::ltrb(0.0, 0.0, 1500.0, 200.0),
            BBox::ltrb(1000.0, 300.0, 1400.0, 1080.0),
            BBox::ltrb(1700.0, 900.0, 1920.0, 1000.0),
        ];

        for allow_resize in [true, false] {
            let windows =
                windows_from_regions(&regions, frame.height, frame.width, canvas, allow_resize);

            for region in &regions {
                let region = Window::enclosing(region, frame).unwrap();
                assert!(covered(&region, &windows));
            }
            assert!(windows.iter().all(|w| w.fits_in(frame) && !w.is_empty()));
            assert!(windows
                .windows(2)
                .all(|p| (p[0].ymin, p[0].xmin) <= (p[1].ymin, p[1].xmin)));
        }
    }
}
