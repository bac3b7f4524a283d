use crate::detection::Detection;
use crate::window::Window;

/// Frame-space detections of one frame, each paired with the window it was
/// detected in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDetections {
    pub windows: Vec<Window>,
    pub detections: Vec<Detection>,
}

impl FrameDetections {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    #[inline]
    pub fn push(&mut self, window: Window, detection: Detection) {
        self.windows.push(window);
        self.detections.push(detection);
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&Window, &Detection)> {
        self.windows.iter().zip(self.detections.iter())
    }

    /// Keeps the pairs whose flag in `keep` is set
    pub fn retain_mask(&mut self, keep: &[bool]) {
        let mut flags = keep.iter().copied();
        self.windows.retain(|_| flags.next().unwrap_or(false));

        let mut flags = keep.iter().copied();
        self.detections.retain(|_| flags.next().unwrap_or(false));
    }

    /// Drops pairs whose detection has a non-finite coordinate or confidence
    pub fn retain_finite(&mut self) {
        let keep: Vec<bool> = self.detections.iter().map(Detection::is_finite).collect();
        let dropped = keep.iter().filter(|k| !**k).count();

        if dropped > 0 {
            log::debug!("dropping {} non-finite detections", dropped);
            self.retain_mask(&keep);
        }
    }
}

impl FromIterator<(Window, Detection)> for FrameDetections {
    fn from_iter<I: IntoIterator<Item = (Window, Detection)>>(iter: I) -> Self {
        let (windows, detections) = iter.into_iter().unzip();

        Self {
            windows,
            detections,
        }
    }
}
