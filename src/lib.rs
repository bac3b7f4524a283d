pub mod aggregate;
pub mod bbox;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod detector;
pub mod driver;
pub mod error;
pub mod frame;
pub mod mask;
pub mod math;
pub mod nms;
pub mod obs;
pub mod record;
pub mod segmenter;
pub mod state;
pub mod transform;
pub mod window;

mod track;

pub use config::PipelineConfig;
pub use detection::Detection;
pub use detector::Detector;
pub use driver::{Pipeline, RunSummary, SequenceDriver};
pub use error::{Error, Result};
pub use frame::FrameDetections;
pub use segmenter::Segmenter;
pub use track::Track;
pub use window::{Extent, Window};

/// Multi-object tracker driven frame by frame.
///
/// `predict` returns the expected locations of the live tracks in the frame
/// about to be processed; `update` then receives that frame's detections
/// together with the very same predictions.
pub trait Tracker {
    fn predict(&mut self) -> Result<Vec<Track>>;
    fn update(&mut self, detections: &[Detection], predicted: &[Track]) -> Result<()>;
}
