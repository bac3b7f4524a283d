//! Per-sequence frame loop and run-level orchestration.

use image::RgbImage;
use rayon::prelude::*;

use crate::aggregate::Aggregator;
use crate::config::PipelineConfig;
use crate::dataset::{FrameSource, Sequence};
use crate::detector::Detector;
use crate::error::{Error, Result};
use crate::frame::FrameDetections;
use crate::obs::overlapping_box_suppression;
use crate::record::{assign_ids, DetectionRecord, ImageMetadata};
use crate::segmenter::Segmenter;
use crate::state::{fuse_regions, Phase, RegionPlan, SequenceState};
use crate::window::{sliding_window_tile, windows_from_regions, Extent, Window};
use crate::Tracker;

/// Result of one processed frame
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub index: usize,
    pub phase: Phase,
    pub windows: Vec<Window>,
    pub detections: FrameDetections,
}

impl FrameOutcome {
    /// Whether the detections belong to the sequence output
    #[inline]
    pub fn is_emitted(&self) -> bool {
        self.phase == Phase::Steady
    }

    /// Unnumbered records of an emitted frame, empty during INIT
    pub fn records(&self, image: &ImageMetadata, decoded: Extent) -> Vec<DetectionRecord> {
        if !self.is_emitted() {
            return Vec::new();
        }

        self.detections
            .detections
            .iter()
            .map(|det| DetectionRecord::new(det, image, decoded))
            .collect()
    }
}

/// Runs the detect / dedup / track / fuse loop over the ordered frames of a
/// single sequence. Owns the sequence's tracker and frame state.
pub struct SequenceDriver<'a, T> {
    config: &'a PipelineConfig,
    aggregator: Aggregator,
    detector: &'a mut dyn Detector,
    segmenter: Option<&'a mut dyn Segmenter>,
    tracker: T,
    state: SequenceState,
}

impl<'a, T: Tracker> SequenceDriver<'a, T> {
    pub fn new(
        config: &'a PipelineConfig,
        detector: &'a mut dyn Detector,
        segmenter: Option<&'a mut dyn Segmenter>,
        tracker: T,
    ) -> Self {
        Self {
            config,
            aggregator: Aggregator::new(config),
            detector,
            segmenter,
            tracker,
            state: SequenceState::new(config.frame_delay),
        }
    }

    #[inline]
    pub fn state(&self) -> &SequenceState {
        &self.state
    }

    #[inline]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn into_tracker(self) -> T {
        self.tracker
    }

    /// Processes the next frame of the sequence. Any collaborator failure
    /// fails the frame as a whole and leaves the frame counter untouched.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<FrameOutcome> {
        let (width, height) = frame.dimensions();
        let extent = Extent::new(height, width);
        let full = Window::full(extent);

        let index = self.state.frame_index();
        let phase = self.state.phase();
        let predicted = self.tracker.predict()?;

        let (windows, fused) = match phase {
            Phase::Init => (sliding_window_tile(full, self.config.window_size), None),
            Phase::Steady => {
                let segmentation = match self.segmenter.as_deref_mut() {
                    Some(segmenter) => Some(segmenter.infer(frame)?),
                    None => None,
                };

                let fusion = fuse_regions(segmentation.as_ref().map(|s| &s.mask), &predicted, extent);
                let windows = match &fusion.plan {
                    RegionPlan::FullFrame => sliding_window_tile(full, self.config.window_size),
                    RegionPlan::Regions(regions) => windows_from_regions(
                        regions,
                        height,
                        width,
                        self.config.window_size,
                        self.config.allow_resize,
                    ),
                };

                (windows, fusion.mask)
            }
        };

        log::trace!("frame {} ({:?}): {} windows", index, phase, windows.len());

        let detections = self.aggregator.detect(frame, &windows, &mut *self.detector)?;
        let detections = overlapping_box_suppression(detections, self.config.obs_iou_threshold);

        self.tracker.update(&detections.detections, &predicted)?;
        self.state.advance(fused);

        Ok(FrameOutcome {
            index,
            phase,
            windows,
            detections,
        })
    }
}

#[derive(Debug)]
pub struct SequenceFailure {
    pub sequence: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    /// Records of all successful sequences, in sequence order, numbered from 0
    pub records: Vec<DetectionRecord>,
    pub failures: Vec<SequenceFailure>,
}

impl RunSummary {
    fn collect<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (String, Result<Vec<DetectionRecord>>)>,
    {
        let mut summary = RunSummary::default();

        for (sequence, result) in results {
            match result {
                Ok(mut records) => {
                    assign_ids(&mut records, summary.records.len());
                    summary.records.append(&mut records);
                }
                Err(error) => {
                    log::warn!("sequence {} skipped: {}", sequence, error);
                    summary.failures.push(SequenceFailure { sequence, error });
                }
            }
        }

        summary
    }
}

/// Collaborators owned by one sequence of a parallel run
pub struct Collaborators<T> {
    pub detector: Box<dyn Detector>,
    pub segmenter: Option<Box<dyn Segmenter>>,
    pub tracker: T,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one sequence with a fresh frame state, returns its unnumbered
    /// records in frame order.
    pub fn process_sequence<S, T>(
        &self,
        sequence: &Sequence,
        source: &S,
        detector: &mut dyn Detector,
        segmenter: Option<&mut dyn Segmenter>,
        tracker: T,
    ) -> Result<Vec<DetectionRecord>>
    where
        S: FrameSource + ?Sized,
        T: Tracker,
    {
        log::info!(
            "sequence {}: processing {} frames",
            sequence.name,
            sequence.frames.len()
        );

        let segmenter = segmenter.map(|s| s as &mut dyn Segmenter);
        let mut driver = SequenceDriver::new(&self.config, detector, segmenter, tracker);
        let mut records = Vec::new();

        for path in &sequence.frames {
            let image = source.metadata_for(path)?;
            let frame = source.load(path)?;
            let (width, height) = frame.dimensions();

            let outcome = driver.process_frame(&frame)?;
            records.extend(outcome.records(&image, Extent::new(height, width)));
        }

        log::info!("sequence {}: {} records", sequence.name, records.len());

        Ok(records)
    }

    /// Runs sequences one after another, sharing the detector and segmenter
    /// and building a new tracker for every sequence. A failing sequence
    /// contributes no records and is reported in the summary.
    pub fn process_all<S, T, F>(
        &self,
        sequences: &[Sequence],
        source: &S,
        detector: &mut dyn Detector,
        mut segmenter: Option<&mut dyn Segmenter>,
        mut new_tracker: F,
    ) -> RunSummary
    where
        S: FrameSource + ?Sized,
        T: Tracker,
        F: FnMut(&Sequence) -> T,
    {
        let results: Vec<_> = sequences
            .iter()
            .map(|sequence| {
                let segmenter: Option<&mut dyn Segmenter> = match segmenter.as_mut() {
                    Some(s) => Some(&mut **s),
                    None => None,
                };
                let tracker = new_tracker(sequence);
                let result = self.process_sequence(sequence, source, &mut *detector, segmenter, tracker);

                (sequence.name.clone(), result)
            })
            .collect();

        RunSummary::collect(results)
    }

    /// Runs sequences in parallel, each with its own collaborators from
    /// `factory`. Records are numbered in sequence order as in
    /// [`Pipeline::process_all`].
    pub fn par_process_all<S, T, F>(&self, sequences: &[Sequence], source: &S, factory: F) -> RunSummary
    where
        S: FrameSource + Sync + ?Sized,
        T: Tracker,
        F: Fn(&Sequence) -> Result<Collaborators<T>> + Sync,
    {
        let results: Vec<_> = sequences
            .par_iter()
            .map(|sequence| {
                let result = factory(sequence).and_then(|mut c| {
                    let segmenter: Option<&mut dyn Segmenter> = match c.segmenter.as_mut() {
                        Some(s) => Some(&mut **s),
                        None => None,
                    };

                    self.process_sequence(sequence, source, &mut *c.detector, segmenter, c.tracker)
                });

                (sequence.name.clone(), result)
            })
            .collect();

        RunSummary::collect(results)
    }
}
