use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::nms::NmsConfig;
use crate::transform::FILL_VALUE;
use crate::window::Extent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detector canvas size
    pub window_size: Extent,
    /// Let oversized regions grow to the canvas aspect ratio and be
    /// letterboxed instead of tiling them at native scale
    pub allow_resize: bool,
    /// Number of leading frames of a sequence that only seed the tracker
    pub frame_delay: usize,
    pub obs_iou_threshold: f32,
    /// Cross-window NMS applied before OBS
    pub second_nms: Option<NmsConfig>,
    /// Maximum canvases per detector call, 0 sends all windows of a frame at once
    pub max_batch: usize,
    pub fill: [u8; 3],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: Extent::new(512, 512),
            allow_resize: true,
            frame_delay: 3,
            obs_iou_threshold: 0.7,
            second_nms: None,
            max_batch: 0,
            fill: FILL_VALUE,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(s)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size.is_empty() {
            return Err(Error::Config(format!(
                "window_size must be non-empty, got {}x{}",
                self.window_size.height, self.window_size.width
            )));
        }

        if !(0.0..=1.0).contains(&self.obs_iou_threshold) {
            return Err(Error::Config(format!(
                "obs_iou_threshold must be in [0, 1], got {}",
                self.obs_iou_threshold
            )));
        }

        if let Some(nms) = &self.second_nms {
            if !(0.0..=1.0).contains(&nms.iou_threshold) {
                return Err(Error::Config(format!(
                    "second_nms.iou_threshold must be in [0, 1], got {}",
                    nms.iou_threshold
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.window_size, Extent::new(512, 512));
        assert_eq!(config.frame_delay, 3);
        assert_eq!(config.fill, [114, 114, 114]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "window_size": {"height": 384, "width": 640},
                "frame_delay": 5,
                "second_nms": {"iou_threshold": 0.5, "merge": true}
            }"#,
        )
        .unwrap();

        assert_eq!(config.window_size, Extent::new(384, 640));
        assert_eq!(config.frame_delay, 5);
        assert_eq!(config.obs_iou_threshold, 0.7);

        let nms = config.second_nms.unwrap();
        assert_eq!(nms.iou_threshold, 0.5);
        assert_eq!(nms.max_detections, 500);
        assert!(nms.merge);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"obs_iou_threshold": 1.5}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"window_size": {"height": 0, "width": 512}}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str("{"),
            Err(Error::JsonError(_))
        ));
    }
}
