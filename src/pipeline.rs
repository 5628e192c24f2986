// THEORY:
// The `pipeline` module is the top-level detection API. It wraps the two
// analysis stages into one object so the processing loop (or a test, or an
// offline tool) can hand it a frame and get a verdict back.
//
// Stage 1 (temporal) is the `BackgroundModel`, which owns all the memory.
// Stage 2 (spatial) is the stateless motion classifier.
//
// The caller passes one `DetectionParams` snapshot per frame. Every value used
// during that frame comes from that snapshot, which is what keeps a cycle
// consistent even while the operator drags a slider.

use crate::config::DetectionParams;
use crate::core_modules::background_model::BackgroundModel;
use crate::core_modules::motion_classifier::motion_classifier;

pub use crate::core_modules::frame::{BoundingBox, Frame, Mask, MotionRegion, MotionVerdict};

/// Result of running one frame through the detector.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    /// The raw background-model mask (0 / 127 / 255).
    pub mask: Mask,
    pub verdict: MotionVerdict,
}

/// Background model plus classifier.
pub struct DetectionPipeline {
    background: BackgroundModel,
}

impl DetectionPipeline {
    pub fn new(params: &DetectionParams) -> Self {
        Self {
            background: BackgroundModel::new(params.sensitivity),
        }
    }

    pub fn analyze(&mut self, frame: &Frame, params: &DetectionParams) -> FrameAnalysis {
        if self.background.history() != params.sensitivity {
            self.background.set_history(params.sensitivity);
        }
        let mask = self.background.apply(frame);
        let verdict = motion_classifier::classify(&mask, params.threshold, params.min_area);
        FrameAnalysis { mask, verdict }
    }

    pub fn background_model(&self) -> &BackgroundModel {
        &self.background
    }
}
