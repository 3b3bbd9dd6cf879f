use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    palm::{PalmDetector, PalmDetectorConfig, crop_from_palm, pick_primary_region},
    preprocess::{self, HANDPOSE_INPUT_SIZE},
};
use crate::{
    model_download::{ModelKind, ensure_model_ready},
    types::{DetectedHand, DetectorOutput, Frame, Handedness},
};

/// Landmark presence below which the crop is treated as not holding a hand.
pub const MIN_HAND_PRESENCE: f32 = 0.5;

/// Landmark model the control loop queries once per frame.
pub trait HandDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectorOutput>;
}

/// Two-stage MediaPipe hand tracking: the palm detector finds the hand, and
/// the handpose model reads 21 landmarks from a rotated crop around it.
///
/// Reports at most one hand.
pub struct OrtHandDetector {
    handpose: Session,
    palm_detector: PalmDetector,
}

impl OrtHandDetector {
    /// `min_detection_confidence` gates the palm detector's score.
    pub fn new(
        handpose_model: &Path,
        palm_model: &Path,
        min_detection_confidence: f32,
    ) -> Result<Self> {
        for (kind, path) in [
            (ModelKind::HandposeEstimator, handpose_model),
            (ModelKind::PalmDetector, palm_model),
        ] {
            ensure_model_ready(kind, path).with_context(|| {
                format!("failed to prepare {} model at {}", kind.label(), path.display())
            })?;
        }

        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_model)
            .with_context(|| {
                format!("failed to load ORT session from {}", handpose_model.display())
            })?;
        let palm_detector = PalmDetector::new(
            palm_model,
            PalmDetectorConfig {
                score_threshold: min_detection_confidence,
                ..PalmDetectorConfig::default()
            },
        )?;

        log::info!(
            "handpose ORT backend ready using {} and palm detector {} (min confidence {min_detection_confidence:.2})",
            handpose_model.display(),
            palm_model.display()
        );
        Ok(Self {
            handpose,
            palm_detector,
        })
    }
}

impl HandDetector for OrtHandDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectorOutput> {
        let palms = self
            .palm_detector
            .detect(frame)
            .context("palm detection failed")?;
        let Some(palm) = pick_primary_region(&palms) else {
            return Ok(DetectorOutput::none());
        };

        let crop = crop_from_palm(palm);
        let (input, transform) = preprocess::prepare_rotated_crop(
            frame,
            crop.center,
            crop.side,
            crop.angle,
            HANDPOSE_INPUT_SIZE,
        )?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = preprocess::decode_landmarks(&flattened)?;

        let presence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let handedness = if outputs.len() > 2 {
            outputs[2]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };

        if presence < MIN_HAND_PRESENCE {
            log::trace!(
                "palm at {:?} (score {:.2}) but hand presence only {presence:.2}",
                palm.bbox,
                palm.score
            );
            return Ok(DetectorOutput::none());
        }

        Ok(DetectorOutput {
            hands: vec![DetectedHand {
                landmarks: landmarks
                    .into_iter()
                    .map(|point| transform.normalize(point))
                    .collect(),
                score: (presence * palm.score).clamp(0.0, 1.0),
                handedness: Handedness::from_score(handedness),
            }],
        })
    }
}
