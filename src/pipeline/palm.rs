//! First detection stage: the MediaPipe palm detector.
//!
//! The detector scores a fixed grid of SSD anchors over the letterboxed
//! frame. Surviving regions are turned into a rotated square crop that the
//! landmark model can read upright.

use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::preprocess::{self, LetterboxInfo, PALM_INPUT_SIZE};
use crate::types::Frame;

/// Keypoints reported per palm: wrist, then knuckles and thumb joints.
const PALM_KEYPOINTS: usize = 7;
const WRIST_KEYPOINT: usize = 0;
const MIDDLE_MCP_KEYPOINT: usize = 2;
const BOX_FEATURES: usize = 4 + PALM_KEYPOINTS * 2;

/// `(stride, anchors per cell)` of each feature map, finest first.
const ANCHOR_LAYERS: [(u32, usize); 2] = [(8, 2), (16, 6)];

/// Crop side relative to the palm box, and how far the crop centre moves
/// from the palm towards the fingers, in palm box heights.
const CROP_SCALE: f32 = 2.6;
const CROP_SHIFT: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub max_regions: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            max_regions: 1,
        }
    }
}

/// A detected palm in frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    /// `[x1, y1, x2, y2]`, clamped into the frame.
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

/// The rotated square handed to the landmark model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PalmCrop {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(PALM_INPUT_SIZE),
            cfg,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = preprocess::prepare_frame(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let box_shape = boxes.shape().to_vec();
        let score_shape = scores.shape().to_vec();
        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();

        decode_palms(
            &PalmTensors {
                boxes: &boxes,
                box_shape: &box_shape,
                scores: &scores,
                score_shape: &score_shape,
            },
            &self.anchors,
            &letterbox,
            &self.cfg,
        )
    }
}

/// Anchor centres in normalized input coordinates, in model output order.
pub fn generate_anchors(input_size: u32) -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    for (stride, per_cell) in ANCHOR_LAYERS {
        let cells = input_size.div_ceil(stride);
        for y in 0..cells {
            for x in 0..cells {
                let centre = [
                    (x as f32 + 0.5) / cells as f32,
                    (y as f32 + 0.5) / cells as f32,
                ];
                anchors.extend(std::iter::repeat_n(centre, per_cell));
            }
        }
    }
    anchors
}

struct PalmTensors<'a> {
    boxes: &'a [f32],
    box_shape: &'a [usize],
    scores: &'a [f32],
    score_shape: &'a [usize],
}

// `[.., anchors, features]` of a palm output tensor.
fn anchor_layout(shape: &[usize], what: &str) -> Result<(usize, usize)> {
    match shape {
        [.., anchors, features] if shape.len() >= 3 => Ok((*anchors, *features)),
        _ => Err(anyhow!(
            "unexpected palm {what} shape {shape:?}, need [batch, anchors, features]"
        )),
    }
}

fn decode_palms(
    tensors: &PalmTensors<'_>,
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    let (box_anchors, features) = anchor_layout(tensors.box_shape, "box")?;
    let (score_anchors, score_features) = anchor_layout(tensors.score_shape, "score")?;
    if features < BOX_FEATURES {
        return Err(anyhow!("palm box feature dimension too small: {features}"));
    }
    if box_anchors != score_anchors {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({box_anchors}) and scores ({score_anchors})"
        ));
    }

    let input = PALM_INPUT_SIZE as f32;
    let extent = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let to_frame = |u: f32, v: f32| {
        (
            u * extent - letterbox.pad_x / letterbox.scale,
            v * extent - letterbox.pad_y / letterbox.scale,
        )
    };

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().enumerate().take(box_anchors) {
        let raw_score = *tensors
            .scores
            .get(idx * score_features)
            .ok_or_else(|| anyhow!("missing score for palm anchor {idx}"))?;
        let score = sigmoid(raw_score);
        if score < cfg.score_threshold {
            continue;
        }

        let row = tensors
            .boxes
            .get(idx * features..idx * features + BOX_FEATURES)
            .ok_or_else(|| anyhow!("missing box features for palm anchor {idx}"))?;
        let cx = anchor[0] + row[0] / input;
        let cy = anchor[1] + row[1] / input;
        let half_w = row[2] / input / 2.0;
        let half_h = row[3] / input / 2.0;

        let (x1, y1) = to_frame(cx - half_w, cy - half_h);
        let (x2, y2) = to_frame(cx + half_w, cy + half_h);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let keypoints = row[4..]
            .chunks_exact(2)
            .map(|kp| to_frame(anchor[0] + kp[0] / input, anchor[1] + kp[1] / input))
            .collect();

        candidates.push(PalmRegion {
            bbox: clamp_box([x1, y1, x2, y2], letterbox.orig_w, letterbox.orig_h),
            keypoints,
            score,
        });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.max_regions);
    Ok(kept.into_iter().map(|idx| candidates[idx].clone()).collect())
}

pub fn pick_primary_region(regions: &[PalmRegion]) -> Option<&PalmRegion> {
    regions
        .iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
}

/// Square crop around the hand, rotated so the fingers point up.
pub fn crop_from_palm(region: &PalmRegion) -> PalmCrop {
    let [x1, y1, x2, y2] = region.bbox;
    let (width, height) = ((x2 - x1).abs(), (y2 - y1).abs());
    let angle = palm_rotation(region);

    // Move towards the fingers along the rotated "up" axis.
    let shift = CROP_SHIFT * height;
    let (sin, cos) = angle.sin_cos();
    let center = (
        (x1 + x2) * 0.5 + shift * sin,
        (y1 + y2) * 0.5 - shift * cos,
    );

    PalmCrop {
        center,
        side: width.max(height) * CROP_SCALE,
        angle,
    }
}

/// Rotation that brings the wrist→middle-knuckle direction to vertical,
/// wrapped into `[-π, π)`. Zero when the keypoints are missing.
pub fn palm_rotation(region: &PalmRegion) -> f32 {
    let (Some(wrist), Some(knuckle)) = (
        region.keypoints.get(WRIST_KEYPOINT),
        region.keypoints.get(MIDDLE_MCP_KEYPOINT),
    ) else {
        return 0.0;
    };

    let rotation = PI * 0.5 - (-(knuckle.1 - wrist.1)).atan2(knuckle.0 - wrist.0);
    rotation - 2.0 * PI * ((rotation + PI) / (2.0 * PI)).floor()
}

fn nms(candidates: &[PalmRegion], threshold: f32, limit: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .score
            .partial_cmp(&candidates[a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    for idx in order {
        if keep.len() >= limit {
            break;
        }
        let overlaps = keep
            .iter()
            .any(|&k| iou(&candidates[idx].bbox, &candidates[k].bbox) >= threshold);
        if !overlaps {
            keep.push(idx);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(bbox: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;
    [
        bbox[0].clamp(0.0, max_x),
        bbox[1].clamp(0.0, max_y),
        bbox[2].clamp(0.0, max_x),
        bbox[3].clamp(0.0, max_y),
    ]
}
