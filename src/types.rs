use crate::error::{ControlError, ControlResult};

pub const NUM_LANDMARKS: usize = 21;

pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn blank(width: u32, height: u32) -> Self {
        let mut rgba = vec![0u8; width as usize * height as usize * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            rgba,
            width,
            height,
        }
    }
}

/// Detector coordinates, relative to the frame size (`x`, `y` in `[0, 1]`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.5 {
            Handedness::Right
        } else if score > 0.0 {
            Handedness::Left
        } else {
            Handedness::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "LEFT",
            Handedness::Right => "RIGHT",
            Handedness::Unknown => "",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DetectedHand {
    pub landmarks: Vec<NormalizedLandmark>,
    pub score: f32,
    pub handedness: Handedness,
}

#[derive(Clone, Debug, Default)]
pub struct DetectorOutput {
    pub hands: Vec<DetectedHand>,
}

impl DetectorOutput {
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Landmark {
    pub id: usize,
    pub x: i32,
    pub y: i32,
}

/// The landmarks of one hand in one frame, in pixel space.
///
/// Either empty (no hand) or holding exactly ids `0..=20` in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandFrame {
    landmarks: Vec<Landmark>,
}

impl HandFrame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_landmarks(landmarks: Vec<Landmark>) -> ControlResult<Self> {
        if landmarks.is_empty() {
            return Ok(Self::empty());
        }
        if landmarks.len() != NUM_LANDMARKS {
            return Err(ControlError::InvalidInput(format!(
                "hand frame needs {NUM_LANDMARKS} landmarks, got {}",
                landmarks.len()
            )));
        }
        if let Some((pos, lm)) = landmarks
            .iter()
            .enumerate()
            .find(|(pos, lm)| lm.id != *pos)
        {
            return Err(ControlError::InvalidInput(format!(
                "landmark at position {pos} has id {}",
                lm.id
            )));
        }
        Ok(Self { landmarks })
    }

    /// Builds a frame from the 21 pixel positions, ids assigned by position.
    #[cfg(test)]
    pub fn from_points(points: &[(i32, i32)]) -> ControlResult<Self> {
        Self::from_landmarks(
            points
                .iter()
                .enumerate()
                .map(|(id, &(x, y))| Landmark { id, x, y })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn get(&self, id: usize) -> ControlResult<Landmark> {
        self.landmarks.get(id).copied().ok_or_else(|| {
            ControlError::InvalidInput(format!(
                "landmark {id} not present in a frame of {} landmarks",
                self.landmarks.len()
            ))
        })
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MappedControl {
    pub raw_value: f32,
    pub display_bar: f32,
    pub display_percent: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerState {
    Extended,
    Folded,
}

impl FingerState {
    pub fn bit(&self) -> u8 {
        match self {
            FingerState::Extended => 1,
            FingerState::Folded => 0,
        }
    }
}

/// Per-digit state ordered thumb, index, middle, ring, pinky.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerStates(pub [FingerState; 5]);

impl FingerStates {
    pub fn bits(&self) -> [u8; 5] {
        self.0.map(|state| state.bit())
    }

    pub fn extended_count(&self) -> usize {
        self.0
            .iter()
            .filter(|state| **state == FingerState::Extended)
            .count()
    }
}
