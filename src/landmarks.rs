use crate::{
    error::{ControlError, ControlResult},
    types::{DetectorOutput, HandFrame, Landmark, NUM_LANDMARKS},
};

/// Converts the detector's normalized landmarks of one hand into pixel space.
///
/// No detected hands is not an error: the result is an empty frame whatever
/// `hand_index` was asked for. A hand that does not carry all 21 landmarks is
/// rejected rather than returned partially filled.
pub fn extract(
    output: &DetectorOutput,
    frame_width: u32,
    frame_height: u32,
    hand_index: usize,
) -> ControlResult<HandFrame> {
    if output.hands.is_empty() {
        return Ok(HandFrame::empty());
    }

    let hand = output
        .hands
        .get(hand_index)
        .ok_or(ControlError::IndexOutOfRange {
            requested: hand_index,
            available: output.hands.len(),
        })?;

    if hand.landmarks.len() != NUM_LANDMARKS {
        return Err(ControlError::InvalidInput(format!(
            "detector reported {} landmarks for hand {hand_index}, expected {NUM_LANDMARKS}",
            hand.landmarks.len()
        )));
    }

    let width = frame_width as f32;
    let height = frame_height as f32;
    let landmarks = hand
        .landmarks
        .iter()
        .enumerate()
        .map(|(id, lm)| {
            if !lm.x.is_finite() || !lm.y.is_finite() {
                return Err(ControlError::InvalidInput(format!(
                    "landmark {id} has non-finite coordinates"
                )));
            }
            Ok(Landmark {
                id,
                x: (lm.x * width).floor() as i32,
                y: (lm.y * height).floor() as i32,
            })
        })
        .collect::<ControlResult<Vec<_>>>()?;

    HandFrame::from_landmarks(landmarks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectedHand, Handedness, NormalizedLandmark};

    fn hand(points: &[(f32, f32)]) -> DetectedHand {
        DetectedHand {
            landmarks: points
                .iter()
                .map(|&(x, y)| NormalizedLandmark { x, y, z: 0.0 })
                .collect(),
            score: 0.9,
            handedness: Handedness::Right,
        }
    }

    fn uniform_hand(x: f32, y: f32) -> DetectedHand {
        hand(&vec![(x, y); NUM_LANDMARKS])
    }

    #[test]
    fn no_hands_yields_empty_frame() {
        let frame = extract(&DetectorOutput::none(), 640, 480, 0).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn no_hands_is_empty_for_any_index() {
        let frame = extract(&DetectorOutput::none(), 640, 480, 3).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn index_past_detected_hands_is_out_of_range() {
        let output = DetectorOutput {
            hands: vec![uniform_hand(0.5, 0.5)],
        };
        assert_eq!(
            extract(&output, 640, 480, 1),
            Err(ControlError::IndexOutOfRange {
                requested: 1,
                available: 1
            })
        );
    }

    #[test]
    fn coordinates_are_floored_to_pixels() {
        let mut points = vec![(0.0, 0.0); NUM_LANDMARKS];
        points[4] = (0.5, 0.25);
        points[8] = (0.999, 0.999);
        let output = DetectorOutput {
            hands: vec![hand(&points)],
        };

        let frame = extract(&output, 640, 480, 0).unwrap();
        assert_eq!(frame.len(), NUM_LANDMARKS);
        assert_eq!(frame.get(4).unwrap(), Landmark { id: 4, x: 320, y: 120 });
        assert_eq!(frame.get(8).unwrap(), Landmark { id: 8, x: 639, y: 479 });
    }

    #[test]
    fn selects_requested_hand() {
        let output = DetectorOutput {
            hands: vec![uniform_hand(0.0, 0.0), uniform_hand(0.5, 0.5)],
        };
        let frame = extract(&output, 100, 100, 1).unwrap();
        assert_eq!(frame.get(0).unwrap(), Landmark { id: 0, x: 50, y: 50 });
    }

    #[test]
    fn short_hand_is_invalid_input() {
        let output = DetectorOutput {
            hands: vec![hand(&[(0.1, 0.1); 5])],
        };
        assert!(matches!(
            extract(&output, 640, 480, 0),
            Err(ControlError::InvalidInput(_))
        ));
    }

    #[test]
    fn nan_coordinate_is_invalid_input() {
        let mut detected = uniform_hand(0.2, 0.2);
        detected.landmarks[7].x = f32::NAN;
        let output = DetectorOutput {
            hands: vec![detected],
        };
        assert!(matches!(
            extract(&output, 640, 480, 0),
            Err(ControlError::InvalidInput(_))
        ));
    }
}
