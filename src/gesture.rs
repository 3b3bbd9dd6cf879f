use crate::{
    error::{ControlError, ControlResult},
    types::{
        FingerState, FingerStates, HandFrame, INDEX_TIP, Landmark, MIDDLE_TIP, PINKY_TIP,
        RING_TIP, THUMB_TIP,
    },
};

pub const TIP_IDS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Decides which digits are extended from the landmark layout of one frame.
///
/// An empty frame is an error, never an all-folded result.
pub fn classify(frame: &HandFrame) -> ControlResult<FingerStates> {
    if frame.is_empty() {
        return Err(ControlError::MissingLandmarks(
            "cannot classify fingers without a detected hand".to_string(),
        ));
    }

    let mut states = [FingerState::Folded; 5];
    states[0] = classify_thumb(frame)?;
    for (slot, &tip) in states.iter_mut().zip(TIP_IDS.iter()).skip(1) {
        *slot = classify_finger(frame, tip)?;
    }
    Ok(FingerStates(states))
}

// Compares x against the IP joint, so it only holds for one hand facing the
// camera in the canonical orientation; a mirrored hand reads inverted.
fn classify_thumb(frame: &HandFrame) -> ControlResult<FingerState> {
    let tip = landmark(frame, THUMB_TIP)?;
    let ip = landmark(frame, THUMB_TIP - 1)?;
    Ok(if tip.x > ip.x {
        FingerState::Extended
    } else {
        FingerState::Folded
    })
}

fn classify_finger(frame: &HandFrame, tip_id: usize) -> ControlResult<FingerState> {
    let tip = landmark(frame, tip_id)?;
    let pip = landmark(frame, tip_id - 2)?;
    // Screen y grows downwards.
    Ok(if tip.y < pip.y {
        FingerState::Extended
    } else {
        FingerState::Folded
    })
}

fn landmark(frame: &HandFrame, id: usize) -> ControlResult<Landmark> {
    frame
        .get(id)
        .map_err(|_| ControlError::MissingLandmarks(format!("landmark {id} not in frame")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NUM_LANDMARKS;

    /// Every finger reaching up, thumb tip right of its IP joint.
    fn open_hand() -> Vec<(i32, i32)> {
        let mut points = vec![(300, 400); NUM_LANDMARKS];
        points[3] = (250, 300);
        points[4] = (280, 290);
        for tip in [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
            points[tip - 2] = (300, 250);
            points[tip] = (300, 150);
        }
        points
    }

    fn closed_hand() -> Vec<(i32, i32)> {
        let mut points = vec![(300, 400); NUM_LANDMARKS];
        points[3] = (250, 300);
        points[4] = (220, 310);
        for tip in [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
            points[tip - 2] = (300, 250);
            points[tip] = (300, 320);
        }
        points
    }

    #[test]
    fn open_hand_is_all_extended() {
        let frame = HandFrame::from_points(&open_hand()).unwrap();
        assert_eq!(classify(&frame).unwrap().bits(), [1, 1, 1, 1, 1]);
    }

    #[test]
    fn closed_hand_is_all_folded() {
        let frame = HandFrame::from_points(&closed_hand()).unwrap();
        assert_eq!(classify(&frame).unwrap().bits(), [0, 0, 0, 0, 0]);
    }

    #[test]
    fn peace_sign() {
        let mut points = closed_hand();
        points[INDEX_TIP] = (280, 100);
        points[MIDDLE_TIP] = (320, 100);
        let frame = HandFrame::from_points(&points).unwrap();
        let states = classify(&frame).unwrap();
        assert_eq!(states.bits(), [0, 1, 1, 0, 0]);
        assert_eq!(states.extended_count(), 2);
    }

    #[test]
    fn equal_coordinates_count_as_folded() {
        let mut points = open_hand();
        points[4] = (250, 290);
        points[INDEX_TIP] = (300, 250);
        let frame = HandFrame::from_points(&points).unwrap();
        assert_eq!(classify(&frame).unwrap().bits(), [0, 0, 1, 1, 1]);
    }

    #[test]
    fn thumb_rule_ignores_vertical_position() {
        let mut points = open_hand();
        points[4] = (280, 600);
        let frame = HandFrame::from_points(&points).unwrap();
        assert_eq!(classify(&frame).unwrap().bits()[0], 1);
    }

    #[test]
    fn empty_frame_is_missing_landmarks() {
        assert!(matches!(
            classify(&HandFrame::empty()),
            Err(ControlError::MissingLandmarks(_))
        ));
    }
}
