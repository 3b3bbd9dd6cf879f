use crate::{
    error::ControlResult,
    types::{HandFrame, Landmark},
};

/// Planar distance between two landmarks, in pixels.
pub fn distance(a: &Landmark, b: &Landmark) -> f32 {
    ((b.x - a.x) as f32).hypot((b.y - a.y) as f32)
}

/// Distance between two landmarks looked up by id in `frame`.
pub fn landmark_distance(frame: &HandFrame, a: usize, b: usize) -> ControlResult<f32> {
    let a = frame.get(a)?;
    let b = frame.get(b)?;
    Ok(distance(&a, &b))
}

/// Integer average of the two positions, rounded towards negative infinity.
pub fn midpoint(a: &Landmark, b: &Landmark) -> (i32, i32) {
    ((a.x + b.x).div_euclid(2), (a.y + b.y).div_euclid(2))
}
