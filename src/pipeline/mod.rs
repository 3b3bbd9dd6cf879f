#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod detector;
pub mod overlay;
pub mod palm;
pub mod preprocess;
pub mod rgba_converter;
pub mod window;

use anyhow::Result;

use crate::types::Frame;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{NokhwaCamera, available_cameras};
pub use detector::{HandDetector, OrtHandDetector};
pub use window::WindowSurface;

/// Blocking supplier of camera frames.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Where rendered frames are shown; its visibility ends the control loop.
pub trait FeedbackSurface {
    fn present(&mut self, frame: &Frame) -> Result<()>;

    fn is_visible(&self) -> bool;
}
