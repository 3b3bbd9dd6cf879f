use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{control::LoopSettings, model_download::ModelKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AudioBackend {
    /// Drive the default sink through `pactl`.
    Pulse,
    /// Log levels instead of applying them.
    DryRun,
}

/// Pinch your thumb and index finger in front of the camera to set the
/// system volume.
#[derive(Debug, Parser)]
#[command(name = "hand-volume", version, about)]
pub struct Args {
    /// Camera index to open.
    #[arg(long, default_value_t = 0)]
    pub camera: u32,

    /// Requested capture width in pixels.
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Requested capture height in pixels.
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Detections below this confidence count as "no hand".
    #[arg(long, default_value_t = 0.7)]
    pub min_detection_confidence: f32,

    /// Handpose ONNX model; downloaded on first use when missing.
    #[arg(long, default_value_os_t = ModelKind::HandposeEstimator.default_path())]
    pub model: PathBuf,

    /// Palm detection ONNX model; downloaded on first use when missing.
    #[arg(long, default_value_os_t = ModelKind::PalmDetector.default_path())]
    pub palm_model: PathBuf,

    #[arg(long, value_enum, default_value_t = AudioBackend::Pulse)]
    pub audio: AudioBackend,

    /// Which detected hand drives the volume.
    #[arg(long, default_value_t = 0)]
    pub hand_index: usize,

    /// Consecutive failed captures tolerated before exiting.
    #[arg(long, default_value_t = 30)]
    pub max_capture_failures: u32,

    /// Print the available cameras and exit.
    #[arg(long)]
    pub list_cameras: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub camera_index: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub min_detection_confidence: f32,
    pub model_path: PathBuf,
    pub palm_model_path: PathBuf,
    pub audio: AudioBackend,
    pub hand_index: usize,
    pub max_capture_failures: u32,
}

impl AppConfig {
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            hand_index: self.hand_index,
            max_capture_failures: self.max_capture_failures,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            frame_width: 640,
            frame_height: 480,
            min_detection_confidence: 0.7,
            model_path: ModelKind::HandposeEstimator.default_path(),
            palm_model_path: ModelKind::PalmDetector.default_path(),
            audio: AudioBackend::Pulse,
            hand_index: 0,
            max_capture_failures: 30,
        }
    }
}

impl From<Args> for AppConfig {
    fn from(args: Args) -> Self {
        Self {
            camera_index: args.camera,
            frame_width: args.width,
            frame_height: args.height,
            min_detection_confidence: args.min_detection_confidence,
            model_path: args.model,
            palm_model_path: args.palm_model,
            audio: args.audio,
            hand_index: args.hand_index,
            max_capture_failures: args.max_capture_failures,
        }
    }
}
