mod audio;
mod config;
mod control;
mod error;
mod geometry;
mod gesture;
mod landmarks;
mod mapping;
mod model_download;
mod pipeline;
mod types;

use anyhow::Result;
use clap::Parser;

use audio::{AudioEndpoint, DryRunEndpoint, PulseAudioEndpoint};
use config::{AppConfig, Args, AudioBackend};

const WINDOW_TITLE: &str = "Hand Volume";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.list_cameras {
        return list_cameras();
    }

    let config = AppConfig::from(args);
    log::info!("starting with {config:?}");

    match config.audio {
        AudioBackend::Pulse => run(&config, PulseAudioEndpoint::new()?),
        AudioBackend::DryRun => run(&config, DryRunEndpoint::default()),
    }
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = pipeline::available_cameras()?;
    if cameras.is_empty() {
        println!("No cameras found.");
    }
    for camera in cameras {
        println!("{:<5} | {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    anyhow::bail!("built without camera support; enable the `camera-nokhwa` feature")
}

#[cfg(feature = "camera-nokhwa")]
fn run<A: AudioEndpoint>(config: &AppConfig, audio: A) -> Result<()> {
    use pipeline::{NokhwaCamera, OrtHandDetector, WindowSurface};

    let camera = NokhwaCamera::open(
        config.camera_index,
        config.frame_width,
        config.frame_height,
    )?;
    let detector = OrtHandDetector::new(
        &config.model_path,
        &config.palm_model_path,
        config.min_detection_confidence,
    )?;
    let window = WindowSurface::new(
        WINDOW_TITLE,
        config.frame_width as usize,
        config.frame_height as usize,
    )?;

    let mut control = control::ControlLoop::new(
        camera,
        detector,
        audio,
        window,
        config.loop_settings(),
    )?;
    control.run(|| false)
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run<A: AudioEndpoint>(_config: &AppConfig, _audio: A) -> Result<()> {
    anyhow::bail!("built without camera support; enable the `camera-nokhwa` feature")
}
