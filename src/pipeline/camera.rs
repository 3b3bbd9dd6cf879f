use anyhow::{Context, Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
        RequestedFormatType,
    },
};

use super::{FrameSource, rgba_converter};
use crate::types::Frame;

const REQUESTED_FPS: u32 = 30;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats(width: u32, height: u32) -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new_from(
            width,
            height,
            FrameFormat::MJPEG,
            REQUESTED_FPS,
        ))),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    info.human_name()
}

/// Blocking webcam reader; each `next_frame` waits for the device.
pub struct NokhwaCamera {
    camera: Camera,
}

impl NokhwaCamera {
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self> {
        let index = CameraIndex::Index(index);
        let mut last_err: Option<anyhow::Error> = None;

        for requested in requested_formats(width, height) {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => {
                        let format = camera.camera_format();
                        log::info!(
                            "opened camera {} at {}x{} {:?} @ {} fps",
                            camera.info().human_name(),
                            format.width(),
                            format.height(),
                            format.format(),
                            format.frame_rate()
                        );
                        return Ok(Self { camera });
                    }
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        let err = last_err
            .unwrap_or_else(|| anyhow!("no supported format for camera {index}"));
        Err(err.context(format!("failed to open camera {index}")))
    }
}

impl FrameSource for NokhwaCamera {
    fn next_frame(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame().context("camera frame read failed")?;
        rgba_converter::decode_buffer(&buffer).context("failed to decode camera frame")
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    }
}
