//! Model input preparation and the inverse mappings back to frame space.

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, NUM_LANDMARKS, NormalizedLandmark};

/// Side of the square hand crop fed to the landmark model.
pub const HANDPOSE_INPUT_SIZE: u32 = 224;
/// Side of the letterboxed frame fed to the palm detector.
pub const PALM_INPUT_SIZE: u32 = 192;

/// Where the frame landed inside the square model input.
#[derive(Clone, Debug, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxInfo {
    pub fn for_frame(width: u32, height: u32, target_size: u32) -> Self {
        let scale = target_size as f32 / (width.max(height).max(1) as f32);
        let (new_w, new_h) = scaled_size(width, height, scale);
        Self {
            scale,
            pad_x: ((target_size as i64 - new_w as i64) / 2).max(0) as f32,
            pad_y: ((target_size as i64 - new_h as i64) / 2).max(0) as f32,
            orig_w: width,
            orig_h: height,
        }
    }
}

fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    (
        (width as f32 * scale).round().max(1.0) as u32,
        (height as f32 * scale).round().max(1.0) as u32,
    )
}

fn check_buffer(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Resizes `frame` into a black square of `target_size` and returns the
/// `[1, size, size, 3]` tensor in `0..=1` with the placement used.
pub fn prepare_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_buffer(frame)?;

    let letterbox = LetterboxInfo::for_frame(frame.width, frame.height, target_size);
    let (new_w, new_h) = scaled_size(frame.width, frame.height, letterbox.scale);
    let new_w = new_w.min(target_size);
    let new_h = new_h.min(target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = letterbox.pad_x as usize;
    let pad_y = letterbox.pad_y as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((input, letterbox))
}

/// A square, rotated window of the frame resampled to `output_size`.
#[derive(Clone, Debug, PartialEq)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl CropTransform {
    /// Frame pixel under crop pixel `(x, y)`, clamped into the frame.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let (ox, oy) = self.unclamped(x, y);
        (
            ox.clamp(0.0, self.orig_w.saturating_sub(1) as f32),
            oy.clamp(0.0, self.orig_h.saturating_sub(1) as f32),
        )
    }

    /// Crop-space model output as a frame-relative landmark.
    pub fn normalize(&self, point: [f32; 3]) -> NormalizedLandmark {
        let [x, y, z] = point;
        let (px, py) = self.project(x, y);
        NormalizedLandmark {
            x: px / self.orig_w.max(1) as f32,
            y: py / self.orig_h.max(1) as f32,
            z: z * self.pixel_scale(),
        }
    }

    fn pixel_scale(&self) -> f32 {
        self.side / self.output_size.max(1) as f32
    }

    fn unclamped(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.pixel_scale();
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }
}

/// Samples the rotated square around `center` into a `[1, size, size, 3]`
/// tensor. Pixels outside the frame read as black.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_buffer(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let size = output_size as usize;
    let mut data = vec![0.0f32; size * size * 3];
    data.par_chunks_mut(size * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let (src_x, src_y) = transform.unclamped(x as f32 + 0.5, y as f32 + 0.5);
                px.copy_from_slice(&sample_rgb(frame, src_x, src_y));
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;
    Ok((input, transform))
}

// Bilinear sample at pixel-centre coordinates.
fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    let (x, y) = (x - 0.5, y - 0.5);
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);

    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        if cx < 0.0 || cy < 0.0 || cx >= frame.width as f32 || cy >= frame.height as f32 {
            return [0.0; 3];
        }
        let idx = (cy as usize * frame.width as usize + cx as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            None => [0.0; 3],
        }
    };

    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| {
        lerp(
            lerp(c00[c], c10[c], fx),
            lerp(c01[c], c11[c], fx),
            fy,
        )
    })
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}
