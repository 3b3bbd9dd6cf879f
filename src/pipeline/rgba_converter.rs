use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

#[cfg(feature = "camera-nokhwa")]
use {
    crate::types::Frame,
    nokhwa::{Buffer, utils::FrameFormat},
};

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceLayout {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

#[cfg(feature = "camera-nokhwa")]
impl From<FrameFormat> for SourceLayout {
    fn from(format: FrameFormat) -> Self {
        match format {
            FrameFormat::NV12 => SourceLayout::Nv12,
            FrameFormat::YUYV => SourceLayout::Yuyv,
            FrameFormat::MJPEG => SourceLayout::Mjpeg,
            FrameFormat::RAWRGB => SourceLayout::Rgb,
            FrameFormat::RAWBGR => SourceLayout::Bgr,
            FrameFormat::GRAY => SourceLayout::Gray,
        }
    }
}

#[cfg(feature = "camera-nokhwa")]
pub fn decode_buffer(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let rgba = to_rgba(
        buffer.source_frame_format().into(),
        buffer.buffer(),
        width,
        height,
    )?;

    Ok(Frame {
        rgba,
        width,
        height,
    })
}

pub fn to_rgba(layout: SourceLayout, data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    match layout {
        SourceLayout::Nv12 => nv12_to_rgba(data, width, height),
        SourceLayout::Yuyv => yuyv_to_rgba(data, width, height),
        SourceLayout::Mjpeg => mjpeg_to_rgba(data, width, height),
        SourceLayout::Rgb => rgb_like_to_rgba(data, width, height, false),
        SourceLayout::Bgr => rgb_like_to_rgba(data, width, height, true),
        SourceLayout::Gray => gray_to_rgba(data, width, height),
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn ensure_len(label: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{label} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = pixel_count(width, height);
    let uv_plane_len = y_plane_len / 2;
    ensure_len("NV12", data, y_plane_len + uv_plane_len)?;

    let mut rgba = vec![0u8; y_plane_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    ensure_len("YUYV", data, pixel_count(width, height) * 2)?;

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    // The capture resolution is what the rest of the frame is built from, so
    // a JPEG of another size would misplace every landmark.
    if let Some(info) = decoder.info() {
        let w = u32::try_from(info.width).unwrap_or(u32::MAX);
        let h = u32::try_from(info.height).unwrap_or(u32::MAX);
        if (w, h) != (width, height) {
            return Err(anyhow!(
                "MJPEG frame is {w}x{h}, camera reported {width}x{height}"
            ));
        }
    }
    let expected = usize::try_from(u64::from(width) * u64::from(height) * 4)
        .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
    ensure_len("MJPEG", &rgba, expected)?;

    Ok(rgba)
}

fn rgb_like_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    ensure_len("RGB", data, pixel_count(width, height) * 3)?;

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = if swap_rb { (src[2], src[0]) } else { (src[0], src[2]) };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });

    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let count = pixel_count(width, height);
    ensure_len("GRAY", data, count)?;

    let mut rgba = vec![0u8; count * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..count].par_iter().copied())
        .for_each(|(dst, value)| dst.copy_from_slice(&[value, value, value, 255]));

    Ok(rgba)
}
