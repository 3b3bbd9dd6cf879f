use anyhow::{Result, anyhow};
use minifb::{Key, Window, WindowOptions};
use rayon::prelude::*;

use super::FeedbackSurface;
use crate::types::Frame;

/// Native window showing each rendered frame.
///
/// Closing the window or pressing Escape makes it report itself invisible.
pub struct WindowSurface {
    window: Window,
    title: String,
    buffer: Vec<u32>,
    size: (usize, usize),
}

impl WindowSurface {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = open_window(title, width, height)?;
        log::info!("opened {width}x{height} window \"{title}\"");
        Ok(Self {
            window,
            title: title.to_string(),
            buffer: vec![0; width * height],
            size: (width, height),
        })
    }
}

fn open_window(title: &str, width: usize, height: usize) -> Result<Window> {
    Window::new(
        title,
        width,
        height,
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        },
    )
    .map_err(|err| anyhow!("failed to open window: {err}"))
}

impl FeedbackSurface for WindowSurface {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        let size = (frame.width as usize, frame.height as usize);
        if size != self.size {
            log::info!(
                "frame size changed to {}x{}, reopening window",
                size.0,
                size.1
            );
            self.window = open_window(&self.title, size.0, size.1)?;
            self.buffer = vec![0; size.0 * size.1];
            self.size = size;
        }

        self.buffer
            .par_iter_mut()
            .zip(frame.rgba.par_chunks_exact(4))
            .for_each(|(dst, px)| {
                *dst = (u32::from(px[0]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[2]);
            });

        self.window
            .update_with_buffer(&self.buffer, size.0, size.1)
            .map_err(|err| anyhow!("failed to present frame: {err}"))
    }

    fn is_visible(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }
}
