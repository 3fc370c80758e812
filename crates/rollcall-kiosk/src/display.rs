//! Live preview window.

use image::RgbImage;
use minifb::{Key, WindowOptions};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("display error: {0}")]
pub struct DisplayError(String);

/// Where annotated frames go, and where the operator asks to stop.
pub trait Display {
    fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;

    /// True once the operator pressed `q` or closed the window.
    fn quit_requested(&self) -> bool;
}

/// A minifb window, opened on the first frame at that frame's size.
pub struct Window {
    title: String,
    inner: Option<minifb::Window>,
    buffer: Vec<u32>,
}

impl Window {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            inner: None,
            buffer: Vec::new(),
        }
    }
}

impl Display for Window {
    fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);

        let window = match &mut self.inner {
            Some(window) => window,
            slot => {
                let window = minifb::Window::new(&self.title, width, height, WindowOptions::default())
                    .map_err(|e| DisplayError(format!("failed to open window: {e}")))?;
                tracing::info!(title = %self.title, width, height, "display window opened");
                slot.insert(window)
            }
        };

        self.buffer.clear();
        self.buffer.extend(
            frame
                .pixels()
                .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2])),
        );
        window
            .update_with_buffer(&self.buffer, width, height)
            .map_err(|e| DisplayError(format!("failed to present frame: {e}")))
    }

    fn quit_requested(&self) -> bool {
        match &self.inner {
            Some(window) => !window.is_open() || window.is_key_down(Key::Q),
            None => false,
        }
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::info!(title = %self.title, "display window closed");
        }
    }
}
