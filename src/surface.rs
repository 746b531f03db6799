//! Drawable surfaces and one-shot draw-target transfer.
//!
//! A `Surface` is the presentation-side object: it knows its layout size,
//! device pixel ratio and whether it is still attached. The `DrawTarget` is
//! the exclusive drawing end; it can be taken out of the surface exactly
//! once and moves into the worker inside `Init`. After the move the control
//! side has no way to touch the pixels again - removal is all that is left.

use log::warn;

use crate::error::{VectaError, VectaResult};

/// Presentation-side surface handle.
#[derive(Debug)]
pub struct Surface {
    layout_width: f32,
    layout_height: f32,
    device_pixel_ratio: f32,
    width: u32,
    height: u32,
    attached: bool,
    target: Option<DrawTarget>,
}

impl Surface {
    /// Resolve physical pixel dimensions from layout size x device pixel
    /// ratio and allocate the draw target. Dimensions are resolved once,
    /// here; a zero layout extent yields a zero-sized target.
    pub fn new(layout_width: f32, layout_height: f32, device_pixel_ratio: f32) -> Self {
        let width = scale(layout_width, device_pixel_ratio);
        let height = scale(layout_height, device_pixel_ratio);
        Self {
            layout_width,
            layout_height,
            device_pixel_ratio,
            width,
            height,
            attached: true,
            target: Some(DrawTarget::new(width, height)),
        }
    }

    pub fn layout_size(&self) -> (f32, f32) {
        (self.layout_width, self.layout_height)
    }

    pub fn physical_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    /// Move the exclusive drawing end out of the surface. Succeeds exactly
    /// once; the second caller gets `VectaError::Surface`.
    pub(crate) fn transfer(&mut self) -> VectaResult<DrawTarget> {
        self.target
            .take()
            .ok_or_else(|| VectaError::surface("draw target already transferred"))
    }

    /// Detach from the presentation tree (the `demolish` path).
    pub fn remove(&mut self) {
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

/// Exclusive drawing end of a surface, owned by exactly one playback engine
/// after transfer. Stores RGBA8 pixels.
pub struct DrawTarget {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    presented: u64,
}

impl DrawTarget {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; buffer_len(width, height)],
            presented: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Copy a rendered RGBA frame into the target. A buffer that does not
    /// match the target extent is dropped with a warning rather than
    /// panicking mid-playback.
    pub fn present(&mut self, rgba: &[u8]) {
        if rgba.len() != self.pixels.len() {
            warn!(
                "pixel buffer size mismatch: got {} bytes, target holds {}",
                rgba.len(),
                self.pixels.len()
            );
            return;
        }
        self.pixels.copy_from_slice(rgba);
        self.presented += 1;
    }

    /// Number of frames presented so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; buffer_len(width, height)];
    }
}

impl std::fmt::Debug for DrawTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawTarget")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("presented", &self.presented)
            .finish()
    }
}

fn scale(layout: f32, device_pixel_ratio: f32) -> u32 {
    if layout > 0.0 {
        (layout * device_pixel_ratio).round() as u32
    } else {
        0
    }
}

fn buffer_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
