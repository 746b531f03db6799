//! Narrow contract over the native vector rasterizer.
//!
//! The crate does not produce pixels itself. A `BackendFactory` is injected
//! into the worker pool and invoked inside a worker thread whenever an
//! `Init` message constructs a playback engine; everything the engine ever
//! asks of the rasterizer goes through `RenderBackend`. Tests inject fakes
//! through the same seam.

use crate::config::RendererKind;

/// One loaded animation inside a worker thread. Teardown is `Drop`.
pub trait RenderBackend: Send {
    /// Decode the asset for a target of the given extent. `false` means the
    /// bytes were rejected.
    fn load(&mut self, data: &[u8], width: u32, height: u32) -> bool;

    /// Recompute the scene for the current frame. `false` means nothing
    /// changed and rendering can be skipped.
    fn update(&mut self) -> bool;

    /// Rasterize and return the RGBA pixel buffer. Backends that present
    /// internally (GPU renderers) return an empty slice.
    fn render(&mut self) -> &[u8];

    /// Position the playhead; sub-frame values interpolate. `false` means
    /// the frame did not change.
    fn set_frame(&mut self, frame: f32) -> bool;

    /// Animation length in seconds.
    fn duration(&self) -> f32;

    /// Total frame count, fractional frames allowed. Below 1.0 the asset is
    /// not ready to play.
    fn total_frames(&self) -> f32;
}

/// Constructs a backend for a renderer selector. Called from worker
/// threads, so factories must be shareable.
pub trait BackendFactory: Send + Sync {
    fn create(&self, renderer: RendererKind) -> Box<dyn RenderBackend>;
}

impl<F> BackendFactory for F
where
    F: Fn(RendererKind) -> Box<dyn RenderBackend> + Send + Sync,
{
    fn create(&self, renderer: RendererKind) -> Box<dyn RenderBackend> {
        self(renderer)
    }
}
