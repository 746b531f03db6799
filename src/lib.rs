//! VECTA - Vector animation playback engine
//!
//! Loads an encoded vector-animation asset, hands the drawing surface to a
//! pooled background worker, drives a frame-accurate playback clock and
//! reports lifecycle events back to the caller without blocking it.
//!
//! The crate is the coordination layer: worker pool, typed message
//! protocol, control handle, visibility-gated scheduling and the playback
//! state machine. Rasterization is an external collaborator injected
//! through [`BackendFactory`].
//!
//! ```ignore
//! let runtime = Runtime::new(my_backend_factory());
//! let surface = Surface::new(320.0, 240.0, 2.0);
//! let mut options = AnimationOptions::new("spinner.json", surface);
//! options.auto_play = true;
//! options.looping = true;
//! let animation = Animation::new(&runtime, options)?;
//! animation.on(PlayerEvent::Load, |_| println!("ready"));
//! runtime.visibility().update([(animation.id(), true)]);
//! ```

// Core coordination layer (protocol, workers, engine, handle)
pub mod core;

// Domain types
pub mod backend;
pub mod config;
pub mod error;
pub mod runtime;
pub mod surface;

// Re-export commonly used types from core
pub use core::handle::{Animation, EventCallback, ListenerId};
pub use core::inflate::{InflateClient, InflateService, looks_gzipped};
pub use core::protocol::{FrameSpan, PlayerEvent, PlayerState};
pub use core::visibility::VisibilityTracker;
pub use core::workers::Workers;

// Re-export domain types
pub use backend::{BackendFactory, RenderBackend};
pub use config::{AnimationOptions, PlayMode, PlaybackConfig, RendererKind, Source};
pub use error::{VectaError, VectaResult};
pub use runtime::Runtime;
pub use surface::{DrawTarget, Surface};
