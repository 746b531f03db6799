//! Core engine modules - protocol, workers, engine, handle, inflate,
//! visibility.
//!
//! These modules form the playback coordination layer, independent of any
//! rendering backend.

pub mod engine;
pub mod handle;
pub mod inflate;
pub mod protocol;
pub mod visibility;
pub mod workers;

// Re-exports for convenience
pub use handle::{Animation, EventCallback, ListenerId};
pub use inflate::{InflateClient, InflateService, looks_gzipped};
pub use protocol::{FrameSpan, PlayerEvent, PlayerState};
pub use visibility::VisibilityTracker;
pub use workers::{WorkerHandle, Workers};
