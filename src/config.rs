//! Animation sources and playback configuration.
//!
//! `PlaybackConfig` is the immutable-after-construction record that crosses
//! the control/worker boundary inside `Init`. Defaults are applied once at
//! construction; afterwards only explicit tweak messages mutate it (bounce
//! mode flips the worker-side copy's direction at loop boundaries).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::surface::Surface;

/// Where the encoded animation bytes come from.
///
/// A path is read from the filesystem; raw bytes are used as-is. Either way
/// a gzip-wrapped payload (magic `1f 8b 08`) is routed through the
/// decompression service before reaching the worker.
#[derive(Clone, Debug)]
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Rendering backend selector, interpreted by the `BackendFactory`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Software rasterizer producing a pixel buffer presented to the target.
    #[default]
    #[serde(rename = "sw")]
    Software,
    /// GPU renderer presenting internally (returns an empty pixel slice).
    Gpu,
}

/// What happens when playback reaches a loop boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Restart from the origin boundary.
    #[default]
    Normal,
    /// Reverse direction instead of restarting.
    Bounce,
}

/// Playback knobs carried into the worker inside `Init`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    pub renderer: RendererKind,
    pub auto_play: bool,
    pub looping: bool,
    pub play_mode: PlayMode,
    /// Bounded repeat budget; `None` plays once (unless `looping`).
    pub repeat_count: Option<u32>,
    /// Playback rate multiplier, > 0.
    pub speed: f32,
    /// +1 forward, -1 backward.
    pub direction: i8,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            renderer: RendererKind::Software,
            auto_play: false,
            looping: false,
            play_mode: PlayMode::Normal,
            repeat_count: None,
            speed: 1.0,
            direction: 1,
        }
    }
}

/// Construction input for an [`Animation`](crate::Animation).
///
/// `new` applies the defaults; the remaining knobs are plain fields:
///
/// ```ignore
/// let mut options = AnimationOptions::new("intro.json", surface);
/// options.auto_play = true;
/// options.looping = true;
/// let animation = Animation::new(&runtime, options)?;
/// ```
#[derive(Debug)]
pub struct AnimationOptions {
    pub source: Source,
    pub surface: Surface,
    pub renderer: RendererKind,
    pub auto_play: bool,
    pub looping: bool,
    pub play_mode: PlayMode,
    pub repeat_count: Option<u32>,
    pub speed: f32,
    pub direction: i8,
}

impl AnimationOptions {
    pub fn new(source: impl Into<Source>, surface: Surface) -> Self {
        let defaults = PlaybackConfig::default();
        Self {
            source: source.into(),
            surface,
            renderer: defaults.renderer,
            auto_play: defaults.auto_play,
            looping: defaults.looping,
            play_mode: defaults.play_mode,
            repeat_count: defaults.repeat_count,
            speed: defaults.speed,
            direction: defaults.direction,
        }
    }

    pub(crate) fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            renderer: self.renderer,
            auto_play: self.auto_play,
            looping: self.looping,
            play_mode: self.play_mode,
            repeat_count: self.repeat_count,
            speed: self.speed,
            direction: self.direction,
        }
    }
}
