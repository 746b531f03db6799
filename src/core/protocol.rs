//! Typed message protocol crossing the control/worker boundary.
//!
//! Every message carries the instance id; a recipient drops anything whose
//! id it does not know (except `Init`, which creates the mapping). `Init`
//! moves the draw target, the decoded asset bytes and the reply sender into
//! the worker - transfer, not copy - so it is deliberately the one variant
//! without serde derives. The plain-data types keep stable lowercase wire
//! tags, covered by the tests below.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PlaybackConfig;
use crate::surface::DrawTarget;

/// Current and total frame position, pushed on every worker response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSpan {
    pub current: f32,
    pub total: f32,
}

/// Playback state, owned by the engine and mirrored read-only on the handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Loading,
    Error,
    Paused,
    Stopped,
    Playing,
    Frozen,
    Complete,
    Destroyed,
}

/// Lifecycle events delivered to subscribers. Exhaustive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerEvent {
    Load,
    Play,
    Pause,
    Stop,
    Loop,
    Complete,
    Freeze,
    Destroyed,
    Error,
}

/// Lifecycle commands routed to a playback engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateAction {
    Play,
    Pause,
    Stop,
    /// Tear the engine down but keep the instance mapping and surface.
    Destroy,
    /// Tear down and remove the instance entirely, surface included.
    Demolish,
}

/// Configuration tweaks, applied on the engine's next tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "camelCase")]
pub enum Tweak {
    Seek(f32),
    PlayAt(f32),
    Looping(bool),
    Direction(i8),
    Speed(f32),
}

/// Everything an engine needs to come to life, moved into the worker.
#[derive(Debug)]
pub struct InitPayload {
    pub id: Uuid,
    pub target: DrawTarget,
    pub animation_data: Vec<u8>,
    pub config: PlaybackConfig,
    /// Per-instance response channel; dropped on engine destruction so the
    /// control-side dispatch loop sees a disconnect.
    pub reply: Sender<WorkerResponse>,
}

/// Control -> worker.
#[derive(Debug)]
pub enum ControlMessage {
    Init(Box<InitPayload>),
    State { id: Uuid, action: StateAction },
    Tweak { id: Uuid, tweak: Tweak },
    Resize { id: Uuid, width: u32, height: u32 },
    Observability { id: Uuid, observable: bool },
}

/// Worker -> control.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerResponse {
    Event {
        id: Uuid,
        event: PlayerEvent,
        frames: FrameSpan,
    },
    State {
        id: Uuid,
        state: PlayerState,
        frames: FrameSpan,
    },
}

impl WorkerResponse {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Event { id, .. } | Self::State { id, .. } => *id,
        }
    }
}
