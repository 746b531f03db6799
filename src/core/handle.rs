//! Caller-facing control handle.
//!
//! An `Animation` owns the presentation surface, proxies commands to its
//! pooled worker as fire-and-forget protocol messages, and mirrors the
//! engine's state and frame position as they stream back. Source
//! resolution (filesystem read, gzip sniff, decompression) happens on a
//! per-instance thread that then becomes the response dispatch loop, so
//! construction never blocks the caller.
//!
//! Subscription is an explicit per-event callback list: `on` returns a
//! token, `off` takes it back. Callbacks run on the dispatch thread.

use anyhow::Context as _;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, trace, warn};
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

use crate::config::{AnimationOptions, PlaybackConfig, Source};
use crate::core::inflate::{InflateClient, looks_gzipped};
use crate::core::protocol::{
    ControlMessage, FrameSpan, InitPayload, PlayerEvent, PlayerState, StateAction, Tweak,
    WorkerResponse,
};
use crate::core::visibility::VisibilityTracker;
use crate::core::workers::WorkerHandle;
use crate::error::{VectaError, VectaResult};
use crate::runtime::Runtime;
use crate::surface::{DrawTarget, Surface};

/// Event subscriber callback; receives the frame position that rode on the
/// triggering response.
pub type EventCallback = Arc<dyn Fn(FrameSpan) + Send + Sync>;

/// Subscription token returned by [`Animation::on`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerId {
    event: PlayerEvent,
    token: u64,
}

#[derive(Default)]
struct Listeners {
    inner: Mutex<HashMap<PlayerEvent, Vec<(u64, EventCallback)>>>,
    next_token: AtomicU64,
}

impl Listeners {
    fn add(&self, event: PlayerEvent, callback: EventCallback) -> ListenerId {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event)
            .or_default()
            .push((token, callback));
        ListenerId { event, token }
    }

    fn remove(&self, listener: &ListenerId) {
        if let Some(callbacks) = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&listener.event)
        {
            callbacks.retain(|(token, _)| *token != listener.token);
        }
    }

    fn emit(&self, event: PlayerEvent, frames: FrameSpan) {
        // Snapshot outside the lock so a callback may subscribe/unsubscribe.
        let callbacks: Vec<EventCallback> = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event)
            .map(|subscribed| {
                subscribed
                    .iter()
                    .map(|(_, callback)| Arc::clone(callback))
                    .collect()
            })
            .unwrap_or_default();
        for callback in callbacks {
            callback(frames);
        }
    }
}

struct Mirror {
    state: PlayerState,
    frames: FrameSpan,
}

/// One animation playback session, spanning this handle and its paired
/// worker-side engine.
pub struct Animation {
    id: Uuid,
    worker: WorkerHandle,
    visibility: VisibilityTracker,
    surface: Surface,
    mirror: Arc<Mutex<Mirror>>,
    listeners: Arc<Listeners>,
    dispatch: Option<JoinHandle<()>>,
}

impl Animation {
    /// Create an instance: transfer the draw target out of the surface,
    /// pick a pooled worker, register for visibility observation and kick
    /// off asynchronous source resolution. Returns as soon as the instance
    /// thread is spawned; loading progress arrives as events.
    pub fn new(runtime: &Runtime, options: AnimationOptions) -> VectaResult<Self> {
        let id = Uuid::new_v4();
        let config = options.playback_config();
        let AnimationOptions {
            source,
            mut surface,
            ..
        } = options;

        let target = surface.transfer()?;
        let worker = runtime.workers().get_worker();
        runtime.visibility().observe(id, worker.sender());

        let mirror = Arc::new(Mutex::new(Mirror {
            state: PlayerState::Loading,
            frames: FrameSpan::default(),
        }));
        let listeners = Arc::new(Listeners::default());
        let (reply_tx, reply_rx) = unbounded();

        let short = id.to_string();
        let dispatch = thread::Builder::new()
            .name(format!("vecta-anim-{}", &short[..8]))
            .spawn({
                let worker = worker.clone();
                let inflate = runtime.inflate_client();
                let mirror = Arc::clone(&mirror);
                let listeners = Arc::clone(&listeners);
                move || {
                    load_and_dispatch(
                        id, source, inflate, worker, target, config, reply_tx, reply_rx, mirror,
                        listeners,
                    )
                }
            })
            .map_err(|e| VectaError::pool(format!("failed to spawn instance thread: {e}")))?;

        let (width, height) = surface.physical_size();
        debug!("animation {id} created ({width}x{height})");

        Ok(Self {
            id,
            worker,
            visibility: runtime.visibility().clone(),
            surface,
            mirror,
            listeners,
            dispatch: Some(dispatch),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Mirrored playback state; updated asynchronously by worker responses.
    pub fn state(&self) -> PlayerState {
        self.mirror
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .state
    }

    /// Mirrored frame position.
    pub fn frames(&self) -> FrameSpan {
        self.mirror
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .frames
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == PlayerState::Destroyed
    }

    pub fn play(&self) {
        self.send_action(StateAction::Play);
    }

    pub fn pause(&self) {
        self.send_action(StateAction::Pause);
    }

    pub fn stop(&self) {
        self.send_action(StateAction::Stop);
    }

    pub fn seek(&self, frame: f32) {
        self.send_tweak(Tweak::Seek(frame));
    }

    pub fn play_at(&self, frame: f32) {
        self.send_tweak(Tweak::PlayAt(frame));
    }

    pub fn set_looping(&self, value: bool) {
        self.send_tweak(Tweak::Looping(value));
    }

    pub fn set_direction(&self, value: i8) {
        if value != 1 && value != -1 {
            warn!("animation {}: direction must be +1 or -1, got {value}", self.id);
            return;
        }
        self.send_tweak(Tweak::Direction(value));
    }

    pub fn set_speed(&self, value: f32) {
        if !(value > 0.0) {
            warn!("animation {}: speed must be > 0, got {value}", self.id);
            return;
        }
        self.send_tweak(Tweak::Speed(value));
    }

    /// Resize the worker-side draw target to a new layout extent, scaled by
    /// the surface's device pixel ratio.
    pub fn resize(&self, layout_width: f32, layout_height: f32) {
        let ratio = self.surface.device_pixel_ratio();
        let width = (layout_width * ratio).round() as u32;
        let height = (layout_height * ratio).round() as u32;
        if width == 0 || height == 0 {
            warn!("animation {}: ignoring resize to zero extent", self.id);
            return;
        }
        self.worker.send(ControlMessage::Resize {
            id: self.id,
            width,
            height,
        });
    }

    /// Subscribe to a lifecycle event. The returned token feeds `off`.
    pub fn on<F>(&self, event: PlayerEvent, callback: F) -> ListenerId
    where
        F: Fn(FrameSpan) + Send + Sync + 'static,
    {
        self.listeners.add(event, Arc::new(callback))
    }

    /// Remove a subscription; unknown tokens are ignored.
    pub fn off(&self, listener: ListenerId) {
        self.listeners.remove(&listener);
    }

    /// Tear the instance down. `remove_surface` selects `demolish`: the
    /// surface is detached and the worker drops the instance mapping
    /// entirely; otherwise the surface stays for later reconstruction.
    /// Idempotent - a destroyed handle swallows repeat calls, and exactly
    /// one `destroyed` event reaches subscribers.
    pub fn destroy(&mut self, remove_surface: bool) {
        let frames = {
            let mut mirror = self.mirror.lock().unwrap_or_else(|e| e.into_inner());
            if mirror.state == PlayerState::Destroyed {
                return;
            }
            mirror.state = PlayerState::Destroyed;
            mirror.frames
        };

        let action = if remove_surface {
            StateAction::Demolish
        } else {
            StateAction::Destroy
        };
        self.worker.send(ControlMessage::State {
            id: self.id,
            action,
        });
        self.visibility.unobserve(self.id);
        if remove_surface {
            self.surface.remove();
        }
        self.listeners.emit(PlayerEvent::Destroyed, frames);
        debug!(
            "animation {} destroyed (remove_surface: {remove_surface})",
            self.id
        );
    }

    fn send_action(&self, action: StateAction) {
        self.worker.send(ControlMessage::State {
            id: self.id,
            action,
        });
    }

    fn send_tweak(&self, tweak: Tweak) {
        self.worker.send(ControlMessage::Tweak {
            id: self.id,
            tweak,
        });
    }
}

impl Drop for Animation {
    fn drop(&mut self) {
        self.destroy(false);
        if let Some(dispatch) = self.dispatch.take() {
            let _ = dispatch.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn load_and_dispatch(
    id: Uuid,
    source: Source,
    inflate: InflateClient,
    worker: WorkerHandle,
    target: DrawTarget,
    config: PlaybackConfig,
    reply_tx: Sender<WorkerResponse>,
    reply_rx: Receiver<WorkerResponse>,
    mirror: Arc<Mutex<Mirror>>,
    listeners: Arc<Listeners>,
) {
    let animation_data = match resolve_source(id, source, &inflate) {
        Ok(data) => data,
        Err(err) => {
            error!("animation {id}: load failed: {err}");
            let frames = {
                let mut mirror = mirror.lock().unwrap_or_else(|e| e.into_inner());
                if mirror.state == PlayerState::Destroyed {
                    None
                } else {
                    mirror.state = PlayerState::Error;
                    Some(mirror.frames)
                }
            };
            if let Some(frames) = frames {
                listeners.emit(PlayerEvent::Error, frames);
            }
            return;
        }
    };

    {
        let mirror = mirror.lock().unwrap_or_else(|e| e.into_inner());
        if mirror.state == PlayerState::Destroyed {
            debug!("animation {id}: destroyed before init, dropping asset");
            return;
        }
    }

    worker.send(ControlMessage::Init(Box::new(InitPayload {
        id,
        target,
        animation_data,
        config,
        reply: reply_tx,
    })));

    // A destroy issued between the check above and the send would have
    // reached the worker before the engine existed and been dropped as an
    // unknown id. The mirror lock orders the two paths: re-issue teardown
    // now that the engine is registered.
    {
        let mirror = mirror.lock().unwrap_or_else(|e| e.into_inner());
        if mirror.state == PlayerState::Destroyed {
            worker.send(ControlMessage::State {
                id,
                action: StateAction::Destroy,
            });
        }
    }

    // Dispatch loop: ends when the engine drops its reply sender.
    for response in reply_rx.iter() {
        if response.id() != id {
            continue;
        }
        match response {
            WorkerResponse::State { state, frames, .. } => {
                let mut mirror = mirror.lock().unwrap_or_else(|e| e.into_inner());
                if mirror.state == PlayerState::Destroyed {
                    continue;
                }
                mirror.state = state;
                mirror.frames = frames;
            }
            WorkerResponse::Event { event, frames, .. } => {
                {
                    let mut mirror = mirror.lock().unwrap_or_else(|e| e.into_inner());
                    if event == PlayerEvent::Destroyed {
                        if mirror.state == PlayerState::Destroyed {
                            // The handle already emitted on its own teardown.
                            continue;
                        }
                        mirror.state = PlayerState::Destroyed;
                    }
                    mirror.frames = frames;
                }
                listeners.emit(event, frames);
            }
        }
    }
    trace!("animation {id}: dispatch loop ended");
}

fn resolve_source(id: Uuid, source: Source, inflate: &InflateClient) -> VectaResult<Vec<u8>> {
    let data = match source {
        Source::Path(path) => fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
        Source::Bytes(bytes) => bytes,
    };
    if looks_gzipped(&data) {
        debug!("animation {id}: gzip magic detected, inflating {} bytes", data.len());
        return inflate.inflate(data);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn listeners_invoke_all_subscribers_for_an_event() {
        let listeners = Listeners::default();
        let counter = Arc::new(AtomicI32::new(0));

        let first = Arc::clone(&counter);
        listeners.add(
            PlayerEvent::Load,
            Arc::new(move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let second = Arc::clone(&counter);
        listeners.add(
            PlayerEvent::Load,
            Arc::new(move |frames| {
                second.fetch_add(frames.total as i32, Ordering::SeqCst);
            }),
        );

        listeners.emit(
            PlayerEvent::Load,
            FrameSpan {
                current: 0.0,
                total: 10.0,
            },
        );
        assert_eq!(counter.load(Ordering::SeqCst), 11);

        // Other event kinds do not trigger.
        listeners.emit(PlayerEvent::Pause, FrameSpan::default());
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn off_removes_exactly_the_given_subscription() {
        let listeners = Listeners::default();
        let counter = Arc::new(AtomicI32::new(0));

        let kept = Arc::clone(&counter);
        listeners.add(
            PlayerEvent::Play,
            Arc::new(move |_| {
                kept.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let dropped = Arc::clone(&counter);
        let token = listeners.add(
            PlayerEvent::Play,
            Arc::new(move |_| {
                dropped.fetch_add(100, Ordering::SeqCst);
            }),
        );

        listeners.remove(&token);
        listeners.emit(PlayerEvent::Play, FrameSpan::default());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
