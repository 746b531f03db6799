//! Worker-side playback engine: state machine and timing loop.
//!
//! One engine per animation instance, living inside a worker thread. It
//! owns the rendering backend and the transferred draw target, derives the
//! current frame from wall-clock time each tick, and reports every state
//! change and lifecycle event back over its per-instance reply channel.
//!
//! # Timing model
//!
//! The playback clock anchor is reset on every `play()`. A tick computes
//! `elapsed / duration * total * speed`, mirrored to `total - frame` when
//! playing backwards. Crossing the relevant boundary either restarts the
//! segment (loop / bounded repeat, with a one-tick intermission) or lands
//! the engine in `complete`. The worker only ticks engines in `playing`,
//! so leaving that state is all it takes to stop the loop.

use log::{debug, error, trace};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::backend::{BackendFactory, RenderBackend};
use crate::config::{PlayMode, PlaybackConfig};
use crate::core::protocol::{FrameSpan, InitPayload, PlayerEvent, PlayerState, WorkerResponse};
use crate::surface::DrawTarget;

/// Pause between a boundary crossing and the loop/bounce restart, the one
/// permitted blocking wait in the timing loop.
const INTERMISSION: Duration = Duration::from_millis(1);

pub struct PlaybackEngine {
    id: Uuid,
    config: PlaybackConfig,
    backend: Option<Box<dyn RenderBackend>>,
    target: DrawTarget,
    reply: Option<crossbeam_channel::Sender<WorkerResponse>>,
    state: PlayerState,
    current_frame: f32,
    total_frames: f32,
    /// Wall-clock anchor of the current play segment.
    begin_time: Option<Instant>,
    /// Repeat counter, 1-based like the repeat budget it is compared to.
    counter: u32,
    observable: bool,
}

impl PlaybackEngine {
    /// Construct the backend, load the asset and render the first frame.
    /// A rejected asset parks the engine in `error`; every later operation
    /// then no-ops because the backend slot stays empty.
    pub(crate) fn new(payload: InitPayload, factory: &dyn BackendFactory) -> Self {
        let InitPayload {
            id,
            target,
            animation_data,
            config,
            reply,
        } = payload;

        let mut engine = Self {
            id,
            config,
            backend: None,
            target,
            reply: Some(reply),
            state: PlayerState::Loading,
            current_frame: 0.0,
            total_frames: 0.0,
            begin_time: None,
            counter: 1,
            observable: false,
        };

        let mut backend = factory.create(engine.config.renderer);
        let (width, height) = (engine.target.width(), engine.target.height());
        if !backend.load(&animation_data, width, height) {
            error!(
                "animation {}: backend rejected asset ({} bytes)",
                engine.id,
                animation_data.len()
            );
            engine.set_state(PlayerState::Error);
            engine.emit(PlayerEvent::Error);
            // Nothing else will ever be sent; let the control side see the
            // channel close.
            engine.reply = None;
            return engine;
        }
        engine.backend = Some(backend);

        engine.present();
        engine.emit(PlayerEvent::Load);

        if engine.config.auto_play {
            engine.play();
        }
        engine
    }

    pub(crate) fn state(&self) -> PlayerState {
        self.state
    }

    /// Start or resume playback. Refreshes the frame count from the
    /// backend; a count below 1 means the asset is not ready and the call
    /// is a documented no-op. Resets the clock anchor either way. Without
    /// observability the engine parks in `frozen` instead of scheduling.
    pub(crate) fn play(&mut self) {
        let total = match self.backend.as_ref() {
            Some(backend) => backend.total_frames(),
            None => return,
        };
        if total < 1.0 {
            debug!(
                "animation {}: frame count not ready, ignoring play",
                self.id
            );
            return;
        }
        self.total_frames = total;
        self.begin_time = Some(Instant::now());

        if self.state == PlayerState::Playing {
            return;
        }
        if self.observable {
            self.set_state(PlayerState::Playing);
            self.emit(PlayerEvent::Play);
        } else {
            self.set_state(PlayerState::Frozen);
        }
    }

    pub(crate) fn pause(&mut self) {
        if self.backend.is_none() {
            return;
        }
        self.set_state(PlayerState::Paused);
        self.emit(PlayerEvent::Pause);
    }

    /// Reset to frame 0 and a fresh repeat budget.
    pub(crate) fn stop(&mut self) {
        if self.backend.is_none() {
            return;
        }
        self.current_frame = 0.0;
        self.counter = 1;
        self.begin_time = None;
        if let Some(backend) = self.backend.as_mut() {
            backend.set_frame(0.0);
        }
        self.present();
        self.set_state(PlayerState::Stopped);
        self.emit(PlayerEvent::Stop);
    }

    /// Jump to a frame and render it once, regardless of observability.
    /// Permitted from any state, `complete` included; playback is paused.
    pub(crate) fn seek(&mut self, frame: f32) {
        if self.backend.is_none() {
            return;
        }
        self.pause();
        self.current_frame = frame;
        if let Some(backend) = self.backend.as_mut() {
            backend.set_frame(frame);
        }
        self.present();
    }

    /// Resume playback from a given frame: the clock anchor is back-dated
    /// so the very next tick computes `frame`. Permitted from `complete`.
    pub(crate) fn play_at(&mut self, frame: f32) {
        let (total, duration) = match self.backend.as_ref() {
            Some(backend) => (backend.total_frames(), backend.duration()),
            None => return,
        };
        if total < 1.0 {
            debug!(
                "animation {}: frame count not ready, ignoring play_at",
                self.id
            );
            return;
        }
        self.total_frames = total;
        let frame = frame.clamp(0.0, total);
        self.current_frame = frame;
        if let Some(backend) = self.backend.as_mut() {
            backend.set_frame(frame);
        }

        let speed = if self.config.speed > 0.0 {
            self.config.speed
        } else {
            1.0
        };
        let progress = if self.config.direction == -1 {
            total - frame
        } else {
            frame
        };
        let offset = if duration > 0.0 {
            progress / total * duration / speed
        } else {
            0.0
        };
        let now = Instant::now();
        self.begin_time = Some(
            now.checked_sub(Duration::from_secs_f32(offset))
                .unwrap_or(now),
        );

        if self.state == PlayerState::Playing {
            return;
        }
        if self.observable {
            self.set_state(PlayerState::Playing);
            self.emit(PlayerEvent::Play);
        } else {
            self.set_state(PlayerState::Frozen);
        }
    }

    fn freeze(&mut self) {
        self.set_state(PlayerState::Frozen);
        self.emit(PlayerEvent::Freeze);
    }

    /// Visibility change from the tracker. Going dark mid-playback freezes
    /// the engine (the loop halts because only `playing` engines tick);
    /// coming back resumes through `play()`.
    pub(crate) fn set_observable(&mut self, observable: bool) {
        self.observable = observable;
        if observable {
            if self.state == PlayerState::Frozen {
                self.play();
            }
        } else if self.state == PlayerState::Playing {
            self.freeze();
        }
    }

    pub(crate) fn set_looping(&mut self, value: bool) {
        if self.backend.is_some() {
            self.config.looping = value;
        }
    }

    pub(crate) fn set_direction(&mut self, value: i8) {
        if self.backend.is_some() {
            self.config.direction = value;
        }
    }

    pub(crate) fn set_speed(&mut self, value: f32) {
        if self.backend.is_some() {
            self.config.speed = value;
        }
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        if self.backend.is_none() {
            return;
        }
        self.target.resize(width, height);
        if self.state != PlayerState::Playing {
            self.present();
        }
    }

    /// Release the backend and report `destroyed`. Idempotent: a second
    /// call finds the backend slot empty and does nothing. Dropping the
    /// reply sender last lets the control side observe the disconnect.
    pub(crate) fn destroy(&mut self) {
        if self.backend.is_none() {
            return;
        }
        self.observable = false;
        self.backend = None;
        self.begin_time = None;
        self.set_state(PlayerState::Destroyed);
        self.emit(PlayerEvent::Destroyed);
        self.reply = None;
        trace!("animation {} engine destroyed", self.id);
    }

    /// One pass of the timing loop. Called by the worker at display-refresh
    /// cadence for every engine; anything not `playing` returns instantly.
    pub(crate) fn tick(&mut self, now: Instant) {
        if self.state != PlayerState::Playing {
            return;
        }
        let duration = match self.backend.as_ref() {
            Some(backend) => backend.duration(),
            None => return,
        };
        if duration <= 0.0 || self.total_frames < 1.0 {
            return;
        }

        let begin = match self.begin_time {
            Some(begin) => begin,
            None => {
                self.begin_time = Some(now);
                now
            }
        };
        let elapsed = now.saturating_duration_since(begin).as_secs_f32();
        let mut frame = elapsed / duration * self.total_frames * self.config.speed;
        if self.config.direction == -1 {
            frame = self.total_frames - frame;
        }
        self.current_frame = frame;

        let crossed = (self.config.direction == 1 && frame >= self.total_frames)
            || (self.config.direction == -1 && frame <= 0.0);
        if crossed {
            let budget = match self.config.repeat_count {
                Some(count) if self.config.play_mode == PlayMode::Bounce => count * 2,
                Some(count) => count,
                None => 0,
            };
            if self.config.looping || (budget > 0 && self.counter < budget) {
                if self.config.play_mode == PlayMode::Bounce {
                    self.config.direction = -self.config.direction;
                    self.current_frame = if self.config.direction == 1 {
                        0.0
                    } else {
                        self.total_frames
                    };
                }
                if self.config.repeat_count.is_some() {
                    self.counter += 1;
                }
                trace!("animation {} loop restart", self.id);
                self.emit(PlayerEvent::Loop);
                thread::sleep(INTERMISSION);
                self.play();
                return;
            }
            self.current_frame = if self.config.direction == 1 {
                self.total_frames
            } else {
                0.0
            };
            self.emit(PlayerEvent::Complete);
            self.set_state(PlayerState::Complete);
            return;
        }

        let updated = match self.backend.as_mut() {
            Some(backend) => backend.set_frame(frame),
            None => false,
        };
        if updated && self.observable {
            self.present();
        }
    }

    /// Recompute and push the current frame to the draw target. Backends
    /// that present internally return an empty buffer and are left alone.
    fn present(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if !backend.update() {
            return;
        }
        let buffer = backend.render();
        if buffer.is_empty() {
            return;
        }
        self.target.present(buffer);
    }

    fn frames(&self) -> FrameSpan {
        FrameSpan {
            current: self.current_frame,
            total: self.total_frames,
        }
    }

    fn set_state(&mut self, state: PlayerState) {
        self.state = state;
        if let Some(reply) = &self.reply {
            let _ = reply.send(WorkerResponse::State {
                id: self.id,
                state,
                frames: self.frames(),
            });
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(reply) = &self.reply {
            let _ = reply.send(WorkerResponse::Event {
                id: self.id,
                event,
                frames: self.frames(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererKind;
    use crate::surface::Surface;
    use crossbeam_channel::{Receiver, unbounded};
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct FakeBackend {
        duration: f32,
        total: f32,
        accept: bool,
        frames: Arc<Mutex<Vec<f32>>>,
        renders: Arc<AtomicUsize>,
        pixels: Vec<u8>,
    }

    impl FakeBackend {
        fn new(duration: f32, total: f32) -> Self {
            Self {
                duration,
                total,
                accept: true,
                frames: Arc::new(Mutex::new(Vec::new())),
                renders: Arc::new(AtomicUsize::new(0)),
                pixels: vec![0xab; 4 * 4 * 4],
            }
        }

        fn rejecting() -> Self {
            let mut backend = Self::new(1.0, 10.0);
            backend.accept = false;
            backend
        }
    }

    impl RenderBackend for FakeBackend {
        fn load(&mut self, _data: &[u8], _width: u32, _height: u32) -> bool {
            self.accept
        }

        fn update(&mut self) -> bool {
            true
        }

        fn render(&mut self) -> &[u8] {
            self.renders.fetch_add(1, Ordering::SeqCst);
            &self.pixels
        }

        fn set_frame(&mut self, frame: f32) -> bool {
            self.frames.lock().unwrap().push(frame);
            true
        }

        fn duration(&self) -> f32 {
            self.duration
        }

        fn total_frames(&self) -> f32 {
            self.total
        }
    }

    fn engine_with(
        config: PlaybackConfig,
        backend: FakeBackend,
    ) -> (PlaybackEngine, Receiver<WorkerResponse>) {
        let (reply, responses) = unbounded();
        let mut surface = Surface::new(4.0, 4.0, 1.0);
        let payload = InitPayload {
            id: Uuid::new_v4(),
            target: surface.transfer().unwrap(),
            animation_data: vec![0x7b],
            config,
            reply,
        };
        let factory = move |_renderer: RendererKind| -> Box<dyn RenderBackend> {
            Box::new(backend.clone())
        };
        let engine = PlaybackEngine::new(payload, &factory);
        (engine, responses)
    }

    fn events(responses: &Receiver<WorkerResponse>) -> Vec<PlayerEvent> {
        responses
            .try_iter()
            .filter_map(|response| match response {
                WorkerResponse::Event { event, .. } => Some(event),
                WorkerResponse::State { .. } => None,
            })
            .collect()
    }

    #[test]
    fn load_renders_first_frame_and_emits_load() {
        let backend = FakeBackend::new(1.0, 10.0);
        let renders = Arc::clone(&backend.renders);
        let (engine, responses) = engine_with(PlaybackConfig::default(), backend);
        assert_eq!(engine.state(), PlayerState::Loading);
        assert_eq!(events(&responses), vec![PlayerEvent::Load]);
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert_eq!(engine.target.presented(), 1);
    }

    #[test]
    fn rejected_asset_parks_in_error() {
        let (mut engine, responses) = engine_with(PlaybackConfig::default(), FakeBackend::rejecting());
        assert_eq!(engine.state(), PlayerState::Error);
        assert_eq!(events(&responses), vec![PlayerEvent::Error]);

        engine.play();
        engine.pause();
        assert_eq!(engine.state(), PlayerState::Error);
    }

    #[test]
    fn play_without_observability_freezes() {
        let (mut engine, responses) = engine_with(PlaybackConfig::default(), FakeBackend::new(1.0, 10.0));
        engine.play();
        assert_eq!(engine.state(), PlayerState::Frozen);
        assert!(!events(&responses).contains(&PlayerEvent::Play));

        engine.set_observable(true);
        assert_eq!(engine.state(), PlayerState::Playing);
        assert!(events(&responses).contains(&PlayerEvent::Play));
    }

    #[test]
    fn tick_computes_the_elapsed_frame() {
        let backend = FakeBackend::new(1.0, 10.0);
        let frames = Arc::clone(&backend.frames);
        let (mut engine, _responses) = engine_with(PlaybackConfig::default(), backend);
        engine.set_observable(true);
        engine.play();

        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(300));
        let last = *frames.lock().unwrap().last().unwrap();
        assert!((last - 3.0).abs() < 1e-3, "got frame {last}");
    }

    #[test]
    fn tick_honors_speed_and_direction() {
        let backend = FakeBackend::new(1.0, 10.0);
        let frames = Arc::clone(&backend.frames);
        let mut config = PlaybackConfig::default();
        config.speed = 2.0;
        let (mut engine, _responses) = engine_with(config, backend);
        engine.set_observable(true);
        engine.play();
        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(300));
        let last = *frames.lock().unwrap().last().unwrap();
        assert!((last - 6.0).abs() < 1e-3, "got frame {last}");

        let backend = FakeBackend::new(1.0, 10.0);
        let frames = Arc::clone(&backend.frames);
        let mut config = PlaybackConfig::default();
        config.direction = -1;
        let (mut engine, _responses) = engine_with(config, backend);
        engine.set_observable(true);
        engine.play();
        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(300));
        let last = *frames.lock().unwrap().last().unwrap();
        assert!((last - 7.0).abs() < 1e-3, "got frame {last}");
    }

    #[test]
    fn completion_without_loop_or_repeat() {
        let (mut engine, responses) = engine_with(PlaybackConfig::default(), FakeBackend::new(1.0, 10.0));
        engine.set_observable(true);
        engine.play();
        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(1100));
        assert_eq!(engine.state(), PlayerState::Complete);
        assert!(events(&responses).contains(&PlayerEvent::Complete));
        assert_eq!(engine.current_frame, 10.0);
    }

    #[test]
    fn bounce_flips_direction_at_the_boundary() {
        let mut config = PlaybackConfig::default();
        config.looping = true;
        config.play_mode = PlayMode::Bounce;
        let (mut engine, responses) = engine_with(config, FakeBackend::new(1.0, 10.0));
        engine.set_observable(true);
        engine.play();

        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(1100));
        assert_eq!(engine.config.direction, -1);
        assert_eq!(engine.current_frame, 10.0);
        assert_eq!(engine.state(), PlayerState::Playing);
        assert!(events(&responses).contains(&PlayerEvent::Loop));

        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(1100));
        assert_eq!(engine.config.direction, 1);
        assert_eq!(engine.current_frame, 0.0);
    }

    #[test]
    fn repeat_count_completes_after_the_final_crossing() {
        let mut config = PlaybackConfig::default();
        config.repeat_count = Some(3);
        let (mut engine, responses) = engine_with(config, FakeBackend::new(1.0, 10.0));
        engine.set_observable(true);
        engine.play();

        for _ in 0..2 {
            let begin = engine.begin_time.unwrap();
            engine.tick(begin + Duration::from_millis(1100));
            assert_eq!(engine.state(), PlayerState::Playing);
        }
        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(1100));
        assert_eq!(engine.state(), PlayerState::Complete);

        let emitted = events(&responses);
        assert_eq!(
            emitted
                .iter()
                .filter(|event| **event == PlayerEvent::Loop)
                .count(),
            2
        );
        assert_eq!(
            emitted
                .iter()
                .filter(|event| **event == PlayerEvent::Complete)
                .count(),
            1
        );
    }

    #[test]
    fn losing_observability_freezes_without_completing() {
        let (mut engine, responses) = engine_with(PlaybackConfig::default(), FakeBackend::new(1.0, 10.0));
        engine.set_observable(true);
        engine.play();

        engine.set_observable(false);
        assert_eq!(engine.state(), PlayerState::Frozen);
        let emitted = events(&responses);
        assert!(emitted.contains(&PlayerEvent::Freeze));
        assert!(!emitted.contains(&PlayerEvent::Complete));

        // Frozen engines do not advance.
        engine.tick(Instant::now() + Duration::from_secs(5));
        assert_eq!(engine.state(), PlayerState::Frozen);

        engine.set_observable(true);
        assert_eq!(engine.state(), PlayerState::Playing);
    }

    #[test]
    fn unobservable_ticks_compute_but_do_not_render() {
        let backend = FakeBackend::new(1.0, 10.0);
        let renders = Arc::clone(&backend.renders);
        let (mut engine, _responses) = engine_with(PlaybackConfig::default(), backend);
        engine.set_observable(true);
        engine.play();
        engine.observable = false;

        let baseline = renders.load(Ordering::SeqCst);
        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(300));
        assert_eq!(renders.load(Ordering::SeqCst), baseline);
        assert!(engine.current_frame > 0.0);
    }

    #[test]
    fn seek_renders_even_when_unobservable() {
        let backend = FakeBackend::new(1.0, 10.0);
        let renders = Arc::clone(&backend.renders);
        let frames = Arc::clone(&backend.frames);
        let (mut engine, responses) = engine_with(PlaybackConfig::default(), backend);

        let baseline = renders.load(Ordering::SeqCst);
        engine.seek(4.0);
        assert_eq!(engine.state(), PlayerState::Paused);
        assert!(events(&responses).contains(&PlayerEvent::Pause));
        assert_eq!(renders.load(Ordering::SeqCst), baseline + 1);
        assert_eq!(*frames.lock().unwrap().last().unwrap(), 4.0);
    }

    #[test]
    fn play_at_back_dates_the_anchor() {
        let backend = FakeBackend::new(1.0, 10.0);
        let frames = Arc::clone(&backend.frames);
        let (mut engine, _responses) = engine_with(PlaybackConfig::default(), backend);
        engine.set_observable(true);
        engine.play_at(4.0);
        assert_eq!(engine.state(), PlayerState::Playing);

        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(400));
        let last = *frames.lock().unwrap().last().unwrap();
        assert!((last - 4.0).abs() < 0.2, "got frame {last}");
    }

    #[test]
    fn play_at_resumes_from_complete() {
        let (mut engine, _responses) = engine_with(PlaybackConfig::default(), FakeBackend::new(1.0, 10.0));
        engine.set_observable(true);
        engine.play();
        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(1100));
        assert_eq!(engine.state(), PlayerState::Complete);

        engine.play_at(2.0);
        assert_eq!(engine.state(), PlayerState::Playing);
    }

    #[test]
    fn stop_resets_frame_and_repeat_budget() {
        let mut config = PlaybackConfig::default();
        config.repeat_count = Some(3);
        let (mut engine, responses) = engine_with(config, FakeBackend::new(1.0, 10.0));
        engine.set_observable(true);
        engine.play();
        let begin = engine.begin_time.unwrap();
        engine.tick(begin + Duration::from_millis(1100));
        assert_eq!(engine.counter, 2);

        engine.stop();
        assert_eq!(engine.state(), PlayerState::Stopped);
        assert_eq!(engine.current_frame, 0.0);
        assert_eq!(engine.counter, 1);
        assert!(events(&responses).contains(&PlayerEvent::Stop));
    }

    #[test]
    fn destroy_is_idempotent_and_halts_frame_computation() {
        let backend = FakeBackend::new(1.0, 10.0);
        let frames = Arc::clone(&backend.frames);
        let (mut engine, responses) = engine_with(PlaybackConfig::default(), backend);
        engine.set_observable(true);
        engine.play();

        engine.destroy();
        engine.destroy();
        assert_eq!(engine.state(), PlayerState::Destroyed);

        let computed = frames.lock().unwrap().len();
        engine.tick(Instant::now() + Duration::from_secs(1));
        assert_eq!(frames.lock().unwrap().len(), computed);

        let destroyed = events(&responses)
            .iter()
            .filter(|event| **event == PlayerEvent::Destroyed)
            .count();
        assert_eq!(destroyed, 1);
    }

    #[test]
    fn tweaks_mutate_config_in_place() {
        let (mut engine, _responses) = engine_with(PlaybackConfig::default(), FakeBackend::new(1.0, 10.0));
        engine.set_looping(true);
        engine.set_direction(-1);
        engine.set_speed(2.5);
        assert!(engine.config.looping);
        assert_eq!(engine.config.direction, -1);
        assert_eq!(engine.config.speed, 2.5);

        engine.destroy();
        engine.set_speed(9.0);
        assert_eq!(engine.config.speed, 2.5);
    }
}
