//! Worker pool: background contexts hosting playback engines.
//!
//! Each worker thread owns a registry of engines keyed by instance id and
//! drains one FIFO channel, so an engine is only ever touched by messages
//! addressed to it, in delivery order - no locks inside a context. Between
//! messages the thread ticks every playing engine at display-refresh
//! cadence; the timing loop "re-arms" simply by the engine still being in
//! `playing` on the next pass.
//!
//! Instances are assigned round-robin. The pool provisions lazily on first
//! demand; `initialize` is idempotent and the pool mutex is the single
//! in-flight guard, so concurrent callers wait for the same provisioning
//! instead of double-creating contexts.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use log::{debug, error, trace};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::backend::BackendFactory;
use crate::core::engine::PlaybackEngine;
use crate::core::protocol::{ControlMessage, StateAction, Tweak};

/// Display-refresh cadence of the per-context timing loop.
const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// How long an observability value may wait for its `Init`. A visibility
/// change can outrun instance registration; the value parks here, latest
/// wins, and exceeding the bound is an internal error, not a silent hang.
const PENDING_OBSERVABILITY_WAIT: Duration = Duration::from_secs(5);

/// Cheap handle addressing one worker context.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    sender: Sender<ControlMessage>,
}

impl WorkerHandle {
    /// Fire-and-forget send; a departed context swallows the message.
    pub(crate) fn send(&self, message: ControlMessage) {
        let _ = self.sender.send(message);
    }

    pub(crate) fn sender(&self) -> Sender<ControlMessage> {
        self.sender.clone()
    }
}

#[derive(Default)]
struct PoolState {
    handles: Vec<WorkerHandle>,
    threads: Vec<JoinHandle<()>>,
    cursor: usize,
    initialized: bool,
}

/// The worker pool. One per [`Runtime`](crate::Runtime).
pub struct Workers {
    state: Mutex<PoolState>,
    factory: Arc<dyn BackendFactory>,
    default_count: usize,
}

impl Workers {
    /// `default_count` is the size the pool lazily provisions to when
    /// `get_worker` finds it empty.
    pub fn new(factory: Arc<dyn BackendFactory>, default_count: usize) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            factory,
            default_count: default_count.max(1),
        }
    }

    /// Provision `count` worker contexts. Idempotent: once initialized,
    /// later calls (any count) are no-ops, and concurrent callers block on
    /// the pool mutex until the first one finishes.
    pub fn initialize(&self, count: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.initialized {
            return;
        }
        let count = count.max(1);
        for index in 0..count {
            let (sender, receiver) = unbounded();
            let factory = Arc::clone(&self.factory);
            let handle = thread::Builder::new()
                .name(format!("vecta-worker-{index}"))
                .spawn(move || run_context(index, receiver, factory))
                .expect("failed to spawn worker thread");
            state.handles.push(WorkerHandle { sender });
            state.threads.push(handle);
        }
        state.initialized = true;
        debug!("worker pool initialized: {count} contexts");
    }

    /// Next context by round-robin cursor, wrapping modulo pool size; the
    /// first call returns index 0. An empty pool is initialized first.
    pub fn get_worker(&self) -> WorkerHandle {
        self.initialize(self.default_count);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let index = state.cursor;
        state.cursor = (state.cursor + 1) % state.handles.len();
        state.handles[index].clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handles
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let (threads, handles) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            (
                std::mem::take(&mut state.threads),
                std::mem::take(&mut state.handles),
            )
        };
        // Disconnect the pool's own senders so idle contexts wind down.
        drop(handles);

        let deadline = Instant::now() + Duration::from_millis(500);
        for handle in threads {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("worker shutdown timeout reached, detaching");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("all workers stopped");
    }
}

/// A parked observability value waiting for its `Init`.
struct PendingObservability {
    observable: bool,
    deadline: Instant,
}

fn run_context(index: usize, receiver: Receiver<ControlMessage>, factory: Arc<dyn BackendFactory>) {
    trace!("worker {index} started");
    let mut engines: HashMap<Uuid, PlaybackEngine> = HashMap::new();
    let mut pending: HashMap<Uuid, PendingObservability> = HashMap::new();

    'context: loop {
        loop {
            match receiver.try_recv() {
                Ok(message) => dispatch(message, &mut engines, &mut pending, &factory),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'context,
            }
        }

        let now = Instant::now();
        for engine in engines.values_mut() {
            engine.tick(now);
        }
        pending.retain(|id, entry| {
            if now >= entry.deadline {
                error!("worker {index}: observability for unknown instance {id} timed out");
                false
            } else {
                true
            }
        });

        match receiver.recv_timeout(TICK_INTERVAL) {
            Ok(message) => dispatch(message, &mut engines, &mut pending, &factory),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    trace!(
        "worker {index} stopped ({} instances dropped)",
        engines.len()
    );
}

fn dispatch(
    message: ControlMessage,
    engines: &mut HashMap<Uuid, PlaybackEngine>,
    pending: &mut HashMap<Uuid, PendingObservability>,
    factory: &Arc<dyn BackendFactory>,
) {
    match message {
        ControlMessage::Init(payload) => {
            let id = payload.id;
            let mut engine = PlaybackEngine::new(*payload, factory.as_ref());
            if let Some(entry) = pending.remove(&id) {
                engine.set_observable(entry.observable);
            }
            engines.insert(id, engine);
        }
        ControlMessage::State { id, action } => match action {
            StateAction::Demolish => match engines.remove(&id) {
                Some(mut engine) => engine.destroy(),
                None => trace!("dropping demolish for unknown instance {id}"),
            },
            action => {
                let Some(engine) = engines.get_mut(&id) else {
                    trace!("dropping {action:?} for unknown instance {id}");
                    return;
                };
                match action {
                    StateAction::Play => engine.play(),
                    StateAction::Pause => engine.pause(),
                    StateAction::Stop => engine.stop(),
                    StateAction::Destroy => engine.destroy(),
                    StateAction::Demolish => {}
                }
            }
        },
        ControlMessage::Tweak { id, tweak } => {
            let Some(engine) = engines.get_mut(&id) else {
                trace!("dropping {tweak:?} for unknown instance {id}");
                return;
            };
            match tweak {
                Tweak::Seek(frame) => engine.seek(frame),
                Tweak::PlayAt(frame) => engine.play_at(frame),
                Tweak::Looping(value) => engine.set_looping(value),
                Tweak::Direction(value) => engine.set_direction(value),
                Tweak::Speed(value) => engine.set_speed(value),
            }
        }
        ControlMessage::Resize { id, width, height } => {
            let Some(engine) = engines.get_mut(&id) else {
                trace!("dropping resize for unknown instance {id}");
                return;
            };
            engine.resize(width, height);
        }
        ControlMessage::Observability { id, observable } => {
            if let Some(engine) = engines.get_mut(&id) {
                engine.set_observable(observable);
            } else {
                // Replaceable, not queued: only the latest value matters.
                pending.insert(
                    id,
                    PendingObservability {
                        observable,
                        deadline: Instant::now() + PENDING_OBSERVABILITY_WAIT,
                    },
                );
            }
        }
    }
}
