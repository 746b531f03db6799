//! Shared visibility tracker.
//!
//! One tracker per runtime observes every surface by instance id. The
//! embedding layer reports intersection batches through `update`; the
//! tracker coalesces consecutive duplicates and forwards only changes to
//! the owning worker as `Observability` messages. Engines never see this
//! registry - visibility reaches them purely through the protocol.

use crossbeam_channel::Sender;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::core::protocol::ControlMessage;

struct Watched {
    worker: Sender<ControlMessage>,
    last: Option<bool>,
}

#[derive(Clone, Default)]
pub struct VisibilityTracker {
    inner: Arc<Mutex<HashMap<Uuid, Watched>>>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn observe(&self, id: Uuid, worker: Sender<ControlMessage>) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Watched { worker, last: None });
        trace!("observing surface {id}");
    }

    pub(crate) fn unobserve(&self, id: Uuid) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        trace!("unobserving surface {id}");
    }

    /// Apply a batch of intersection changes. Entries for unknown ids are
    /// ignored; repeated states coalesce so a worker only ever sees the
    /// latest meaningful value.
    pub fn update<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (Uuid, bool)>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for (id, observable) in entries {
            let Some(watched) = inner.get_mut(&id) else {
                continue;
            };
            if watched.last == Some(observable) {
                continue;
            }
            watched.last = Some(observable);
            let _ = watched
                .worker
                .send(ControlMessage::Observability { id, observable });
        }
    }

    /// Last state forwarded for an instance, if any change arrived yet.
    pub fn last_observability(&self, id: Uuid) -> Option<bool> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .and_then(|watched| watched.last)
    }

    pub fn watched_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
