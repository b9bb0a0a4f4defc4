//! Mapping from event kind to at most one registered handler.
//!
//! Presence is mirrored in an atomic bitmask so the hot path can answer
//! "is anything registered for this kind?" without taking a lock. Writes
//! happen either from inside the scripting runtime (which already holds the
//! access token) or through [`crate::EventBridge::with_runtime`].

use crate::kind::EventKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

pub struct HandlerRegistry<H> {
    handlers: RwLock<HashMap<EventKind, H>>,
    present: AtomicU32,
}

impl<H> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            present: AtomicU32::new(0),
        }
    }
}

impl<H: Clone> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last registration wins; the previous handler is returned.
    pub fn register(&self, kind: EventKind, handler: H) -> Option<H> {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let previous = handlers.insert(kind, handler);
        self.present.fetch_or(kind.bit(), Ordering::Release);
        previous
    }

    pub fn unregister(&self, kind: EventKind) -> Option<H> {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        self.present.fetch_and(!kind.bit(), Ordering::Release);
        handlers.remove(&kind)
    }

    /// Lock-free presence check.
    #[inline]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.present.load(Ordering::Acquire) & kind.bit() != 0
    }

    /// Clones the handler out so no registry lock is held while it runs.
    pub fn get(&self, kind: EventKind) -> Option<H> {
        if !self.contains(kind) {
            return None;
        }
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
    }

    pub fn clear(&self) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        self.present.store(0, Ordering::Release);
        handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.present.load(Ordering::Acquire).count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn registered_kinds(&self) -> Vec<EventKind> {
        EventKind::ALL.into_iter().filter(|k| self.contains(*k)).collect()
    }
}
