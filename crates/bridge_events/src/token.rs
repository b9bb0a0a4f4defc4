//! The Interpreter Access Token.
//!
//! Only one native thread may run scripting-layer code at a time. The token
//! is a mutex around the runtime itself, so holding a [`AccessToken`] is the
//! only way to reach it. Acquisitions and releases are counted; releases are
//! recorded by the guard's `Drop`, which runs on every exit path.

use crate::error::EventError;
use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

thread_local! {
    static HELD_BY_THIS_THREAD: Cell<bool> = const { Cell::new(false) };
}

pub struct InterpreterLock<R> {
    runtime: Mutex<R>,
    acquisitions: AtomicU64,
    releases: AtomicU64,
}

impl<R> InterpreterLock<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime: Mutex::new(runtime),
            acquisitions: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// Blocks until the runtime is free.
    ///
    /// Fails with [`EventError::Reentrant`] when this thread already holds
    /// the token, e.g. a handler whose side effect raised another event.
    /// A lock poisoned by a panicking handler is recovered.
    pub fn acquire(&self) -> Result<AccessToken<'_, R>, EventError> {
        if HELD_BY_THIS_THREAD.with(Cell::get) {
            return Err(EventError::Reentrant);
        }
        let guard = self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        HELD_BY_THIS_THREAD.with(|held| held.set(true));
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken {
            guard,
            releases: &self.releases,
        })
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }
}

pub struct AccessToken<'a, R> {
    guard: MutexGuard<'a, R>,
    releases: &'a AtomicU64,
}

impl<R> Deref for AccessToken<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.guard
    }
}

impl<R> DerefMut for AccessToken<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.guard
    }
}

impl<R> Drop for AccessToken<'_, R> {
    fn drop(&mut self) {
        HELD_BY_THIS_THREAD.with(|held| held.set(false));
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquire_and_release_are_paired() {
        let lock = InterpreterLock::new(0u32);
        for _ in 0..5 {
            let mut token = lock.acquire().unwrap();
            *token += 1;
        }
        assert_eq!(lock.acquisitions(), 5);
        assert_eq!(lock.releases(), 5);
        assert_eq!(*lock.acquire().unwrap(), 5);
    }

    #[test]
    fn nested_acquire_on_one_thread_is_refused() {
        let lock = InterpreterLock::new(());
        let _outer = lock.acquire().unwrap();
        assert!(matches!(lock.acquire(), Err(EventError::Reentrant)));
        assert_eq!(lock.acquisitions(), 1);
    }

    #[test]
    fn release_happens_when_holder_panics() {
        let lock = Arc::new(InterpreterLock::new(()));
        let inner = Arc::clone(&lock);
        let joined = std::thread::spawn(move || {
            let _token = inner.acquire().unwrap();
            panic!("handler failure");
        })
        .join();

        assert!(joined.is_err());
        assert_eq!(lock.releases(), 1);
        assert!(lock.acquire().is_ok());
    }

    #[test]
    fn other_threads_wait_their_turn() {
        let lock = Arc::new(InterpreterLock::new(Vec::new()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let lock = Arc::clone(&lock);
                std::thread::spawn(move || lock.acquire().unwrap().push(i))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.acquire().unwrap().len(), 4);
        // The token taken for the length check is released with its statement.
        assert_eq!(lock.acquisitions(), 5);
        assert_eq!(lock.acquisitions(), lock.releases());
    }
}
