//! The "informationally queryable" client window.
//!
//! While a connect or disconnect handler runs, the acting client is in an
//! engine state that would normally hide its info. The window marks that one
//! client id as queryable for exactly the duration of the handler call.

use std::sync::atomic::{AtomicI32, Ordering};

const CLOSED: i32 = -1;

#[derive(Debug)]
pub struct QueryableClient(AtomicI32);

impl Default for QueryableClient {
    fn default() -> Self {
        Self(AtomicI32::new(CLOSED))
    }
}

impl QueryableClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<i32> {
        match self.0.load(Ordering::Acquire) {
            CLOSED => None,
            id => Some(id),
        }
    }

    pub fn is_queryable(&self, client_id: i32) -> bool {
        client_id >= 0 && self.current() == Some(client_id)
    }

    /// Opens the window; it closes when the returned guard drops, on every
    /// exit path including unwinding.
    pub fn open(&self, client_id: i32) -> QueryWindow<'_> {
        self.0.store(client_id, Ordering::Release);
        QueryWindow(&self.0)
    }
}

#[must_use = "the window closes as soon as the guard is dropped"]
pub struct QueryWindow<'a>(&'a AtomicI32);

impl Drop for QueryWindow<'_> {
    fn drop(&mut self) {
        self.0.store(CLOSED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_scoped() {
        let q = QueryableClient::new();
        assert_eq!(q.current(), None);
        {
            let _w = q.open(3);
            assert!(q.is_queryable(3));
            assert!(!q.is_queryable(4));
        }
        assert_eq!(q.current(), None);
    }

    #[test]
    fn window_closes_on_unwind() {
        let q = QueryableClient::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _w = q.open(5);
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert_eq!(q.current(), None);
    }
}
