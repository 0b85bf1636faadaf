//! A store wrapper that injects deterministic faults.
//!
//! [Faulty] forwards every access to the wrapped store until a configured
//! operation count is reached, after which that kind of access fails
//! unconditionally. Deterministic failure points let tests pin down exactly
//! which media access an algorithm was performing when the medium gave out.

use super::{Error, Store};
use bytes::Bytes;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// A [Store] that starts failing after a configured number of operations.
#[derive(Clone, Debug)]
pub struct Faulty<S> {
    inner: S,
    fail_read_after: Option<u64>,
    fail_write_after: Option<u64>,
    reads: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl<S> Faulty<S> {
    /// Wrap `inner` with no faults configured.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_read_after: None,
            fail_write_after: None,
            reads: Arc::new(AtomicU64::new(0)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Let `n` reads succeed, then fail every subsequent read.
    pub fn fail_read_after(mut self, n: u64) -> Self {
        self.fail_read_after = Some(n);
        self
    }

    /// Let `n` writes succeed, then fail every subsequent write.
    pub fn fail_write_after(mut self, n: u64) -> Self {
        self.fail_write_after = Some(n);
        self
    }

    fn trip(counter: &AtomicU64, limit: Option<u64>) -> bool {
        let seen = counter.fetch_add(1, Ordering::Relaxed);
        limit.is_some_and(|limit| seen >= limit)
    }
}

impl<S: Store> Store for Faulty<S> {
    async fn read_at(&self, address: u32, len: u32) -> Result<Bytes, Error> {
        if Self::trip(&self.reads, self.fail_read_after) {
            return Err(Error::ReadFailed);
        }
        self.inner.read_at(address, len).await
    }

    async fn write_at(&self, address: u32, buf: Bytes) -> Result<(), Error> {
        if Self::trip(&self.writes, self.fail_write_after) {
            return Err(Error::WriteFailed);
        }
        self.inner.write_at(address, buf).await
    }
}
