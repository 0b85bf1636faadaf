//! An in-memory EEPROM image.
//!
//! [Memory] emulates a freshly erased part: every byte of the image starts
//! at `0xFF` and stays addressable through cheap clones of the handle, which
//! all share the same image. Reads and writes are strictly bounds-checked
//! and counted, so tests can assert how many media accesses an operation
//! issued.

use super::{Error, Store};
use crate::ring::ERASED_BYTE;
use bytes::Bytes;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// In-memory [Store] implementation.
#[derive(Clone, Debug)]
pub struct Memory {
    image: Arc<Mutex<Vec<u8>>>,
    reads: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl Memory {
    /// Create an image of `capacity` bytes, all erased (`0xFF`).
    pub fn new(capacity: u32) -> Self {
        Self::with_content(vec![ERASED_BYTE; capacity as usize])
    }

    /// Create an image seeded with arbitrary prior contents.
    pub fn with_content(content: Vec<u8>) -> Self {
        Self {
            image: Arc::new(Mutex::new(content)),
            reads: Arc::new(AtomicU64::new(0)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Size of the image in bytes.
    pub fn capacity(&self) -> u32 {
        self.image.lock().unwrap().len() as u32
    }

    /// Number of successful reads issued so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful writes issued so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Snapshot the full image for byte-level assertions.
    pub fn image(&self) -> Vec<u8> {
        self.image.lock().unwrap().clone()
    }
}

impl Store for Memory {
    async fn read_at(&self, address: u32, len: u32) -> Result<Bytes, Error> {
        let end = address.checked_add(len).ok_or(Error::AddressOverflow)?;
        let image = self.image.lock().unwrap();
        if end as usize > image.len() {
            return Err(Error::OutOfRange {
                address,
                len,
                capacity: image.len() as u32,
            });
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(Bytes::copy_from_slice(&image[address as usize..end as usize]))
    }

    async fn write_at(&self, address: u32, buf: Bytes) -> Result<(), Error> {
        let len = buf.len() as u32;
        let end = address.checked_add(len).ok_or(Error::AddressOverflow)?;
        let mut image = self.image.lock().unwrap();
        if end as usize > image.len() {
            return Err(Error::OutOfRange {
                address,
                len,
                capacity: image.len() as u32,
            });
        }
        image[address as usize..end as usize].copy_from_slice(&buf);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
