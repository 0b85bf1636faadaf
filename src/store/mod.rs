//! Read and write bytes at absolute addresses on a backing medium.
//!
//! [Store] is the narrow capability the ring requires of the medium it
//! persists to: a positioned read and a positioned write, both asynchronous
//! and fallible. Transport concerns (I²C/SPI transactions, page buffering,
//! write-cycle timing) belong to the implementation, not to callers.
//!
//! Two reference implementations are provided: [memory::Memory], an
//! in-memory EEPROM image, and [faulty::Faulty], a wrapper that injects
//! deterministic failures for crash and error-path testing.

pub mod faulty;
pub mod memory;

use bytes::Bytes;
use std::future::Future;
use thiserror::Error;

/// Errors that can occur when accessing a backing store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("out of range: address {address} + length {len} exceeds capacity {capacity}")]
    OutOfRange {
        address: u32,
        len: u32,
        capacity: u32,
    },
    #[error("address overflow")]
    AddressOverflow,
    #[error("read failed")]
    ReadFailed,
    #[error("write failed")]
    WriteFailed,
}

/// A byte-addressable backing medium, typically an EEPROM or FRAM driver.
///
/// The interface is address-oriented and partition-agnostic: bounds checking
/// is the implementation's responsibility and failures are surfaced to the
/// caller unchanged. On success `read_at` returns exactly `len` bytes;
/// whether they alias a shared buffer or were copied into an owned one is up
/// to the implementation ([Bytes] carries either).
pub trait Store: Clone + Send + Sync + 'static {
    /// Read exactly `len` bytes starting at `address`.
    fn read_at(&self, address: u32, len: u32) -> impl Future<Output = Result<Bytes, Error>> + Send;

    /// Write `buf` verbatim starting at `address`.
    fn write_at(&self, address: u32, buf: Bytes) -> impl Future<Output = Result<(), Error>> + Send;
}
