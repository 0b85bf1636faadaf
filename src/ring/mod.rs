//! A circular, wear-leveled "latest-value" store over a [crate::store::Store].
//!
//! A partition of the backing medium is divided into fixed-size slots, each
//! holding a monotonically increasing version header and an opaque payload.
//! Writes advance around the ring one slot at a time, spreading wear evenly,
//! and the record with the largest version is the **head**, the value a
//! caller usually wants. Older generations remain readable in decreasing
//! recency until the ring wraps over them.
//!
//! # Format
//!
//! Slots are laid out back to back from the partition base; the residual
//! `byte_length % stride` bytes at the end are unused:
//!
//! ```text
//! +---------------+--------------------+---------------+--------------------+--
//! | version (u32) | payload            | version (u32) | payload            | ...
//! +---------------+--------------------+---------------+--------------------+--
//! |    4 bytes    | stride - 4 bytes   |    4 bytes    | stride - 4 bytes   |
//! +---------------+--------------------+---------------+--------------------+--
//! ```
//!
//! A slot whose header reads `0xFFFF_FFFF` is **erased**, the natural
//! all-ones state of EEPROM after [Ring::format]. The payload region is
//! stored verbatim; a payload shorter than `stride - 4` leaves the trailing
//! bytes at whatever the medium held before.
//!
//! # Recovery
//!
//! No head location is persisted anywhere. [Ring::init] rediscovers it from
//! the headers alone, either with a full linear scan or (by default) a
//! binary search that exploits the two sorted runs a wrapped ring forms,
//! finishing in O(log slot_count) header reads. Recovery tolerates
//! arbitrary wrap points, interrupted writes, and arbitrary prior contents;
//! a write torn by power loss costs at most that one generation.
//!
//! # Example
//!
//! ```rust
//! use wearlog::ring::{Config, Ring};
//! use wearlog::store::memory::Memory;
//!
//! futures::executor::block_on(async {
//!     let store = Memory::new(1024);
//!     let cfg = Config::new(1024);
//!
//!     // Erase the partition once, then open it.
//!     Ring::format(&store, &cfg).await.unwrap();
//!     let mut ring = Ring::init(store, cfg).await.unwrap();
//!
//!     ring.write(b"generation 0").await.unwrap();
//!     ring.write(b"generation 1").await.unwrap();
//!
//!     // The head is the most recent record.
//!     let latest = ring.read().await.unwrap().unwrap();
//!     assert_eq!(&latest[..12], b"generation 1");
//! });
//! ```

mod storage;
pub use storage::Ring;

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Size of the version header at the start of every slot.
pub const HEADER_SIZE: usize = 4;

/// The value of a single erased byte, the natural state of EEPROM.
pub const ERASED_BYTE: u8 = 0xFF;

/// Header value marking an erased slot.
pub const ERASED_VERSION: u32 = u32::MAX;

/// Smallest usable slot size: a header plus one payload byte.
pub const MIN_STRIDE: u32 = HEADER_SIZE as u32 + 1;

/// Default slot size.
pub const DEFAULT_STRIDE: u32 = 32;

/// Errors that can occur when interacting with a [Ring].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] crate::store::Error),
    #[error("invalid payload length: {0}")]
    InvalidPayload(usize),
    #[error("invalid stride: {0}")]
    InvalidStride(u32),
    #[error("invalid layout: {byte_length} bytes cannot hold a {stride} byte slot")]
    InvalidLayout { byte_length: u32, stride: u32 },
    #[error("version mismatch (expected {expected}, found {found})")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Layout of a [Ring] partition.
#[derive(Clone, Debug)]
pub struct Config {
    /// Absolute address of the first byte of the partition.
    pub base: u32,

    /// Size of the partition in bytes.
    pub byte_length: u32,

    /// Slot size in bytes, header included. Must be at least [MIN_STRIDE].
    pub stride: u32,

    /// Store the version header in little-endian byte order.
    pub little_endian: bool,

    /// Recover the head with a full linear scan instead of binary search.
    pub full_scan: bool,
}

impl Config {
    /// A layout of `byte_length` bytes at address 0 with default slot size,
    /// big-endian headers, and binary-search recovery.
    pub fn new(byte_length: u32) -> Self {
        Self {
            base: 0,
            byte_length,
            stride: DEFAULT_STRIDE,
            little_endian: false,
            full_scan: false,
        }
    }

    /// Number of slots the partition holds.
    pub fn slot_count(&self) -> u32 {
        self.byte_length.checked_div(self.stride).unwrap_or(0)
    }

    /// Largest payload a slot can hold.
    pub fn payload_capacity(&self) -> u32 {
        self.stride.saturating_sub(HEADER_SIZE as u32)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.stride < MIN_STRIDE {
            return Err(Error::InvalidStride(self.stride));
        }
        if self.base.checked_add(self.byte_length).is_none() {
            return Err(Error::Store(crate::store::Error::AddressOverflow));
        }
        if self.slot_count() == 0 {
            return Err(Error::InvalidLayout {
                byte_length: self.byte_length,
                stride: self.stride,
            });
        }
        Ok(())
    }

    /// Byte offset of `slot` relative to the partition base.
    pub(crate) fn slot_offset(&self, slot: u32) -> u32 {
        slot * self.stride
    }

    pub(crate) fn put_version<B: BufMut>(&self, buf: &mut B, version: u32) {
        if self.little_endian {
            buf.put_u32_le(version);
        } else {
            buf.put_u32(version);
        }
    }

    pub(crate) fn get_version<B: Buf>(&self, buf: &mut B) -> u32 {
        if self.little_endian {
            buf.get_u32_le()
        } else {
            buf.get_u32()
        }
    }
}
