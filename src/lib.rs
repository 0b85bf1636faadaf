//! Turn byte-addressable non-volatile memory into a circular, wear-leveled
//! "latest-value" store.
//!
//! EEPROM and FRAM parts endure a limited number of write cycles per cell.
//! Rewriting one record in place burns through a single spot on the die
//! while the rest of the part sits idle. [ring::Ring] spreads those writes
//! across a log-structured ring of fixed-size slots instead: each write
//! takes the next slot with the next version number, and the most recent
//! record is rediscovered after a power cycle by scanning the version
//! headers. No head pointer is ever persisted.
//!
//! The medium itself stays behind the narrow [store::Store] capability
//! (positioned read, positioned write), so the same core runs against an
//! I²C EEPROM driver, a memory-mapped FRAM, or the in-memory image shipped
//! for tests.
//!
//! # Example
//!
//! ```rust
//! use wearlog::ring::{Config, Ring};
//! use wearlog::store::memory::Memory;
//!
//! futures::executor::block_on(async {
//!     let store = Memory::new(256);
//!     let cfg = Config {
//!         stride: 16,
//!         ..Config::new(256)
//!     };
//!
//!     Ring::format(&store, &cfg).await.unwrap();
//!     let mut ring = Ring::init(store, cfg).await.unwrap();
//!     ring.write(b"calibration").await.unwrap();
//!
//!     let latest = ring.read().await.unwrap().unwrap();
//!     assert_eq!(&latest[..11], b"calibration");
//! });
//! ```

pub mod ring;
pub mod store;
