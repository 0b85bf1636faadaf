use super::{Config, Error, ERASED_BYTE, ERASED_VERSION, HEADER_SIZE};
use crate::store::Store;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use tracing::{debug, trace, warn};

/// Head state recovered from the media.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Head {
    version: u32,
    offset: u32,
    empty: bool,
}

impl Head {
    const EMPTY: Self = Self {
        version: 0,
        offset: 0,
        empty: true,
    };
}

/// Read one version header at `offset` within the partition.
async fn read_version<S: Store>(store: &S, cfg: &Config, offset: u32) -> Result<u32, Error> {
    let mut header = store
        .read_at(cfg.base + offset, HEADER_SIZE as u32)
        .await?;
    assert_eq!(header.len(), HEADER_SIZE);
    Ok(cfg.get_version(&mut header))
}

/// Read one full slot at `offset` within the partition, returning its
/// version and a view of the payload region.
async fn read_slot<S: Store>(
    store: &S,
    cfg: &Config,
    offset: u32,
) -> Result<(u32, Bytes), Error> {
    let mut block = store.read_at(cfg.base + offset, cfg.stride).await?;
    assert_eq!(block.len(), cfg.stride as usize);
    let version = cfg.get_version(&mut block);
    Ok((version, block))
}

/// Recover the head by reading every slot header in physical order.
///
/// Slots fill from slot 0 in increasing physical order until the first wrap,
/// so the scan stops at the first erased slot: everything beyond it is
/// either erased as well (pre-wrap media) or unreachable corruption, and
/// both are treated the same way.
async fn find_head_linear<S: Store>(store: &S, cfg: &Config) -> Result<Head, Error> {
    let mut best: Option<(u32, u32)> = None;
    for slot in 0..cfg.slot_count() {
        let offset = cfg.slot_offset(slot);
        let version = read_version(store, cfg, offset).await?;
        if version == ERASED_VERSION {
            break;
        }
        if best.is_none_or(|(max, _)| version > max) {
            best = Some((version, offset));
        }
    }
    Ok(match best {
        Some((version, offset)) => Head {
            version,
            offset,
            empty: false,
        },
        None => Head::EMPTY,
    })
}

/// Recover the head in O(log slot_count) header reads.
///
/// Until the first wrap, versions increase in physical order. Afterward they
/// increase on two contiguous runs split at the head, and every version in
/// the newer run `[0..head]` is strictly greater than every version in the
/// older run `[head+1..]`. The search keeps the invariant that the head lies
/// in `[lo, hi]` and that `lo_version` is the version stored at `lo`.
async fn find_head_binary<S: Store>(store: &S, cfg: &Config) -> Result<Head, Error> {
    let mut lo_version = read_version(store, cfg, 0).await?;
    if lo_version == ERASED_VERSION {
        return Ok(Head::EMPTY);
    }
    let mut lo = 0u32;
    let mut hi = cfg.slot_count() - 1;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let mid_version = read_version(store, cfg, cfg.slot_offset(mid)).await?;
        if mid_version == ERASED_VERSION || mid_version < lo_version {
            // Rule out `[mid, hi]`: the slot at `mid` is past the head.
            // Cannot fire at `mid == lo`, so `mid - 1` never underflows.
            hi = mid - 1;
            continue;
        }
        let next_version = read_version(store, cfg, cfg.slot_offset(mid + 1)).await?;
        if next_version == ERASED_VERSION || mid_version > next_version {
            return Ok(Head {
                version: mid_version,
                offset: cfg.slot_offset(mid),
                empty: false,
            });
        }
        lo = mid + 1;
        lo_version = next_version;
    }
    Ok(Head {
        version: lo_version,
        offset: cfg.slot_offset(lo),
        empty: false,
    })
}

/// A circular, wear-leveled latest-value store over one partition of a
/// [Store].
///
/// `Ring` is the caller-owned handle to an opened partition: the layout
/// parameters plus the location of the most recent record (the head),
/// recovered by [Ring::init] and advanced in place by each successful
/// [Ring::write]. Dropping the handle loses nothing; a later `init`
/// rediscovers the same head from the media.
///
/// A single `Ring` must be the only writer of its partition. Handles over
/// disjoint partitions are independent.
#[derive(Debug)]
pub struct Ring<S: Store> {
    store: S,
    cfg: Config,
    slot_count: u32,
    empty: bool,
    version: u32,
    offset: u32,
}

impl<S: Store> Ring<S> {
    /// Erase the partition: every byte of `[base, base + byte_length)` is
    /// set to `0xFF` in a single store write.
    ///
    /// Produces no handle; follow with [Ring::init] to start writing. Fails
    /// if the store rejects the range.
    pub async fn format(store: &S, cfg: &Config) -> Result<(), Error> {
        cfg.validate()?;
        let blank = Bytes::from(vec![ERASED_BYTE; cfg.byte_length as usize]);
        store.write_at(cfg.base, blank).await?;
        debug!(
            base = cfg.base,
            byte_length = cfg.byte_length,
            "formatted partition"
        );
        Ok(())
    }

    /// Open the partition and recover the head.
    ///
    /// Recovery reads only slot headers: a full linear scan when
    /// `cfg.full_scan` is set, otherwise a binary search that needs
    /// O(log slot_count) reads. Both modes recover the same head on any
    /// media produced by `format` and `write`. On fully erased media the
    /// handle starts empty.
    pub async fn init(store: S, cfg: Config) -> Result<Self, Error> {
        cfg.validate()?;
        let head = if cfg.full_scan {
            find_head_linear(&store, &cfg).await?
        } else {
            find_head_binary(&store, &cfg).await?
        };
        debug!(
            empty = head.empty,
            version = head.version,
            offset = head.offset,
            full_scan = cfg.full_scan,
            "recovered head"
        );
        Ok(Self {
            slot_count: cfg.slot_count(),
            store,
            cfg,
            empty: head.empty,
            version: head.version,
            offset: head.offset,
        })
    }

    /// Return the payload of the most recent record, or `None` if nothing
    /// was ever written.
    ///
    /// The slot's header is re-read and compared against the handle; a
    /// mismatch means the handle is stale or the media changed underneath
    /// it and surfaces as [Error::VersionMismatch].
    pub async fn read(&self) -> Result<Option<Bytes>, Error> {
        if self.empty {
            return Ok(None);
        }
        let (version, payload) = read_slot(&self.store, &self.cfg, self.offset).await?;
        if version != self.version {
            warn!(
                expected = self.version,
                found = version,
                offset = self.offset,
                "head version mismatch"
            );
            return Err(Error::VersionMismatch {
                expected: self.version,
                found: version,
            });
        }
        Ok(Some(payload))
    }

    /// Commit `payload` as a new record and advance the handle to it.
    ///
    /// The first write of a formatted partition occupies slot 0 with
    /// version 0; every later write takes the next slot (wrapping to the
    /// base past the end of the partition) with the next version, so the
    /// head version always equals the number of writes minus one. The
    /// header and payload go to the store in a single write call.
    ///
    /// On failure the handle is unchanged and the media may hold a torn
    /// slot, which the next recovery treats as just another header value.
    /// Version overflow after 2³² − 1 writes wraps silently; reformat
    /// before that point.
    pub async fn write(&mut self, payload: &[u8]) -> Result<(), Error> {
        if payload.is_empty() || payload.len() > self.cfg.payload_capacity() as usize {
            return Err(Error::InvalidPayload(payload.len()));
        }
        let (next_offset, next_version) = if self.empty {
            (self.offset, self.version)
        } else {
            // Advance one slot, wrapping past the last one. The residual
            // bytes after the last full slot are never written.
            let slot = self.offset / self.cfg.stride;
            let wrap = slot + 1 == self.slot_count;
            let next_slot = if wrap { 0 } else { slot + 1 };
            (
                self.cfg.slot_offset(next_slot),
                self.version.wrapping_add(1),
            )
        };

        let mut block = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        self.cfg.put_version(&mut block, next_version);
        block.extend_from_slice(payload);
        self.store
            .write_at(self.cfg.base + next_offset, block.freeze())
            .await?;
        trace!(version = next_version, offset = next_offset, "wrote slot");

        self.offset = next_offset;
        self.version = next_version;
        self.empty = false;
        Ok(())
    }

    /// Enumerate records from newest to oldest.
    ///
    /// Walks backward from the head, wrapping at the base, and stops at the
    /// first erased slot or after one full revolution. Yields nothing on an
    /// empty handle. Slots are read lazily, one per item.
    pub fn list(&self) -> impl Stream<Item = Result<(u32, Bytes), Error>> + '_ {
        let start = if self.empty { None } else { Some(0u32) };
        stream::unfold(start, move |state| async move {
            let back = state?;
            if back == self.slot_count {
                return None;
            }
            let head_slot = self.offset / self.cfg.stride;
            let slot = (head_slot + self.slot_count - back) % self.slot_count;
            match read_slot(&self.store, &self.cfg, self.cfg.slot_offset(slot)).await {
                Err(err) => Some((Err(err), None)),
                Ok((ERASED_VERSION, _)) => None,
                Ok((version, payload)) => Some((Ok((version, payload)), Some(back + 1))),
            }
        })
    }

    /// Enumerate every slot in physical order, erased ones included.
    ///
    /// Needs only layout parameters, not a recovered head, which makes it
    /// usable for diagnostics and for probing media with speculative
    /// parameters. Erased slots carry version `0xFFFF_FFFF` and whatever
    /// the store holds as payload.
    pub fn list_slots<'a>(
        store: &'a S,
        cfg: &'a Config,
    ) -> impl Stream<Item = Result<(u32, Bytes), Error>> + 'a {
        stream::unfold(Some(0u32), move |state| async move {
            let slot = state?;
            if slot == 0 {
                if let Err(err) = cfg.validate() {
                    return Some((Err(err), None));
                }
            }
            if slot == cfg.slot_count() {
                return None;
            }
            match read_slot(store, cfg, cfg.slot_offset(slot)).await {
                Err(err) => Some((Err(err), None)),
                Ok((version, payload)) => Some((Ok((version, payload)), Some(slot + 1))),
            }
        })
    }

    /// True iff no record has ever been observed or written.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Version of the current head (0 on an empty handle).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Byte offset of the head relative to the partition base (0 on an
    /// empty handle).
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of slots in the partition.
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::Memory;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn cfg(byte_length: u32, stride: u32) -> Config {
        Config {
            stride,
            ..Config::new(byte_length)
        }
    }

    async fn write_n(ring: &mut Ring<Memory>, n: u32) {
        for i in 0..n {
            ring.write(&[i as u8]).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_binary_erased_ring() {
        let store = Memory::new(64);
        let head = find_head_binary(&store, &cfg(64, 8)).await.unwrap();
        assert_eq!(head, Head::EMPTY);
    }

    #[tokio::test]
    async fn test_binary_single_written_slot() {
        let store = Memory::new(64);
        let layout = cfg(64, 8);
        let mut ring = Ring::init(store.clone(), layout.clone()).await.unwrap();
        ring.write(&[1]).await.unwrap();

        let head = find_head_binary(&store, &layout).await.unwrap();
        assert_eq!(
            head,
            Head {
                version: 0,
                offset: 0,
                empty: false
            }
        );
    }

    #[tokio::test]
    async fn test_binary_partial_ring() {
        // 5 of 8 slots written: the ring has not wrapped yet.
        let store = Memory::new(64);
        let layout = cfg(64, 8);
        let mut ring = Ring::init(store.clone(), layout.clone()).await.unwrap();
        write_n(&mut ring, 5).await;

        let head = find_head_binary(&store, &layout).await.unwrap();
        assert_eq!(
            head,
            Head {
                version: 4,
                offset: 32,
                empty: false
            }
        );
    }

    #[tokio::test]
    async fn test_binary_wrapped_ring() {
        let store = Memory::new(64);
        let layout = cfg(64, 8);
        let mut ring = Ring::init(store.clone(), layout.clone()).await.unwrap();
        write_n(&mut ring, 13).await;

        let head = find_head_binary(&store, &layout).await.unwrap();
        assert_eq!(
            head,
            Head {
                version: 12,
                offset: 4 * 8,
                empty: false
            }
        );
        let linear = find_head_linear(&store, &layout).await.unwrap();
        assert_eq!(head, linear);
    }

    #[tokio::test]
    async fn test_linear_stops_at_first_erased() {
        let store = Memory::new(64);
        let layout = cfg(64, 8);
        let mut ring = Ring::init(store.clone(), layout.clone()).await.unwrap();
        write_n(&mut ring, 3).await;
        let reads_before = store.reads();

        let head = find_head_linear(&store, &layout).await.unwrap();
        assert_eq!(head.version, 2);

        // Three written headers plus the terminating erased one.
        assert_eq!(store.reads() - reads_before, 4);
    }

    #[tokio::test]
    async fn test_finder_equivalence_random() {
        // Any sequence of format-then-writes must recover identically in
        // both modes, and identically to the writer's own bookkeeping.
        let mut rng = StdRng::seed_from_u64(0xEE5);
        for _ in 0..100 {
            let stride = rng.gen_range(5..=24);
            let slots = rng.gen_range(1..=33);
            let byte_length = stride * slots + rng.gen_range(0..stride);
            let layout = cfg(byte_length, stride);
            let store = Memory::new(byte_length);
            Ring::format(&store, &layout).await.unwrap();

            let mut ring = Ring::init(store.clone(), layout.clone()).await.unwrap();
            let writes = rng.gen_range(0..3 * slots + 2);
            write_n(&mut ring, writes).await;

            let binary = Ring::init(store.clone(), layout.clone()).await.unwrap();
            let linear = Ring::init(
                store.clone(),
                Config {
                    full_scan: true,
                    ..layout.clone()
                },
            )
            .await
            .unwrap();
            for recovered in [&binary, &linear] {
                assert_eq!(recovered.is_empty(), ring.is_empty(), "writes={writes}");
                assert_eq!(recovered.version(), ring.version(), "writes={writes}");
                assert_eq!(recovered.offset(), ring.offset(), "writes={writes}");
            }
        }
    }

    #[tokio::test]
    async fn test_binary_read_complexity() {
        // 256 slots, fully wrapped.
        let layout = cfg(2048, 8);
        let store = Memory::new(2048);
        Ring::format(&store, &layout).await.unwrap();
        let mut ring = Ring::init(store.clone(), layout.clone()).await.unwrap();
        write_n(&mut ring, 300).await;

        let reads_before = store.reads();
        Ring::init(store.clone(), layout.clone()).await.unwrap();
        let binary_reads = store.reads() - reads_before;
        assert!(binary_reads <= 2 * 8 + 2, "binary used {binary_reads} reads");

        let reads_before = store.reads();
        Ring::init(
            store.clone(),
            Config {
                full_scan: true,
                ..layout
            },
        )
        .await
        .unwrap();
        let linear_reads = store.reads() - reads_before;
        assert_eq!(linear_reads, 256);
    }

    #[tokio::test]
    async fn test_torn_header_below_oldest_is_skipped() {
        // 12 writes over 8 slots: live versions 4..=11, head at slot 3.
        let layout = cfg(64, 8);
        let store = Memory::new(64);
        Ring::format(&store, &layout).await.unwrap();
        let mut ring = Ring::init(store.clone(), layout.clone()).await.unwrap();
        write_n(&mut ring, 12).await;
        assert_eq!(ring.version(), 11);
        assert_eq!(ring.offset(), 24);

        // An interrupted 13th write left slot 4 with a partially programmed
        // header that decodes below the oldest live version.
        store
            .write_at(4 * 8, Bytes::from_static(&[0, 0, 0, 2]))
            .await
            .unwrap();

        let binary = Ring::init(store.clone(), layout.clone()).await.unwrap();
        let linear = Ring::init(
            store.clone(),
            Config {
                full_scan: true,
                ..layout
            },
        )
        .await
        .unwrap();
        for recovered in [&binary, &linear] {
            assert_eq!(recovered.version(), 11);
            assert_eq!(recovered.offset(), 24);
        }
    }
}
