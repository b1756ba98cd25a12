//! Lock-free shared transposition table for the threat-space search.
//!
//! Fixed-capacity, power-of-two sized, indexed by the low bits of the
//! Zobrist key. Each bucket holds four entries. An entry is two
//! `AtomicU64` words: the packed payload and `key XOR payload`, so a torn
//! write by a concurrent thread is detected on probe and the full 64-bit
//! key is validated at the same time. All atomic accesses are `Relaxed`.
//!
//! ## Payload layout
//!
//! ```text
//! bits  0..16  move (16-bit packed)
//! bits 16..32  score (i16)
//! bits 32..36  bound
//! bits 36..44  depth
//! bit  44      must-defend flag
//! bit  45      has-initiative flag
//! bits 46..56  generation counter
//! bits 56..64  key high bits (redundant with the XOR check)
//! ```
//!
//! The table never validates move legality; a caller receiving a stale
//! entry must reject an illegal hash move itself.

use std::sync::atomic::{AtomicU64, Ordering};

use sente_core::{Move, Score};

/// Bound type of a stored score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    /// Empty entry.
    None = 0,
    /// Exact score.
    Exact = 1,
    /// Lower bound (fail high).
    Lower = 2,
    /// Upper bound (fail low).
    Upper = 3,
}

impl Bound {
    const fn from_bits(bits: u64) -> Bound {
        match bits & 0x0F {
            1 => Bound::Exact,
            2 => Bound::Lower,
            3 => Bound::Upper,
            _ => Bound::None,
        }
    }
}

/// Decoded table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtEntry {
    pub mv: Move,
    pub score: Score,
    pub bound: Bound,
    pub depth: u8,
    pub must_defend: bool,
    pub has_initiative: bool,
}

impl TtEntry {
    pub fn new(
        mv: Move,
        score: Score,
        bound: Bound,
        depth: u8,
        must_defend: bool,
        has_initiative: bool,
    ) -> TtEntry {
        TtEntry { mv, score, bound, depth, must_defend, has_initiative }
    }
}

/// Entries per bucket.
const BUCKET_SIZE: usize = 4;

/// Generation counter mask (10 bits).
const GENERATION_MASK: u64 = 0x3FF;

struct AtomicSlot {
    payload: AtomicU64,
    check: AtomicU64,
}

impl AtomicSlot {
    const fn new() -> AtomicSlot {
        AtomicSlot { payload: AtomicU64::new(0), check: AtomicU64::new(0) }
    }
}

fn pack(key: u64, entry: &TtEntry, generation: u64) -> u64 {
    (entry.mv.raw() as u64)
        | (((entry.score.to_i16() as u16) as u64) << 16)
        | ((entry.bound as u64) << 32)
        | ((entry.depth as u64) << 36)
        | ((entry.must_defend as u64) << 44)
        | ((entry.has_initiative as u64) << 45)
        | ((generation & GENERATION_MASK) << 46)
        | ((key >> 56) << 56)
}

fn unpack(payload: u64) -> (TtEntry, u64) {
    let entry = TtEntry {
        mv: Move::from_raw((payload & 0xFFFF) as u16),
        score: Score::from_i16(((payload >> 16) & 0xFFFF) as u16 as i16),
        bound: Bound::from_bits(payload >> 32),
        depth: ((payload >> 36) & 0xFF) as u8,
        must_defend: (payload >> 44) & 1 != 0,
        has_initiative: (payload >> 45) & 1 != 0,
    };
    let generation = (payload >> 46) & GENERATION_MASK;
    (entry, generation)
}

/// Shared transposition table keyed by 64-bit Zobrist hashes.
pub struct SharedHashTable {
    slots: Box<[AtomicSlot]>,
    bucket_mask: u64,
    generation: AtomicU64,
}

impl SharedHashTable {
    /// Create a table with at least `size` entries, rounded up to a
    /// power-of-two bucket count.
    pub fn new(size: usize) -> SharedHashTable {
        let buckets = (size / BUCKET_SIZE).next_power_of_two().max(1);
        let slots: Box<[AtomicSlot]> =
            (0..buckets * BUCKET_SIZE).map(|_| AtomicSlot::new()).collect();
        SharedHashTable { slots, bucket_mask: (buckets - 1) as u64, generation: AtomicU64::new(0) }
    }

    /// Number of entry slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reset every entry and the generation counter.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.payload.store(0, Ordering::Relaxed);
            slot.check.store(0, Ordering::Relaxed);
        }
        self.generation.store(0, Ordering::Relaxed);
    }

    /// Advance the generation counter. Call once per search.
    pub fn increase_generation(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Hint that the bucket for `key` will be probed soon.
    ///
    /// Portable no-op beyond touching the first slot of the bucket.
    #[inline]
    pub fn prefetch(&self, key: u64) {
        let index = (key & self.bucket_mask) as usize * BUCKET_SIZE;
        let _ = self.slots[index].payload.load(Ordering::Relaxed);
    }

    /// Look up an entry, verifying the full key and write integrity.
    pub fn seek(&self, key: u64) -> Option<TtEntry> {
        let base = (key & self.bucket_mask) as usize * BUCKET_SIZE;
        for slot in &self.slots[base..base + BUCKET_SIZE] {
            let payload = slot.payload.load(Ordering::Relaxed);
            let check = slot.check.load(Ordering::Relaxed);
            if payload == 0 && check == 0 {
                continue;
            }
            // torn-write and key validation in one comparison
            if payload ^ check != key {
                continue;
            }
            let (entry, _) = unpack(payload);
            if entry.bound != Bound::None {
                return Some(entry);
            }
        }
        None
    }

    /// Store an entry, replacing in order of preference: a slot holding
    /// the same key, then the shallowest entry, then the oldest
    /// generation.
    pub fn insert(&self, key: u64, entry: TtEntry) {
        let generation = self.generation.load(Ordering::Relaxed);
        let base = (key & self.bucket_mask) as usize * BUCKET_SIZE;

        let mut victim = base;
        let mut victim_rank = u64::MAX;
        for (i, slot) in self.slots[base..base + BUCKET_SIZE].iter().enumerate() {
            let payload = slot.payload.load(Ordering::Relaxed);
            let check = slot.check.load(Ordering::Relaxed);
            if payload == 0 && check == 0 {
                victim = base + i;
                break;
            }
            if payload ^ check == key {
                victim = base + i;
                break;
            }
            let (existing, existing_generation) = unpack(payload);
            // prefer shallower entries, then older generations
            let age = generation.wrapping_sub(existing_generation) & GENERATION_MASK;
            let rank = ((existing.depth as u64) << 10) | (GENERATION_MASK - age);
            if rank < victim_rank {
                victim_rank = rank;
                victim = base + i;
            }
        }

        let payload = pack(key, &entry, generation);
        let slot = &self.slots[victim];
        slot.payload.store(payload, Ordering::Relaxed);
        slot.check.store(payload ^ key, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for SharedHashTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHashTable")
            .field("capacity", &self.capacity())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::Sign;

    fn entry(depth: u8) -> TtEntry {
        TtEntry::new(
            Move::new(7, 9, Sign::Cross),
            Score::win_in(3),
            Bound::Exact,
            depth,
            false,
            true,
        )
    }

    #[test]
    fn insert_and_seek_roundtrip() {
        let table = SharedHashTable::new(1024);
        let key = 0xDEAD_BEEF_1234_5678u64;
        table.insert(key, entry(7));

        let found = table.seek(key).expect("entry should be found");
        assert_eq!(found.mv, Move::new(7, 9, Sign::Cross));
        assert_eq!(found.score, Score::win_in(3));
        assert_eq!(found.bound, Bound::Exact);
        assert_eq!(found.depth, 7);
        assert!(found.has_initiative);
        assert!(!found.must_defend);
    }

    #[test]
    fn seek_miss_returns_none() {
        let table = SharedHashTable::new(1024);
        assert!(table.seek(0x1234).is_none());
    }

    #[test]
    fn same_key_is_replaced_in_place() {
        let table = SharedHashTable::new(1024);
        let key = 0xAAAA_BBBB_CCCC_DDDDu64;
        table.insert(key, entry(3));
        table.insert(key, entry(9));
        assert_eq!(table.seek(key).unwrap().depth, 9);
    }

    #[test]
    fn colliding_keys_coexist_within_a_bucket() {
        let table = SharedHashTable::new(64);
        // same low bits, distinct high bits: all land in one bucket
        let keys: Vec<u64> = (1..=4u64).map(|i| 0x5 | (i << 32)).collect();
        for (i, &key) in keys.iter().enumerate() {
            table.insert(key, entry(i as u8 + 1));
        }
        for (i, &key) in keys.iter().enumerate() {
            let found = table.seek(key).expect("bucket should hold all four");
            assert_eq!(found.depth, i as u8 + 1);
        }
    }

    #[test]
    fn torn_write_is_rejected() {
        let table = SharedHashTable::new(1024);
        let key = 0xDEAD_BEEF_0BAD_F00Du64;
        table.insert(key, entry(5));
        assert!(table.seek(key).is_some());

        let index = (key & table.bucket_mask) as usize * BUCKET_SIZE;
        // find the written slot and corrupt its payload
        for slot in &table.slots[index..index + BUCKET_SIZE] {
            let payload = slot.payload.load(Ordering::Relaxed);
            if payload != 0 {
                slot.payload.store(payload ^ 0x00FF_0000, Ordering::Relaxed);
            }
        }
        assert!(table.seek(key).is_none(), "corrupted entry must not be returned");
    }

    #[test]
    fn flags_roundtrip() {
        let table = SharedHashTable::new(1024);
        let key = 0x1111_2222_3333_4444u64;
        table.insert(
            key,
            TtEntry::new(Move::new(0, 0, Sign::Circle), Score::loss_in(4), Bound::Upper, 12, true, false),
        );
        let found = table.seek(key).unwrap();
        assert!(found.must_defend);
        assert!(!found.has_initiative);
        assert_eq!(found.bound, Bound::Upper);
        assert_eq!(found.score, Score::loss_in(4));
    }

    #[test]
    fn concurrent_stress_no_panics() {
        use std::thread;

        let table = std::sync::Arc::new(SharedHashTable::new(4096));
        thread::scope(|s| {
            for t in 0..8u64 {
                let table = std::sync::Arc::clone(&table);
                s.spawn(move || {
                    for i in 0u64..10_000 {
                        let key = (t.wrapping_mul(6364136223846793005))
                            .wrapping_add(i.wrapping_mul(2862933555777941757));
                        table.insert(key, entry((i & 0x3F) as u8));
                        if let Some(found) = table.seek(key) {
                            // a hit must decode to an internally consistent entry
                            assert!(found.bound != Bound::None);
                        }
                    }
                });
            }
        });
    }
}
