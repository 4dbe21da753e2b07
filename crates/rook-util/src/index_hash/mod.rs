//! Index hash table.
//!
//! An open-addressed Robin Hood hash table that does not own its keys. Each
//! occupied slot stores only a 32-bit index into a key slice held by the
//! caller; hashing and equality always re-read `keys[idx]` from that slice.
//! The table itself is two flat arrays: the entry payloads and a metadata
//! strip with one byte per slot recording the probe distance (0 = empty,
//! n > 0 = occupied, n − 1 slots away from its ideal bucket).
//!
//! The allocation covers `official_size + max_probe_distance_limit` slots:
//! the tail lets an entry whose ideal bucket is the last official slot probe
//! forward without wrapping. The metadata strip carries one extra trailing
//! byte, permanently set to 1, which reads as "occupied, at its ideal
//! bucket" and therefore stops any probe that walks off the end without a
//! separate bounds test.
//!
//! Insertion is Robin Hood with the backward-shift refinement: rather than
//! swapping the displaced entry and continuing the insert with it, the whole
//! run of occupied slots is shifted forward one position, which preserves
//! the probe-distance ordering directly. Whenever a probe distance reaches
//! the current ceiling, `max_items` is zeroed so the *next* insert grows the
//! table first; the insert in progress always completes.

use std::marker::PhantomData;

use static_assertions::const_assert;

/// Architectural ceiling on probe distance. One metadata byte per slot
/// bounds distances to 255; distance 1 means the ideal bucket itself, so at
/// most 254 slots are ever probed beyond the official allocation.
pub const HASH_MAX_PROBE_DISTANCE: u32 = 255;

/// Smallest table: 2^3 = 8 official slots.
pub const INDEX_MIN_SIZE_BASE_2: u8 = 3;

const_assert!(HASH_MAX_PROBE_DISTANCE <= u8::MAX as u32);
// The minimum-size table must still admit at least one entry at load factor 3/4.
const_assert!((1u32 << INDEX_MIN_SIZE_BASE_2) * 3 / 4 >= 1);

/// A key usable with [`IndexHash`]: a precomputed 64-bit hash plus deep
/// equality. The hash must be stable while the key is in a table.
pub trait IndexKey {
    fn index_hash(&self) -> u64;
    fn index_key_equal(&self, other: &Self) -> bool;
}

/// Insert budget for a given official size: load factor 3/4, in integer
/// arithmetic.
fn max_items_for(official_size: u32) -> u32 {
    (official_size as u64 * 3 / 4) as u32
}

/// Smallest bucket count that keeps `entries` under load factor 3/4:
/// ceil(entries * 4 / 3).
fn min_buckets_for(entries: u32) -> u64 {
    (entries as u64 * 4 + 2) / 3
}

fn round_up_log_base2(v: u64) -> u8 {
    debug_assert!(v >= 1);
    (64 - (v - 1).leading_zeros()) as u8
}

/// Open-addressed Robin Hood hash table over externally owned keys.
///
/// A fresh table is *unbuilt* and holds no allocation; [`build`] must be
/// called before inserting. [`demolish`] returns it to the unbuilt state
/// (dropping the table does the same).
///
/// [`build`]: IndexHash::build
/// [`demolish`]: IndexHash::demolish
pub struct IndexHash<K> {
    /// One probe-distance byte per slot, plus the trailing sentinel.
    metadata: Box<[u8]>,
    /// Slot payloads: indices into the caller's key slice.
    entries: Box<[u32]>,
    official_size_log2: u8,
    /// Bits to shift a 64-bit hash right to obtain the ideal bucket
    /// (= 64 − `official_size_log2`).
    key_right_shift: u8,
    /// Current probe-distance ceiling.
    max_probe_distance: u8,
    /// Architectural probe-distance ceiling for this allocation.
    max_probe_distance_limit: u8,
    cur_items: u32,
    /// Insert budget; zeroed to force a grow before the next insert.
    max_items: u32,
    _keys: PhantomData<fn(&K) -> u64>,
}

impl<K: IndexKey> IndexHash<K> {
    /// Creates an unbuilt table.
    pub fn new() -> Self {
        IndexHash {
            metadata: Box::default(),
            entries: Box::default(),
            official_size_log2: 0,
            key_right_shift: 0,
            max_probe_distance: 0,
            max_probe_distance_limit: 0,
            cur_items: 0,
            max_items: 0,
            _keys: PhantomData,
        }
    }

    /// Allocates the table sized for `entries` expected inserts, with a
    /// floor of `2^INDEX_MIN_SIZE_BASE_2` slots.
    pub fn build(&mut self, entries: u32) {
        debug_assert!(!self.is_built());
        let initial_size_log2 = if entries == 0 {
            INDEX_MIN_SIZE_BASE_2
        } else {
            round_up_log_base2(min_buckets_for(entries)).max(INDEX_MIN_SIZE_BASE_2)
        };
        self.allocate(64 - initial_size_log2, initial_size_log2);
    }

    /// Frees the entire contents of the table, returning it to the unbuilt
    /// state.
    pub fn demolish(&mut self) {
        *self = IndexHash::new();
    }

    pub fn is_built(&self) -> bool {
        !self.metadata.is_empty()
    }

    pub fn cur_items(&self) -> u32 {
        self.cur_items
    }

    pub fn max_items(&self) -> u32 {
        self.max_items
    }

    pub fn official_size(&self) -> u32 {
        1 << self.official_size_log2
    }

    pub fn max_probe_distance(&self) -> u8 {
        self.max_probe_distance
    }

    pub fn allocated_items(&self) -> usize {
        self.official_size() as usize + self.max_probe_distance_limit as usize
    }

    fn allocate(&mut self, key_right_shift: u8, official_size_log2: u8) {
        if official_size_log2 >= 32 {
            crate::vm_oops!(
                "index hash: cannot allocate 2^{} official slots",
                official_size_log2
            );
        }
        let official_size = 1u32 << official_size_log2;
        let max_items = max_items_for(official_size);
        // Probe distance 1 is the ideal bucket itself, so the limit counts
        // slots beyond the official allocation and tops out one short of the
        // architectural ceiling.
        let limit = u32::min(HASH_MAX_PROBE_DISTANCE - 1, max_items - 1) as u8;
        let allocated_items = official_size as usize + limit as usize;

        let mut metadata = vec![0u8; allocated_items + 1];
        // The sentinel: reads as an occupied slot at its ideal position.
        metadata[allocated_items] = 1;

        self.metadata = metadata.into_boxed_slice();
        self.entries = vec![0u32; allocated_items].into_boxed_slice();
        self.official_size_log2 = official_size_log2;
        self.key_right_shift = key_right_shift;
        self.max_probe_distance = limit;
        self.max_probe_distance_limit = limit;
        self.cur_items = 0;
        self.max_items = max_items;
    }

    fn ideal_bucket(&self, hash: u64) -> usize {
        (hash >> self.key_right_shift) as usize
    }

    /// UNCONDITIONALLY inserts `idx` keyed by `keys[idx]`. Does not check
    /// whether the key is already present; inserting the same index twice is
    /// a contract violation and aborts the VM.
    pub fn insert_nocheck(&mut self, keys: &[K], idx: u32) {
        if !self.is_built() {
            crate::vm_oops!("index hash: insert into a table that was never built");
        }
        if self.cur_items >= self.max_items {
            self.grow(keys);
        }
        self.insert_internal(keys, idx);
    }

    /// Looks up a key, returning the index stored for it.
    pub fn fetch(&self, keys: &[K], want: &K) -> Option<u32> {
        if !self.is_built() {
            return None;
        }
        let mut slot = self.ideal_bucket(want.index_hash());
        let mut probe_distance: u8 = 1;
        loop {
            let meta = self.metadata[slot];
            if meta == probe_distance {
                let idx = self.entries[slot];
                if keys[idx as usize].index_key_equal(want) {
                    return Some(idx);
                }
            } else if meta < probe_distance {
                // Every entry this far from its ideal bucket would have
                // displaced the shorter-travelled occupant; the key is
                // absent. The sentinel byte lands here too.
                return None;
            }
            probe_distance += 1;
            slot += 1;
        }
    }

    fn grow(&mut self, keys: &[K]) {
        log::trace!(
            "index hash: growing {} -> {} official slots ({} live entries)",
            self.official_size(),
            self.official_size() * 2,
            self.cur_items
        );
        let mut grown = IndexHash::new();
        grown.allocate(self.key_right_shift - 1, self.official_size_log2 + 1);
        for slot in 0..self.allocated_items() {
            if self.metadata[slot] != 0 {
                grown.insert_internal(keys, self.entries[slot]);
            }
        }
        *self = grown;
    }

    fn insert_internal(&mut self, keys: &[K], idx: u32) {
        if self.cur_items >= self.max_items {
            crate::vm_oops!("index hash: grow needed during insert of {}", idx);
        }

        let mut slot = self.ideal_bucket(keys[idx as usize].index_hash());
        let mut probe_distance: u8 = 1;
        loop {
            let meta = self.metadata[slot];
            if meta < probe_distance {
                // This slot is ours, occupied or not.
                if meta != 0 {
                    // Make room. Probe distances are never out of order, so
                    // instead of swapping with the occupant and re-inserting
                    // it, shift the whole occupied run forward one slot.
                    let mut gap = slot;
                    let mut displaced = self.metadata[gap];
                    loop {
                        let bumped = displaced + 1;
                        if bumped == self.max_probe_distance {
                            // Force a resize before the next insert so this
                            // loop never has to handle overflow itself.
                            self.max_items = 0;
                        }
                        gap += 1;
                        displaced = self.metadata[gap];
                        self.metadata[gap] = bumped;
                        if displaced == 0 {
                            break;
                        }
                    }
                    self.entries.copy_within(slot..gap, slot + 1);
                }

                // Same signal as in the shift loop: an entry is landing at
                // the current ceiling, so the next insert must grow first.
                if probe_distance == self.max_probe_distance {
                    self.max_items = 0;
                }

                self.cur_items += 1;
                self.metadata[slot] = probe_distance;
                self.entries[slot] = idx;
                return;
            }

            if meta == probe_distance && self.entries[slot] == idx {
                crate::vm_oops!("index hash: insert duplicate for {}", idx);
            }

            probe_distance += 1;
            slot += 1;
            debug_assert!(u32::from(probe_distance) <= u32::from(self.max_probe_distance) + 1);
        }
    }

    /// Exhaustively checks the table's structural invariants against the
    /// caller's key slice. Debugging aid; panics on the first violation.
    pub fn validate(&self, keys: &[K]) {
        if !self.is_built() {
            return;
        }
        let allocated = self.allocated_items();
        assert_eq!(self.metadata[allocated], 1, "trailing sentinel clobbered");

        let mut live = 0u32;
        for slot in 0..allocated {
            let meta = self.metadata[slot];
            if meta == 0 {
                continue;
            }
            live += 1;
            assert!(
                meta <= self.max_probe_distance,
                "slot {slot}: probe distance {meta} above ceiling {}",
                self.max_probe_distance
            );
            let idx = self.entries[slot];
            let ideal = self.ideal_bucket(keys[idx as usize].index_hash());
            assert_eq!(
                ideal + meta as usize - 1,
                slot,
                "slot {slot}: entry {idx} is not on its probe chain"
            );
            let prev = if slot == 0 { 0 } else { self.metadata[slot - 1] };
            if prev == 0 {
                assert_eq!(meta, 1, "slot {slot}: run must start at its ideal bucket");
            } else {
                assert!(
                    meta <= prev + 1,
                    "slot {slot}: probe distances out of order ({prev} then {meta})"
                );
            }
        }
        assert_eq!(live, self.cur_items, "live entry count drifted");
        if self.max_items != 0 {
            assert!(self.cur_items <= self.max_items, "insert budget exceeded");
        }
    }
}

impl<K: IndexKey> Default for IndexHash<K> {
    fn default() -> Self {
        IndexHash::new()
    }
}
