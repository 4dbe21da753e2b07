//! VM string values.
//!
//! The full string subsystem (representations, encodings, I/O) lives outside
//! the core. The core needs only an immutable string value with a cached
//! 64-bit hash and a deep equality predicate, and that is what [`VmString`]
//! provides: shared, immutable text whose hash is computed once on first use.
//!
//! Hashing uses `ahash` with fixed seeds, so a given string lands in the
//! same hash bucket on every run. That keeps index-hash layouts reproducible
//! when debugging.

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::index_hash::IndexKey;

// Arbitrary but fixed seeds; changing them reshuffles every hash bucket.
const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

fn hash_str(text: &str) -> u64 {
    ahash::RandomState::with_seeds(HASH_SEEDS[0], HASH_SEEDS[1], HASH_SEEDS[2], HASH_SEEDS[3])
        .hash_one(text)
}

struct Repr {
    text: Box<str>,
    hash: OnceLock<u64>,
}

/// An immutable, shared VM string value.
///
/// Cloning is a reference-count bump. Equality is deep content equality with
/// a pointer fast path, matching the string subsystem's `string_equal`
/// semantics.
#[derive(Clone)]
pub struct VmString {
    repr: Arc<Repr>,
}

static_assertions::assert_eq_size!(VmString, usize);

impl VmString {
    pub fn new(text: impl Into<Box<str>>) -> Self {
        VmString {
            repr: Arc::new(Repr {
                text: text.into(),
                hash: OnceLock::new(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.repr.text
    }

    pub fn len(&self) -> usize {
        self.repr.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repr.text.is_empty()
    }

    /// The string's 64-bit hash, computed on first use and cached.
    pub fn vm_hash(&self) -> u64 {
        *self.repr.hash.get_or_init(|| hash_str(&self.repr.text))
    }

    /// True if both values share one underlying allocation.
    pub fn ptr_eq(a: &VmString, b: &VmString) -> bool {
        Arc::ptr_eq(&a.repr, &b.repr)
    }
}

/// Deep string equality: pointer fast path, then content comparison.
pub fn string_equal(a: &VmString, b: &VmString) -> bool {
    VmString::ptr_eq(a, b) || a.repr.text == b.repr.text
}

impl PartialEq for VmString {
    fn eq(&self, other: &Self) -> bool {
        string_equal(self, other)
    }
}

impl Eq for VmString {}

impl Hash for VmString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.vm_hash());
    }
}

impl fmt::Debug for VmString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for VmString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for VmString {
    fn from(text: &str) -> Self {
        VmString::new(text)
    }
}

impl IndexKey for VmString {
    fn index_hash(&self) -> u64 {
        self.vm_hash()
    }

    fn index_key_equal(&self, other: &Self) -> bool {
        string_equal(self, other)
    }
}
