//! Callsite interning.
//!
//! The interner canonicalises callsite descriptors so that equivalent call
//! shapes share one `Arc`'d value VM-wide, letting dispatch and JIT caches
//! key on pointer identity. It owns two things behind one mutex: the
//! per-arity buckets of interned descriptors, and the canonical name table
//! through which every named-argument string passes before descriptors are
//! compared. The name table is a `Vec` of strings indexed by an
//! [`IndexHash`], so repeat name lookups are a hash probe and repeat name
//! comparisons are pointer comparisons.
//!
//! Interning never fails; it just declines. Flattening callsites, arities
//! at or above [`INTERN_ARITY_LIMIT`], and named shapes whose names are not
//! known stay owned by the caller, unmarked.

use std::array;
use std::sync::Arc;

use parking_lot::Mutex;
use rook_util::index_hash::IndexHash;
use rook_util::strings::{string_equal, VmString};
use rook_util::vm_oops;

use super::{ArgFlags, Callsite};

/// Callsites at or above this arity are not interned. Bucket storage also
/// grows in chunks of this size.
pub const INTERN_ARITY_LIMIT: usize = 8;

/// A snapshot of interner occupancy, for profiling and tests.
#[derive(Debug, Clone)]
pub struct InternerStats {
    /// Interned descriptor count per arity.
    pub by_arity: [usize; INTERN_ARITY_LIMIT],
    /// Distinct canonical named-argument strings.
    pub canonical_names: usize,
}

impl InternerStats {
    pub fn total(&self) -> usize {
        self.by_arity.iter().sum()
    }
}

struct InternerState {
    by_arity: [Vec<Arc<Callsite>>; INTERN_ARITY_LIMIT],
    /// Canonical named-argument strings, appended in first-seen order.
    names: Vec<VmString>,
    /// Hash over `names`; maps a name to its index there.
    name_index: IndexHash<VmString>,
}

impl InternerState {
    /// Returns the canonical instance of `name`, registering it on first
    /// sight.
    fn canonical_name(&mut self, name: &VmString) -> VmString {
        if let Some(idx) = self.name_index.fetch(&self.names, name) {
            return self.names[idx as usize].clone();
        }
        let idx = self.names.len() as u32;
        self.names.push(name.clone());
        self.name_index.insert_nocheck(&self.names, idx);
        self.names[idx as usize].clone()
    }

    /// Rewrites the descriptor's named-argument strings with their
    /// canonical instances, so later equality checks hit the pointer fast
    /// path.
    fn canonicalise_names(&mut self, cs: &mut Arc<Callsite>) {
        let Some(names) = cs.arg_names() else { return };
        let mut canonical = Vec::with_capacity(names.len());
        let mut changed = false;
        for name in names {
            let canon = self.canonical_name(name);
            changed |= !VmString::ptr_eq(&canon, name);
            canonical.push(canon);
        }
        if changed {
            match Arc::get_mut(cs) {
                Some(owned) => owned.replace_arg_names(canonical),
                None => {
                    let mut clone = (**cs).clone();
                    clone.replace_arg_names(canonical);
                    *cs = Arc::new(clone);
                }
            }
        }
    }
}

/// The VM-wide callsite interner.
///
/// All mutation is serialised by one mutex; reads of interned descriptors
/// need no synchronisation because their contents never change after
/// publication.
pub struct CallsiteInterner {
    state: Mutex<InternerState>,
}

impl CallsiteInterner {
    pub fn new() -> Self {
        CallsiteInterner::with_name_capacity(0)
    }

    /// Creates an interner whose name index is pre-sized for
    /// `expected_names` distinct named-argument strings.
    pub fn with_name_capacity(expected_names: u32) -> Self {
        let mut name_index = IndexHash::new();
        name_index.build(expected_names);
        CallsiteInterner {
            state: Mutex::new(InternerState {
                by_arity: array::from_fn(|_| Vec::new()),
                names: Vec::new(),
                name_index,
            }),
        }
    }

    /// Tries to intern the callsite behind `cs`.
    ///
    /// On a hit the caller's descriptor is dropped and `cs` repointed at
    /// the interned one; on a miss the descriptor itself is marked interned
    /// and stored. Flattening callsites, arities at or above
    /// [`INTERN_ARITY_LIMIT`], and named shapes without known names are
    /// left untouched, as is anything already interned.
    pub fn try_intern(&self, cs: &mut Arc<Callsite>) {
        // Already published; the pointer is already canonical.
        if cs.is_interned() {
            return;
        }
        // Can't intern anything with flattening.
        if cs.has_flattening() {
            return;
        }
        // Also can't intern past the max arity.
        let arity = cs.flag_count() as usize;
        if arity >= INTERN_ARITY_LIMIT {
            return;
        }
        // Can intern things with nameds, provided we know the names.
        if cs.num_nameds() > 0 && cs.arg_names().is_none() {
            return;
        }

        let mut state = self.state.lock();

        if cs.num_nameds() > 0 {
            state.canonicalise_names(cs);
        }

        // Search for a match.
        if let Some(existing) = state.by_arity[arity]
            .iter()
            .find(|existing| callsites_equal(existing, cs))
        {
            // Got a match: drop the one we were passed and replace it with
            // the interned one.
            *cs = Arc::clone(existing);
            return;
        }

        // Not found: store it for the future.
        match Arc::get_mut(cs) {
            Some(owned) => owned.mark_interned(),
            None => {
                let mut clone = (**cs).clone();
                clone.mark_interned();
                *cs = Arc::new(clone);
            }
        }
        let bucket = &mut state.by_arity[arity];
        if bucket.len() % INTERN_ARITY_LIMIT == 0 {
            bucket.reserve(INTERN_ARITY_LIMIT);
        }
        bucket.push(Arc::clone(cs));
    }

    /// Produces the callsite with positional argument `idx` dropped,
    /// interned if possible.
    pub fn drop_positional(&self, cs: &Arc<Callsite>, idx: u32) -> Arc<Callsite> {
        // Only positional arguments of a non-flattening callsite may be
        // edited.
        if idx >= cs.num_pos() {
            vm_oops!("cannot drop positional in callsite: index {} out of range", idx);
        }
        if cs.has_flattening() {
            vm_oops!("cannot transform a callsite with flattening args");
        }

        let mut flags = Vec::with_capacity(cs.flag_count() as usize - 1);
        for (i, flag) in cs.flags().iter().enumerate() {
            if i as u32 != idx {
                flags.push(*flag);
            }
        }
        let new_callsite = Callsite::new(
            flags,
            cs.num_pos() - 1,
            cs.arg_names().map(<[VmString]>::to_vec),
        );

        let mut arc = Arc::new(new_callsite);
        self.try_intern(&mut arc);
        arc
    }

    /// Produces the callsite with `flag` inserted as positional argument
    /// `idx`, interned if possible.
    pub fn insert_positional(&self, cs: &Arc<Callsite>, idx: u32, flag: ArgFlags) -> Arc<Callsite> {
        if idx > cs.num_pos() {
            vm_oops!("cannot insert positional in callsite: index {} out of range", idx);
        }
        if cs.has_flattening() {
            vm_oops!("cannot transform a callsite with flattening args");
        }

        let mut flags = Vec::with_capacity(cs.flag_count() as usize + 1);
        for (i, old) in cs.flags().iter().enumerate() {
            if i as u32 == idx {
                flags.push(flag);
            }
            flags.push(*old);
        }
        if idx == cs.flag_count() {
            flags.push(flag);
        }
        let new_callsite = Callsite::new(
            flags,
            cs.num_pos() + 1,
            cs.arg_names().map(<[VmString]>::to_vec),
        );

        let mut arc = Arc::new(new_callsite);
        self.try_intern(&mut arc);
        arc
    }

    /// Interned descriptor count for one arity.
    pub fn interned_count(&self, arity: u32) -> usize {
        let state = self.state.lock();
        state
            .by_arity
            .get(arity as usize)
            .map_or(0, Vec::len)
    }

    pub fn stats(&self) -> InternerStats {
        let state = self.state.lock();
        InternerStats {
            by_arity: array::from_fn(|arity| state.by_arity[arity].len()),
            canonical_names: state.names.len(),
        }
    }
}

impl Default for CallsiteInterner {
    fn default() -> Self {
        CallsiteInterner::new()
    }
}

/// Descriptor equality as the interner sees it: same flag bytes and, entry
/// for entry, equal names.
fn callsites_equal(a: &Callsite, b: &Callsite) -> bool {
    if a.flags() != b.flags() {
        return false;
    }
    match (a.arg_names(), b.arg_names()) {
        (None, None) => true,
        (Some(a_names), Some(b_names)) => a_names
            .iter()
            .zip(b_names.iter())
            .all(|(x, y)| string_equal(x, y)),
        _ => false,
    }
}
