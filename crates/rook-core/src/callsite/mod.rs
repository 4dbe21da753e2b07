//! Callsite descriptors.
//!
//! A [`Callsite`] is a static description of one call shape: the kind of
//! each argument, how many of them are positional, the names of the named
//! ones, and whether any argument is a flattening argument expanded at call
//! time. Dispatch and JIT caches key on callsite *pointer identity*, which
//! is why equivalent descriptors are collapsed to one shared value by the
//! [`interner`].
//!
//! The handful of shapes dispatch emits most often have fixed IDs
//! ([`CommonCallsiteId`]); the instance interns them at bootstrap so that
//! any later equivalent shape resolves to the same pointer.

pub mod interner;

pub use interner::{CallsiteInterner, InternerStats, INTERN_ARITY_LIMIT};

use std::fmt;
use std::ops::BitOr;

use rook_util::strings::VmString;
use static_assertions::assert_eq_size;

/// Per-argument tags of a callsite, one byte per argument.
///
/// The low bits carry the value kind; `NAMED` marks an argument passed by
/// name, and the two flattening bits mark arguments expanded at call time.
/// Bit values are an internal detail but stable across a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgFlags(u8);

assert_eq_size!(ArgFlags, u8);

impl ArgFlags {
    /// Object argument.
    pub const OBJ: ArgFlags = ArgFlags(1);
    /// Native integer argument.
    pub const INT: ArgFlags = ArgFlags(2);
    /// Native floating point argument.
    pub const NUM: ArgFlags = ArgFlags(4);
    /// String argument.
    pub const STR: ArgFlags = ArgFlags(8);
    /// Argument passed by name.
    pub const NAMED: ArgFlags = ArgFlags(32);
    /// Positional flattening argument, expanded at call time.
    pub const FLATTEN_POS: ArgFlags = ArgFlags(64);
    /// Named flattening argument, expanded at call time.
    pub const FLATTEN_NAMED: ArgFlags = ArgFlags(128);

    pub fn contains(self, other: ArgFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_flattening(self) -> bool {
        self.0 & (ArgFlags::FLATTEN_POS.0 | ArgFlags::FLATTEN_NAMED.0) != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for ArgFlags {
    type Output = ArgFlags;

    fn bitor(self, rhs: ArgFlags) -> ArgFlags {
        ArgFlags(self.0 | rhs.0)
    }
}

/// A static description of one call shape.
///
/// Non-interned callsites are plain owned values. Once the interner accepts
/// one it is shared as an `Arc` and never mutated again; `is_interned`
/// marks that state.
pub struct Callsite {
    /// One tag per argument known at the callsite; positionals first.
    arg_flags: Box<[ArgFlags]>,
    /// How many leading entries of `arg_flags` are positional.
    num_pos: u32,
    /// Total arguments expanded at the call site. Equal to the flag count
    /// except when flattening is in play.
    arg_count: u32,
    /// Names of the named arguments, one per named entry. `None` when there
    /// are no nameds, or when the names are not known (which blocks
    /// interning).
    arg_names: Option<Box<[VmString]>>,
    has_flattening: bool,
    is_interned: bool,
    /// The same callsite with an invocant prepended; owned by its parent.
    with_invocant: Option<Box<Callsite>>,
}

impl Callsite {
    /// Creates a descriptor from per-argument flags, the positional count,
    /// and the named-argument names.
    ///
    /// Aborts the VM if `num_pos` exceeds the flag count or the name list
    /// does not match the named entry count.
    pub fn new(arg_flags: Vec<ArgFlags>, num_pos: u32, arg_names: Option<Vec<VmString>>) -> Self {
        let flag_count = arg_flags.len() as u32;
        if num_pos > flag_count {
            rook_util::vm_oops!(
                "callsite with {} positionals but only {} flags",
                num_pos,
                flag_count
            );
        }
        let arg_names = match arg_names {
            Some(names) if names.is_empty() => None,
            Some(names) => {
                if names.len() as u32 != flag_count - num_pos {
                    rook_util::vm_oops!(
                        "callsite with {} named entries but {} names",
                        flag_count - num_pos,
                        names.len()
                    );
                }
                Some(names.into_boxed_slice())
            }
            None => None,
        };
        let has_flattening = arg_flags.iter().any(|flag| flag.is_flattening());
        Callsite {
            arg_flags: arg_flags.into_boxed_slice(),
            num_pos,
            arg_count: flag_count,
            arg_names,
            has_flattening,
            is_interned: false,
            with_invocant: None,
        }
    }

    /// Convenience constructor for an all-positional shape.
    pub fn positional(arg_flags: &[ArgFlags]) -> Self {
        Callsite::new(arg_flags.to_vec(), arg_flags.len() as u32, None)
    }

    pub fn flags(&self) -> &[ArgFlags] {
        &self.arg_flags
    }

    pub fn flag_count(&self) -> u32 {
        self.arg_flags.len() as u32
    }

    pub fn num_pos(&self) -> u32 {
        self.num_pos
    }

    pub fn num_nameds(&self) -> u32 {
        self.flag_count() - self.num_pos
    }

    pub fn arg_count(&self) -> u32 {
        self.arg_count
    }

    /// Overrides the expanded argument count. Only meaningful for
    /// flattening callsites, whose true count is known at call time.
    pub fn set_arg_count(&mut self, arg_count: u32) {
        self.arg_count = arg_count;
    }

    pub fn arg_names(&self) -> Option<&[VmString]> {
        self.arg_names.as_deref()
    }

    pub fn has_flattening(&self) -> bool {
        self.has_flattening
    }

    pub fn is_interned(&self) -> bool {
        self.is_interned
    }

    pub fn with_invocant(&self) -> Option<&Callsite> {
        self.with_invocant.as_deref()
    }

    /// Attaches the invocant-prefixed companion descriptor. Its lifetime
    /// follows this callsite from here on.
    pub fn set_with_invocant(&mut self, companion: Callsite) {
        self.with_invocant = Some(Box::new(companion));
    }

    pub(crate) fn mark_interned(&mut self) {
        debug_assert!(!self.has_flattening);
        self.is_interned = true;
    }

    pub(crate) fn replace_arg_names(&mut self, arg_names: Vec<VmString>) {
        debug_assert_eq!(arg_names.len() as u32, self.num_nameds());
        self.arg_names = Some(arg_names.into_boxed_slice());
    }
}

/// Deep copy. The clone is an independent mutable descriptor, so it is
/// never born interned; `with_invocant` children are copied recursively.
impl Clone for Callsite {
    fn clone(&self) -> Self {
        Callsite {
            arg_flags: self.arg_flags.clone(),
            num_pos: self.num_pos,
            arg_count: self.arg_count,
            arg_names: self.arg_names.clone(),
            has_flattening: self.has_flattening,
            is_interned: false,
            with_invocant: self.with_invocant.clone(),
        }
    }
}

impl fmt::Debug for Callsite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callsite")
            .field("arg_flags", &self.arg_flags)
            .field("num_pos", &self.num_pos)
            .field("arg_count", &self.arg_count)
            .field("arg_names", &self.arg_names)
            .field("has_flattening", &self.has_flattening)
            .field("is_interned", &self.is_interned)
            .finish()
    }
}

/// IDs of the callsite shapes dispatch uses most often.
///
/// A closed set: the instance holds one interned descriptor per ID and
/// resolves them in constant time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommonCallsiteId {
    ZeroArity = 0,
    Obj,
    ObjObj,
    ObjInt,
    ObjNum,
    ObjStr,
    IntInt,
    ObjObjStr,
    ObjObjObj,
}

impl CommonCallsiteId {
    pub const COUNT: usize = 9;

    pub const ALL: [CommonCallsiteId; CommonCallsiteId::COUNT] = [
        CommonCallsiteId::ZeroArity,
        CommonCallsiteId::Obj,
        CommonCallsiteId::ObjObj,
        CommonCallsiteId::ObjInt,
        CommonCallsiteId::ObjNum,
        CommonCallsiteId::ObjStr,
        CommonCallsiteId::IntInt,
        CommonCallsiteId::ObjObjStr,
        CommonCallsiteId::ObjObjObj,
    ];

    /// Decodes a raw ID byte, as read from bytecode.
    pub fn from_raw(raw: u8) -> Option<CommonCallsiteId> {
        CommonCallsiteId::ALL.get(raw as usize).copied()
    }

    /// The call shape this ID stands for.
    fn shape(self) -> Callsite {
        use CommonCallsiteId::*;
        let flags: &[ArgFlags] = match self {
            ZeroArity => &[],
            Obj => &[ArgFlags::OBJ],
            ObjObj => &[ArgFlags::OBJ, ArgFlags::OBJ],
            ObjInt => &[ArgFlags::OBJ, ArgFlags::INT],
            ObjNum => &[ArgFlags::OBJ, ArgFlags::NUM],
            ObjStr => &[ArgFlags::OBJ, ArgFlags::STR],
            IntInt => &[ArgFlags::INT, ArgFlags::INT],
            ObjObjStr => &[ArgFlags::OBJ, ArgFlags::OBJ, ArgFlags::STR],
            ObjObjObj => &[ArgFlags::OBJ, ArgFlags::OBJ, ArgFlags::OBJ],
        };
        Callsite::positional(flags)
    }
}

/// Interns every common shape, returning the table the instance serves
/// `get_common` lookups from. Later interns of equivalent dynamic shapes
/// collapse to these descriptors.
pub(crate) fn initialize_common(
    interner: &CallsiteInterner,
) -> [std::sync::Arc<Callsite>; CommonCallsiteId::COUNT] {
    CommonCallsiteId::ALL.map(|id| {
        let mut cs = std::sync::Arc::new(id.shape());
        interner.try_intern(&mut cs);
        cs
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let named_str = ArgFlags::STR | ArgFlags::NAMED;
        assert!(named_str.contains(ArgFlags::STR));
        assert!(named_str.contains(ArgFlags::NAMED));
        assert!(!named_str.contains(ArgFlags::OBJ));
        assert!(!named_str.is_flattening());
        assert!(ArgFlags::FLATTEN_POS.is_flattening());
        assert!((ArgFlags::OBJ | ArgFlags::FLATTEN_NAMED).is_flattening());
    }

    #[test]
    fn positional_shape() {
        let cs = Callsite::positional(&[ArgFlags::OBJ, ArgFlags::INT]);
        assert_eq!(cs.flag_count(), 2);
        assert_eq!(cs.num_pos(), 2);
        assert_eq!(cs.num_nameds(), 0);
        assert_eq!(cs.arg_count(), 2);
        assert!(cs.arg_names().is_none());
        assert!(!cs.has_flattening());
        assert!(!cs.is_interned());
    }

    #[test]
    fn named_shape() {
        let cs = Callsite::new(
            vec![ArgFlags::OBJ, ArgFlags::STR | ArgFlags::NAMED],
            1,
            Some(vec![VmString::new("mode")]),
        );
        assert_eq!(cs.num_nameds(), 1);
        assert_eq!(cs.arg_names().unwrap()[0].as_str(), "mode");
    }

    #[test]
    fn flattening_is_detected() {
        let mut cs = Callsite::positional(&[ArgFlags::OBJ, ArgFlags::FLATTEN_POS]);
        assert!(cs.has_flattening());
        // The expanded count becomes known at call time.
        assert_eq!(cs.arg_count(), 2);
        cs.set_arg_count(5);
        assert_eq!(cs.arg_count(), 5);
        assert_eq!(cs.flag_count(), 2);
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn positional_count_above_flag_count_aborts() {
        let _ = Callsite::new(vec![ArgFlags::OBJ], 2, None);
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn name_count_mismatch_aborts() {
        let _ = Callsite::new(
            vec![ArgFlags::OBJ, ArgFlags::STR | ArgFlags::NAMED],
            1,
            Some(vec![VmString::new("a"), VmString::new("b")]),
        );
    }

    #[test]
    fn clone_is_deep_and_not_interned() {
        let mut original = Callsite::new(
            vec![ArgFlags::OBJ, ArgFlags::STR | ArgFlags::NAMED],
            1,
            Some(vec![VmString::new("key")]),
        );
        original.set_with_invocant(Callsite::positional(&[
            ArgFlags::OBJ,
            ArgFlags::OBJ,
        ]));

        let copy = original.clone();
        drop(original);

        assert_eq!(copy.flags(), &[ArgFlags::OBJ, ArgFlags::STR | ArgFlags::NAMED]);
        assert_eq!(copy.arg_names().unwrap()[0].as_str(), "key");
        assert!(!copy.is_interned());
        let companion = copy.with_invocant().unwrap();
        assert_eq!(companion.flag_count(), 2);
        assert!(!companion.is_interned());
    }

    #[test]
    fn common_id_raw_round_trip() {
        for id in CommonCallsiteId::ALL {
            assert_eq!(CommonCallsiteId::from_raw(id as u8), Some(id));
        }
        assert_eq!(CommonCallsiteId::from_raw(9), None);
        assert_eq!(CommonCallsiteId::from_raw(255), None);
    }
}
