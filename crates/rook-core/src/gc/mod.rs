//! Stop-the-world GC coordination.
//!
//! The core does not collect anything itself; the nursery collector is an
//! external collaborator behind the [`Collector`] trait. What lives here is
//! the multi-thread protocol around it: electing a coordinator, driving
//! every mutator to a safepoint, claiming the work of threads that are
//! blocked in syscalls, and releasing everyone once the run is over.
//!
//! Each thread carries a GC status word, mutated only by compare-and-swap:
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `None` | Running mutator code, not opted into a collection. |
//! | `Interrupt` | Asked to reach a safepoint and opt in. |
//! | `Unable` | Blocked in a syscall; cannot run code. |
//! | `Stolen` | Blocked, and the coordinator has claimed its GC work. |
//!
//! Legal transitions: `None → Interrupt` and `Unable → Stolen` (coordinator
//! signalling), `None → Unable` (thread about to block), `Unable → None`
//! (thread unblocking, only once no collection is in progress), and
//! `Interrupt → None` (consumed on entry to collection). Anything else
//! observed is a fatal state machine violation.
//!
//! The protocol itself lives in [`orchestrate`]'s `impl Instance` block.

pub mod collector;
mod orchestrate;

pub use collector::{Collector, NullCollector, PermRoots};

use rook_util::fatal::exitcode;
use rook_util::vm_panic;

/// A thread's GC participation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GcStatus {
    /// Running mutator code, not opted into a collection.
    None = 0,
    /// Asked to reach a safepoint and opt into a collection.
    Interrupt = 1,
    /// Blocked in a syscall; cannot run code.
    Unable = 2,
    /// Blocked, with the coordinator running this thread's GC work.
    Stolen = 3,
}

impl GcStatus {
    pub(crate) fn from_raw(raw: u32) -> GcStatus {
        match raw {
            0 => GcStatus::None,
            1 => GcStatus::Interrupt,
            2 => GcStatus::Unable,
            3 => GcStatus::Stolen,
            other => vm_panic!(exitcode::GCORCH, "invalid GC status {} observed; aborting", other),
        }
    }
}
