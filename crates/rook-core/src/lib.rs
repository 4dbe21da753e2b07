//! # rook-core - Rook VM Runtime Substrate
//!
//! The core runtime of the Rook bytecode VM: callsite descriptors with a
//! VM-wide interner, the index hash table backing it, and the
//! stop-the-world GC orchestration protocol. The bytecode interpreter,
//! object model, string subsystem, and nursery allocator are external
//! collaborators; this crate talks to them through small seams (the
//! [`gc::Collector`] trait, `rook_util::strings`) and owns everything in
//! between.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Mutator Threads                       │
//! │   safepoint() · enter_from_allocator() · blocked/       │
//! │   unblocked marking around syscalls                     │
//! └──────────────────────────┬──────────────────────────────┘
//!                            │ CAS on per-thread gc_status
//! ┌──────────────────────────▼──────────────────────────────┐
//! │                       Instance                           │
//! │  ┌──────────────┐  ┌───────────────────────────────┐    │
//! │  │  thread set  │  │  GC counters                  │    │
//! │  │  (mutex)     │  │  expected / starting / seq    │    │
//! │  └──────────────┘  └───────────────────────────────┘    │
//! │  ┌───────────────────────────────────────────────┐      │
//! │  │  CallsiteInterner (mutex)                     │      │
//! │  │  per-arity buckets + canonical name table     │      │
//! │  │  backed by rook_util::IndexHash               │      │
//! │  └───────────────────────────────────────────────┘      │
//! └──────────────────────────┬──────────────────────────────┘
//!                            │ Collector trait
//!                  ┌─────────▼─────────┐
//!                  │  nursery collector │  (external)
//!                  └───────────────────┘
//! ```
//!
//! A collection is strictly stop-the-world: one thread wins the
//! coordinator election, every other thread opts in at a safepoint (or has
//! its work stolen while blocked in a syscall), all of them meet on a spin
//! barrier, and each participant collects its own nursery.
//!
//! ## Quick Start
//!
//! ```rust
//! use rook_core::{Instance, VmConfig};
//!
//! fn main() -> Result<(), rook_core::VmError> {
//!     let instance = Instance::new(VmConfig::default())?;
//!     let tc = instance.main_thread();
//!
//!     // Poll at safepoints while running bytecode.
//!     instance.safepoint(&tc);
//!
//!     // The allocator slow path triggers a collection.
//!     instance.enter_from_allocator(&tc);
//!     assert_eq!(instance.gc_seq_number(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`callsite`]: callsite descriptors, common-callsite table, interner
//! - [`config`]: instance configuration and validation
//! - [`error`]: error types for the fallible surface
//! - [`gc`]: GC status state machine, orchestration protocol, collector seam
//! - [`instance`]: the VM instance and per-thread contexts

pub mod callsite;
pub mod config;
pub mod error;
pub mod gc;
pub mod instance;

pub use callsite::{
    ArgFlags, Callsite, CallsiteInterner, CommonCallsiteId, InternerStats, INTERN_ARITY_LIMIT,
};
pub use config::VmConfig;
pub use error::{Result, VmError};
pub use gc::{Collector, GcStatus, NullCollector, PermRoots};
pub use instance::{Instance, ThreadContext};

/// Crate version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
