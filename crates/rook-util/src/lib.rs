//! rook-util - Foundation Types for the Rook VM
//!
//! This crate holds the small, dependency-light pieces the VM core is built
//! on: fatal-error reporting, the VM string value, and the index hash table
//! used wherever the VM needs to map string keys onto dense indices.
//!
//! Everything here is deliberately free of VM-instance state; the types can
//! be exercised and tested in isolation.
//!
//! ## Modules
//!
//! - [`fatal`]: fatal-error reporting and process exit codes
//! - [`strings`]: immutable VM string values with cached hashes
//! - [`index_hash`]: open-addressed Robin Hood index hash table

pub mod fatal;
pub mod index_hash;
pub mod strings;

pub use index_hash::{IndexHash, IndexKey};
pub use strings::{string_equal, VmString};
