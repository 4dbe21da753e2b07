//! Error types for the VM core.
//!
//! Only the genuinely recoverable surface returns `Result`: configuration
//! validation and instance bootstrap. Contract violations and impossible
//! concurrent states never come back as errors; they abort the VM through
//! `rook_util::fatal` at the point of detection.

use thiserror::Error;

/// Error type for VM core operations
#[derive(Debug, Error)]
pub enum VmError {
    /// The supplied configuration was rejected
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Result type alias for VM core operations
pub type Result<T> = std::result::Result<T, VmError>;
