//! Configuration Module - VM Core Tuning Parameters
//!
//! Capacity hints for the structures the instance builds at bootstrap.
//! All parameters have sensible defaults; `validate()` rejects values the
//! core cannot honour.

use crate::error::{Result, VmError};

/// Configuration for a VM instance
///
/// # Examples
///
/// ```rust
/// use rook_core::VmConfig;
///
/// // Use default configuration
/// let config = VmConfig::default();
///
/// // Size for a workload with many named arguments
/// let config = VmConfig {
///     interned_name_capacity: 4096,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Initial capacity of the live thread table
    ///
    /// The table grows as mutator threads attach; this only avoids early
    /// reallocation. Must be at least 1 (the main thread).
    ///
    /// Default: 8
    pub thread_capacity: usize,

    /// Expected number of distinct named-argument strings
    ///
    /// Sizes the callsite interner's canonical name index. Zero means the
    /// minimum allocation; the index grows on demand either way.
    ///
    /// Default: 0
    pub interned_name_capacity: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            thread_capacity: 8,
            interned_name_capacity: 0,
        }
    }
}

impl VmConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.thread_capacity == 0 {
            return Err(VmError::Configuration(
                "thread_capacity must be at least 1 (the main thread)".to_string(),
            ));
        }
        if self.interned_name_capacity > (1 << 30) {
            return Err(VmError::Configuration(format!(
                "interned_name_capacity {} exceeds the index hash ceiling",
                self.interned_name_capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(VmConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_thread_capacity_is_rejected() {
        let config = VmConfig {
            thread_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_name_capacity_is_rejected() {
        let config = VmConfig {
            interned_name_capacity: u32::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
