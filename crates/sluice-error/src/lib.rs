//! Error types for the sluice windowing core.
//!
//! Two kinds of failures exist in this core: parameter invariants violated
//! at construction time, and collaborator contract violations observed at
//! runtime (e.g. a merge callback handed windows that do not overlap).
//! Everything else is handled by the assignment and trigger algorithms
//! themselves, not by raising errors.

use thiserror::Error;

/// Errors produced by the sluice windowing core.
#[derive(Error, Debug)]
pub enum SluiceError {
    /// A construction parameter violates its invariant (non-positive size,
    /// slide or gap, offset out of range, zero count threshold).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A collaborator broke a protocol contract: a merge over windows that
    /// do not overlap, or a callback referencing a window the caller no
    /// longer tracks.
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}

impl SluiceError {
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, SluiceError::InvalidConfiguration(_))
    }

    pub fn is_inconsistent_state(&self) -> bool {
        matches!(self, SluiceError::InconsistentState(_))
    }
}

/// Result type alias for sluice errors
pub type Result<T> = std::result::Result<T, SluiceError>;

/// Convenience function to create configuration errors
pub fn invalid_configuration(message: impl Into<String>) -> SluiceError {
    SluiceError::InvalidConfiguration(message.into())
}

/// Convenience function to create inconsistent-state errors
pub fn inconsistent_state(message: impl Into<String>) -> SluiceError {
    SluiceError::InconsistentState(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_display() {
        let err = invalid_configuration("size must be positive");
        let display = format!("{}", err);
        assert!(display.contains("invalid configuration"));
        assert!(display.contains("size must be positive"));
    }

    #[test]
    fn test_inconsistent_state_display() {
        let err = inconsistent_state("merge over disjoint windows");
        let display = format!("{}", err);
        assert!(display.contains("inconsistent state"));
        assert!(display.contains("disjoint"));
    }

    #[test]
    fn test_predicates() {
        assert!(invalid_configuration("x").is_invalid_configuration());
        assert!(!invalid_configuration("x").is_inconsistent_state());
        assert!(inconsistent_state("y").is_inconsistent_state());
        assert!(!inconsistent_state("y").is_invalid_configuration());
    }
}
