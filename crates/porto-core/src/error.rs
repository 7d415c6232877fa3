//! Engine error taxonomy.
//!
//! Every property operation resolves to one of seven error kinds. Handlers
//! return the first error encountered; the dispatcher surfaces it verbatim
//! to the caller, and no partial mutation is ever visible on error.

use serde::{Deserialize, Serialize};

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by property and container operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum Error {
    /// Syntactic parse failure, unknown enum token, unknown map key on
    /// indexed set, or an out-of-range value.
    #[error("InvalidValue: {0}")]
    InvalidValue(String),

    /// The property's state gate rejected the operation.
    #[error("InvalidState: {0}")]
    InvalidState(String),

    /// Unknown property name, or unknown indexed sub-key on a property
    /// that supports indexing.
    #[error("InvalidProperty: {0}")]
    InvalidProperty(String),

    /// The kernel lacks the feature backing this property, or a controller
    /// enable was requested after container start.
    #[error("NotSupported: {0}")]
    NotSupported(String),

    /// The client lacks the privilege for this operation.
    #[error("Permission: {0}")]
    Permission(String),

    /// A hierarchical resource budget is exhausted.
    #[error("ResourceNotAvailable: {0}")]
    ResourceNotAvailable(String),

    /// Collaborator failure without a more specific kind, or persistence
    /// of a non-persistable property.
    #[error("Unknown: {0}")]
    Unknown(String),
}

impl Error {
    /// Short name of the error kind, as used in responses and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidValue(_) => "InvalidValue",
            Self::InvalidState(_) => "InvalidState",
            Self::InvalidProperty(_) => "InvalidProperty",
            Self::NotSupported(_) => "NotSupported",
            Self::Permission(_) => "Permission",
            Self::ResourceNotAvailable(_) => "ResourceNotAvailable",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Human-readable message without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidValue(m)
            | Self::InvalidState(m)
            | Self::InvalidProperty(m)
            | Self::NotSupported(m)
            | Self::Permission(m)
            | Self::ResourceNotAvailable(m)
            | Self::Unknown(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(Error::InvalidValue("x".into()).kind(), "InvalidValue");
        assert_eq!(Error::Permission("x".into()).kind(), "Permission");
        assert_eq!(
            Error::ResourceNotAvailable("x".into()).kind(),
            "ResourceNotAvailable"
        );
    }

    #[test]
    fn test_display_carries_message() {
        let err = Error::InvalidState("cannot change property in runtime".into());
        assert_eq!(
            err.to_string(),
            "InvalidState: cannot change property in runtime"
        );
        assert_eq!(err.message(), "cannot change property in runtime");
    }
}
