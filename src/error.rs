//! Unified error type for the chainkv library.
//!
//! Every fallible operation returns [`Result`]. Absence of a key or a version
//! is not an error: lookups return `Ok(None)` instead. [`Error::code`] maps
//! each variant onto the status taxonomy in [`crate::status`].

use thiserror::Error;

use crate::status::Code;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error outside of the storage engine (config files, store directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the underlying fjall storage engine.
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// A key or version that the caller required to exist is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Column family already exists: {0}")]
    FamilyExists(String),

    /// The family is unknown, or the handle refers to a dropped family.
    #[error("Column family not found: {0}")]
    FamilyNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted record failed validation on read.
    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("Store not initialized at {0}")]
    NotInitialized(String),

    #[error("Store version mismatch: expected {expected}, got {found}")]
    StoreVersionMismatch { expected: u32, found: u32 },
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// The status code this error reports as.
    ///
    /// Unknown families are argument errors rather than NotFound, which is
    /// reserved for missing keys and versions.
    pub fn code(&self) -> Code {
        match self {
            Self::Io(_) | Self::Fjall(_) => Code::IoError,
            Self::NotFound(_) => Code::NotFound,
            Self::FamilyExists(_) => Code::AlreadyExists,
            Self::FamilyNotFound(_) | Self::InvalidArgument(_) | Self::NotInitialized(_) => {
                Code::InvalidArgument
            }
            Self::Corruption(_) | Self::StoreVersionMismatch { .. } => Code::Corruption,
        }
    }

    /// The error text without its category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Io(e) => e.to_string(),
            Self::Fjall(e) => e.to_string(),
            Self::NotFound(msg) | Self::InvalidArgument(msg) | Self::Corruption(msg) => msg.clone(),
            Self::FamilyExists(name) | Self::FamilyNotFound(name) => {
                format!("column family '{}'", name)
            }
            Self::NotInitialized(path) => format!("store not initialized at {}", path),
            Self::StoreVersionMismatch { expected, found } => {
                format!("store version {} (expected {})", found, expected)
            }
        }
    }

    /// Returns `true` if this error reports a missing key or version.
    pub fn is_not_found(&self) -> bool {
        self.code() == Code::NotFound
    }

    /// Returns `true` if this error is an argument or misuse error.
    pub fn is_invalid_argument(&self) -> bool {
        self.code() == Code::InvalidArgument
    }

    /// Returns `true` if persisted data failed validation.
    pub fn is_corruption(&self) -> bool {
        self.code() == Code::Corruption
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_errors_are_not_not_found() {
        let err = Error::FamilyNotFound("users".to_string());
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(!err.is_not_found());

        let err = Error::FamilyExists("users".to_string());
        assert_eq!(err.code(), Code::AlreadyExists);
    }

    #[test]
    fn test_storage_faults() {
        let err = Error::from(std::io::Error::other("disk gone"));
        assert_eq!(err.code(), Code::IoError);

        let err = Error::StoreVersionMismatch { expected: 1, found: 7 };
        assert!(err.is_corruption());
        assert_eq!(err.to_string(), "Store version mismatch: expected 1, got 7");
    }
}
