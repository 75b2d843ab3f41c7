//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed, results found (or no results is acceptable)
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - critical failure that should halt automation
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::IndexError;

/// Standard exit codes for CLI operations.
///
/// These codes follow Unix conventions where 0 indicates success,
/// and non-zero values indicate various error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Nothing to search: empty index or no results (code 3)
    NotFound = 3,

    /// Store or file I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Snapshot corruption detected (code 7)
    IndexCorrupted = 7,

    /// Operation not supported (code 8)
    UnsupportedOperation = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Determine exit code for a search based on result presence.
    ///
    /// Returns `Success` if anything ranked, `NotFound` if empty.
    pub fn from_results<T>(results: &[T]) -> Self {
        if results.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Convert an `IndexError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &IndexError) -> Self {
        match error {
            IndexError::EmptyIndex => ExitCode::NotFound,

            IndexError::SnapshotCorrupt { .. } => ExitCode::IndexCorrupted,

            // Data that can never be searched correctly without a rebuild
            IndexError::DimensionMismatch { .. } | IndexError::InvalidPosition { .. } => {
                ExitCode::BlockingError
            }

            IndexError::StoreUnavailable { .. } | IndexError::Persistence { .. } => {
                ExitCode::IoError
            }
            IndexError::Config { .. } | IndexError::InvalidWeight { .. } => ExitCode::ConfigError,
            IndexError::Unsupported { .. } => ExitCode::UnsupportedOperation,

            // Everything else is a general error
            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    ///
    /// Blocking errors should halt automation pipelines.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError | ExitCode::IndexCorrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as u8, 0);
        assert_eq!(ExitCode::GeneralError as u8, 1);
        assert_eq!(ExitCode::BlockingError as u8, 2);
        assert_eq!(ExitCode::NotFound as u8, 3);
        assert_eq!(ExitCode::IndexCorrupted as u8, 7);
    }

    #[test]
    fn test_from_results() {
        assert_eq!(ExitCode::from_results(&[1]), ExitCode::Success);
        assert_eq!(ExitCode::from_results::<u8>(&[]), ExitCode::NotFound);
    }

    #[test]
    fn test_from_error() {
        assert_eq!(
            ExitCode::from_error(&IndexError::EmptyIndex),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from_error(&IndexError::SnapshotCorrupt {
                path: PathBuf::from("vectors.snap"),
                reason: "checksum mismatch".to_string(),
            }),
            ExitCode::IndexCorrupted
        );
        assert_eq!(
            ExitCode::from_error(&IndexError::DimensionMismatch {
                expected: 512,
                actual: 768,
            }),
            ExitCode::BlockingError
        );
        assert_eq!(
            ExitCode::from_error(&IndexError::Unsupported {
                operation: "remove",
                index_kind: "flat",
            }),
            ExitCode::UnsupportedOperation
        );
        assert_eq!(
            ExitCode::from_error(&IndexError::EncodingFailed {
                reason: "offline".to_string(),
            }),
            ExitCode::GeneralError
        );
    }

    #[test]
    fn test_is_blocking() {
        assert!(ExitCode::BlockingError.is_blocking());
        assert!(ExitCode::IndexCorrupted.is_blocking());
        assert!(!ExitCode::Success.is_blocking());
        assert!(!ExitCode::NotFound.is_blocking());
    }
}
