// Error types for the sample generator
//
// Every failure aborts the run, so this module only has to describe what went
// wrong and where; nothing downstream tries to recover from a SampleError.

use log::error;
use std::fmt;
use std::path::PathBuf;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so the binary and the logs report failures
/// the same way.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Log a sample error with structured context
///
/// The line carries the numeric code, the emission step that failed and the
/// human-readable message.
pub fn log_sample_error(err: &SampleError, context: &str) {
    error!(
        "Sample error in {}: code={}, component=SampleGenerator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Sample generation errors
///
/// These errors cover directory preparation, container encoding, file
/// writes, and the decoders used to read samples back.
///
/// Error code range: 3001-3010
#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    /// Output directory could not be created
    DirectoryCreate { path: PathBuf, details: String },

    /// A sample file could not be written
    WriteFailed { path: PathBuf, details: String },

    /// Object graph holds a value the pickle encoder cannot round-trip
    UnsupportedValue { reason: String },

    /// Shape does not describe the number of elements supplied
    InvalidShape { shape: Vec<usize>, elements: usize },

    /// Name already used within the same array set, group or mapping
    DuplicateName { name: String },

    /// Archive requested with no member arrays
    EmptyArchive,

    /// Output directory could not be enumerated
    ListingFailed { path: PathBuf, details: String },

    /// Bytes do not form a valid container
    Decode { reason: String },

    /// ZIP layer failure while writing or reading an archive
    Archive { details: String },

    /// I/O failure without a specific path attached
    Io { details: String },
}

impl ErrorCode for SampleError {
    fn code(&self) -> i32 {
        match self {
            SampleError::DirectoryCreate { .. } => 3001,
            SampleError::WriteFailed { .. } => 3002,
            SampleError::UnsupportedValue { .. } => 3003,
            SampleError::InvalidShape { .. } => 3004,
            SampleError::DuplicateName { .. } => 3005,
            SampleError::EmptyArchive => 3006,
            SampleError::ListingFailed { .. } => 3007,
            SampleError::Decode { .. } => 3008,
            SampleError::Archive { .. } => 3009,
            SampleError::Io { .. } => 3010,
        }
    }

    fn message(&self) -> String {
        match self {
            SampleError::DirectoryCreate { path, details } => {
                format!("Failed to create {}: {}", path.display(), details)
            }
            SampleError::WriteFailed { path, details } => {
                format!("Failed to write {}: {}", path.display(), details)
            }
            SampleError::UnsupportedValue { reason } => {
                format!("Unsupported value: {}", reason)
            }
            SampleError::InvalidShape { shape, elements } => {
                format!("Shape {:?} does not fit {} elements", shape, elements)
            }
            SampleError::DuplicateName { name } => format!("Duplicate name: {}", name),
            SampleError::EmptyArchive => "Archive needs at least one array".to_string(),
            SampleError::ListingFailed { path, details } => {
                format!("Failed to list {}: {}", path.display(), details)
            }
            SampleError::Decode { reason } => format!("Decode error: {}", reason),
            SampleError::Archive { details } => format!("Archive error: {}", details),
            SampleError::Io { details } => format!("I/O error: {}", details),
        }
    }
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SampleError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for SampleError {}

/// Convert from std::io::Error to SampleError
impl From<std::io::Error> for SampleError {
    fn from(err: std::io::Error) -> Self {
        SampleError::Io {
            details: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for SampleError {
    fn from(err: zip::result::ZipError) -> Self {
        SampleError::Archive {
            details: err.to_string(),
        }
    }
}

/// Shorthand for decode failures.
pub(crate) fn decode_error(reason: impl Into<String>) -> SampleError {
    SampleError::Decode {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_error_codes() {
        assert_eq!(
            SampleError::DirectoryCreate {
                path: PathBuf::from("out"),
                details: "test".to_string()
            }
            .code(),
            3001
        );
        assert_eq!(
            SampleError::WriteFailed {
                path: PathBuf::from("out/a.npy"),
                details: "test".to_string()
            }
            .code(),
            3002
        );
        assert_eq!(
            SampleError::UnsupportedValue {
                reason: "test".to_string()
            }
            .code(),
            3003
        );
        assert_eq!(
            SampleError::InvalidShape {
                shape: vec![2, 2],
                elements: 3
            }
            .code(),
            3004
        );
        assert_eq!(
            SampleError::DuplicateName {
                name: "x".to_string()
            }
            .code(),
            3005
        );
        assert_eq!(SampleError::EmptyArchive.code(), 3006);
        assert_eq!(
            SampleError::ListingFailed {
                path: PathBuf::from("out"),
                details: "test".to_string()
            }
            .code(),
            3007
        );
        assert_eq!(decode_error("test").code(), 3008);
        assert_eq!(
            SampleError::Archive {
                details: "test".to_string()
            }
            .code(),
            3009
        );
        assert_eq!(
            SampleError::Io {
                details: "test".to_string()
            }
            .code(),
            3010
        );
    }

    #[test]
    fn test_sample_error_display() {
        let err = SampleError::InvalidShape {
            shape: vec![3, 3],
            elements: 8,
        };
        assert!(err.message().contains("[3, 3]"));
        assert!(err.message().contains("8 elements"));

        let err = SampleError::WriteFailed {
            path: PathBuf::from("samples/matrix.npy"),
            details: "disk full".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("code 3002"));
        assert!(rendered.contains("samples/matrix.npy"));
        assert!(rendered.contains("disk full"));
    }

    #[test]
    fn test_error_code_trait() {
        let err: &dyn ErrorCode = &SampleError::EmptyArchive;
        assert_eq!(err.code(), 3006);
        assert!(err.message().contains("at least one"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test error");
        let sample_err: SampleError = io_err.into();

        match sample_err {
            SampleError::Io { details } => {
                assert!(details.contains("test error"));
            }
            other => panic!("Expected Io variant, got {other:?}"),
        }
    }

    #[test]
    fn test_error_propagation() {
        fn may_fail() -> Result<(), SampleError> {
            Err(SampleError::EmptyArchive)
        }

        fn caller() -> Result<(), SampleError> {
            may_fail()?;
            Ok(())
        }

        assert_eq!(caller(), Err(SampleError::EmptyArchive));
    }
}
