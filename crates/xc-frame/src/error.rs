//! Error types for frame operations.

use thiserror::Error;

/// Errors that can occur while loading, coercing or writing frames.
#[derive(Error, Debug)]
pub enum FrameError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Named archive member does not exist
    #[error("member '{member}' not found in archive {archive}")]
    MemberNotFound { archive: String, member: String },

    /// Delimited text could not be parsed
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },

    /// No header row
    #[error("input has no header row")]
    MissingHeader,

    /// Column name not present in the frame
    #[error("unknown column '{column}' in {context}")]
    UnknownColumn { column: String, context: String },

    /// Header names a column twice
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    /// Column has the wrong type for the requested operation
    #[error("column '{column}' is {actual}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    /// Columns of one frame have different lengths
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for frame operations.
pub type Result<T> = std::result::Result<T, FrameError>;

impl From<FrameError> for xc_common::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => xc_common::Error::Io(e),
            FrameError::UnknownColumn { column, context } => {
                xc_common::Error::UnknownColumn { column, context }
            }
            FrameError::Malformed { line, message } => {
                xc_common::Error::MalformedData { line, message }
            }
            other => xc_common::Error::DataLoad(other.to_string()),
        }
    }
}
