// Error taxonomy for conversion and daemon configuration

use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading a DKB export or writing the YNAB file.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O on an unnamed stream (stdin, stdout, an in-memory buffer).
    #[error("stream I/O error: {0}")]
    Stream(#[from] std::io::Error),

    /// A row that does not match the DKB column layout.
    #[error("line {line}: {reason}")]
    Format { line: u64, reason: String },

    #[error("invalid IBAN in account header: {0:?}")]
    InvalidIban(String),

    #[error("missing column header row (expected a row starting with \"Buchungsdatum\")")]
    MissingHeader,

    #[error("input is empty")]
    EmptyInput,

    #[error("invalid date range: {0}")]
    InvalidRange(String),
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(line: u64, reason: impl Into<String>) -> Self {
        ConvertError::Format {
            line,
            reason: reason.into(),
        }
    }

    /// Row-level errors can be skipped, file-level ones cannot.
    pub fn is_row_error(&self) -> bool {
        matches!(self, ConvertError::Format { .. })
    }
}

/// Missing or unusable daemon settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_display_includes_line() {
        let err = ConvertError::format(7, "bad amount");
        assert_eq!(err.to_string(), "line 7: bad amount");
        assert!(err.is_row_error());
    }

    #[test]
    fn test_io_error_is_not_row_error() {
        let err = ConvertError::io(
            "missing.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("missing.csv"));
        assert!(!err.is_row_error());
    }

    #[test]
    fn test_stream_error_from_io() {
        let err: ConvertError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into();
        assert!(matches!(err, ConvertError::Stream(_)));
        assert_eq!(err.to_string(), "stream I/O error: closed");
        assert!(!err.is_row_error());
    }
}
