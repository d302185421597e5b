// Error handling framework
// Transfer failures are classified once, where they are detected.

use std::time::Duration;
use thiserror::Error;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn as_gib(bytes: &u64) -> f64 {
    *bytes as f64 / GIB
}

/// Remote transfer errors
///
/// Every variant already carries its retry classification (see [`TransferError::class`]),
/// so retry loops never need to inspect libssh2 error codes or message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("SFTP configuration error: {0}")]
    Configuration(String),

    #[error("SFTP authentication failed: {0}")]
    Authentication(String),

    #[error("SSH connection error: {0}")]
    Connection(String),

    #[error("{operation} timeout after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("File not found or inaccessible: {0}")]
    NotFound(String),

    #[error("File too large: {:.1}GB (max: {:.0}GB)", as_gib(.size), as_gib(.max))]
    FileTooLarge { size: u64, max: u64 },

    #[error("File is empty or corrupted: {0}")]
    EmptyFile(String),

    #[error("Failed to read chunk at offset {offset}: {reason}")]
    PartialRead { offset: u64, reason: String },
}

/// User-facing error category, one per HTTP mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Timeout,
    NotFound,
    FileTooLarge,
    EmptyFile,
    PartialRead,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::EmptyFile => "empty_file",
            ErrorKind::PartialRead => "partial_read",
        }
    }
}

/// Retry classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Must not be retried
    Permanent,
    /// Eligible for bounded retry with backoff
    Transient,
}

impl TransferError {
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        TransferError::Timeout { operation, after }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Configuration(_) => ErrorKind::Configuration,
            TransferError::Authentication(_) | TransferError::Connection(_) => {
                ErrorKind::Connection
            }
            TransferError::Timeout { .. } => ErrorKind::Timeout,
            TransferError::NotFound(_) => ErrorKind::NotFound,
            TransferError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            TransferError::EmptyFile(_) => ErrorKind::EmptyFile,
            TransferError::PartialRead { .. } => ErrorKind::PartialRead,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            TransferError::Connection(_) | TransferError::Timeout { .. } => ErrorClass::Transient,
            TransferError::Configuration(_)
            | TransferError::Authentication(_)
            | TransferError::NotFound(_)
            | TransferError::FileTooLarge { .. }
            | TransferError::EmptyFile(_)
            | TransferError::PartialRead { .. } => ErrorClass::Permanent,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.class() == ErrorClass::Permanent
    }
}

/// Validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_mentions_timeout() {
        let err = TransferError::timeout("chunk read", Duration::from_secs(60));
        assert_eq!(err.to_string(), "chunk read timeout after 60s");
    }

    #[test]
    fn test_file_too_large_display_in_gib() {
        let err = TransferError::FileTooLarge {
            size: 11 * 1024 * 1024 * 1024,
            max: 10 * 1024 * 1024 * 1024,
        };
        assert_eq!(err.to_string(), "File too large: 11.0GB (max: 10GB)");
    }

    #[test]
    fn test_authentication_is_permanent_connection_kind() {
        let err = TransferError::Authentication("bad password".to_string());
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_transient_classes() {
        assert_eq!(
            TransferError::Connection("reset".to_string()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            TransferError::timeout("listing", Duration::from_secs(120)).class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_permanent_classes() {
        let permanent = [
            TransferError::Configuration("SSH_PASSWORD not configured".to_string()),
            TransferError::NotFound("/a.ts".to_string()),
            TransferError::FileTooLarge { size: 2, max: 1 },
            TransferError::EmptyFile("/a.ts".to_string()),
            TransferError::PartialRead {
                offset: 0,
                reason: "eof".to_string(),
            },
        ];
        for err in permanent {
            assert!(err.is_permanent(), "{err} should be permanent");
        }
    }
}
