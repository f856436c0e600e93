//! Error types for the SunSpec model engine
//!
//! Every fallible operation returns [`Result`]. Errors carry an [`ErrorKind`]
//! from the decoder taxonomy and a [`Severity`] telling the caller whether the
//! current scan must stop.

use std::fmt;

use thiserror::Error;

use crate::types::TypeTag;

/// Result type for suns-model operations
pub type Result<T> = std::result::Result<T, SunsError>;

/// How far an error or diagnostic is allowed to propagate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Log and continue
    Warning,
    /// Abort the current operation
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Fatal => f.write_str("fatal"),
        }
    }
}

/// Error taxonomy shared by errors and soft diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    Protocol,
    UnknownModel,
    LengthMismatch,
    Truncation,
    UnsupportedType,
    Ordering,
    TypeMismatch,
    InsufficientSpace,
    Definition,
    /// Payload exhausted before every block was decoded
    Overrun,
}

impl ErrorKind {
    /// Default severity of this kind when it is raised
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnknownModel | Self::LengthMismatch | Self::Truncation | Self::Overrun => {
                Severity::Warning
            },
            _ => Severity::Fatal,
        }
    }
}

/// SunSpec engine errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SunsError {
    /// Register transport failure
    #[error("IO error: {0}")]
    Io(String),

    /// Protocol-level errors other than the dedicated variants below
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No candidate base register carried the signature
    #[error("Protocol error: SunSpec signature not found at registers {candidates:?}")]
    SignatureNotFound { candidates: Vec<u16> },

    /// 0x0000 where a model id or the end marker was expected
    #[error("Protocol error: found 0x0000 at register {register} where a model id or end marker was expected")]
    MissingEndMarker { register: u32 },

    /// Model id has no registry entry
    #[error("Unknown model id: {0}")]
    UnknownModel(u16),

    /// Declared length disagrees with the resolved model geometry
    #[error("Length mismatch for model {model_id}: declared {declared} registers, {expected}")]
    LengthMismatch {
        model_id: u16,
        declared: u16,
        expected: String,
    },

    /// Fewer bytes than the operation needs
    #[error("Truncated data: needed {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },

    /// Codec cannot handle this type
    #[error("Unsupported type: {0}")]
    UnsupportedType(TypeTag),

    /// Repeating block is not the last block of its model
    #[error("Ordering error in model {model}: repeating block {block} is not the last of {blocks}")]
    Ordering {
        model: String,
        block: usize,
        blocks: usize,
    },

    /// Typed accessor called on a value of another type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: TypeTag, actual: TypeTag },

    /// Destination buffer too small for the encoded value
    #[error("Insufficient space: {needed} bytes required, {available} available")]
    InsufficientSpace { needed: usize, available: usize },

    /// Model definition source errors
    #[error("Definition error: {0}")]
    Definition(String),
}

impl From<std::io::Error> for SunsError {
    fn from(err: std::io::Error) -> Self {
        SunsError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for SunsError {
    fn from(err: serde_yaml::Error) -> Self {
        SunsError::Definition(format!("YAML error: {}", err))
    }
}

// Helper methods for creating errors
impl SunsError {
    pub fn io(msg: impl Into<String>) -> Self {
        SunsError::Io(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        SunsError::Protocol(msg.into())
    }

    pub fn definition(msg: impl Into<String>) -> Self {
        SunsError::Definition(msg.into())
    }

    /// Taxonomy entry for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SunsError::Io(_) => ErrorKind::Io,
            SunsError::Protocol(_)
            | SunsError::SignatureNotFound { .. }
            | SunsError::MissingEndMarker { .. } => ErrorKind::Protocol,
            SunsError::UnknownModel(_) => ErrorKind::UnknownModel,
            SunsError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            SunsError::Truncated { .. } => ErrorKind::Truncation,
            SunsError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            SunsError::Ordering { .. } => ErrorKind::Ordering,
            SunsError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            SunsError::InsufficientSpace { .. } => ErrorKind::InsufficientSpace,
            SunsError::Definition(_) => ErrorKind::Definition,
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind().severity()
    }

    /// Check if this error must terminate the current scan
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// A soft outcome attached to a decode or traversal step
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

impl From<&SunsError> for Diagnostic {
    fn from(err: &SunsError) -> Self {
        Self {
            kind: err.kind(),
            severity: err.severity(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_and_soft_kinds() {
        assert!(SunsError::io("timeout").is_fatal());
        assert!(SunsError::MissingEndMarker { register: 40010 }.is_fatal());
        assert!(SunsError::SignatureNotFound {
            candidates: vec![1, 40001]
        }
        .is_fatal());
        assert!(!SunsError::UnknownModel(64000).is_fatal());
        assert!(!SunsError::Truncated {
            needed: 6,
            available: 4
        }
        .is_fatal());
        assert_eq!(
            SunsError::UnsupportedType(TypeTag::Null).kind(),
            ErrorKind::UnsupportedType
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: SunsError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("read timed out"));
    }

    #[test]
    fn test_diagnostic_from_error() {
        let diag = Diagnostic::from(&SunsError::UnknownModel(7));
        assert_eq!(diag.kind, ErrorKind::UnknownModel);
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.to_string(), "[warning] Unknown model id: 7");
    }
}
