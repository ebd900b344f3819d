//! Error types for fluex-rs.
//!
//! This module defines domain-specific error types organized by functional area.

use std::fmt;
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug)]
pub enum FluexError {
    /// Statement lifecycle and caller-input errors
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Errors reported by the underlying driver
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Value conversion errors
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Errors raised by the statement scope itself.
#[derive(Error, Debug)]
pub enum StatementError {
    /// Parameter index outside the 1-based range
    #[error("Parameter index {index} is invalid: parameter indices are 1-based")]
    InvalidParameterIndex { index: usize },

    /// Operation attempted on a closed statement
    #[error("Statement is closed")]
    Closed,

    /// Illegal lifecycle transition
    #[error("Invalid statement state: {0}")]
    InvalidState(String),

    /// Exact-one extraction found no rows
    #[error("Query returned no rows")]
    NoRows,

    /// At-most-one extraction found a second row
    #[error("Query returned more than one row")]
    NonUniqueResult,

    /// Execution produced an update count where a row cursor was expected
    #[error("Expected a row cursor but the statement produced an update count")]
    NoCursor,

    /// Execution produced a row cursor where an update count was expected
    #[error("Expected an update count but the statement produced a row cursor")]
    UnexpectedCursor,

    /// One or more failures during close; the first is primary, the rest
    /// are retained as suppressed
    #[error("Statement close failed: {primary}")]
    CloseFailed {
        primary: Box<FluexError>,
        suppressed: Vec<FluexError>,
    },
}

/// Errors reported by a [`StatementDriver`](crate::driver::StatementDriver)
/// implementation.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Statement execution failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Driver rejected a parameter binding
    #[error("Bind rejected for parameter {index}: {message}")]
    BindRejected { index: usize, message: String },

    /// Cursor operation failed
    #[error("Cursor error: {0}")]
    Cursor(String),

    /// Underlying statement resource is gone
    #[error("Statement resource is closed")]
    ResourceClosed,

    /// Operation the driver does not implement
    #[error("Unsupported by this driver: {0}")]
    Unsupported(String),

    /// Network or storage I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors raised while converting values between SQL and Rust types.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// NULL encountered where a non-optional value was requested
    #[error("Unexpected NULL value")]
    UnexpectedNull,

    /// Value type does not match the requested Rust type
    #[error("Cannot convert {actual} value to {requested}")]
    TypeMismatch {
        requested: &'static str,
        actual: &'static str,
    },

    /// Numeric value does not fit the requested type
    #[error("Numeric value out of range for {requested}")]
    OutOfRange { requested: &'static str },

    /// Column index past the end of the row
    #[error("Column index {0} out of bounds")]
    ColumnOutOfBounds(usize),

    /// Column name not present in the row
    #[error("No column named '{0}'")]
    NoSuchColumn(String),
}

/// Coarse error classification for dispatch and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid caller input
    InvalidArgument,
    /// Operation illegal in the current lifecycle state
    IllegalState,
    /// A single-row extraction matched more than one row
    DuplicateResult,
    /// A required row was missing
    NoData,
    /// The driver reported a failure
    Execution,
    /// A value conversion failed
    Conversion,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorKind::IllegalState => write!(f, "ILLEGAL_STATE"),
            ErrorKind::DuplicateResult => write!(f, "DUPLICATE_RESULT"),
            ErrorKind::NoData => write!(f, "NO_DATA"),
            ErrorKind::Execution => write!(f, "EXECUTION"),
            ErrorKind::Conversion => write!(f, "CONVERSION"),
        }
    }
}

impl FluexError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FluexError::Statement(e) => e.kind(),
            FluexError::Driver(_) => ErrorKind::Execution,
            FluexError::Conversion(_) => ErrorKind::Conversion,
        }
    }
}

impl StatementError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StatementError::InvalidParameterIndex { .. } => ErrorKind::InvalidArgument,
            StatementError::Closed | StatementError::InvalidState(_) => ErrorKind::IllegalState,
            StatementError::NoRows => ErrorKind::NoData,
            StatementError::NonUniqueResult => ErrorKind::DuplicateResult,
            StatementError::NoCursor | StatementError::UnexpectedCursor => ErrorKind::Execution,
            StatementError::CloseFailed { primary, .. } => primary.kind(),
        }
    }
}
