//! # Error Definitions
//!
//! Failures while shaping values or reading and writing envelopes.

use thiserror::Error;

/// Failures of the value model and the envelope codec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    /// The underlying polypack encoder or decoder failed.
    #[error("codec: {0}")]
    Codec(#[from] polypack::Error),
    /// A value did not have the shape its declared type requires.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    /// A record was missing a required field.
    #[error("missing field `{field}` in {type_name}")]
    MissingField { type_name: String, field: String },
    /// A variant name not declared by the target type.
    #[error("unknown variant `{variant}` for {type_name}")]
    UnknownVariant { type_name: String, variant: String },
    /// The number of positional values did not match the declared signature.
    #[error("expected {expected} values, found {found}")]
    ArityMismatch { expected: usize, found: usize },
    /// Nesting exceeded `MAX_RECURSION_DEPTH`.
    #[error("recursion limit exceeded")]
    RecursionLimitExceeded,
    /// The envelope structure itself is malformed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
