//! Error types for backend operations.
//!
//! This module defines the core error taxonomy used throughout the library.
//! Numerical non-convergence of iterative solvers is deliberately *not* an
//! error; solvers report it through their result records instead.

use thiserror::Error;

/// Errors that can occur during backend operations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// An operation received a value it cannot interpret or convert.
    ///
    /// Surfaced immediately at the call site, never retried.
    #[error("Operation '{operation}' does not support type {ty}")]
    UnsupportedType {
        /// Name of the operation that rejected the value
        operation: String,
        /// Description of the offending type
        ty: String,
    },

    /// Dimension mismatch between tensors.
    ///
    /// This error occurs when operations involve tensors with incompatible
    /// shapes, including batch sizes that violate the combined-batch-size
    /// rule.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions
        expected: String,
        /// Actual dimensions
        actual: String,
    },

    /// An index falls outside the valid range of its axis.
    #[error("Index {index} is out of bounds for axis of size {axis_size}")]
    IndexOutOfBounds {
        /// The offending index
        index: i64,
        /// Size of the indexed axis
        axis_size: usize,
    },

    /// An argument is malformed for the requested operation.
    #[error("Invalid argument to '{operation}': {reason}")]
    InvalidArgument {
        /// Name of the operation
        operation: String,
        /// Description of the problem
        reason: String,
    },

    /// A requested feature combination is recognized but not built.
    ///
    /// Surfaced as a clear signal rather than silently substituting a
    /// different policy.
    #[error("Feature not implemented: {feature}")]
    NotImplemented {
        /// Name of the unimplemented feature
        feature: String,
    },

    /// Fatal configuration error.
    ///
    /// Raised before any computation proceeds, e.g. when 64-bit precision
    /// is requested but the active engine cannot enable it, or when an
    /// operation is dispatched with no backend registered.
    #[error("Configuration error: {reason}")]
    Configuration {
        /// Description of the configuration problem
        reason: String,
    },
}

impl BackendError {
    /// Create an UnsupportedType error naming the operation and type.
    pub fn unsupported_type<S1, S2>(operation: S1, ty: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::UnsupportedType {
            operation: operation.into(),
            ty: ty.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an IndexOutOfBounds error.
    pub fn index_out_of_bounds(index: i64, axis_size: usize) -> Self {
        Self::IndexOutOfBounds { index, axis_size }
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument<S1, S2>(operation: S1, reason: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::InvalidArgument {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a NotImplemented error for a specific feature.
    pub fn not_implemented<S: Into<String>>(feature: S) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
        }
    }

    /// Create a Configuration error with a custom reason.
    pub fn configuration<S: Into<String>>(reason: S) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

/// Result type alias for operations that can produce BackendError.
pub type Result<T> = std::result::Result<T, BackendError>;
