//! Unified error type for the TenMap data model
//!
//! Every structural invariant of [`Labels`](crate::Labels),
//! [`TensorBlock`](crate::TensorBlock) and [`TensorMap`](crate::TensorMap) is
//! checked eagerly at construction time, and a violation is reported through
//! one of the variants of [`TensorError`]. A failed construction never yields
//! a partially-built object.
//!
//! # Examples
//!
//! ```
//! use tenmap_core::{Labels, TensorError};
//!
//! let result = Labels::new(["a"], &[[0], [0]]);
//! assert!(matches!(result, Err(TensorError::DuplicateRow { .. })));
//! ```

use thiserror::Error;

/// Top-level error type for all structural operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// The same row appears twice in a Labels
    #[error("duplicate row {row:?} in labels with names {names:?}")]
    DuplicateRow { names: Vec<String>, row: Vec<i32> },

    /// A row does not have one entry per dimension name
    #[error("row {index} has {got} values, expected {expected} (one per dimension name)")]
    WidthMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    /// Two Labels were combined but do not share the same names
    #[error("incompatible dimension names: {first:?} vs {second:?}")]
    IncompatibleNames {
        first: Vec<String>,
        second: Vec<String>,
    },

    /// Dimension name is not a valid identifier
    #[error("invalid dimension name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Dimension name used more than once
    #[error("dimension name '{name}' is used more than once {context}")]
    DuplicateName { name: String, context: String },

    /// Labels row counts do not match the value array shape
    #[error("shape mismatch for {axis}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        axis: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A gradient with this parameter name already exists
    #[error("gradient with respect to '{0}' already exists in this block")]
    DuplicateGradient(String),

    /// Properties that must be identical (same names, same rows, same order) are not
    #[error("property labels mismatch: {context}")]
    PropertyLabelsMismatch { context: String },

    /// A gradient sample points outside of the parent samples
    #[error("gradient sample {row} references parent sample {reference}, but the block only has {parent_count} samples")]
    InvalidSampleReference {
        row: usize,
        reference: i32,
        parent_count: usize,
    },

    /// Gradient block layout does not match its parent
    #[error("invalid gradient with respect to '{parameter}': {reason}")]
    InvalidGradient { parameter: String, reason: String },

    /// Number of keys and number of blocks differ
    #[error("got {keys} keys but {blocks} blocks")]
    KeyCountMismatch { keys: usize, blocks: usize },

    /// Property names differ between blocks
    #[error("block {block} has property names {got:?}, expected {expected:?}")]
    InconsistentProperties {
        block: usize,
        expected: Vec<String>,
        got: Vec<String>,
    },

    /// Sample names differ between blocks
    #[error("block {block} has sample names {got:?}, expected {expected:?}")]
    InconsistentSamples {
        block: usize,
        expected: Vec<String>,
        got: Vec<String>,
    },

    /// Component layout differs between blocks
    #[error("block {block} has inconsistent components: {reason}")]
    InconsistentComponents { block: usize, reason: String },

    /// Blocks declare different sets of gradient parameters
    #[error("block {block} has gradients {got:?}, expected {expected:?}")]
    InconsistentGradients {
        block: usize,
        expected: Vec<String>,
        got: Vec<String>,
    },

    /// Moving keys to samples would create ambiguous sample rows
    #[error("ambiguous samples after moving keys: {reason}")]
    AmbiguousSamples { reason: String },

    /// Blocks merged along properties do not share the same samples
    #[error("block {block} has different samples from the other blocks in its group")]
    SampleLabelsMismatch { block: usize },

    /// Invalid argument to a structural operation
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Value array backend failure
    #[error("array error: {0}")]
    Array(String),
}

/// Result type alias for structural operations
pub type TensorResult<T> = Result<T, TensorError>;

impl TensorError {
    /// Create an invalid parameter error with a message
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        TensorError::InvalidParameter(msg.into())
    }

    /// Create a shape mismatch error for the given axis
    pub fn shape_mismatch(axis: impl Into<String>, expected: Vec<usize>, got: Vec<usize>) -> Self {
        TensorError::ShapeMismatch {
            axis: axis.into(),
            expected,
            got,
        }
    }

    /// Create an invalid gradient error
    pub fn invalid_gradient(parameter: &str, reason: impl Into<String>) -> Self {
        TensorError::InvalidGradient {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}
