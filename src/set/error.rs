// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

use crate::types::ConvertError;

/// The result type of set operations.
pub type Result<T> = std::result::Result<T, SetError>;

/// The error type of set operations.
#[derive(thiserror::Error, Debug)]
pub enum SetError {
    /// Invariant violation. Non-recoverable; propagate to the query.
    #[error("logical error: {0}")]
    Logical(String),
    /// Size limits violated under throw mode. The query planner may
    /// recover by falling back to another filter strategy.
    #[error("IN-set size limit exceeded: {rows} rows, {bytes} bytes")]
    SizeLimitExceeded { rows: usize, bytes: usize },
    #[error(
        "types of column {index} in section IN don't match: \
         {left} on the left, {right} on the right"
    )]
    TypeMismatch {
        index: usize,
        left: String,
        right: String,
    },
    #[error(
        "number of columns in section IN doesn't match: \
         {left} at left, {right} at right"
    )]
    ColumnCountMismatch { left: usize, right: usize },
    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),
}
