// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

use ordered_float::OrderedFloat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DataType, DataTypeExt, DataTypeKind, Date, DateTime, DateTime64};

/// A wrapper around floats providing implementations of `Eq`, `Ord`, and `Hash`.
pub type F64 = OrderedFloat<f64>;

/// Primitive SQL value.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DataValue {
    // NOTE: Null comes first.
    // => NULL is less than any non-NULL values
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(F64),
    Decimal(Decimal),
    Date(Date),
    DateTime(DateTime),
    DateTime64(DateTime64),
    String(String),
}

impl DataValue {
    /// Returns `true` if value is null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type of value. The scale of a `DateTime64` value is not part
    /// of the value itself, so it is reported with scale 0.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(DataTypeKind::Bool.not_null()),
            Self::Int16(_) => Some(DataTypeKind::Int16.not_null()),
            Self::Int32(_) => Some(DataTypeKind::Int32.not_null()),
            Self::Int64(_) => Some(DataTypeKind::Int64.not_null()),
            Self::Float64(_) => Some(DataTypeKind::Float64.not_null()),
            Self::Decimal(_) => Some(DataTypeKind::Decimal.not_null()),
            Self::Date(_) => Some(DataTypeKind::Date.not_null()),
            Self::DateTime(_) => Some(DataTypeKind::DateTime.not_null()),
            Self::DateTime64(_) => Some(DataTypeKind::DateTime64(0).not_null()),
            Self::String(_) => Some(DataTypeKind::String.not_null()),
        }
    }
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{v}"),
            Self::DateTime64(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "'{v}'"),
        }
    }
}

/// The error type of value type conversion.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("failed to convert string {0:?} to int: {1:?}")]
    ParseInt(String, std::num::ParseIntError),
    #[error("failed to convert string {0:?} to float: {1:?}")]
    ParseFloat(String, std::num::ParseFloatError),
    #[error("failed to convert string {0:?} to bool: {1:?}")]
    ParseBool(String, std::str::ParseBoolError),
    #[error("failed to convert string {0:?} to date or time: {1}")]
    ParseDate(String, chrono::ParseError),
    #[error("failed to convert string {0:?} to decimal")]
    ParseDecimal(String),
    #[error("failed to cast {0} to type {1}")]
    Cast(String, &'static str),
    #[error("no cast from {0} to {1}")]
    NoCast(&'static str, DataType),
}
