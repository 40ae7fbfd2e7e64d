// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! Data types and scalar values.

use serde::{Deserialize, Serialize};

mod datetime;
mod native;
mod value;

pub use self::datetime::*;
pub(crate) use self::native::*;
pub use self::value::*;

/// Kind of a scalar data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataTypeKind {
    Bool,
    Int16,
    Int32,
    Int64,
    Float64,
    Decimal,
    Date,
    DateTime,
    /// Sub-second timestamp with the given decimal sub-second scale.
    DateTime64(u8),
    String,
}

impl DataTypeKind {
    /// Byte width of the native in-memory representation, or `None` for
    /// variable-width kinds.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::Int16 => Some(2),
            Self::Int32 | Self::Date => Some(4),
            Self::Int64 | Self::Float64 | Self::DateTime | Self::DateTime64(_) => Some(8),
            Self::Decimal => Some(16),
            Self::String => None,
        }
    }
}

impl std::fmt::Display for DataTypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "Bool"),
            Self::Int16 => write!(f, "Int16"),
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::Float64 => write!(f, "Float64"),
            Self::Decimal => write!(f, "Decimal"),
            Self::Date => write!(f, "Date"),
            Self::DateTime => write!(f, "DateTime"),
            Self::DateTime64(scale) => write!(f, "DateTime64({scale})"),
            Self::String => write!(f, "String"),
        }
    }
}

/// Data type with nullability and dictionary encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub kind: DataTypeKind,
    pub nullable: bool,
    pub low_cardinality: bool,
}

impl std::fmt::Debug for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.low_cardinality {
            write!(f, "LowCardinality(")?;
        }
        if self.nullable {
            write!(f, "Nullable({})", self.kind)?;
        } else {
            write!(f, "{}", self.kind)?;
        }
        if self.low_cardinality {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl DataType {
    pub const fn new(kind: DataTypeKind, nullable: bool) -> DataType {
        DataType {
            kind,
            nullable,
            low_cardinality: false,
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn kind(&self) -> DataTypeKind {
        self.kind
    }

    /// Mark the type as dictionary-encoded.
    pub const fn low_cardinality(mut self) -> DataType {
        self.low_cardinality = true;
        self
    }

    pub fn remove_nullable(mut self) -> DataType {
        self.nullable = false;
        self
    }

    pub fn remove_low_cardinality(mut self) -> DataType {
        self.low_cardinality = false;
        self
    }

    /// Whether the type may be wrapped into a nullable type.
    pub fn can_be_inside_nullable(&self) -> bool {
        !self.low_cardinality && !self.nullable
    }

    /// Byte width of the native representation, or `None` for strings.
    pub fn fixed_width(&self) -> Option<usize> {
        self.kind.fixed_width()
    }
}

/// The extension methods for [`DataType`].
pub trait DataTypeExt {
    fn nullable(self) -> DataType;
    fn not_null(self) -> DataType;
}

impl DataTypeExt for DataTypeKind {
    fn nullable(self) -> DataType {
        DataType::new(self, true)
    }

    fn not_null(self) -> DataType {
        DataType::new(self, false)
    }
}
