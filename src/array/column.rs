// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! Block column encodings.
//!
//! A [`Column`] is an array together with its physical encoding. Constant
//! and dictionary-encoded columns must be materialized to full arrays
//! before hashing; the set layer calls [`Column::to_full`] for that.

use std::borrow::Cow;

use super::{ArrayBuilderImpl, ArrayImpl, ArrayImplBuilderPickExt};
use crate::types::DataType;

/// A column of a block, in one of the physical encodings.
#[derive(Debug, Clone)]
pub enum Column {
    /// A fully materialized array.
    Full(ArrayImpl),
    /// A single value repeated `len` times. The value lives in a one-row
    /// array so that its physical type is known even for NULL.
    Const { data: ArrayImpl, len: usize },
    /// A dictionary-encoded (low-cardinality) column: `keys[i]` indexes
    /// into the distinct `values` array.
    Dict { keys: Vec<u32>, values: ArrayImpl },
}

impl Column {
    /// Number of rows of the column.
    pub fn len(&self) -> usize {
        match self {
            Self::Full(a) => a.len(),
            Self::Const { len, .. } => *len,
            Self::Dict { keys, .. } => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialize a constant column into a full array; full and
    /// dictionary columns are passed through.
    pub fn to_full_if_const(&self) -> Cow<'_, Column> {
        match self {
            Self::Const { data, len } => {
                let mut builder = ArrayBuilderImpl::from_type_of_array(data);
                builder.push_n(*len, &data.get(0));
                Cow::Owned(Column::Full(builder.finish()))
            }
            _ => Cow::Borrowed(self),
        }
    }

    /// Materialize a dictionary column into a full array; other encodings
    /// are passed through.
    pub fn to_full_if_low_cardinality(&self) -> Cow<'_, Column> {
        match self {
            Self::Dict { keys, values } => {
                let mut builder = ArrayBuilderImpl::from_type_of_array(values);
                let rows: Vec<usize> = keys.iter().map(|&k| k as usize).collect();
                builder.pick_from(values, &rows);
                Cow::Owned(Column::Full(builder.finish()))
            }
            _ => Cow::Borrowed(self),
        }
    }

    /// Materialize any encoding into a full array.
    pub fn to_full(&self) -> Cow<'_, ArrayImpl> {
        let full = match self {
            Self::Full(a) => return Cow::Borrowed(a),
            Self::Const { .. } => self.to_full_if_const(),
            Self::Dict { .. } => self.to_full_if_low_cardinality(),
        };
        match full.into_owned() {
            Column::Full(a) => Cow::Owned(a),
            _ => unreachable!("materialization must produce a full column"),
        }
    }
}

impl From<ArrayImpl> for Column {
    fn from(array: ArrayImpl) -> Self {
        Column::Full(array)
    }
}

/// A column paired with its declared data type.
#[derive(Debug, Clone)]
pub struct ColumnWithType {
    pub column: Column,
    pub ty: DataType,
}

impl ColumnWithType {
    pub fn new(column: Column, ty: DataType) -> Self {
        ColumnWithType { column, ty }
    }

    pub fn full(array: ArrayImpl, ty: DataType) -> Self {
        ColumnWithType {
            column: Column::Full(array),
            ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::I64Array;
    use crate::types::DataValue;

    #[test]
    fn test_const_to_full() {
        let col = Column::Const {
            data: ArrayImpl::Int64([Some(7)].into_iter().collect()),
            len: 3,
        };
        let full = col.to_full();
        assert_eq!(full.len(), 3);
        assert_eq!(full.get(2), DataValue::Int64(7));
    }

    #[test]
    fn test_dict_to_full() {
        let values: I64Array = [Some(10), Some(20)].into_iter().collect();
        let col = Column::Dict {
            keys: vec![1, 0, 1, 1],
            values: ArrayImpl::Int64(values),
        };
        let full = col.to_full();
        assert_eq!(full.len(), 4);
        assert_eq!(full.get(0), DataValue::Int64(20));
        assert_eq!(full.get(1), DataValue::Int64(10));
        assert_eq!(full.get(3), DataValue::Int64(20));
    }

    #[test]
    fn test_const_null_to_full() {
        let col = Column::Const {
            data: ArrayImpl::Int64([None].into_iter().collect()),
            len: 2,
        };
        let full = col.to_full();
        assert_eq!(full.get(0), DataValue::Null);
        assert_eq!(full.get(1), DataValue::Null);
    }
}
