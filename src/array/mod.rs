// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! In-memory column representation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Bound, RangeBounds};

use crate::types::{DataType, DataTypeKind, DataValue, Date, DateTime, DateTime64, F64};

mod column;
mod data_chunk;
mod internal_ext;
mod iterator;
pub mod ops;
mod primitive_array;
mod shuffle_ext;
mod string_array;

pub use self::column::*;
pub use self::data_chunk::*;
pub use self::internal_ext::*;
pub use self::iterator::ArrayIter;
pub use self::ops::CastCache;
pub use self::primitive_array::*;
pub use self::shuffle_ext::*;
pub use self::string_array::*;

/// A trait over all array builders.
///
/// `ArrayBuilder` is a trait over all builders. You could build an array with
/// `push` with the help of `ArrayBuilder` trait. The `push` function always
/// accepts reference to an element. e.g. for `PrimitiveArray`,
/// you must do `builder.push(Some(&1))`. For `StringArray`, you must do
/// `builder.push(Some("xxx"))`. Note that you don't need to construct a `String`.
///
/// The associated type `Array` is the type of the corresponding array. It is the
/// return type of `finish`.
pub trait ArrayBuilder: Send + Sync + 'static {
    /// Corresponding `Array` of this builder.
    type Array: Array<Builder = Self>;

    /// Create a new builder with `capacity`.
    fn with_capacity(capacity: usize) -> Self;

    /// Append a value to builder.
    fn push(&mut self, value: Option<&<Self::Array as Array>::Item>);

    /// Append an array to builder.
    fn append(&mut self, other: &Self::Array);

    /// Finish build and return a new array.
    fn finish(self) -> Self::Array;
}

/// A trait over all array.
///
/// `Array` must be built with an `ArrayBuilder`. The array trait provides several
/// unified interface on an array, like `len`, `get` and `iter`.
///
/// The `Builder` associated type is the builder for this array.
/// The `Item` is the item you could retrieve from this array.
///
/// For example, `PrimitiveArray` could return an `Option<&u32>`, and `StringArray`
/// will return an `Option<&str>`.
pub trait Array: Sized + Send + Sync + 'static {
    /// Corresponding builder of this array.
    type Builder: ArrayBuilder<Array = Self>;

    /// Type of element in the array.
    type Item: ToOwned + ?Sized;

    /// Retrieve a reference to value.
    fn get(&self, idx: usize) -> Option<&Self::Item>;

    /// Number of items of array.
    fn len(&self) -> usize;

    /// Get iterator of current array.
    fn iter(&self) -> ArrayIter<'_, Self> {
        ArrayIter::new(self)
    }

    /// Check if `Array` is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An extension trait for [`Array`].
pub trait ArrayExt: Array {
    /// Filter the elements and return a new array.
    fn filter(&self, visibility: impl Iterator<Item = bool>) -> Self;

    /// Return a slice of self for the provided range.
    fn slice(&self, range: impl RangeBounds<usize>) -> Self;
}

impl<A: Array> ArrayExt for A {
    fn filter(&self, visibility: impl Iterator<Item = bool>) -> Self {
        let mut builder = Self::Builder::with_capacity(self.len());
        for (a, visible) in self.iter().zip(visibility) {
            if visible {
                builder.push(a);
            }
        }
        builder.finish()
    }

    fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let len = self.len();
        let begin = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => len,
        };
        assert!(begin <= end, "range start must not be greater than end");
        assert!(end <= len, "range end out of bounds");

        let mut builder = Self::Builder::with_capacity(end - begin);
        for i in begin..end {
            builder.push(self.get(i));
        }
        builder.finish()
    }
}

pub type BoolArray = PrimitiveArray<bool>;
pub type I16Array = PrimitiveArray<i16>;
pub type I32Array = PrimitiveArray<i32>;
pub type I64Array = PrimitiveArray<i64>;
pub type F64Array = PrimitiveArray<F64>;
pub type DecimalArray = PrimitiveArray<Decimal>;
pub type DateArray = PrimitiveArray<Date>;
pub type DateTimeArray = PrimitiveArray<DateTime>;
pub type DateTime64Array = PrimitiveArray<DateTime64>;

pub type BoolArrayBuilder = PrimitiveArrayBuilder<bool>;
pub type I16ArrayBuilder = PrimitiveArrayBuilder<i16>;
pub type I32ArrayBuilder = PrimitiveArrayBuilder<i32>;
pub type I64ArrayBuilder = PrimitiveArrayBuilder<i64>;
pub type F64ArrayBuilder = PrimitiveArrayBuilder<F64>;
pub type DecimalArrayBuilder = PrimitiveArrayBuilder<Decimal>;
pub type DateArrayBuilder = PrimitiveArrayBuilder<Date>;
pub type DateTimeArrayBuilder = PrimitiveArrayBuilder<DateTime>;
pub type DateTime64ArrayBuilder = PrimitiveArrayBuilder<DateTime64>;

/// Invoke a macro with the list of all array variants.
///
/// Each entry is `{ Abc, Type, abc, AbcArray, AbcArrayBuilder, Value }` where
/// `Abc` is the variant name of [`ArrayImpl`], `Type` is the item type of the
/// array, and `Value` is the variant name of [`DataValue`].
#[macro_export]
macro_rules! for_all_variants {
    ($macro:ident $(, $x:tt)*) => {
        $macro! {
            [$($x),*],
            { Bool, bool, bool, BoolArray, BoolArrayBuilder, Bool },
            { Int16, i16, int16, I16Array, I16ArrayBuilder, Int16 },
            { Int32, i32, int32, I32Array, I32ArrayBuilder, Int32 },
            { Int64, i64, int64, I64Array, I64ArrayBuilder, Int64 },
            { Float64, F64, float64, F64Array, F64ArrayBuilder, Float64 },
            { Decimal, Decimal, decimal, DecimalArray, DecimalArrayBuilder, Decimal },
            { Date, Date, date, DateArray, DateArrayBuilder, Date },
            { DateTime, DateTime, datetime, DateTimeArray, DateTimeArrayBuilder, DateTime },
            { DateTime64, DateTime64, datetime64, DateTime64Array, DateTime64ArrayBuilder, DateTime64 },
            { String, str, string, StringArray, StringArrayBuilder, String }
        }
    };
}

/// Embeds all types of arrays in `array` module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayImpl {
    Bool(BoolArray),
    Int16(I16Array),
    Int32(I32Array),
    Int64(I64Array),
    Float64(F64Array),
    Decimal(DecimalArray),
    Date(DateArray),
    DateTime(DateTimeArray),
    DateTime64(DateTime64Array),
    String(StringArray),
}

/// Embeds all types of array builders in `array` module.
pub enum ArrayBuilderImpl {
    Bool(BoolArrayBuilder),
    Int16(I16ArrayBuilder),
    Int32(I32ArrayBuilder),
    Int64(I64ArrayBuilder),
    Float64(F64ArrayBuilder),
    Decimal(DecimalArrayBuilder),
    Date(DateArrayBuilder),
    DateTime(DateTimeArrayBuilder),
    DateTime64(DateTime64ArrayBuilder),
    String(StringArrayBuilder),
}

/// An error which can be returned when downcasting an [`ArrayImpl`] into a concrete type array.
#[derive(Debug, Clone)]
pub struct TypeMismatch;

macro_rules! impl_into {
    ([], $( { $Abc:ident, $Type:ty, $abc:ident, $AbcArray:ty, $AbcArrayBuilder:ty, $Value:ident } ),*) => {
        $(
            impl From<$AbcArray> for ArrayImpl {
                fn from(array: $AbcArray) -> Self {
                    Self::$Abc(array)
                }
            }

            impl<'a> TryFrom<&'a ArrayImpl> for &'a $AbcArray {
                type Error = TypeMismatch;

                fn try_from(array: &'a ArrayImpl) -> Result<Self, Self::Error> {
                    match array {
                        ArrayImpl::$Abc(array) => Ok(array),
                        _ => Err(TypeMismatch),
                    }
                }
            }
        )*
    }
}

for_all_variants! { impl_into }

macro_rules! impl_array_builder_impl {
    ([], $( { $Abc:ident, $Type:ty, $abc:ident, $AbcArray:ty, $AbcArrayBuilder:ty, $Value:ident } ),*) => {
        impl ArrayBuilderImpl {
            /// Create a new array builder from data type.
            pub fn with_capacity(capacity: usize, ty: &DataType) -> Self {
                match ty.kind() {
                    DataTypeKind::Bool => Self::Bool(BoolArrayBuilder::with_capacity(capacity)),
                    DataTypeKind::Int16 => Self::Int16(I16ArrayBuilder::with_capacity(capacity)),
                    DataTypeKind::Int32 => Self::Int32(I32ArrayBuilder::with_capacity(capacity)),
                    DataTypeKind::Int64 => Self::Int64(I64ArrayBuilder::with_capacity(capacity)),
                    DataTypeKind::Float64 => Self::Float64(F64ArrayBuilder::with_capacity(capacity)),
                    DataTypeKind::Decimal => Self::Decimal(DecimalArrayBuilder::with_capacity(capacity)),
                    DataTypeKind::Date => Self::Date(DateArrayBuilder::with_capacity(capacity)),
                    DataTypeKind::DateTime => Self::DateTime(DateTimeArrayBuilder::with_capacity(capacity)),
                    DataTypeKind::DateTime64(_) => {
                        Self::DateTime64(DateTime64ArrayBuilder::with_capacity(capacity))
                    }
                    DataTypeKind::String => Self::String(StringArrayBuilder::with_capacity(capacity)),
                }
            }

            /// Create a new array builder with the same type of given array.
            pub fn from_type_of_array(array: &ArrayImpl) -> Self {
                match array {
                    $(
                        ArrayImpl::$Abc(_) => Self::$Abc(<$AbcArrayBuilder>::with_capacity(0)),
                    )*
                }
            }

            /// Appends an element to the back of array.
            pub fn push(&mut self, v: &DataValue) {
                match (self, v) {
                    $(
                        (Self::$Abc(a), DataValue::$Value(v)) => a.push(Some(v)),
                        (Self::$Abc(a), DataValue::Null) => a.push(None),
                    )*
                    _ => panic!("failed to push value: type mismatch"),
                }
            }

            /// Appends an element `n` times.
            pub fn push_n(&mut self, n: usize, v: &DataValue) {
                for _ in 0..n {
                    self.push(v);
                }
            }

            /// Appends an [`ArrayImpl`].
            pub fn append(&mut self, array: &ArrayImpl) {
                match (self, array) {
                    $(
                        (Self::$Abc(builder), ArrayImpl::$Abc(arr)) => builder.append(arr),
                    )*
                    _ => panic!("failed to append array: type mismatch"),
                }
            }

            /// Finish build and return a new array.
            pub fn finish(self) -> ArrayImpl {
                match self {
                    $(
                        Self::$Abc(a) => ArrayImpl::$Abc(a.finish()),
                    )*
                }
            }
        }
    }
}

for_all_variants! { impl_array_builder_impl }

macro_rules! impl_array_impl {
    ([], $( { $Abc:ident, $Type:ty, $abc:ident, $AbcArray:ty, $AbcArrayBuilder:ty, $Value:ident } ),*) => {
        impl ArrayImpl {
            /// Get the value at the given index.
            pub fn get(&self, idx: usize) -> DataValue {
                match self {
                    $(
                        Self::$Abc(a) => match a.get(idx) {
                            Some(val) => DataValue::$Value(val.to_owned()),
                            None => DataValue::Null,
                        },
                    )*
                }
            }

            /// Number of items of array.
            pub fn len(&self) -> usize {
                match self {
                    $(
                        Self::$Abc(a) => a.len(),
                    )*
                }
            }

            /// Check if array is empty.
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Filter the elements and return a new array.
            pub fn filter(&self, visibility: impl Iterator<Item = bool>) -> Self {
                match self {
                    $(
                        Self::$Abc(a) => Self::$Abc(a.filter(visibility)),
                    )*
                }
            }

            /// Name of the element type, for error messages.
            pub fn type_string(&self) -> &'static str {
                match self {
                    $(
                        Self::$Abc(_) => stringify!($Abc),
                    )*
                }
            }
        }

        impl ArrayImplValidExt for ArrayImpl {
            fn get_valid_bitmap(&self) -> &bitvec::vec::BitVec {
                match self {
                    $(
                        Self::$Abc(a) => a.get_valid_bitmap(),
                    )*
                }
            }
        }

        impl ArrayImplEstimateExt for ArrayImpl {
            fn get_estimated_size(&self) -> usize {
                match self {
                    $(
                        Self::$Abc(a) => a.get_estimated_size(),
                    )*
                }
            }
        }
    }
}

for_all_variants! { impl_array_impl }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataTypeExt;

    #[test]
    fn test_filter() {
        let array: I32Array = (0..=60).map(Some).collect();
        let filtered = array.filter((0..=60).map(|x| x >= 60));
        assert_eq!(
            filtered.iter().map(|x| x.cloned()).collect::<Vec<_>>(),
            vec![Some(60)]
        );
    }

    #[test]
    fn test_builder_impl_push() {
        let mut builder =
            ArrayBuilderImpl::with_capacity(4, &DataTypeKind::Int64.nullable());
        builder.push(&DataValue::Int64(1));
        builder.push(&DataValue::Null);
        builder.push_n(2, &DataValue::Int64(7));
        let array = builder.finish();
        assert_eq!(array.len(), 4);
        assert_eq!(array.get(0), DataValue::Int64(1));
        assert_eq!(array.get(1), DataValue::Null);
        assert_eq!(array.get(3), DataValue::Int64(7));
    }

    #[test]
    #[should_panic(expected = "type mismatch")]
    fn test_builder_impl_type_mismatch() {
        let mut builder =
            ArrayBuilderImpl::with_capacity(1, &DataTypeKind::Int64.not_null());
        builder.push(&DataValue::String("oops".into()));
    }
}
