// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! Utilities to shuffle [`Array`] content.

use super::*;
use crate::for_all_variants;

/// Append scattered array values into builder.
pub trait ArrayBuilderPickExt: ArrayBuilder {
    /// Pick rows according to `logical_rows` from array to the current builder.
    ///
    /// For example, the `array` contains `[1, 3, 5, 7, 9]`, and `logical_rows` is
    /// `[4, 2, 0]`, then we will append `[9, 5, 1]` to the builder.
    fn pick_from(&mut self, array: &Self::Array, logical_rows: &[usize]) {
        for idx in logical_rows {
            self.push(array.get(*idx));
        }
    }
}

impl<T: ArrayBuilder> ArrayBuilderPickExt for T {}

pub trait ArrayImplBuilderPickExt {
    fn pick_from(&mut self, array: &ArrayImpl, logical_rows: &[usize]);
}

/// Implement dispatch functions for `ArrayImplBuilderPickExt`.
macro_rules! impl_array_impl_shuffle_ext {
    ([], $( { $Abc:ident, $Type:ty, $abc:ident, $AbcArray:ty, $AbcArrayBuilder:ty, $Value:ident } ),*) => {
        impl ArrayImplBuilderPickExt for ArrayBuilderImpl {
            fn pick_from(&mut self, array: &ArrayImpl, logical_rows: &[usize]) {
                match (self, array) {
                    $(
                        (Self::$Abc(builder), ArrayImpl::$Abc(arr)) => {
                            builder.pick_from(arr, logical_rows)
                        }
                    )*
                    _ => panic!("failed to pick values: type mismatch"),
                }
            }
        }
    }
}

for_all_variants! { impl_array_impl_shuffle_ext }
