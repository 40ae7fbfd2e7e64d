// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! Provide utilities to access the internal states of the [`Array`].

use bitvec::vec::BitVec;

use super::Array;

pub trait ArrayValidExt: Array {
    fn get_valid_bitmap(&self) -> &BitVec;
}

pub trait ArrayImplValidExt {
    fn get_valid_bitmap(&self) -> &BitVec;
}

pub trait ArrayEstimateExt: Array {
    /// Get estimated size of the array in memory.
    fn get_estimated_size(&self) -> usize;
}

pub trait ArrayImplEstimateExt {
    /// Get estimated size of the array in memory.
    fn get_estimated_size(&self) -> usize;
}
