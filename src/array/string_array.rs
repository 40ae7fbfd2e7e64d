// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

use std::iter::FromIterator;

use bitvec::vec::BitVec;
use serde::{Deserialize, Serialize};

use super::{Array, ArrayBuilder, ArrayEstimateExt, ArrayValidExt};

/// A collection of variable-length UTF-8 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringArray {
    offset: Vec<usize>,
    valid: BitVec,
    data: Vec<u8>,
}

impl Array for StringArray {
    type Item = str;
    type Builder = StringArrayBuilder;

    fn get(&self, idx: usize) -> Option<&str> {
        if self.valid[idx] {
            let data_slice = &self.data[self.offset[idx]..self.offset[idx + 1]];
            Some(unsafe { std::str::from_utf8_unchecked(data_slice) })
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        self.valid.len()
    }
}

impl StringArray {
    /// The stored bytes at `idx`, ignoring validity. Rows marked invalid
    /// hold an empty run.
    pub fn raw_bytes(&self, idx: usize) -> &[u8] {
        &self.data[self.offset[idx]..self.offset[idx + 1]]
    }
}

impl ArrayValidExt for StringArray {
    fn get_valid_bitmap(&self) -> &BitVec {
        &self.valid
    }
}

impl ArrayEstimateExt for StringArray {
    fn get_estimated_size(&self) -> usize {
        self.data.len() + self.offset.len() * std::mem::size_of::<usize>() + self.valid.len() / 8
    }
}

/// A builder that uses `&str` to build a [`StringArray`].
pub struct StringArrayBuilder {
    offset: Vec<usize>,
    valid: BitVec,
    data: Vec<u8>,
}

impl ArrayBuilder for StringArrayBuilder {
    type Array = StringArray;

    fn with_capacity(capacity: usize) -> Self {
        let mut offset = Vec::with_capacity(capacity + 1);
        offset.push(0);
        Self {
            offset,
            valid: BitVec::with_capacity(capacity),
            data: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, value: Option<&str>) {
        self.valid.push(value.is_some());
        if let Some(x) = value {
            self.data.extend_from_slice(x.as_bytes());
        }
        self.offset.push(self.data.len());
    }

    fn append(&mut self, other: &StringArray) {
        self.valid.extend_from_bitslice(&other.valid);
        self.data.extend_from_slice(&other.data);
        let start = *self.offset.last().unwrap();
        for other_offset in &other.offset[1..] {
            self.offset.push(*other_offset + start);
        }
    }

    fn finish(self) -> StringArray {
        StringArray {
            offset: self.offset,
            valid: self.valid,
            data: self.data,
        }
    }
}

// Enable `collect()` an array from iterator of `Option<&str>` or `Option<String>`.
impl<S: AsRef<str>> FromIterator<Option<S>> for StringArray {
    fn from_iter<I: IntoIterator<Item = Option<S>>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut builder = StringArrayBuilder::with_capacity(iter.size_hint().0);
        for e in iter {
            builder.push(e.as_ref().map(|s| s.as_ref()));
        }
        builder.finish()
    }
}
