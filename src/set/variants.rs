// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! The closed family of physical hash-set layouts.
//!
//! The layout is chosen once per set from the key column signature and is
//! immutable afterwards. Dispatch happens once per block; the inner loops
//! are monomorphized over the key image type.

use std::hash::Hash;

use ahash::RandomState;
use hashbrown::hash_table::HashTable;
use hashbrown::HashSet;

use crate::array::{ArrayImpl, ArrayImplValidExt};
use crate::types::DataType;

/// A hash set over fixed-width key images.
pub struct BitsKeySet<B> {
    set: HashSet<B, RandomState>,
}

impl<B: Copy + Eq + Hash> BitsKeySet<B> {
    fn new() -> Self {
        BitsKeySet {
            set: HashSet::with_hasher(RandomState::new()),
        }
    }

    fn insert_rows(
        &mut self,
        key: impl Fn(usize) -> B,
        rows: usize,
        null_map: Option<&[u8]>,
        mut filter: Option<&mut [u8]>,
    ) {
        for i in 0..rows {
            if let Some(null_map) = null_map {
                if null_map[i] != 0 {
                    if let Some(filter) = filter.as_deref_mut() {
                        filter[i] = 0;
                    }
                    continue;
                }
            }
            let inserted = self.set.insert(key(i));
            if let Some(filter) = filter.as_deref_mut() {
                filter[i] = inserted as u8;
            }
        }
    }

    fn find_rows(
        &self,
        key: impl Fn(usize) -> B,
        rows: usize,
        negate: bool,
        null_map: Option<&[u8]>,
        out: &mut [u8],
    ) {
        for i in 0..rows {
            if null_map.is_some_and(|m| m[i] != 0) {
                out[i] = negate as u8;
            } else {
                out[i] = (negate ^ self.set.contains(&key(i))) as u8;
            }
        }
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn byte_count(&self) -> usize {
        self.set.capacity() * std::mem::size_of::<B>()
    }
}

#[derive(Clone, Copy)]
struct ArenaEntry {
    hash: u64,
    offset: u32,
    len: u32,
}

/// A hash set over variable-length byte keys. The key bytes live in an
/// arena owned by the set; table entries hold offsets into the arena,
/// never owning references.
pub struct ArenaKeySet {
    table: HashTable<ArenaEntry>,
    arena: Vec<u8>,
    state: RandomState,
}

impl ArenaKeySet {
    fn new() -> Self {
        ArenaKeySet {
            table: HashTable::new(),
            arena: Vec::new(),
            state: RandomState::new(),
        }
    }

    fn emplace(&mut self, bytes: &[u8]) -> bool {
        let hash = self.state.hash_one(bytes);
        let Self { table, arena, .. } = self;
        let found = table
            .find(hash, |e| {
                e.hash == hash && &arena[e.offset as usize..(e.offset + e.len) as usize] == bytes
            })
            .is_some();
        if found {
            return false;
        }
        let entry = ArenaEntry {
            hash,
            offset: arena.len() as u32,
            len: bytes.len() as u32,
        };
        arena.extend_from_slice(bytes);
        table.insert_unique(hash, entry, |e| e.hash);
        true
    }

    fn contains(&self, bytes: &[u8]) -> bool {
        let hash = self.state.hash_one(bytes);
        self.table
            .find(hash, |e| {
                e.hash == hash
                    && &self.arena[e.offset as usize..(e.offset + e.len) as usize] == bytes
            })
            .is_some()
    }

    fn insert_rows(
        &mut self,
        serialize: impl Fn(usize, &mut Vec<u8>),
        rows: usize,
        null_map: Option<&[u8]>,
        mut filter: Option<&mut [u8]>,
    ) {
        let mut scratch = Vec::new();
        for i in 0..rows {
            if let Some(null_map) = null_map {
                if null_map[i] != 0 {
                    if let Some(filter) = filter.as_deref_mut() {
                        filter[i] = 0;
                    }
                    continue;
                }
            }
            scratch.clear();
            serialize(i, &mut scratch);
            let inserted = self.emplace(&scratch);
            if let Some(filter) = filter.as_deref_mut() {
                filter[i] = inserted as u8;
            }
        }
    }

    fn find_rows(
        &self,
        serialize: impl Fn(usize, &mut Vec<u8>),
        rows: usize,
        negate: bool,
        null_map: Option<&[u8]>,
        out: &mut [u8],
    ) {
        let mut scratch = Vec::new();
        for i in 0..rows {
            if null_map.is_some_and(|m| m[i] != 0) {
                out[i] = negate as u8;
            } else {
                scratch.clear();
                serialize(i, &mut scratch);
                out[i] = (negate ^ self.contains(&scratch)) as u8;
            }
        }
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    fn byte_count(&self) -> usize {
        self.arena.len() + self.table.capacity() * std::mem::size_of::<ArenaEntry>()
    }
}

/// Serialized multi-key tuples carry the element types to drive the
/// per-component encoding.
pub struct SerializedKeySet {
    types: Vec<DataType>,
    set: ArenaKeySet,
}

/// The closed family of storage layouts.
#[derive(Default)]
pub enum SetVariants {
    /// Degenerate layout of a set that was never given a header.
    #[default]
    Empty,
    /// A single fixed-width key of 1/2/4/8/16 bytes.
    FixedWidth8(BitsKeySet<u8>),
    FixedWidth16(BitsKeySet<u16>),
    FixedWidth32(BitsKeySet<u32>),
    FixedWidth64(BitsKeySet<u64>),
    FixedWidth128(BitsKeySet<u128>),
    /// A single variable-width string key.
    StringKeys(ArenaKeySet),
    /// Multiple fixed-width keys bit-packed into one integer image.
    Packed64(BitsKeySet<u64>),
    Packed128(BitsKeySet<u128>),
    Packed256(BitsKeySet<[u8; 32]>),
    /// Everything else: each tuple serialized into an arena byte run.
    SerializedKeys(SerializedKeySet),
}

impl SetVariants {
    /// Choose the layout for the given element types. The choice is a
    /// deterministic function of the signature.
    pub fn choose(element_types: &[DataType]) -> SetVariants {
        if element_types.is_empty() {
            return SetVariants::Empty;
        }
        // A bit image cannot tell NULL from zero, so nullable keys (which
        // occur only under transform_null_in) are serialized with a
        // per-component null tag.
        if element_types.iter().any(|t| t.is_nullable()) {
            return Self::serialized(element_types);
        }
        if element_types.len() == 1 {
            return match element_types[0].fixed_width() {
                Some(1) => SetVariants::FixedWidth8(BitsKeySet::new()),
                Some(2) => SetVariants::FixedWidth16(BitsKeySet::new()),
                Some(4) => SetVariants::FixedWidth32(BitsKeySet::new()),
                Some(8) => SetVariants::FixedWidth64(BitsKeySet::new()),
                Some(16) => SetVariants::FixedWidth128(BitsKeySet::new()),
                Some(w) => panic!("unexpected key width: {w}"),
                None => SetVariants::StringKeys(ArenaKeySet::new()),
            };
        }
        match element_types
            .iter()
            .map(|t| t.fixed_width())
            .sum::<Option<usize>>()
        {
            Some(w) if w <= 8 => SetVariants::Packed64(BitsKeySet::new()),
            Some(w) if w <= 16 => SetVariants::Packed128(BitsKeySet::new()),
            Some(w) if w <= 32 => SetVariants::Packed256(BitsKeySet::new()),
            _ => Self::serialized(element_types),
        }
    }

    fn serialized(element_types: &[DataType]) -> SetVariants {
        SetVariants::SerializedKeys(SerializedKeySet {
            types: element_types.to_vec(),
            set: ArenaKeySet::new(),
        })
    }

    /// Name of the layout, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::FixedWidth8(_) => "fixed_width_8",
            Self::FixedWidth16(_) => "fixed_width_16",
            Self::FixedWidth32(_) => "fixed_width_32",
            Self::FixedWidth64(_) => "fixed_width_64",
            Self::FixedWidth128(_) => "fixed_width_128",
            Self::StringKeys(_) => "string_keys",
            Self::Packed64(_) => "packed_64",
            Self::Packed128(_) => "packed_128",
            Self::Packed256(_) => "packed_256",
            Self::SerializedKeys(_) => "serialized_keys",
        }
    }

    /// Bulk-insert the rows of a block. Rows marked in `null_map` are
    /// skipped; when `filter` is given, `filter[i]` is set to 1 iff row `i`
    /// inserted a previously unseen tuple.
    pub fn insert_block(
        &mut self,
        keys: &[&ArrayImpl],
        rows: usize,
        null_map: Option<&[u8]>,
        filter: Option<&mut [u8]>,
    ) {
        match self {
            Self::Empty => {}
            Self::FixedWidth8(s) => {
                s.insert_rows(|i| pack::<1>(keys, i)[0], rows, null_map, filter)
            }
            Self::FixedWidth16(s) => s.insert_rows(
                |i| u16::from_le_bytes(pack::<2>(keys, i)),
                rows,
                null_map,
                filter,
            ),
            Self::FixedWidth32(s) => s.insert_rows(
                |i| u32::from_le_bytes(pack::<4>(keys, i)),
                rows,
                null_map,
                filter,
            ),
            Self::FixedWidth64(s) | Self::Packed64(s) => s.insert_rows(
                |i| u64::from_le_bytes(pack::<8>(keys, i)),
                rows,
                null_map,
                filter,
            ),
            Self::FixedWidth128(s) | Self::Packed128(s) => s.insert_rows(
                |i| u128::from_le_bytes(pack::<16>(keys, i)),
                rows,
                null_map,
                filter,
            ),
            Self::Packed256(s) => s.insert_rows(|i| pack::<32>(keys, i), rows, null_map, filter),
            Self::StringKeys(s) => s.insert_rows(
                |i, out| serialize_string(keys[0], i, out),
                rows,
                null_map,
                filter,
            ),
            Self::SerializedKeys(s) => {
                let types = &s.types;
                s.set.insert_rows(
                    |i, out| serialize_row(keys, types, i, out),
                    rows,
                    null_map,
                    filter,
                )
            }
        }
    }

    /// Bulk-probe the rows of a block, writing `negate XOR found` into
    /// `out`. Rows marked in `null_map` receive `negate` without probing.
    pub fn find_block(
        &self,
        keys: &[&ArrayImpl],
        rows: usize,
        negate: bool,
        null_map: Option<&[u8]>,
        out: &mut [u8],
    ) {
        match self {
            // A set that was never built answers `negate` everywhere, the
            // same as the never-built fast path of `Set::execute`.
            Self::Empty => out[..rows].fill(negate as u8),
            Self::FixedWidth8(s) => {
                s.find_rows(|i| pack::<1>(keys, i)[0], rows, negate, null_map, out)
            }
            Self::FixedWidth16(s) => s.find_rows(
                |i| u16::from_le_bytes(pack::<2>(keys, i)),
                rows,
                negate,
                null_map,
                out,
            ),
            Self::FixedWidth32(s) => s.find_rows(
                |i| u32::from_le_bytes(pack::<4>(keys, i)),
                rows,
                negate,
                null_map,
                out,
            ),
            Self::FixedWidth64(s) | Self::Packed64(s) => s.find_rows(
                |i| u64::from_le_bytes(pack::<8>(keys, i)),
                rows,
                negate,
                null_map,
                out,
            ),
            Self::FixedWidth128(s) | Self::Packed128(s) => s.find_rows(
                |i| u128::from_le_bytes(pack::<16>(keys, i)),
                rows,
                negate,
                null_map,
                out,
            ),
            Self::Packed256(s) => {
                s.find_rows(|i| pack::<32>(keys, i), rows, negate, null_map, out)
            }
            Self::StringKeys(s) => s.find_rows(
                |i, out| serialize_string(keys[0], i, out),
                rows,
                negate,
                null_map,
                out,
            ),
            Self::SerializedKeys(s) => {
                let types = &s.types;
                s.set.find_rows(
                    |i, out| serialize_row(keys, types, i, out),
                    rows,
                    negate,
                    null_map,
                    out,
                )
            }
        }
    }

    /// Number of distinct tuples stored.
    pub fn row_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::FixedWidth8(s) => s.len(),
            Self::FixedWidth16(s) => s.len(),
            Self::FixedWidth32(s) => s.len(),
            Self::FixedWidth64(s) | Self::Packed64(s) => s.len(),
            Self::FixedWidth128(s) | Self::Packed128(s) => s.len(),
            Self::Packed256(s) => s.len(),
            Self::StringKeys(s) => s.len(),
            Self::SerializedKeys(s) => s.set.len(),
        }
    }

    /// Estimated bytes held by the layout.
    pub fn byte_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::FixedWidth8(s) => s.byte_count(),
            Self::FixedWidth16(s) => s.byte_count(),
            Self::FixedWidth32(s) => s.byte_count(),
            Self::FixedWidth64(s) | Self::Packed64(s) => s.byte_count(),
            Self::FixedWidth128(s) | Self::Packed128(s) => s.byte_count(),
            Self::Packed256(s) => s.byte_count(),
            Self::StringKeys(s) => s.byte_count(),
            Self::SerializedKeys(s) => s.set.byte_count(),
        }
    }
}

/// Write the fixed-width little-endian image of the value at `row` into
/// `buf`, returning the width.
fn write_fixed(array: &ArrayImpl, row: usize, buf: &mut [u8]) -> usize {
    match array {
        ArrayImpl::Bool(a) => {
            buf[0] = a.raw_value(row) as u8;
            1
        }
        ArrayImpl::Int16(a) => {
            buf[..2].copy_from_slice(&a.raw_value(row).to_le_bytes());
            2
        }
        ArrayImpl::Int32(a) => {
            buf[..4].copy_from_slice(&a.raw_value(row).to_le_bytes());
            4
        }
        ArrayImpl::Int64(a) => {
            buf[..8].copy_from_slice(&a.raw_value(row).to_le_bytes());
            8
        }
        ArrayImpl::Float64(a) => {
            buf[..8].copy_from_slice(&a.raw_value(row).0.to_bits().to_le_bytes());
            8
        }
        ArrayImpl::Decimal(a) => {
            buf[..16].copy_from_slice(&a.raw_value(row).serialize());
            16
        }
        ArrayImpl::Date(a) => {
            buf[..4].copy_from_slice(&a.raw_value(row).num_days().to_le_bytes());
            4
        }
        ArrayImpl::DateTime(a) => {
            buf[..8].copy_from_slice(&a.raw_value(row).timestamp().to_le_bytes());
            8
        }
        ArrayImpl::DateTime64(a) => {
            buf[..8].copy_from_slice(&a.raw_value(row).ticks().to_le_bytes());
            8
        }
        ArrayImpl::String(_) => panic!("string key in fixed-width layout"),
    }
}

/// Bit-pack the fixed-width keys of `row` into one `N`-byte image,
/// zero-padded on the right.
fn pack<const N: usize>(keys: &[&ArrayImpl], row: usize) -> [u8; N] {
    let mut buf = [0u8; N];
    let mut pos = 0;
    for key in keys {
        pos += write_fixed(key, row, &mut buf[pos..]);
    }
    buf
}

fn serialize_string(array: &ArrayImpl, row: usize, out: &mut Vec<u8>) {
    match array {
        ArrayImpl::String(a) => out.extend_from_slice(a.raw_bytes(row)),
        _ => panic!("expected a string key column"),
    }
}

/// Serialize the tuple at `row` into `out`. Nullable components carry a
/// leading tag byte; string components are length-prefixed so that tuple
/// boundaries stay unambiguous.
fn serialize_row(keys: &[&ArrayImpl], types: &[DataType], row: usize, out: &mut Vec<u8>) {
    for (key, ty) in keys.iter().zip(types.iter()) {
        if ty.is_nullable() {
            let is_null = !key.get_valid_bitmap()[row];
            out.push(is_null as u8);
            if is_null {
                continue;
            }
        }
        match key {
            ArrayImpl::String(a) => {
                let bytes = a.raw_bytes(row);
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            _ => {
                let mut buf = [0u8; 16];
                let width = write_fixed(key, row, &mut buf);
                out.extend_from_slice(&buf[..width]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataTypeExt, DataTypeKind};

    fn int64_array(values: &[Option<i64>]) -> ArrayImpl {
        ArrayImpl::Int64(values.iter().copied().collect())
    }

    #[test]
    fn test_choose_is_deterministic() {
        let cases = [
            (vec![], "empty"),
            (vec![DataTypeKind::Bool.not_null()], "fixed_width_8"),
            (vec![DataTypeKind::Int16.not_null()], "fixed_width_16"),
            (vec![DataTypeKind::Date.not_null()], "fixed_width_32"),
            (vec![DataTypeKind::Int64.not_null()], "fixed_width_64"),
            (vec![DataTypeKind::Decimal.not_null()], "fixed_width_128"),
            (vec![DataTypeKind::String.not_null()], "string_keys"),
            (vec![DataTypeKind::Int64.nullable()], "serialized_keys"),
            (
                vec![DataTypeKind::Int32.not_null(), DataTypeKind::Int32.not_null()],
                "packed_64",
            ),
            (
                vec![DataTypeKind::Int64.not_null(), DataTypeKind::Int64.not_null()],
                "packed_128",
            ),
            (
                vec![
                    DataTypeKind::Int64.not_null(),
                    DataTypeKind::Int64.not_null(),
                    DataTypeKind::Int64.not_null(),
                ],
                "packed_256",
            ),
            (
                vec![DataTypeKind::Int64.not_null(), DataTypeKind::String.not_null()],
                "serialized_keys",
            ),
        ];
        for (types, expected) in cases {
            assert_eq!(SetVariants::choose(&types).name(), expected, "{types:?}");
        }
    }

    #[test]
    fn test_empty_variant_answers_negate() {
        let variants = SetVariants::default();
        let mut out = vec![9u8; 2];
        variants.find_block(&[], 2, true, None, &mut out);
        assert_eq!(out, vec![1, 1]);
        variants.find_block(&[], 2, false, None, &mut out);
        assert_eq!(out, vec![0, 0]);
        assert_eq!(variants.row_count(), 0);
    }

    #[test]
    fn test_fixed_width_insert_find() {
        let mut variants = SetVariants::choose(&[DataTypeKind::Int64.not_null()]);
        let build = int64_array(&[Some(1), Some(2), Some(1)]);
        let mut filter = vec![0u8; 3];
        variants.insert_block(&[&build], 3, None, Some(&mut filter));
        assert_eq!(filter, vec![1, 1, 0]);
        assert_eq!(variants.row_count(), 2);
        assert!(variants.byte_count() > 0);

        let probe = int64_array(&[Some(0), Some(1), Some(2)]);
        let mut out = vec![0u8; 3];
        variants.find_block(&[&probe], 3, false, None, &mut out);
        assert_eq!(out, vec![0, 1, 1]);
        variants.find_block(&[&probe], 3, true, None, &mut out);
        assert_eq!(out, vec![1, 0, 0]);
    }

    #[test]
    fn test_null_rows_are_skipped() {
        let mut variants = SetVariants::choose(&[DataTypeKind::Int64.not_null()]);
        let build = int64_array(&[Some(1), None]);
        let null_map = vec![0u8, 1];
        let mut filter = vec![0u8; 2];
        variants.insert_block(&[&build], 2, Some(&null_map), Some(&mut filter));
        assert_eq!(filter, vec![1, 0]);
        // The NULL row holds the default value 0; it must not have been
        // inserted as 0.
        let probe = int64_array(&[Some(0)]);
        let mut out = vec![0u8; 1];
        variants.find_block(&[&probe], 1, false, None, &mut out);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_string_keys() {
        let mut variants = SetVariants::choose(&[DataTypeKind::String.not_null()]);
        let build = ArrayImpl::String([Some("foo"), Some("bar")].into_iter().collect());
        variants.insert_block(&[&build], 2, None, None);
        assert_eq!(variants.row_count(), 2);

        let probe = ArrayImpl::String([Some("bar"), Some("baz")].into_iter().collect());
        let mut out = vec![0u8; 2];
        variants.find_block(&[&probe], 2, false, None, &mut out);
        assert_eq!(out, vec![1, 0]);
    }

    #[test]
    fn test_serialized_nullable_keys() {
        let types = vec![DataTypeKind::Int64.nullable()];
        let mut variants = SetVariants::choose(&types);
        let build = int64_array(&[Some(0), None]);
        variants.insert_block(&[&build], 2, None, None);
        assert_eq!(variants.row_count(), 2);

        // NULL and 0 must stay distinct keys.
        let probe = int64_array(&[Some(0), None, Some(1)]);
        let mut out = vec![0u8; 3];
        variants.find_block(&[&probe], 3, false, None, &mut out);
        assert_eq!(out, vec![1, 1, 0]);
    }

    #[test]
    fn test_packed_multi_key() {
        let types = vec![
            DataTypeKind::Int64.not_null(),
            DataTypeKind::Int64.not_null(),
            DataTypeKind::Int64.not_null(),
        ];
        let mut variants = SetVariants::choose(&types);
        let k0 = int64_array(&[Some(1), Some(1)]);
        let k1 = int64_array(&[Some(2), Some(2)]);
        let k2 = int64_array(&[Some(3), Some(4)]);
        variants.insert_block(&[&k0, &k1, &k2], 2, None, None);
        assert_eq!(variants.row_count(), 2);

        let p0 = int64_array(&[Some(1), Some(1)]);
        let p1 = int64_array(&[Some(2), Some(2)]);
        let p2 = int64_array(&[Some(4), Some(5)]);
        let mut out = vec![0u8; 2];
        variants.find_block(&[&p0, &p1, &p2], 2, false, None, &mut out);
        assert_eq!(out, vec![1, 0]);
    }

    #[test]
    fn test_serialized_tuple_boundaries() {
        // ("ab", "c") and ("a", "bc") must not collide thanks to the
        // length prefix.
        let types = vec![DataTypeKind::String.not_null(), DataTypeKind::String.not_null()];
        let mut variants = SetVariants::choose(&types);
        let k0 = ArrayImpl::String([Some("ab")].into_iter().collect());
        let k1 = ArrayImpl::String([Some("c")].into_iter().collect());
        variants.insert_block(&[&k0, &k1], 1, None, None);

        let p0 = ArrayImpl::String([Some("a")].into_iter().collect());
        let p1 = ArrayImpl::String([Some("bc")].into_iter().collect());
        let mut out = vec![0u8; 1];
        variants.find_block(&[&p0, &p1], 1, false, None, &mut out);
        assert_eq!(out, vec![0]);
    }
}
