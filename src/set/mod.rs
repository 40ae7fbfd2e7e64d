// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! The IN-set: a thread-safe hash set over N-tuples of column values.
//!
//! A [`Set`] is built incrementally from column blocks and probed in bulk,
//! producing a boolean column of membership results. One reader-writer lock
//! guards the whole set: writers during build, readers during query and
//! size probes. Readers observe a snapshot bounded by their lock
//! acquisition point; no reader sees a partially inserted block.

use std::sync::atomic::{AtomicBool, Ordering};

use itertools::Itertools;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::array::{
    Array, ArrayBuilderImpl, ArrayImpl, ArrayImplValidExt, CastCache, Column, ColumnWithType,
    DataChunk,
};
use crate::types::{scale_multiplier, DataType, DataTypeKind};

mod error;
mod index;
mod variants;

pub use self::error::{Result, SetError};
pub use self::index::{FieldValue, KeyTuplePositionMapping, OrderedSetIndex};
pub use self::variants::SetVariants;

/// What to do when a size limit is exceeded during build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowMode {
    /// Fail the build with [`SetError::SizeLimitExceeded`].
    #[default]
    Throw,
    /// Stop feeding: `insert_from_columns` returns `false`.
    Break,
}

/// Size limits checked at block boundaries. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetLimits {
    pub max_rows: usize,
    pub max_bytes: usize,
    pub overflow_mode: OverflowMode,
}

impl SetLimits {
    fn check(&self, rows: usize, bytes: usize) -> Result<bool> {
        let fits = (self.max_rows == 0 || rows <= self.max_rows)
            && (self.max_bytes == 0 || bytes <= self.max_bytes);
        if fits {
            return Ok(true);
        }
        match self.overflow_mode {
            OverflowMode::Throw => Err(SetError::SizeLimitExceeded { rows, bytes }),
            OverflowMode::Break => Ok(false),
        }
    }
}

#[derive(Default)]
struct SetInner {
    /// Declared types of the IN keys. Empty until the header is set.
    key_types: Vec<DataType>,
    /// Types used to store retained tuples: the key types with
    /// low-cardinality dictionaries (and, without transform_null_in,
    /// nullability) stripped.
    element_types: Vec<DataType>,
    variants: SetVariants,
    retain_elements: bool,
    max_retained_elements: Option<usize>,
    /// Distinct inserted tuples, aligned across keys.
    retained: Option<Vec<ArrayBuilderImpl>>,
}

impl SetInner {
    fn alloc_retained(&mut self) {
        if self.retain_elements && self.retained.is_none() && !self.element_types.is_empty() {
            self.retained = Some(
                self.element_types
                    .iter()
                    .map(|ty| ArrayBuilderImpl::with_capacity(0, ty))
                    .collect(),
            );
        }
    }
}

/// Data structure for the implementation of the IN expression.
pub struct Set {
    limits: SetLimits,
    /// When true, NULL participates in membership (NULL matches NULL);
    /// when false, NULL on either side yields non-membership.
    transform_null_in: bool,
    is_built: AtomicBool,
    inner: RwLock<SetInner>,
}

impl Set {
    pub fn new(limits: SetLimits, transform_null_in: bool) -> Self {
        Set {
            limits,
            transform_null_in,
            is_built: AtomicBool::new(false),
            inner: RwLock::new(SetInner::default()),
        }
    }

    /// Request that distinct inserted tuples are retained for later
    /// [`OrderedSetIndex`] construction. When the set grows past
    /// `max_elements`, retention is dropped.
    pub fn retain_elements(&self, max_elements: Option<usize>) {
        let mut inner = self.inner.write();
        inner.retain_elements = true;
        inner.max_retained_elements = max_elements;
        inner.alloc_retained();
    }

    /// Fix the key arity and types and choose the storage layout. Called
    /// once; subsequent calls are no-ops.
    pub fn set_header(&self, key_types: &[DataType]) {
        let mut inner = self.inner.write();
        if !inner.key_types.is_empty() {
            return;
        }
        for ty in key_types {
            // Low-cardinality columns are hashed through their dictionary
            // value type.
            let mut ty = ty.remove_low_cardinality();
            if !self.transform_null_in {
                ty = ty.remove_nullable();
            }
            inner.key_types.push(ty);
            inner.element_types.push(ty);
        }
        inner.variants = SetVariants::choose(&inner.element_types);
        debug!(variant = inner.variants.name(), "chose set storage layout");
        inner.alloc_retained();
    }

    /// Insert a block of key columns. See [`insert_from_columns`](Self::insert_from_columns).
    pub fn insert_block(&self, chunk: &DataChunk) -> Result<bool> {
        let columns: Vec<Column> = chunk
            .arrays()
            .iter()
            .map(|a| Column::Full(a.clone()))
            .collect();
        self.insert_from_columns(&columns)
    }

    /// Insert a block of key columns. Returns `true` when the caller may
    /// keep feeding blocks, `false` when a size limit tripped under the
    /// `Break` overflow mode.
    pub fn insert_from_columns(&self, columns: &[Column]) -> Result<bool> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.key_types.is_empty() {
            return Err(SetError::Logical(
                "Set::set_header must be called before Set::insert_from_columns".into(),
            ));
        }
        if columns.len() != inner.key_types.len() {
            return Err(SetError::Logical(format!(
                "invalid number of key columns for set: expected {}, got {}",
                inner.key_types.len(),
                columns.len()
            )));
        }

        // Constant and dictionary-encoded columns are materialized first
        // and held until after hashing.
        let materialized = columns.iter().map(|c| c.to_full()).collect_vec();
        let key_arrays = materialized.iter().map(|c| c.as_ref()).collect_vec();
        let rows = key_arrays.first().map(|a| a.len()).unwrap_or(0);

        // Only keys where all components are non-NULL enter the set.
        let null_map = if self.transform_null_in {
            None
        } else {
            extract_null_map(&key_arrays)
        };

        let mut filter = inner.retained.is_some().then(|| vec![0u8; rows]);
        inner
            .variants
            .insert_block(&key_arrays, rows, null_map.as_deref(), filter.as_deref_mut());

        if let (Some(filter), Some(builders)) = (&filter, inner.retained.as_mut()) {
            for (builder, array) in builders.iter_mut().zip_eq(&key_arrays) {
                for (i, &inserted) in filter.iter().enumerate() {
                    if inserted != 0 {
                        builder.push(&array.get(i));
                    }
                }
            }
        }

        if let Some(max) = inner.max_retained_elements {
            if inner.retained.is_some() && inner.variants.row_count() > max {
                warn!(
                    rows = inner.variants.row_count(),
                    max, "set grew past the retained-element cap, dropping retained columns"
                );
                inner.retained = None;
                inner.retain_elements = false;
            }
        }

        self.limits
            .check(inner.variants.row_count(), inner.variants.byte_count())
    }

    /// Flip the one-way "built" flag. The set must be marked built before
    /// membership probes like [`has_null`](Self::has_null).
    pub fn mark_built(&self) {
        self.is_built.store(true, Ordering::Release);
    }

    pub fn is_built(&self) -> bool {
        self.is_built.load(Ordering::Acquire)
    }

    /// Probe a block of key columns. The result is a boolean column of the
    /// block's length with `negate XOR member(tuple_i)` at row `i`.
    pub fn execute(
        &self,
        columns: &[ColumnWithType],
        negate: bool,
        cache: &CastCache,
    ) -> Result<ArrayImpl> {
        if columns.is_empty() {
            return Err(SetError::Logical(
                "no columns passed to Set::execute".into(),
            ));
        }
        let rows = columns[0].column.len();

        let inner = self.inner.read();

        // A set that was never given a header answers `negate` everywhere.
        if inner.key_types.is_empty() {
            return Ok(constant_bool(negate, rows));
        }
        if columns.len() != inner.key_types.len() {
            return Err(SetError::ColumnCountMismatch {
                left: columns.len(),
                right: inner.key_types.len(),
            });
        }
        if rows == 0 {
            return Ok(constant_bool(negate, 0));
        }

        // Rows whose answer is forced to `negate`: NULL components under
        // SQL semantics and values that lost sub-second precision.
        let mut forced_null: Option<Vec<u8>> = None;
        let mut key_arrays: Vec<ArrayImpl> = Vec::with_capacity(columns.len());

        for (i, col) in columns.iter().enumerate() {
            let target = inner.key_types[i];
            let full = col.column.to_full();
            let from_ty = col.ty.remove_low_cardinality();

            let casted = if !self.transform_null_in && target.can_be_inside_nullable() {
                // Cast failures become NULLs and flow into the null mask.
                cache.cast(&full, &from_ty, &target, true)?
            } else if self.transform_null_in && from_ty.is_nullable() && !target.is_nullable() {
                // The set cannot contain NULL for this key, so cast the
                // nested column and force `negate` on the input's NULL rows.
                merge_null_map(&mut forced_null, invalid_rows(&full), rows)?;
                cache.cast(&full, &from_ty.remove_nullable(), &target, false)?
            } else {
                cache.cast(&full, &from_ty, &target, false)?
            };

            // Casting DateTime64 to a coarser type floors away sub-second
            // ticks; rows that actually lost precision cannot match.
            if let DataTypeKind::DateTime64(scale) = from_ty.kind() {
                if !matches!(target.kind(), DataTypeKind::DateTime64(_)) && scale >= 1 {
                    let mask = datetime64_precision_null_map(&full, scale)?;
                    merge_null_map(&mut forced_null, Some(mask), rows)?;
                }
            }

            key_arrays.push(casted);
        }

        if !self.transform_null_in {
            for array in &key_arrays {
                merge_null_map(&mut forced_null, invalid_rows(array), rows)?;
            }
        }

        let key_refs = key_arrays.iter().collect_vec();
        let mut out = vec![0u8; rows];
        inner
            .variants
            .find_block(&key_refs, rows, negate, forced_null.as_deref(), &mut out);

        Ok(ArrayImpl::Bool(
            out.iter().map(|&v| Some(v != 0)).collect(),
        ))
    }

    /// Whether the set contains NULL: true iff NULL participates in
    /// membership, the set has a single nullable key, and a probe with the
    /// single-value block `[NULL]` succeeds.
    pub fn has_null(&self) -> Result<bool> {
        if !self.is_built() {
            return Err(SetError::Logical(
                "trying to use set before it has been built".into(),
            ));
        }
        if !self.transform_null_in {
            return Ok(false);
        }
        let key_type = {
            let inner = self.inner.read();
            match inner.key_types.as_slice() {
                [ty] if ty.is_nullable() => *ty,
                _ => return Ok(false),
            }
        };
        let mut builder = ArrayBuilderImpl::with_capacity(1, &key_type);
        builder.push(&crate::types::DataValue::Null);
        let column = ColumnWithType::full(builder.finish(), key_type);
        let result = self.execute(&[column], false, &CastCache::new())?;
        Ok(result.get(0) == crate::types::DataValue::Bool(true))
    }

    pub fn empty(&self) -> bool {
        self.inner.read().variants.row_count() == 0
    }

    /// Number of distinct tuples stored.
    pub fn row_count(&self) -> usize {
        self.inner.read().variants.row_count()
    }

    /// Estimated bytes held by the storage layout.
    pub fn byte_count(&self) -> usize {
        self.inner.read().variants.byte_count()
    }

    pub fn element_types(&self) -> Vec<DataType> {
        self.inner.read().element_types.clone()
    }

    /// Whether the stored key type at `idx` matches `other`, compared
    /// modulo nullability and low cardinality. Out-of-range `idx` returns
    /// false: the same set expression may have been built with different
    /// columns, and callers probe without knowing the arity.
    pub fn are_types_equal(&self, idx: usize, other: &DataType) -> bool {
        let inner = self.inner.read();
        match inner.key_types.get(idx) {
            None => false,
            Some(ty) => {
                ty.remove_low_cardinality().remove_nullable()
                    == other.remove_low_cardinality().remove_nullable()
            }
        }
    }

    pub fn check_types_equal(&self, idx: usize, other: &DataType) -> Result<()> {
        if self.are_types_equal(idx, other) {
            return Ok(());
        }
        let inner = self.inner.read();
        Err(SetError::TypeMismatch {
            index: idx + 1,
            left: other.to_string(),
            right: inner
                .key_types
                .get(idx)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "<none>".into()),
        })
    }

    /// Hand the retained distinct tuples off for ordered-index
    /// construction. Returns `None` when retention is off or was dropped.
    pub fn take_retained_columns(&self) -> Option<Vec<ArrayImpl>> {
        let mut inner = self.inner.write();
        let builders = inner.retained.take()?;
        inner.retain_elements = false;
        Some(builders.into_iter().map(|b| b.finish()).collect())
    }
}

fn constant_bool(value: bool, rows: usize) -> ArrayImpl {
    ArrayImpl::Bool((0..rows).map(|_| Some(value)).collect())
}

/// Combined null mask over the key columns: `1` where any component is
/// NULL. Returns `None` when no component is NULL anywhere.
fn extract_null_map(key_arrays: &[&ArrayImpl]) -> Option<Vec<u8>> {
    let mut mask: Option<Vec<u8>> = None;
    for array in key_arrays {
        let valid = array.get_valid_bitmap();
        if valid.count_zeros() == 0 {
            continue;
        }
        let mask = mask.get_or_insert_with(|| vec![0u8; array.len()]);
        for (i, slot) in mask.iter_mut().enumerate() {
            *slot |= !valid[i] as u8;
        }
    }
    mask
}

/// Per-row invalid mask of one array, or `None` when fully valid.
fn invalid_rows(array: &ArrayImpl) -> Option<Vec<u8>> {
    let valid = array.get_valid_bitmap();
    if valid.count_zeros() == 0 {
        return None;
    }
    Some((0..valid.len()).map(|i| !valid[i] as u8).collect())
}

/// OR `other` into `mask`, checking that the sizes line up.
fn merge_null_map(
    mask: &mut Option<Vec<u8>>,
    other: Option<Vec<u8>>,
    rows: usize,
) -> Result<()> {
    let Some(other) = other else { return Ok(()) };
    if other.len() != rows {
        return Err(SetError::Logical("null maps have different sizes".into()));
    }
    match mask {
        None => *mask = Some(other),
        Some(mask) => {
            for (slot, v) in mask.iter_mut().zip(other) {
                *slot |= v;
            }
        }
    }
    Ok(())
}

/// Mark rows whose DateTime64 value is not a whole multiple of one unit of
/// the target precision.
fn datetime64_precision_null_map(array: &ArrayImpl, scale: u8) -> Result<Vec<u8>> {
    let ArrayImpl::DateTime64(a) = array else {
        return Err(SetError::Logical(
            "expected a DateTime64 column for the precision check".into(),
        ));
    };
    let multiplier = scale_multiplier(scale);
    Ok((0..a.len())
        .map(|i| (a.raw_value(i).ticks() % multiplier != 0) as u8)
        .collect())
}

#[cfg(test)]
mod tests;
