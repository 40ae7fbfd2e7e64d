// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! The ordered-set index: a lexicographically sorted materialization of the
//! set's retained tuples, used to decide whether a hyperrectangle of key
//! ranges intersects the set.

use std::cmp::Ordering;

use itertools::Itertools;

use crate::array::{ArrayBuilderImpl, ArrayImpl, ArrayImplBuilderPickExt, ArrayImplValidExt};
use crate::keyrange::{
    apply_monotonic_functions_chain_to_range, BoolMask, Bound, MonotonicFunctionsChain, Range,
};
use crate::types::DataType;

/// Maps one index key position onto a position of the set's tuple, together
/// with the chain of monotonic functions between them.
pub struct KeyTuplePositionMapping {
    pub key_index: usize,
    pub tuple_index: usize,
    pub functions: MonotonicFunctionsChain,
}

/// One endpoint of the probe hyperrectangle on one tuple axis. Normal
/// values live in a single-row column typed like the ordered column, so
/// that comparisons stay within one physical type. Infinity sentinels are
/// tags, never magic column values.
pub enum FieldValue {
    NegInf,
    PosInf,
    Normal(ArrayImpl),
}

impl FieldValue {
    /// Replace the held value. Infinity sentinels are idempotent.
    pub fn update(&mut self, bound: &Bound, template: &ArrayImpl) {
        match bound {
            Bound::NegInf => *self = FieldValue::NegInf,
            Bound::PosInf => *self = FieldValue::PosInf,
            Bound::Value(v) => {
                let mut builder = ArrayBuilderImpl::from_type_of_array(template);
                builder.push(v);
                *self = FieldValue::Normal(builder.finish());
            }
        }
    }

    fn from_bound(bound: &Bound, template: &ArrayImpl) -> Self {
        let mut value = FieldValue::NegInf;
        value.update(bound, template);
        value
    }
}

/// Compare a stored-column row with an endpoint.
///
/// NULL rows sort after every value in the ordered columns, so a NULL row
/// equals `PosInf`; the typed comparison below propagates the same
/// NULL-as-larger rule for normal endpoints.
fn compare(column: &ArrayImpl, row: usize, rhs: &FieldValue) -> Ordering {
    match rhs {
        FieldValue::NegInf => Ordering::Greater,
        FieldValue::PosInf => {
            if column.get_valid_bitmap()[row] {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        }
        FieldValue::Normal(value) => column.compare_at(row, value, 0),
    }
}

/// Index over the sorted tuples of a set, answering range-intersection
/// queries during key-range analysis of an index scan.
pub struct OrderedSetIndex {
    has_all_keys: bool,
    mapping: Vec<KeyTuplePositionMapping>,
    /// Jointly sorted ascending under lexicographic tuple comparison.
    ordered_columns: Vec<ArrayImpl>,
}

impl OrderedSetIndex {
    /// Build the index from the set's retained columns and the key-to-tuple
    /// mapping recorded by the planner.
    pub fn new(
        retained_columns: Vec<ArrayImpl>,
        mut mapping: Vec<KeyTuplePositionMapping>,
    ) -> Self {
        let has_all_keys = retained_columns.len() == mapping.len();

        mapping.sort_by(|l, r| {
            (l.key_index, l.tuple_index).cmp(&(r.key_index, r.tuple_index))
        });
        mapping.dedup_by_key(|m| m.key_index);

        let mut ordered_columns = mapping
            .iter()
            .map(|m| retained_columns[m.tuple_index].clone())
            .collect_vec();

        let rows = ordered_columns.first().map(|c| c.len()).unwrap_or(0);
        if rows > 1 {
            let mut indices = (0..rows).collect_vec();
            indices.sort_by(|&a, &b| {
                for column in &ordered_columns {
                    match column.compare_at(a, column, b) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                Ordering::Equal
            });
            for column in &mut ordered_columns {
                let mut builder = ArrayBuilderImpl::from_type_of_array(column);
                builder.pick_from(column, &indices);
                *column = builder.finish();
            }
        }

        OrderedSetIndex {
            has_all_keys,
            mapping,
            ordered_columns,
        }
    }

    /// Number of tuples in the index.
    pub fn size(&self) -> usize {
        self.ordered_columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn has_all_keys(&self) -> bool {
        self.has_all_keys
    }

    pub fn has_monotonic_functions_chain(&self) -> bool {
        self.mapping.iter().any(|m| !m.functions.is_empty())
    }

    /// Whether the intersection of the set and the hyperrectangle of
    /// `key_ranges` is non-empty (`can_be_true`), and whether the
    /// hyperrectangle holds points outside the set (`can_be_false`).
    pub fn check_in_range(
        &self,
        key_ranges: &[Range],
        data_types: &[DataType],
        single_point: bool,
    ) -> BoolMask {
        let tuple_size = self.mapping.len();

        let mut left_point = Vec::with_capacity(tuple_size);
        let mut right_point = Vec::with_capacity(tuple_size);
        let mut left_included = true;
        let mut right_included = true;

        for (i, mapping) in self.mapping.iter().enumerate() {
            let new_range = apply_monotonic_functions_chain_to_range(
                key_ranges[mapping.key_index].clone(),
                &mapping.functions,
                &data_types[mapping.key_index],
                single_point,
            );
            let Some(new_range) = new_range else {
                return BoolMask::unknown();
            };

            left_point.push(FieldValue::from_bound(&new_range.left, &self.ordered_columns[i]));
            left_included &= new_range.left_included;
            right_point.push(FieldValue::from_bound(&new_range.right, &self.ordered_columns[i]));
            right_included &= new_range.right_included;
        }

        // Each hyperrectangle maps to a contiguous run of the
        // lexicographically ordered tuples, so the set intersects the range
        // iff a bound coincides with an element or some element lies
        // between the two lower bounds.
        let size = self.size();
        let left_lower = self.lower_bound(&left_point);
        let right_lower = self.lower_bound(&right_point);

        // A special case of a one-element range, useful for partition
        // pruning: with all keys present the answer is exact.
        let mut one_element_range = true;
        for (left, right) in left_point.iter().zip(&right_point) {
            let equal = match (left, right) {
                (FieldValue::Normal(l), FieldValue::Normal(r)) => {
                    l.compare_at(0, r, 0) == Ordering::Equal
                }
                (FieldValue::PosInf, FieldValue::PosInf)
                | (FieldValue::NegInf, FieldValue::NegInf) => true,
                _ => false,
            };
            if !equal {
                one_element_range = false;
                break;
            }
        }
        if one_element_range && self.has_all_keys {
            if !left_included || !right_included {
                return BoolMask::new(false, true);
            }
            if left_lower != size && self.equals_at(left_lower, &left_point) {
                return BoolMask::new(true, false);
            }
            return BoolMask::new(false, true);
        }

        // With more than one element in the range it can always be false;
        // only whether it may be true is left to decide. Given
        // left_lower >= left_point and right_lower >= right_point, look for
        // a match between the two lower bounds.
        if left_lower + 1 < right_lower {
            // There is a point in between: left_lower + 1.
            return BoolMask::new(true, true);
        }
        if left_lower + 1 == right_lower {
            // left_point <= left_lower < right_point <= right_lower, so
            // left_lower is a match unless the excluded left endpoint
            // coincides with it.
            if left_included || !self.equals_at(left_lower, &left_point) {
                return BoolMask::new(true, true);
            }
            // The left endpoint fails to cover a point; check for a match
            // at the right boundary.
            return BoolMask::new(
                right_included && right_lower != size && self.equals_at(right_lower, &right_point),
                true,
            );
        }
        // left_lower == right_lower: the only candidate is the right
        // boundary itself.
        BoolMask::new(
            right_included && right_lower != size && self.equals_at(right_lower, &right_point),
            true,
        )
    }

    /// First row not lexicographically less than `point`.
    fn lower_bound(&self, point: &[FieldValue]) -> usize {
        let mut lo = 0;
        let mut hi = self.size();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.less_at(mid, point) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn less_at(&self, row: usize, point: &[FieldValue]) -> bool {
        for (column, value) in self.ordered_columns.iter().zip(point) {
            match compare(column, row, value) {
                Ordering::Less => return true,
                Ordering::Greater => return false,
                Ordering::Equal => continue,
            }
        }
        false
    }

    fn equals_at(&self, row: usize, point: &[FieldValue]) -> bool {
        self.ordered_columns
            .iter()
            .zip(point)
            .all(|(column, value)| compare(column, row, value) == Ordering::Equal)
    }
}
