// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use super::*;
use crate::array::{ArrayImpl, CastCache, Column, ColumnWithType};
use crate::keyrange::{
    Bound, BoolMask, Monotonicity, MonotonicFunction, Range,
};
use crate::types::{
    ConvertError, DataTypeExt, DataValue, DateTime, DateTime64, F64,
};

fn int64(values: &[Option<i64>]) -> ArrayImpl {
    ArrayImpl::Int64(values.iter().copied().collect())
}

fn int64_full(values: &[i64]) -> ArrayImpl {
    ArrayImpl::Int64(values.iter().map(|&v| Some(v)).collect())
}

fn strings(values: &[Option<&str>]) -> ArrayImpl {
    ArrayImpl::String(values.iter().copied().collect())
}

/// Read a boolean result column as 0/1 bytes.
fn to_bits(array: &ArrayImpl) -> Vec<u8> {
    (0..array.len())
        .map(|i| match array.get(i) {
            DataValue::Bool(true) => 1,
            DataValue::Bool(false) => 0,
            v => panic!("expected a boolean result, got {v:?}"),
        })
        .collect()
}

fn int64_set(values: &[i64]) -> Set {
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[DataTypeKind::Int64.not_null()]);
    set.insert_from_columns(&[Column::Full(int64_full(values))])
        .unwrap();
    set.mark_built();
    set
}

fn probe_int64(set: &Set, values: &[i64], negate: bool) -> Vec<u8> {
    let column = ColumnWithType::full(int64_full(values), DataTypeKind::Int64.not_null());
    to_bits(&set.execute(&[column], negate, &CastCache::new()).unwrap())
}

#[test]
fn test_basic_integer_in() {
    // S1: build {1,2,3,5,8}, probe {0,1,4,5,9,2}.
    let set = int64_set(&[1, 2, 3, 5, 8]);
    assert_eq!(probe_int64(&set, &[0, 1, 4, 5, 9, 2], false), [0, 1, 0, 1, 0, 1]);
    assert_eq!(probe_int64(&set, &[0, 1, 4, 5, 9, 2], true), [1, 0, 1, 0, 1, 0]);
}

#[test]
fn test_null_non_transform() {
    // S2: NULL is dropped during build and never matches during probe.
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[DataTypeKind::Int64.nullable()]);
    set.insert_from_columns(&[Column::Full(int64(&[Some(1), None, Some(3)]))])
        .unwrap();
    set.mark_built();
    assert_eq!(set.row_count(), 2);

    let probe = ColumnWithType::full(
        int64(&[None, Some(1), Some(2), Some(3)]),
        DataTypeKind::Int64.nullable(),
    );
    let cache = CastCache::new();
    let result = set.execute(&[probe.clone()], false, &cache).unwrap();
    assert_eq!(to_bits(&result), [0, 1, 0, 1]);

    // Negation: null rows still answer `negate`.
    let result = set.execute(&[probe], true, &cache).unwrap();
    assert_eq!(to_bits(&result), [1, 0, 1, 0]);
}

#[test]
fn test_null_transform() {
    // S3: NULL participates in membership.
    let set = Set::new(SetLimits::default(), true);
    set.set_header(&[DataTypeKind::Int64.nullable()]);
    set.insert_from_columns(&[Column::Full(int64(&[Some(1), None]))])
        .unwrap();
    set.mark_built();

    let probe = ColumnWithType::full(
        int64(&[None, Some(1), Some(2)]),
        DataTypeKind::Int64.nullable(),
    );
    let result = set.execute(&[probe], false, &CastCache::new()).unwrap();
    assert_eq!(to_bits(&result), [1, 1, 0]);

    assert!(set.has_null().unwrap());
}

#[test]
fn test_has_null_requires_built() {
    let set = Set::new(SetLimits::default(), true);
    set.set_header(&[DataTypeKind::Int64.nullable()]);
    assert!(matches!(set.has_null(), Err(SetError::Logical(_))));
}

#[test]
fn test_has_null_false_cases() {
    // Without transform_null_in the set never contains NULL.
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[DataTypeKind::Int64.nullable()]);
    set.insert_from_columns(&[Column::Full(int64(&[None]))]).unwrap();
    set.mark_built();
    assert!(!set.has_null().unwrap());

    // A non-nullable key cannot hold NULL either.
    let set = Set::new(SetLimits::default(), true);
    set.set_header(&[DataTypeKind::Int64.not_null()]);
    set.insert_from_columns(&[Column::Full(int64_full(&[1]))]).unwrap();
    set.mark_built();
    assert!(!set.has_null().unwrap());
}

#[test]
fn test_datetime64_precision() {
    // S4: a probe value with sub-second ticks never matches a
    // second-precision set, regardless of its floored image.
    let base = 1_704_067_200i64; // 2024-01-01 00:00:00
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[DataTypeKind::DateTime.not_null()]);
    set.insert_from_columns(&[Column::Full(ArrayImpl::DateTime(
        [Some(DateTime::from_timestamp(base))].into_iter().collect(),
    ))])
    .unwrap();
    set.mark_built();

    let probe = ColumnWithType::full(
        ArrayImpl::DateTime64(
            [
                Some(DateTime64::new(base * 1000)),
                Some(DateTime64::new(base * 1000 + 500)),
            ]
            .into_iter()
            .collect(),
        ),
        DataTypeKind::DateTime64(3).not_null(),
    );
    let result = set.execute(&[probe], false, &CastCache::new()).unwrap();
    assert_eq!(to_bits(&result), [1, 0]);
}

#[test]
fn test_idempotent_rebuild() {
    // Any partition of the same rows into blocks yields the same set.
    let probe = [0i64, 1, 2, 3, 4, 5, 6, 7, 8, 9];
    let baseline = probe_int64(&int64_set(&[1, 2, 3, 5, 8]), &probe, false);

    for blocks in [
        vec![vec![1i64, 2, 3], vec![5, 8]],
        vec![vec![1], vec![2], vec![3], vec![5], vec![8]],
        vec![vec![8, 5, 3, 2, 1], vec![1, 2, 3, 5, 8]],
    ] {
        let set = Set::new(SetLimits::default(), false);
        set.set_header(&[DataTypeKind::Int64.not_null()]);
        for block in &blocks {
            set.insert_from_columns(&[Column::Full(int64_full(block))])
                .unwrap();
        }
        set.mark_built();
        assert_eq!(probe_int64(&set, &probe, false), baseline);
    }
}

#[test]
fn test_cast_equivalent_probes() {
    let set = int64_set(&[1, 2, 3]);
    let cache = CastCache::new();

    // Int32 probes are widened to the key type.
    let probe = ColumnWithType::full(
        ArrayImpl::Int32([Some(1), Some(4)].into_iter().collect()),
        DataTypeKind::Int32.not_null(),
    );
    let result = set.execute(&[probe], false, &cache).unwrap();
    assert_eq!(to_bits(&result), [1, 0]);

    // A fractional float cannot be a member of an integer set; the failed
    // accurate cast turns into NULL, which answers `negate`.
    let probe = ColumnWithType::full(
        ArrayImpl::Float64(
            [Some(F64::from(2.0)), Some(F64::from(2.5))].into_iter().collect(),
        ),
        DataTypeKind::Float64.not_null(),
    );
    let result = set.execute(&[probe], false, &cache).unwrap();
    assert_eq!(to_bits(&result), [1, 0]);
}

#[test]
fn test_execute_before_header_answers_negate() {
    let set = Set::new(SetLimits::default(), false);
    let column = ColumnWithType::full(int64_full(&[1, 2]), DataTypeKind::Int64.not_null());
    let cache = CastCache::new();
    let result = set.execute(&[column.clone()], false, &cache).unwrap();
    assert_eq!(to_bits(&result), [0, 0]);
    let result = set.execute(&[column], true, &cache).unwrap();
    assert_eq!(to_bits(&result), [1, 1]);
}

#[test]
fn test_insert_before_header_fails() {
    let set = Set::new(SetLimits::default(), false);
    let err = set
        .insert_from_columns(&[Column::Full(int64_full(&[1]))])
        .unwrap_err();
    assert!(matches!(err, SetError::Logical(_)));
}

#[test]
fn test_column_count_mismatch() {
    let set = int64_set(&[1]);
    let column = ColumnWithType::full(int64_full(&[1]), DataTypeKind::Int64.not_null());
    let err = set
        .execute(&[column.clone(), column], false, &CastCache::new())
        .unwrap_err();
    assert!(matches!(
        err,
        SetError::ColumnCountMismatch { left: 2, right: 1 }
    ));
}

#[test]
fn test_size_limits_throw() {
    let limits = SetLimits {
        max_rows: 3,
        max_bytes: 0,
        overflow_mode: OverflowMode::Throw,
    };
    let set = Set::new(limits, false);
    set.set_header(&[DataTypeKind::Int64.not_null()]);
    assert!(set
        .insert_from_columns(&[Column::Full(int64_full(&[1, 2, 3]))])
        .unwrap());
    let err = set
        .insert_from_columns(&[Column::Full(int64_full(&[4]))])
        .unwrap_err();
    assert!(matches!(err, SetError::SizeLimitExceeded { rows: 4, .. }));
}

#[test]
fn test_size_limits_break() {
    let limits = SetLimits {
        max_rows: 3,
        max_bytes: 0,
        overflow_mode: OverflowMode::Break,
    };
    let set = Set::new(limits, false);
    set.set_header(&[DataTypeKind::Int64.not_null()]);
    // The caller stops feeding on `false`; the set keeps what it has.
    assert!(!set
        .insert_from_columns(&[Column::Full(int64_full(&[1, 2, 3, 4]))])
        .unwrap());
    set.mark_built();
    assert_eq!(set.row_count(), 4);
    assert_eq!(probe_int64(&set, &[1, 4, 5], false), [1, 1, 0]);
}

#[test]
fn test_duplicate_rows_count_once() {
    let set = int64_set(&[7, 7, 7, 8]);
    assert_eq!(set.row_count(), 2);
    assert!(!set.empty());
    assert!(set.byte_count() > 0);
}

#[test]
fn test_insert_block_from_chunk() {
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[
        DataTypeKind::Int64.not_null(),
        DataTypeKind::String.not_null(),
    ]);
    let chunk: crate::array::DataChunk = [
        int64_full(&[1, 2]),
        strings(&[Some("a"), Some("b")]),
    ]
    .into_iter()
    .collect();
    set.insert_block(&chunk).unwrap();
    set.mark_built();
    assert_eq!(set.row_count(), 2);
}

#[test]
fn test_string_set() {
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[DataTypeKind::String.not_null()]);
    set.insert_from_columns(&[Column::Full(strings(&[Some("foo"), Some("bar")]))])
        .unwrap();
    set.mark_built();

    let probe = ColumnWithType::full(
        strings(&[Some("bar"), Some("baz"), Some("")]),
        DataTypeKind::String.not_null(),
    );
    let result = set.execute(&[probe], false, &CastCache::new()).unwrap();
    assert_eq!(to_bits(&result), [1, 0, 0]);
}

#[test]
fn test_multi_key_set() {
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[
        DataTypeKind::Int64.not_null(),
        DataTypeKind::String.not_null(),
    ]);
    set.insert_from_columns(&[
        Column::Full(int64_full(&[1, 2])),
        Column::Full(strings(&[Some("a"), Some("b")])),
    ])
    .unwrap();
    set.mark_built();

    let result = set
        .execute(
            &[
                ColumnWithType::full(int64_full(&[1, 1, 2]), DataTypeKind::Int64.not_null()),
                ColumnWithType::full(
                    strings(&[Some("a"), Some("b"), Some("b")]),
                    DataTypeKind::String.not_null(),
                ),
            ],
            false,
            &CastCache::new(),
        )
        .unwrap();
    assert_eq!(to_bits(&result), [1, 0, 1]);
}

#[test]
fn test_const_column_input() {
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[DataTypeKind::Int64.not_null()]);
    set.insert_from_columns(&[Column::Const {
        data: int64_full(&[5]),
        len: 4,
    }])
    .unwrap();
    set.mark_built();
    assert_eq!(set.row_count(), 1);

    let probe = ColumnWithType::new(
        Column::Const {
            data: int64_full(&[5]),
            len: 3,
        },
        DataTypeKind::Int64.not_null(),
    );
    let result = set.execute(&[probe], false, &CastCache::new()).unwrap();
    assert_eq!(to_bits(&result), [1, 1, 1]);
}

#[test]
fn test_low_cardinality_input() {
    // A dictionary-encoded column is hashed through its value type.
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[DataTypeKind::String.not_null().low_cardinality()]);
    set.insert_from_columns(&[Column::Dict {
        keys: vec![0, 1, 0],
        values: strings(&[Some("x"), Some("y")]),
    }])
    .unwrap();
    set.mark_built();
    assert_eq!(set.row_count(), 2);
    assert_eq!(set.element_types(), vec![DataTypeKind::String.not_null()]);

    let probe = ColumnWithType::new(
        Column::Dict {
            keys: vec![1, 0],
            values: strings(&[Some("z"), Some("y")]),
        },
        DataTypeKind::String.not_null().low_cardinality(),
    );
    let result = set.execute(&[probe], false, &CastCache::new()).unwrap();
    assert_eq!(to_bits(&result), [1, 0]);
}

#[test]
fn test_types_equal() {
    let set = Set::new(SetLimits::default(), false);
    set.set_header(&[DataTypeKind::Int64.nullable()]);
    assert!(set.are_types_equal(0, &DataTypeKind::Int64.not_null()));
    assert!(set.are_types_equal(0, &DataTypeKind::Int64.nullable()));
    assert!(!set.are_types_equal(0, &DataTypeKind::Int32.not_null()));
    assert!(!set.are_types_equal(1, &DataTypeKind::Int64.not_null()));
    assert!(set.check_types_equal(0, &DataTypeKind::Int64.not_null()).is_ok());
    assert!(matches!(
        set.check_types_equal(0, &DataTypeKind::String.not_null()),
        Err(SetError::TypeMismatch { index: 1, .. })
    ));
}

#[test]
fn test_retained_elements_cap() {
    let set = Set::new(SetLimits::default(), false);
    set.retain_elements(Some(2));
    set.set_header(&[DataTypeKind::Int64.not_null()]);
    set.insert_from_columns(&[Column::Full(int64_full(&[1, 2, 3]))])
        .unwrap();
    set.mark_built();
    // The cap tripped: retention is dropped, the set itself stays usable.
    assert!(set.take_retained_columns().is_none());
    assert_eq!(set.row_count(), 3);
}

#[test]
fn test_retained_columns_are_distinct_and_aligned() {
    let set = Set::new(SetLimits::default(), false);
    set.retain_elements(None);
    set.set_header(&[
        DataTypeKind::Int64.not_null(),
        DataTypeKind::String.not_null(),
    ]);
    set.insert_from_columns(&[
        Column::Full(int64_full(&[1, 1, 2])),
        Column::Full(strings(&[Some("a"), Some("a"), Some("b")])),
    ])
    .unwrap();
    set.insert_from_columns(&[
        Column::Full(int64_full(&[1])),
        Column::Full(strings(&[Some("a")])),
    ])
    .unwrap();
    set.mark_built();

    let retained = set.take_retained_columns().unwrap();
    assert_eq!(retained.len(), 2);
    assert_eq!(retained[0].len(), 2);
    assert_eq!(retained[1].len(), 2);
    assert_eq!(retained[0].get(0), DataValue::Int64(1));
    assert_eq!(retained[1].get(0), DataValue::String("a".into()));
    assert_eq!(retained[0].get(1), DataValue::Int64(2));
    assert_eq!(retained[1].get(1), DataValue::String("b".into()));
}

#[test]
fn test_retained_skips_null_rows() {
    let set = Set::new(SetLimits::default(), false);
    set.retain_elements(None);
    set.set_header(&[DataTypeKind::Int64.nullable()]);
    set.insert_from_columns(&[Column::Full(int64(&[Some(1), None, Some(2)]))])
        .unwrap();
    set.mark_built();
    let retained = set.take_retained_columns().unwrap();
    assert_eq!(retained[0].len(), 2);
}

#[test]
fn test_retained_keeps_null_under_transform() {
    let set = Set::new(SetLimits::default(), true);
    set.retain_elements(None);
    set.set_header(&[DataTypeKind::Int64.nullable()]);
    set.insert_from_columns(&[Column::Full(int64(&[Some(1), None, None]))])
        .unwrap();
    set.mark_built();
    let retained = set.take_retained_columns().unwrap();
    assert_eq!(retained[0].len(), 2);
    assert_eq!(retained[0].get(0), DataValue::Int64(1));
    assert_eq!(retained[0].get(1), DataValue::Null);
}

// ---- OrderedSetIndex ----

fn mapping(entries: &[(usize, usize)]) -> Vec<KeyTuplePositionMapping> {
    entries
        .iter()
        .map(|&(key_index, tuple_index)| KeyTuplePositionMapping {
            key_index,
            tuple_index,
            functions: vec![],
        })
        .collect()
}

/// The three-tuple set {(1,'a'), (2,'b'), (3,'c')} of S5/S6.
fn two_key_index() -> OrderedSetIndex {
    OrderedSetIndex::new(
        vec![
            int64_full(&[1, 2, 3]),
            strings(&[Some("a"), Some("b"), Some("c")]),
        ],
        mapping(&[(0, 0), (1, 1)]),
    )
}

fn point(v: DataValue) -> Range {
    Range::single_point(v)
}

#[test]
fn test_index_single_point() {
    // S5.
    let index = two_key_index();
    assert!(index.has_all_keys());
    let types = [
        DataTypeKind::Int64.not_null(),
        DataTypeKind::String.not_null(),
    ];

    let mask = index.check_in_range(
        &[point(DataValue::Int64(2)), point(DataValue::String("b".into()))],
        &types,
        true,
    );
    assert_eq!(mask, BoolMask::new(true, false));

    let mask = index.check_in_range(
        &[point(DataValue::Int64(2)), point(DataValue::String("a".into()))],
        &types,
        true,
    );
    assert_eq!(mask, BoolMask::new(false, true));
}

#[test]
fn test_index_open_ranges() {
    // S6.
    let index = two_key_index();
    let types = [
        DataTypeKind::Int64.not_null(),
        DataTypeKind::String.not_null(),
    ];

    // ((1,'a'), (3,'c')) exclusive-exclusive contains the interior point (2,'b').
    let mask = index.check_in_range(
        &[
            Range::new(
                Bound::Value(DataValue::Int64(1)),
                false,
                Bound::Value(DataValue::Int64(3)),
                false,
            ),
            Range::new(
                Bound::Value(DataValue::String("a".into())),
                false,
                Bound::Value(DataValue::String("c".into())),
                false,
            ),
        ],
        &types,
        false,
    );
    assert_eq!(mask, BoolMask::unknown());

    // ((3,'c'), (+inf,+inf)) holds nothing of the set.
    let mask = index.check_in_range(
        &[
            Range::new(Bound::Value(DataValue::Int64(3)), false, Bound::PosInf, false),
            Range::new(
                Bound::Value(DataValue::String("c".into())),
                false,
                Bound::PosInf,
                false,
            ),
        ],
        &types,
        false,
    );
    assert_eq!(mask, BoolMask::new(false, true));
}

#[test]
fn test_index_sorts_tuples() {
    // Construction sorts the retained tuples lexicographically.
    let index = OrderedSetIndex::new(vec![int64_full(&[5, 1, 8, 3, 2])], mapping(&[(0, 0)]));
    let types = [DataTypeKind::Int64.not_null()];

    for (value, expected) in [(1, true), (4, false), (5, true), (8, true), (9, false)] {
        let mask = index.check_in_range(&[point(DataValue::Int64(value))], &types, true);
        assert_eq!(mask, BoolMask::new(expected, !expected), "value {value}");
    }

    // An excluded upper bound at the maximum leaves nothing above it.
    let mask = index.check_in_range(
        &[Range::new(
            Bound::Value(DataValue::Int64(8)),
            false,
            Bound::PosInf,
            false,
        )],
        &types,
        false,
    );
    assert_eq!(mask, BoolMask::new(false, true));

    let mask = index.check_in_range(
        &[Range::new(
            Bound::NegInf,
            false,
            Bound::Value(DataValue::Int64(0)),
            true,
        )],
        &types,
        false,
    );
    assert_eq!(mask, BoolMask::new(false, true));
}

#[test]
fn test_index_excluded_left_corner() {
    // The subtle branch: left_lower + 1 == right_lower with the excluded
    // left endpoint equal to a stored row. The right boundary is a hit
    // only when included.
    let index = OrderedSetIndex::new(vec![int64_full(&[1, 2, 5])], mapping(&[(0, 0)]));
    let types = [DataTypeKind::Int64.not_null()];

    let range = |right_included| {
        Range::new(
            Bound::Value(DataValue::Int64(1)),
            false,
            Bound::Value(DataValue::Int64(2)),
            right_included,
        )
    };
    let mask = index.check_in_range(&[range(true)], &types, false);
    assert_eq!(mask, BoolMask::new(true, true));
    let mask = index.check_in_range(&[range(false)], &types, false);
    assert_eq!(mask, BoolMask::new(false, true));
}

#[test]
fn test_index_agrees_with_set_on_single_points() {
    let values = [1i64, 2, 3, 5, 8];
    let set = Set::new(SetLimits::default(), false);
    set.retain_elements(None);
    set.set_header(&[DataTypeKind::Int64.not_null()]);
    set.insert_from_columns(&[Column::Full(int64_full(&values))])
        .unwrap();
    set.mark_built();

    let index = OrderedSetIndex::new(set.take_retained_columns().unwrap(), mapping(&[(0, 0)]));
    let types = [DataTypeKind::Int64.not_null()];

    for x in 0i64..10 {
        let member = probe_int64(&set, &[x], false)[0] != 0;
        let mask = index.check_in_range(&[point(DataValue::Int64(x))], &types, true);
        assert_eq!(mask, BoolMask::new(member, !member), "x = {x}");
    }
}

#[test]
fn test_index_null_sorts_as_positive_infinity() {
    // A retained NULL tuple answers a +inf single point.
    let index = OrderedSetIndex::new(vec![int64(&[Some(1), None])], mapping(&[(0, 0)]));
    let types = [DataTypeKind::Int64.nullable()];

    let range = Range::new(Bound::PosInf, true, Bound::PosInf, true);
    let mask = index.check_in_range(&[range], &types, false);
    assert_eq!(mask, BoolMask::new(true, false));
}

#[test]
fn test_index_mapping_sort_and_dedup() {
    // Duplicated key positions keep the first (smallest tuple index) entry.
    let index = OrderedSetIndex::new(
        vec![int64_full(&[1, 2]), int64_full(&[10, 20])],
        mapping(&[(1, 1), (0, 0), (1, 0)]),
    );
    // Two mapping entries survive out of three: not all source columns are
    // covered by distinct keys.
    assert!(!index.has_all_keys());
    let types = [
        DataTypeKind::Int64.not_null(),
        DataTypeKind::Int64.not_null(),
    ];
    // Even a matching point cannot be exact without all keys.
    let mask = index.check_in_range(
        &[point(DataValue::Int64(1)), point(DataValue::Int64(1))],
        &types,
        true,
    );
    assert_eq!(mask, BoolMask::unknown());
}

struct Negate;

impl MonotonicFunction for Negate {
    fn name(&self) -> &str {
        "negate"
    }

    fn monotonicity_on(
        &self,
        _ty: &DataType,
        _left: &Bound,
        _right: &Bound,
    ) -> Option<Monotonicity> {
        Some(Monotonicity {
            is_positive: false,
            is_strict: true,
        })
    }

    fn apply(&self, value: &DataValue) -> std::result::Result<DataValue, ConvertError> {
        match value {
            DataValue::Int64(v) => Ok(DataValue::Int64(-v)),
            _ => Err(ConvertError::Cast(value.to_string(), "Int64")),
        }
    }
}

struct NotMonotonic;

impl MonotonicFunction for NotMonotonic {
    fn name(&self) -> &str {
        "not_monotonic"
    }

    fn monotonicity_on(
        &self,
        _ty: &DataType,
        _left: &Bound,
        _right: &Bound,
    ) -> Option<Monotonicity> {
        None
    }

    fn apply(&self, value: &DataValue) -> std::result::Result<DataValue, ConvertError> {
        Ok(value.clone())
    }
}

#[test]
fn test_index_monotonic_chain() {
    // The set stores f(k) = -k; a key range maps through the chain before
    // the search.
    let stored = OrderedSetIndex::new(
        vec![int64_full(&[1, 2, 3])],
        vec![KeyTuplePositionMapping {
            key_index: 0,
            tuple_index: 0,
            functions: vec![Arc::new(Negate)],
        }],
    );
    assert!(stored.has_monotonic_functions_chain());
    let types = [DataTypeKind::Int64.not_null()];

    // k in [-3,-1] => f(k) in [1,3].
    let mask = stored.check_in_range(
        &[Range::new(
            Bound::Value(DataValue::Int64(-3)),
            true,
            Bound::Value(DataValue::Int64(-1)),
            true,
        )],
        &types,
        false,
    );
    assert_eq!(mask, BoolMask::unknown());

    // k in [-10,-4] => f(k) in [4,10], disjoint from the set.
    let mask = stored.check_in_range(
        &[Range::new(
            Bound::Value(DataValue::Int64(-10)),
            true,
            Bound::Value(DataValue::Int64(-4)),
            true,
        )],
        &types,
        false,
    );
    assert_eq!(mask, BoolMask::new(false, true));
}

#[test]
fn test_index_chain_failure_is_unknown() {
    let stored = OrderedSetIndex::new(
        vec![int64_full(&[1])],
        vec![KeyTuplePositionMapping {
            key_index: 0,
            tuple_index: 0,
            functions: vec![Arc::new(NotMonotonic)],
        }],
    );
    let types = [DataTypeKind::Int64.not_null()];
    let mask = stored.check_in_range(
        &[Range::new(
            Bound::Value(DataValue::Int64(5)),
            true,
            Bound::Value(DataValue::Int64(6)),
            true,
        )],
        &types,
        false,
    );
    assert_eq!(mask, BoolMask::unknown());
}

#[test]
fn test_index_without_chain_reports_none() {
    let index = two_key_index();
    assert!(!index.has_monotonic_functions_chain());
}

// ---- concurrency ----

#[test]
fn test_concurrent_readers() {
    let set = Arc::new(int64_set(&[1, 2, 3, 5, 8]));
    let mut handles = vec![];
    for _ in 0..4 {
        let set = set.clone();
        handles.push(std::thread::spawn(move || {
            let cache = CastCache::new();
            for _ in 0..100 {
                let column =
                    ColumnWithType::full(int64_full(&[1, 4]), DataTypeKind::Int64.not_null());
                let result = set.execute(&[column], false, &cache).unwrap();
                assert_eq!(to_bits(&result), [1, 0]);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_readers_see_whole_blocks() {
    // A reader never observes a partially inserted block: after the write
    // lock is released, all rows of the block are visible.
    let set = Arc::new(Set::new(SetLimits::default(), false));
    set.set_header(&[DataTypeKind::Int64.not_null()]);

    let writer = {
        let set = set.clone();
        std::thread::spawn(move || {
            for base in 0..50i64 {
                let block: Vec<i64> = (0..10).map(|i| base * 10 + i).collect();
                set.insert_from_columns(&[Column::Full(int64_full(&block))])
                    .unwrap();
            }
        })
    };

    let cache = CastCache::new();
    for _ in 0..100 {
        // Rows 10..20 were inserted as one block: either all present or
        // none.
        let column = ColumnWithType::full(
            int64_full(&(10..20).collect::<Vec<_>>()),
            DataTypeKind::Int64.not_null(),
        );
        let bits = to_bits(&set.execute(&[column], false, &cache).unwrap());
        assert!(
            bits.iter().all(|&b| b == 1) || bits.iter().all(|&b| b == 0),
            "observed a partially inserted block: {bits:?}"
        );
    }
    writer.join().unwrap();
}
