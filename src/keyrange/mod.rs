// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! Key ranges and monotonic function chains.
//!
//! A [`Range`] describes one axis of a hyperrectangle of key values, with
//! inclusive or exclusive endpoints and infinity sentinels. Ranges are
//! consumed by the ordered-set index after being mapped through the chain
//! of monotonic functions recorded for the key.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{ConvertError, DataType, DataValue};

/// One endpoint of a [`Range`]. Infinities are tagged values, never magic
/// column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bound {
    NegInf,
    Value(DataValue),
    PosInf,
}

impl Bound {
    pub fn is_neg_inf(&self) -> bool {
        matches!(self, Self::NegInf)
    }

    pub fn is_pos_inf(&self) -> bool {
        matches!(self, Self::PosInf)
    }
}

/// A range of key values with inclusive/exclusive endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub left: Bound,
    pub right: Bound,
    pub left_included: bool,
    pub right_included: bool,
}

impl Range {
    /// The whole domain.
    pub fn whole() -> Self {
        Range {
            left: Bound::NegInf,
            right: Bound::PosInf,
            left_included: false,
            right_included: false,
        }
    }

    /// The single point `[value, value]`.
    pub fn single_point(value: DataValue) -> Self {
        Range {
            left: Bound::Value(value.clone()),
            right: Bound::Value(value),
            left_included: true,
            right_included: true,
        }
    }

    pub fn new(left: Bound, left_included: bool, right: Bound, right_included: bool) -> Self {
        Range {
            left,
            right,
            left_included,
            right_included,
        }
    }
}

/// The two-bit result of a range probe: whether the predicate can evaluate
/// to true somewhere in the range, and whether it can evaluate to false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolMask {
    pub can_be_true: bool,
    pub can_be_false: bool,
}

impl BoolMask {
    pub const fn new(can_be_true: bool, can_be_false: bool) -> Self {
        BoolMask {
            can_be_true,
            can_be_false,
        }
    }

    /// The "unknown" mask.
    pub const fn unknown() -> Self {
        BoolMask::new(true, true)
    }
}

/// Monotonicity of a function over some value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Monotonicity {
    /// Increasing when true, decreasing when false.
    pub is_positive: bool,
    /// Strictly monotonic: distinct inputs map to distinct outputs.
    pub is_strict: bool,
}

/// A single-argument function known to be monotonic on some ranges.
///
/// Functions are recorded per key by the query planner when the index key
/// is an expression over the set's tuple position, e.g. `toDate(t)` for a
/// set over `t`.
pub trait MonotonicFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Monotonicity over `[left, right]`, or `None` when the function is
    /// not monotonic there.
    fn monotonicity_on(&self, ty: &DataType, left: &Bound, right: &Bound) -> Option<Monotonicity>;

    /// Apply the function to a single value.
    fn apply(&self, value: &DataValue) -> Result<DataValue, ConvertError>;
}

pub type MonotonicFunctionsChain = Vec<Arc<dyn MonotonicFunction>>;

fn apply_bound(
    func: &dyn MonotonicFunction,
    bound: &Bound,
    is_positive: bool,
) -> Result<Bound, ConvertError> {
    // Under a decreasing function the image of an infinity flips sign.
    Ok(match bound {
        Bound::NegInf if is_positive => Bound::NegInf,
        Bound::NegInf => Bound::PosInf,
        Bound::PosInf if is_positive => Bound::PosInf,
        Bound::PosInf => Bound::NegInf,
        Bound::Value(v) => Bound::Value(func.apply(v)?),
    })
}

/// Map a range through a chain of monotonic functions, yielding the image
/// range. Returns `None` when some function in the chain is not monotonic
/// on the intermediate range (unless the range is a single point, where
/// monotonicity is irrelevant).
pub fn apply_monotonic_functions_chain_to_range(
    mut range: Range,
    functions: &[Arc<dyn MonotonicFunction>],
    ty: &DataType,
    single_point: bool,
) -> Option<Range> {
    for func in functions {
        let monotonicity = if single_point {
            Monotonicity {
                is_positive: true,
                is_strict: true,
            }
        } else {
            func.monotonicity_on(ty, &range.left, &range.right)?
        };

        let left = apply_bound(func.as_ref(), &range.left, monotonicity.is_positive).ok()?;
        let right = apply_bound(func.as_ref(), &range.right, monotonicity.is_positive).ok()?;

        range = if monotonicity.is_positive {
            Range::new(left, range.left_included, right, range.right_included)
        } else {
            Range::new(right, range.right_included, left, range.left_included)
        };
        if !monotonicity.is_strict {
            // A non-strict function may collapse an open endpoint onto the
            // image boundary, so the image endpoints must be closed.
            range.left_included = true;
            range.right_included = true;
        }
    }
    Some(range)
}
