// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! Array operations: typed comparison and accurate casts.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use num_traits::ToPrimitive;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::*;
use crate::for_all_variants;
use crate::types::{
    scale_multiplier, ConvertError, DataType, DataTypeKind, Date, DateTime, DateTime64, F64,
};

type A = ArrayImpl;
type Result = std::result::Result<ArrayImpl, ConvertError>;

/// Days from the Common Era to the Unix epoch (1970-01-01).
const EPOCH_NUM_DAYS: i32 = 719_163;

const SECONDS_PER_DAY: i64 = 86_400;

fn cmp_opt<T: PartialOrd + ?Sized>(a: Option<&T>, b: Option<&T>) -> Ordering {
    // NULL sorts after any value, matching the ordered-set index layout.
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

macro_rules! impl_compare_at {
    ([], $( { $Abc:ident, $Type:ty, $abc:ident, $AbcArray:ty, $AbcArrayBuilder:ty, $Value:ident } ),*) => {
        impl ArrayImpl {
            /// Compare the value at `i` with the value at `j` of `other`.
            /// Both arrays must hold the same type. NULL compares greater
            /// than any value and equal to NULL.
            pub fn compare_at(&self, i: usize, other: &ArrayImpl, j: usize) -> Ordering {
                match (self, other) {
                    $(
                        (Self::$Abc(a), Self::$Abc(b)) => cmp_opt(a.get(i), b.get(j)),
                    )*
                    _ => panic!("failed to compare values: type mismatch"),
                }
            }
        }
    }
}

for_all_variants! { impl_compare_at }

/// Perform a per-row operation, passing NULL through.
fn unary_op<A, O, F, V>(a: &A, f: F) -> O
where
    A: Array,
    O: Array,
    V: Borrow<O::Item>,
    F: Fn(&A::Item) -> V,
{
    let mut builder = O::Builder::with_capacity(a.len());
    for e in a.iter() {
        if let Some(e) = e {
            builder.push(Some(f(e).borrow()));
        } else {
            builder.push(None);
        }
    }
    builder.finish()
}

/// Perform a fallible per-row operation, failing the whole cast on the
/// first unrepresentable value.
fn try_unary_op<A, O, F, V>(a: &A, f: F) -> std::result::Result<O, ConvertError>
where
    A: Array,
    O: Array,
    V: Borrow<O::Item>,
    F: Fn(&A::Item) -> std::result::Result<V, ConvertError>,
{
    let mut builder = O::Builder::with_capacity(a.len());
    for e in a.iter() {
        if let Some(e) = e {
            builder.push(Some(f(e)?.borrow()));
        } else {
            builder.push(None);
        }
    }
    Ok(builder.finish())
}

/// Perform a fallible per-row operation, turning unrepresentable values
/// into NULL.
fn unary_op_or_null<A, O, F, V>(a: &A, f: F) -> O
where
    A: Array,
    O: Array,
    V: Borrow<O::Item>,
    F: Fn(&A::Item) -> std::result::Result<V, ConvertError>,
{
    let mut builder = O::Builder::with_capacity(a.len());
    for e in a.iter() {
        match e.map(&f) {
            Some(Ok(v)) => builder.push(Some(v.borrow())),
            _ => builder.push(None),
        }
    }
    builder.finish()
}

macro_rules! fallible {
    ($a:expr, $or_null:expr, $f:expr) => {
        if $or_null {
            unary_op_or_null($a, $f)
        } else {
            try_unary_op($a, $f)?
        }
    };
}

fn cast_err(v: impl ToString, to: &'static str) -> ConvertError {
    ConvertError::Cast(v.to_string(), to)
}

impl ArrayImpl {
    /// Cast the array to another type. Fails on the first value that cannot
    /// be represented exactly in the target type.
    ///
    /// `from` is the declared type of this array; it carries information the
    /// physical array does not, such as the `DateTime64` scale.
    pub fn cast_accurate(&self, from: &DataType, to: &DataType) -> Result {
        self.cast_inner(from, to, false)
    }

    /// Like [`cast_accurate`](Self::cast_accurate), but unrepresentable
    /// values become NULL instead of failing the cast.
    pub fn cast_accurate_or_null(&self, from: &DataType, to: &DataType) -> Result {
        self.cast_inner(from, to, true)
    }

    fn cast_inner(&self, from: &DataType, to: &DataType, or_null: bool) -> Result {
        type Kind = DataTypeKind;
        if from.kind() == to.kind() {
            return Ok(self.clone());
        }
        Ok(match self {
            A::Bool(a) => match to.kind() {
                Kind::Bool => self.clone(),
                Kind::Int16 => A::Int16(unary_op(a, |&b| b as i16)),
                Kind::Int32 => A::Int32(unary_op(a, |&b| b as i32)),
                Kind::Int64 => A::Int64(unary_op(a, |&b| b as i64)),
                Kind::Float64 => A::Float64(unary_op(a, |&b| F64::from(b as u8 as f64))),
                Kind::Decimal => A::Decimal(unary_op(a, |&b| Decimal::from(b as u8))),
                Kind::String => A::String(unary_op(a, |&b| if b { "true" } else { "false" })),
                _ => return Err(ConvertError::NoCast("Bool", *to)),
            },
            A::Int16(a) => match to.kind() {
                Kind::Bool => A::Bool(fallible!(a, or_null, |&i: &i16| match i {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(cast_err(i, "Bool")),
                })),
                Kind::Int16 => self.clone(),
                Kind::Int32 => A::Int32(unary_op(a, |&i| i as i32)),
                Kind::Int64 => A::Int64(unary_op(a, |&i| i as i64)),
                Kind::Float64 => A::Float64(unary_op(a, |&i| F64::from(i as f64))),
                Kind::Decimal => A::Decimal(unary_op(a, |&i| Decimal::from(i))),
                Kind::String => A::String(unary_op(a, |i| i.to_string())),
                _ => return Err(ConvertError::NoCast("Int16", *to)),
            },
            A::Int32(a) => match to.kind() {
                Kind::Bool => A::Bool(fallible!(a, or_null, |&i: &i32| match i {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(cast_err(i, "Bool")),
                })),
                Kind::Int16 => A::Int16(fallible!(a, or_null, |&i: &i32| i16::try_from(i)
                    .map_err(|_| cast_err(i, "Int16")))),
                Kind::Int32 => self.clone(),
                Kind::Int64 => A::Int64(unary_op(a, |&i| i as i64)),
                Kind::Float64 => A::Float64(unary_op(a, |&i| F64::from(i as f64))),
                Kind::Decimal => A::Decimal(unary_op(a, |&i| Decimal::from(i))),
                Kind::String => A::String(unary_op(a, |i| i.to_string())),
                _ => return Err(ConvertError::NoCast("Int32", *to)),
            },
            A::Int64(a) => match to.kind() {
                Kind::Bool => A::Bool(fallible!(a, or_null, |&i: &i64| match i {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(cast_err(i, "Bool")),
                })),
                Kind::Int16 => A::Int16(fallible!(a, or_null, |&i: &i64| i16::try_from(i)
                    .map_err(|_| cast_err(i, "Int16")))),
                Kind::Int32 => A::Int32(fallible!(a, or_null, |&i: &i64| i32::try_from(i)
                    .map_err(|_| cast_err(i, "Int32")))),
                Kind::Int64 => self.clone(),
                Kind::Float64 => A::Float64(fallible!(a, or_null, |&i: &i64| {
                    let f = i as f64;
                    if f as i64 == i {
                        Ok(F64::from(f))
                    } else {
                        Err(cast_err(i, "Float64"))
                    }
                })),
                Kind::Decimal => A::Decimal(unary_op(a, |&i| Decimal::from(i))),
                Kind::String => A::String(unary_op(a, |i| i.to_string())),
                _ => return Err(ConvertError::NoCast("Int64", *to)),
            },
            A::Float64(a) => match to.kind() {
                Kind::Int16 => A::Int16(fallible!(a, or_null, |f: &F64| float_to_int::<i16>(
                    f.0, "Int16"
                ))),
                Kind::Int32 => A::Int32(fallible!(a, or_null, |f: &F64| float_to_int::<i32>(
                    f.0, "Int32"
                ))),
                Kind::Int64 => A::Int64(fallible!(a, or_null, |f: &F64| float_to_int::<i64>(
                    f.0, "Int64"
                ))),
                Kind::Float64 => self.clone(),
                Kind::Decimal => A::Decimal(fallible!(a, or_null, |f: &F64| {
                    Decimal::from_f64_retain(f.0).ok_or_else(|| cast_err(f, "Decimal"))
                })),
                Kind::String => A::String(unary_op(a, |f| f.to_string())),
                _ => return Err(ConvertError::NoCast("Float64", *to)),
            },
            A::Decimal(a) => match to.kind() {
                Kind::Int16 => A::Int16(fallible!(a, or_null, |d: &Decimal| decimal_to_int(
                    d,
                    |d| d.to_i16(),
                    "Int16"
                ))),
                Kind::Int32 => A::Int32(fallible!(a, or_null, |d: &Decimal| decimal_to_int(
                    d,
                    |d| d.to_i32(),
                    "Int32"
                ))),
                Kind::Int64 => A::Int64(fallible!(a, or_null, |d: &Decimal| decimal_to_int(
                    d,
                    |d| d.to_i64(),
                    "Int64"
                ))),
                Kind::Float64 => A::Float64(fallible!(a, or_null, |d: &Decimal| {
                    let f = d.to_f64().ok_or_else(|| cast_err(d, "Float64"))?;
                    if Decimal::from_f64_retain(f) == Some(*d) {
                        Ok(F64::from(f))
                    } else {
                        Err(cast_err(d, "Float64"))
                    }
                })),
                Kind::Decimal => self.clone(),
                Kind::String => A::String(unary_op(a, |d| d.to_string())),
                _ => return Err(ConvertError::NoCast("Decimal", *to)),
            },
            A::Date(a) => match to.kind() {
                Kind::Date => self.clone(),
                Kind::DateTime => A::DateTime(unary_op(a, |d: &Date| {
                    DateTime::from_timestamp((d.num_days() - EPOCH_NUM_DAYS) as i64 * SECONDS_PER_DAY)
                })),
                Kind::String => A::String(unary_op(a, |d| d.to_string())),
                _ => return Err(ConvertError::NoCast("Date", *to)),
            },
            A::DateTime(a) => match to.kind() {
                Kind::Date => A::Date(fallible!(a, or_null, |t: &DateTime| {
                    let secs = t.timestamp();
                    if secs % SECONDS_PER_DAY != 0 {
                        return Err(cast_err(t, "Date"));
                    }
                    let days = secs.div_euclid(SECONDS_PER_DAY) + EPOCH_NUM_DAYS as i64;
                    i32::try_from(days)
                        .ok()
                        .and_then(Date::from_num_days)
                        .ok_or_else(|| cast_err(t, "Date"))
                })),
                Kind::DateTime => self.clone(),
                Kind::DateTime64(scale) => {
                    let multiplier = scale_multiplier(scale);
                    A::DateTime64(fallible!(a, or_null, move |t: &DateTime| {
                        t.timestamp()
                            .checked_mul(multiplier)
                            .map(DateTime64::new)
                            .ok_or_else(|| cast_err(t, "DateTime64"))
                    }))
                }
                Kind::Int64 => A::Int64(unary_op(a, |t: &DateTime| t.timestamp())),
                Kind::String => A::String(unary_op(a, |t| t.to_string())),
                _ => return Err(ConvertError::NoCast("DateTime", *to)),
            },
            A::DateTime64(a) => {
                let from_scale = match from.kind() {
                    Kind::DateTime64(s) => s,
                    _ => panic!("DateTime64 array declared with non-DateTime64 type"),
                };
                match to.kind() {
                    // Downscale conversions floor towards negative infinity;
                    // exactness is enforced by the caller's precision guard.
                    Kind::DateTime => {
                        let multiplier = scale_multiplier(from_scale);
                        A::DateTime(unary_op(a, move |t: &DateTime64| {
                            DateTime::from_timestamp(t.ticks().div_euclid(multiplier))
                        }))
                    }
                    Kind::DateTime64(to_scale) if to_scale < from_scale => {
                        let multiplier = scale_multiplier(from_scale - to_scale);
                        A::DateTime64(unary_op(a, move |t: &DateTime64| {
                            DateTime64::new(t.ticks().div_euclid(multiplier))
                        }))
                    }
                    Kind::DateTime64(to_scale) => {
                        let multiplier = scale_multiplier(to_scale - from_scale);
                        A::DateTime64(fallible!(a, or_null, move |t: &DateTime64| {
                            t.ticks()
                                .checked_mul(multiplier)
                                .map(DateTime64::new)
                                .ok_or_else(|| cast_err(t, "DateTime64"))
                        }))
                    }
                    Kind::Date => {
                        let multiplier = scale_multiplier(from_scale);
                        A::Date(fallible!(a, or_null, move |t: &DateTime64| {
                            let days = t
                                .ticks()
                                .div_euclid(multiplier)
                                .div_euclid(SECONDS_PER_DAY)
                                + EPOCH_NUM_DAYS as i64;
                            i32::try_from(days)
                                .ok()
                                .and_then(Date::from_num_days)
                                .ok_or_else(|| cast_err(t, "Date"))
                        }))
                    }
                    Kind::Int64 => A::Int64(unary_op(a, |t: &DateTime64| t.ticks())),
                    Kind::String => A::String(unary_op(a, |t| t.to_string())),
                    _ => return Err(ConvertError::NoCast("DateTime64", *to)),
                }
            }
            A::String(a) => match to.kind() {
                Kind::Bool => A::Bool(fallible!(a, or_null, |s: &str| s
                    .parse::<bool>()
                    .map_err(|e| ConvertError::ParseBool(s.into(), e)))),
                Kind::Int16 => A::Int16(fallible!(a, or_null, |s: &str| s
                    .parse::<i16>()
                    .map_err(|e| ConvertError::ParseInt(s.into(), e)))),
                Kind::Int32 => A::Int32(fallible!(a, or_null, |s: &str| s
                    .parse::<i32>()
                    .map_err(|e| ConvertError::ParseInt(s.into(), e)))),
                Kind::Int64 => A::Int64(fallible!(a, or_null, |s: &str| s
                    .parse::<i64>()
                    .map_err(|e| ConvertError::ParseInt(s.into(), e)))),
                Kind::Float64 => A::Float64(fallible!(a, or_null, |s: &str| s
                    .parse::<f64>()
                    .map(F64::from)
                    .map_err(|e| ConvertError::ParseFloat(s.into(), e)))),
                Kind::Decimal => A::Decimal(fallible!(a, or_null, |s: &str| s
                    .parse::<Decimal>()
                    .map_err(|_| ConvertError::ParseDecimal(s.into())))),
                Kind::Date => A::Date(fallible!(a, or_null, |s: &str| s
                    .parse::<Date>()
                    .map_err(|e| ConvertError::ParseDate(s.into(), e)))),
                Kind::DateTime => A::DateTime(fallible!(a, or_null, |s: &str| s
                    .parse::<DateTime>()
                    .map_err(|e| ConvertError::ParseDate(s.into(), e)))),
                Kind::String => self.clone(),
                _ => return Err(ConvertError::NoCast("String", *to)),
            },
        })
    }
}

fn float_to_int<T>(f: f64, name: &'static str) -> std::result::Result<T, ConvertError>
where
    T: TryFrom<i64>,
{
    if f.fract() != 0.0 || !f.is_finite() {
        return Err(cast_err(f, name));
    }
    if f < i64::MIN as f64 || f > i64::MAX as f64 {
        return Err(cast_err(f, name));
    }
    T::try_from(f as i64).map_err(|_| cast_err(f, name))
}

fn decimal_to_int<T>(
    d: &Decimal,
    to: impl Fn(&Decimal) -> Option<T>,
    name: &'static str,
) -> std::result::Result<T, ConvertError> {
    if !d.fract().is_zero() {
        return Err(cast_err(d, name));
    }
    to(d).ok_or_else(|| cast_err(d, name))
}

type CompiledCast = Arc<dyn Fn(&ArrayImpl) -> Result + Send + Sync>;

#[derive(Clone, PartialEq, Eq, Hash)]
struct CastKey {
    from: DataType,
    to: DataType,
    or_null: bool,
}

/// A memo of compiled casts, keyed by the source and target types.
///
/// The cache is logically global to a query context: it is shared by all
/// readers of a [`Set`](crate::set::Set) and passed into `execute` by
/// reference, never owned by the set itself.
#[derive(Default)]
pub struct CastCache {
    cache: RwLock<HashMap<CastKey, CompiledCast>>,
}

impl CastCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cast `array` from `from` to `to`, memoizing the compiled cast.
    pub fn cast(
        &self,
        array: &ArrayImpl,
        from: &DataType,
        to: &DataType,
        or_null: bool,
    ) -> Result {
        let key = CastKey {
            from: *from,
            to: *to,
            or_null,
        };
        let compiled = self.cache.read().get(&key).cloned();
        let compiled = match compiled {
            Some(f) => f,
            None => {
                let (from, to) = (*from, *to);
                let f: CompiledCast = if or_null {
                    Arc::new(move |a: &ArrayImpl| a.cast_accurate_or_null(&from, &to))
                } else {
                    Arc::new(move |a: &ArrayImpl| a.cast_accurate(&from, &to))
                };
                self.cache
                    .write()
                    .entry(key)
                    .or_insert_with(|| f.clone())
                    .clone()
            }
        };
        compiled(array)
    }
}
