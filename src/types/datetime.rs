// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! Calendar value types.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A wrapper for [`NaiveDate`].
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Date(NaiveDate);

impl Date {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Date)
    }

    /// Days since the Common Era, the fixed-width image of the date.
    pub fn num_days(&self) -> i32 {
        self.0.num_days_from_ce()
    }

    pub fn from_num_days(days: i32) -> Option<Self> {
        NaiveDate::from_num_days_from_ce_opt(days).map(Date)
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Date {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::from_str(s).map(Date)
    }
}

/// Timestamp with second precision, stored as seconds since the Unix epoch.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DateTime(i64);

impl DateTime {
    pub const fn from_timestamp(secs: i64) -> Self {
        DateTime(secs)
    }

    pub const fn timestamp(&self) -> i64 {
        self.0
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match chrono::DateTime::from_timestamp(self.0, 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for DateTime {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?;
        Ok(DateTime(dt.and_utc().timestamp()))
    }
}

/// Sub-second timestamp, stored as ticks of `10^-scale` seconds. The scale
/// lives on the data type, not on the value.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DateTime64(i64);

impl DateTime64 {
    pub const fn new(ticks: i64) -> Self {
        DateTime64(ticks)
    }

    pub const fn ticks(&self) -> i64 {
        self.0
    }
}

impl Display for DateTime64 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `10^scale`, the tick count of one second at the given scale.
pub fn scale_multiplier(scale: u8) -> i64 {
    10i64.pow(scale as u32)
}
