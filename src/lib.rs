// Copyright 2024 Inset Project Authors. Licensed under Apache-2.0.

//! The IN-set core of a column-oriented analytical query engine.
//!
//! Two tightly coupled components live here:
//!
//! - [`set::Set`]: an append-only, thread-safe hash set over N-tuples of
//!   typed column values. It is built incrementally from column blocks and
//!   probed in bulk against column blocks, yielding a boolean column of
//!   membership results.
//! - [`set::OrderedSetIndex`]: a lexicographically sorted materialization of
//!   the same set over a projected key subset, answering whether a
//!   hyperrectangle of key ranges intersects the set.

pub mod array;
pub mod keyrange;
pub mod set;
pub mod types;
