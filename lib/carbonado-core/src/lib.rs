//! Decoding, ordering and downsampling of raw time-series query results.
//!
//! A query result arrives as a flat RowBinary stream of `(name, time, value, timestamp)` records. [`parse::Parser`]
//! decodes it into a [`store::PointStore`] backed by pooled fixed-size blocks, [`order::sort_and_dedup`] orders the
//! points by metric and time while keeping only the latest write for every `(metric, time)` pair, and
//! [`group::group_and_rollup`] splits the result into per-metric series, downsamples each one and hands it to a
//! [`group::SeriesSink`].
#![deny(missing_docs)]

pub mod block;
pub mod group;
pub mod intern;
pub mod order;
pub mod parse;
pub mod pooling;
pub mod rollup;
pub mod sort;
pub mod store;
pub mod varint;

pub use self::block::{BlockPool, Point, BLOCK_SIZE};
pub use self::group::{group_and_rollup, GroupStats, Series, SeriesSink};
pub use self::order::sort_and_dedup;
pub use self::parse::{MetricPoint, ParseError, Parser};
pub use self::rollup::{Rollup, Sample};
pub use self::store::PointStore;
