//! RowBinary result parsing.
//!
//! The columnar store answers a points query with a flat sequence of records, each laid out as:
//!
//! ```text
//! varint    name length
//! [u8]      name
//! u32 (LE)  time
//! f64 (LE)  value
//! u32 (LE)  timestamp
//! ```
//!
//! Records repeat until the buffer is exhausted; a partial trailing record is an error.

use snafu::{ResultExt as _, Snafu};
use tracing::debug;

use crate::{
    block::{BlockPool, Point},
    store::PointStore,
    varint::{read_uvarint, VarintError},
};

/// Size of the fixed-width fields trailing the name in every record.
const FIXED_FIELDS_LEN: usize = 4 + 8 + 4;

/// A record-level decoding fault.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum RecordError {
    /// The name length prefix could not be decoded.
    #[snafu(display("invalid name length"))]
    NameLength {
        /// Underlying varint error.
        source: VarintError,
    },

    /// Fewer bytes remain than the record declares.
    #[snafu(display("record needs {} more byte(s), only {} remaining", needed, remaining))]
    TruncatedRecord {
        /// Bytes required for the name and fixed-width fields.
        needed: u64,

        /// Bytes remaining in the buffer.
        remaining: usize,
    },
}

/// A parse error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ParseError {
    /// The buffer is not a sequence of complete records.
    #[snafu(display("malformed response stream at offset {}", offset))]
    MalformedStream {
        /// Offset of the record that failed to decode.
        offset: usize,

        /// What was wrong with the record.
        source: RecordError,
    },
}

/// A point that does not come from a RowBinary buffer, such as one served from a cache.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricPoint {
    /// Metric name.
    pub metric: String,

    /// Logical timestamp of the sample, in seconds.
    pub time: i32,

    /// Sample value.
    pub value: f64,

    /// Write timestamp of the sample, in seconds.
    pub timestamp: i32,
}

/// A decoded record, borrowing its name from the input buffer.
struct RawRecord<'a> {
    name: &'a [u8],
    time: i32,
    value: f64,
    timestamp: i32,
}

/// Splits a RowBinary buffer into records.
struct RecordReader<'a> {
    body: &'a [u8],
    offset: usize,
}

impl<'a> RecordReader<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self { body, offset: 0 }
    }

    /// Reads the name length and checks that the whole record is present.
    ///
    /// Returns the name length and the offset where the name starts.
    fn record_header(&self) -> Result<(usize, usize), ParseError> {
        let remaining = &self.body[self.offset..];
        let (name_len, prefix_len) = read_uvarint(remaining)
            .context(NameLength)
            .context(MalformedStream { offset: self.offset })?;

        let available = remaining.len() - prefix_len;
        let needed = name_len.saturating_add(FIXED_FIELDS_LEN as u64);
        if needed > available as u64 {
            return Err(RecordError::TruncatedRecord {
                needed,
                remaining: available,
            })
            .context(MalformedStream { offset: self.offset });
        }

        // `needed` fits in the buffer, so the name length fits in a `usize`.
        Ok((name_len as usize, self.offset + prefix_len))
    }

    /// Skips over the next record without decoding its fields.
    fn skip(&mut self) -> Result<(), ParseError> {
        let (name_len, name_start) = self.record_header()?;
        self.offset = name_start + name_len + FIXED_FIELDS_LEN;
        Ok(())
    }

    fn next_record(&mut self) -> Result<RawRecord<'a>, ParseError> {
        let (name_len, name_start) = self.record_header()?;
        let body = self.body;

        let mut cursor = name_start + name_len;
        let name = &body[name_start..cursor];

        let time = u32::from_le_bytes(fixed(body, cursor)) as i32;
        cursor += 4;

        let value = f64::from_bits(u64::from_le_bytes(fixed(body, cursor)));
        cursor += 8;

        let timestamp = u32::from_le_bytes(fixed(body, cursor)) as i32;
        cursor += 4;

        self.offset = cursor;

        Ok(RawRecord {
            name,
            time,
            value,
            timestamp,
        })
    }

    fn is_exhausted(&self) -> bool {
        self.offset >= self.body.len()
    }
}

#[inline]
fn fixed<const N: usize>(body: &[u8], offset: usize) -> [u8; N] {
    let mut bytes = [0; N];
    bytes.copy_from_slice(&body[offset..offset + N]);
    bytes
}

/// Counts the records in `body` without decoding them.
///
/// Only the name length prefixes are read; names and fixed-width fields are skipped over.
///
/// # Errors
///
/// If the buffer is not a sequence of complete records, an error is returned.
pub fn count_records(body: &[u8]) -> Result<usize, ParseError> {
    let mut reader = RecordReader::new(body);
    let mut count = 0;
    while !reader.is_exhausted() {
        reader.skip()?;
        count += 1;
    }
    Ok(count)
}

/// RowBinary parser.
///
/// Decodes a query response into a [`PointStore`], interning metric names as it goes. Responses are usually grouped by
/// metric, so a name identical to the previous record's reuses its identifier without a table lookup.
#[derive(Clone)]
pub struct Parser {
    pool: BlockPool,
    reversed_names: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a new `Parser` drawing blocks from the process-wide pool.
    pub fn new() -> Self {
        Self {
            pool: BlockPool::global().clone(),
            reversed_names: false,
        }
    }

    /// Sets the pool that blocks are acquired from.
    pub fn with_pool(mut self, pool: BlockPool) -> Self {
        self.pool = pool;
        self
    }

    /// Sets whether metric names in the response are reversed paths.
    ///
    /// When enabled, names are canonicalized by reversing their dot-separated segments, so that `load.cpu.host1` in
    /// the response is stored, ordered and emitted as `host1.cpu.load`.
    ///
    /// Defaults to `false`.
    pub fn with_reversed_names(mut self, reversed_names: bool) -> Self {
        self.reversed_names = reversed_names;
        self
    }

    /// Parses `body` into a new point store.
    ///
    /// # Errors
    ///
    /// If the buffer is not a sequence of complete records, an error is returned. Parsing stops at the first malformed
    /// record, and any blocks acquired so far are returned to the pool.
    pub fn parse<'a>(&self, body: &'a [u8]) -> Result<PointStore<'a>, ParseError> {
        let store = PointStore::new(body, self.pool.clone());
        self.parse_into(store)
    }

    /// Parses `body` into a new point store that also holds `extra` points.
    ///
    /// The buffer is counted first so that the store can be sized upfront for both sources. Extra points are stored
    /// ahead of the decoded records and share the same name table.
    ///
    /// # Errors
    ///
    /// If the buffer is not a sequence of complete records, an error is returned.
    pub fn parse_with_extra<'a>(&self, body: &'a [u8], extra: &'a [MetricPoint]) -> Result<PointStore<'a>, ParseError> {
        let count = count_records(body)?;
        let mut store = PointStore::with_capacity(body, self.pool.clone(), count + extra.len());

        let mut last: Option<(&[u8], u32)> = None;
        for point in extra {
            let name = point.metric.as_bytes();
            let id = match last {
                Some((last_name, id)) if last_name == name => id,
                _ => store.names_mut().intern(name),
            };
            last = Some((name, id));

            store.push(Point {
                id,
                time: point.time,
                value: point.value,
                timestamp: point.timestamp,
            });
        }

        self.parse_into(store)
    }

    fn parse_into<'a>(&self, mut store: PointStore<'a>) -> Result<PointStore<'a>, ParseError> {
        let mut reader = RecordReader::new(store.body());
        let mut last: Option<(&'a [u8], u32)> = None;

        while !reader.is_exhausted() {
            let record = reader.next_record()?;

            let id = match last {
                Some((last_name, id)) if last_name == record.name => id,
                _ => {
                    let names = store.names_mut();
                    if self.reversed_names {
                        names.intern_reversed(record.name)
                    } else {
                        names.intern(record.name)
                    }
                }
            };
            last = Some((record.name, id));

            store.push(Point {
                id,
                time: record.time,
                value: record.value,
                timestamp: record.timestamp,
            });
        }

        debug!(
            bytes = store.body().len(),
            points = store.len(),
            metrics = store.names().len(),
            blocks = store.block_count(),
            "Parsed RowBinary response."
        );

        Ok(store)
    }
}
