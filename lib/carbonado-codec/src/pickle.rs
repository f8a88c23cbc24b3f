//! Pickle (protocol 2) encoding of rendered series.
//!
//! The reply is a list of dicts, one per series:
//!
//! ```text
//! [{"name": str, "step": int, "values": [float | None, ...], "start": int, "end": int}, ...]
//! ```
//!
//! Only the handful of opcodes needed to build that structure are emitted.

use std::io::Write;

use carbonado_core::{Series, SeriesSink};
use snafu::ResultExt as _;

use crate::{
    error::{EncodeError, Io},
    window::Window,
};

const PROTO: u8 = 0x80;
const PROTOCOL_VERSION: u8 = 2;
const EMPTY_LIST: u8 = b']';
const EMPTY_DICT: u8 = b'}';
const APPEND: u8 = b'a';
const SETITEM: u8 = b's';
const BINUNICODE: u8 = b'X';
const BININT: u8 = b'J';
const BINFLOAT: u8 = b'G';
const NONE: u8 = b'N';
const STOP: u8 = b'.';

/// The complete reply for a query that matched no series: an empty list.
pub const PICKLE_EMPTY_LIST: &[u8] = &[PROTO, PROTOCOL_VERSION, EMPTY_LIST, STOP];

struct PickleWriter<W> {
    inner: W,
}

impl<W: Write> PickleWriter<W> {
    fn header(&mut self) -> std::io::Result<()> {
        self.inner.write_all(&[PROTO, PROTOCOL_VERSION])
    }

    fn list(&mut self) -> std::io::Result<()> {
        self.inner.write_all(&[EMPTY_LIST])
    }

    fn dict(&mut self) -> std::io::Result<()> {
        self.inner.write_all(&[EMPTY_DICT])
    }

    fn append(&mut self) -> std::io::Result<()> {
        self.inner.write_all(&[APPEND])
    }

    fn set_item(&mut self) -> std::io::Result<()> {
        self.inner.write_all(&[SETITEM])
    }

    fn string(&mut self, value: &str) -> std::io::Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| std::io::Error::other("string too long to pickle"))?;
        self.inner.write_all(&[BINUNICODE])?;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(value.as_bytes())
    }

    fn int(&mut self, value: i32) -> std::io::Result<()> {
        self.inner.write_all(&[BININT])?;
        self.inner.write_all(&value.to_le_bytes())
    }

    fn append_float(&mut self, value: f64) -> std::io::Result<()> {
        self.inner.write_all(&[BINFLOAT])?;
        self.inner.write_all(&value.to_be_bytes())?;
        self.append()
    }

    fn append_nones(&mut self, count: usize) -> std::io::Result<()> {
        for _ in 0..count {
            self.inner.write_all(&[NONE, APPEND])?;
        }
        Ok(())
    }

    fn key(&mut self, key: &str) -> std::io::Result<()> {
        self.string(key)
    }

    fn stop(&mut self) -> std::io::Result<()> {
        self.inner.write_all(&[STOP])
    }
}

/// Encodes series as a pickled list of dicts.
///
/// Series are written as they arrive. Once every series has been written, [`finish`][Self::finish] terminates the
/// stream, or writes [`PICKLE_EMPTY_LIST`] if no series was written at all.
pub struct PickleEncoder<W> {
    writer: PickleWriter<W>,
    from: i32,
    until: i32,
    prefix: Option<String>,
    started: bool,
}

impl<W: Write> PickleEncoder<W> {
    /// Creates a new `PickleEncoder` for the query window `[from, until]`, in seconds.
    pub fn new(inner: W, from: i32, until: i32) -> Self {
        Self {
            writer: PickleWriter { inner },
            from,
            until,
            prefix: None,
            started: false,
        }
    }

    /// Sets the prefix to prepend, dot-separated, to every series name.
    ///
    /// An empty prefix is ignored.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Terminates the stream and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// If the output cannot be written, an error is returned.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        if self.started {
            self.writer.stop().context(Io)?;
        } else {
            self.writer.inner.write_all(PICKLE_EMPTY_LIST).context(Io)?;
        }

        self.writer.inner.flush().context(Io)?;
        Ok(self.writer.inner)
    }

    fn write_values(&mut self, series: &Series<'_>, window: &Window) -> std::io::Result<()> {
        let slots = window.slots();

        // Slots up to `filled` have been written, either with a value or with `None`.
        let mut filled = 0;
        for sample in series.samples {
            let Some(slot) = window.slot_of(sample.time) else {
                continue;
            };
            if slot < filled {
                continue;
            }

            self.writer.append_nones(slot - filled)?;
            self.writer.append_float(sample.value)?;
            filled = slot + 1;
        }

        self.writer.append_nones(slots - filled)
    }
}

impl<W: Write> SeriesSink for PickleEncoder<W> {
    type Error = EncodeError;

    fn write_series(&mut self, series: Series<'_>) -> Result<(), Self::Error> {
        if !self.started {
            self.writer.header().context(Io)?;
            self.writer.list().context(Io)?;
            self.started = true;
        }

        let window = Window::new(self.from, self.until, series.step);

        let w = &mut self.writer;
        w.dict().context(Io)?;

        w.key("name").context(Io)?;
        match &self.prefix {
            Some(prefix) => w.string(&format!("{}.{}", prefix, series.name)).context(Io)?,
            None => w.string(series.name).context(Io)?,
        }
        w.set_item().context(Io)?;

        w.key("step").context(Io)?;
        w.int(window.step()).context(Io)?;
        w.set_item().context(Io)?;

        w.key("values").context(Io)?;
        w.list().context(Io)?;
        self.write_values(&series, &window).context(Io)?;

        let w = &mut self.writer;
        w.set_item().context(Io)?;

        w.key("start").context(Io)?;
        w.int(window.start()).context(Io)?;
        w.set_item().context(Io)?;

        w.key("end").context(Io)?;
        w.int(window.end()).context(Io)?;
        w.set_item().context(Io)?;

        w.append().context(Io)
    }
}

#[cfg(test)]
mod tests {
    use carbonado_core::Sample;
    use proptest::prelude::*;
    use similar_asserts::assert_eq;

    use super::*;

    struct Expected(Vec<u8>);

    impl Expected {
        fn new() -> Self {
            Self(vec![PROTO, PROTOCOL_VERSION, EMPTY_LIST])
        }

        fn op(mut self, op: u8) -> Self {
            self.0.push(op);
            self
        }

        fn string(mut self, value: &str) -> Self {
            self.0.push(BINUNICODE);
            self.0.extend_from_slice(&(value.len() as u32).to_le_bytes());
            self.0.extend_from_slice(value.as_bytes());
            self
        }

        fn int(mut self, value: i32) -> Self {
            self.0.push(BININT);
            self.0.extend_from_slice(&value.to_le_bytes());
            self
        }

        fn float(mut self, value: f64) -> Self {
            self.0.push(BINFLOAT);
            self.0.extend_from_slice(&value.to_be_bytes());
            self.op(APPEND)
        }

        fn none(self) -> Self {
            self.op(NONE).op(APPEND)
        }
    }

    fn series<'s>(name: &'s str, step: i32, samples: &'s [Sample]) -> Series<'s> {
        Series { name, step, samples }
    }

    /// Counts the grid entries of an encoded single-series stream by walking its opcodes.
    fn count_values(bytes: &[u8]) -> usize {
        let mut count = 0;
        let mut i = 2;
        while i < bytes.len() {
            match bytes[i] {
                BINUNICODE => {
                    let len = u32::from_le_bytes(bytes[i + 1..i + 5].try_into().unwrap()) as usize;
                    i += 5 + len;
                }
                BININT => i += 5,
                BINFLOAT => {
                    count += 1;
                    i += 9;
                }
                NONE => {
                    count += 1;
                    i += 1;
                }
                _ => i += 1,
            }
        }
        count
    }

    #[test]
    fn no_series_writes_empty_list() {
        let encoder = PickleEncoder::new(Vec::new(), 0, 100);
        assert_eq!(encoder.finish().unwrap(), PICKLE_EMPTY_LIST.to_vec());
    }

    #[test]
    fn single_series() {
        let samples = [Sample::new(60, 1.0)];

        let mut encoder = PickleEncoder::new(Vec::new(), 60, 120);
        encoder.write_series(series("a", 60, &samples)).unwrap();
        let actual = encoder.finish().unwrap();

        let expected = Expected::new()
            .op(EMPTY_DICT)
            .string("name")
            .string("a")
            .op(SETITEM)
            .string("step")
            .int(60)
            .op(SETITEM)
            .string("values")
            .op(EMPTY_LIST)
            .float(1.0)
            .none()
            .op(SETITEM)
            .string("start")
            .int(60)
            .op(SETITEM)
            .string("end")
            .int(120)
            .op(SETITEM)
            .op(APPEND)
            .op(STOP);

        assert_eq!(actual, expected.0);
    }

    #[test]
    fn gaps_and_out_of_window_points() {
        let samples = [
            Sample::new(0, 9.0),
            Sample::new(120, 1.0),
            Sample::new(150, 5.0),
            Sample::new(240, 2.0),
            Sample::new(600, 9.0),
        ];

        let mut encoder = PickleEncoder::new(Vec::new(), 60, 300);
        encoder.write_series(series("a", 60, &samples)).unwrap();
        let actual = encoder.finish().unwrap();

        let expected = Expected::new()
            .op(EMPTY_DICT)
            .string("name")
            .string("a")
            .op(SETITEM)
            .string("step")
            .int(60)
            .op(SETITEM)
            .string("values")
            .op(EMPTY_LIST)
            .none()
            .float(1.0)
            .none()
            .float(2.0)
            .none()
            .op(SETITEM)
            .string("start")
            .int(60)
            .op(SETITEM)
            .string("end")
            .int(300)
            .op(SETITEM)
            .op(APPEND)
            .op(STOP);

        assert_eq!(actual, expected.0);
    }

    #[test]
    fn prefix_is_dot_joined() {
        let mut encoder = PickleEncoder::new(Vec::new(), 60, 60).with_prefix("dc1");
        encoder.write_series(series("cpu.load", 60, &[])).unwrap();
        let actual = encoder.finish().unwrap();

        let expected = Expected::new().op(EMPTY_DICT).string("name").string("dc1.cpu.load");
        assert!(actual.starts_with(&expected.0));
    }

    #[test]
    fn empty_prefix_is_ignored() {
        let mut encoder = PickleEncoder::new(Vec::new(), 60, 60).with_prefix("");
        encoder.write_series(series("cpu.load", 60, &[])).unwrap();
        let actual = encoder.finish().unwrap();

        let expected = Expected::new().op(EMPTY_DICT).string("name").string("cpu.load");
        assert!(actual.starts_with(&expected.0));
    }

    #[test]
    fn window_at_end_of_time_range() {
        let samples = [Sample::new(2_147_483_640, 1.0)];

        let mut encoder = PickleEncoder::new(Vec::new(), i32::MAX - 5, i32::MAX);
        encoder.write_series(series("a", 60, &samples)).unwrap();
        let actual = encoder.finish().unwrap();

        let expected = Expected::new()
            .op(EMPTY_DICT)
            .string("name")
            .string("a")
            .op(SETITEM)
            .string("step")
            .int(60)
            .op(SETITEM)
            .string("values")
            .op(EMPTY_LIST)
            .op(SETITEM)
            .string("start")
            .int(i32::MAX)
            .op(SETITEM)
            .string("end")
            .int(2_147_483_640)
            .op(SETITEM)
            .op(APPEND)
            .op(STOP);

        assert_eq!(actual, expected.0);
    }

    proptest! {
        #[test]
        fn property_test_grid_is_complete(
            from in 0i32..10_000,
            len in 0i32..10_000,
            step in 1i32..600,
            times in proptest::collection::btree_set(0i32..20_000, 0..64),
        ) {
            let samples = times.iter().map(|t| Sample::new(*t, 1.0)).collect::<Vec<_>>();

            let mut encoder = PickleEncoder::new(Vec::new(), from, from + len);
            encoder.write_series(series("m", step, &samples)).unwrap();
            let actual = encoder.finish().unwrap();

            let window = Window::new(from, from + len, step);
            prop_assert_eq!(count_values(&actual), window.slots());
        }
    }
}
