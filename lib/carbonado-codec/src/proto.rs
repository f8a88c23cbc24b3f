//! Protobuf encoding of rendered series.
//!
//! The reply is a `MultiFetchResponse` as understood by carbonzipper-compatible clients:
//!
//! ```text
//! message FetchResponse {
//!     required string name = 1;
//!     required int32 startTime = 2;
//!     required int32 stopTime = 3;
//!     required int32 stepTime = 4;
//!     repeated double values = 5;
//!     repeated bool isAbsent = 6;
//! }
//!
//! message MultiFetchResponse {
//!     repeated FetchResponse metrics = 1;
//! }
//! ```
//!
//! Repeated fields are not packed. Since a `MultiFetchResponse` is nothing but its repeated `metrics` field, each
//! `FetchResponse` is written out as soon as its series is rendered.

use std::io::Write;

use carbonado_core::{Series, SeriesSink};
use protobuf::CodedOutputStream;
use snafu::ResultExt as _;

use crate::{
    error::{EncodeError, Io, Protobuf},
    window::Window,
};

const MULTI_FETCH_RESPONSE_METRICS: u32 = 1;

const FETCH_RESPONSE_NAME: u32 = 1;
const FETCH_RESPONSE_START_TIME: u32 = 2;
const FETCH_RESPONSE_STOP_TIME: u32 = 3;
const FETCH_RESPONSE_STEP_TIME: u32 = 4;
const FETCH_RESPONSE_VALUES: u32 = 5;
const FETCH_RESPONSE_IS_ABSENT: u32 = 6;

/// Encodes series as a protobuf `MultiFetchResponse`.
///
/// No bytes are written when there are no series, which is the encoding of an empty `MultiFetchResponse`.
pub struct ProtobufEncoder<W> {
    inner: W,
    from: i32,
    until: i32,
    prefix: Option<String>,
    scratch: Vec<u8>,
    values: Vec<f64>,
    absent: Vec<bool>,
}

impl<W: Write> ProtobufEncoder<W> {
    /// Creates a new `ProtobufEncoder` for the query window `[from, until]`, in seconds.
    pub fn new(inner: W, from: i32, until: i32) -> Self {
        Self {
            inner,
            from,
            until,
            prefix: None,
            scratch: Vec::new(),
            values: Vec::new(),
            absent: Vec::new(),
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

    /// Flushes the output and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// If the output cannot be flushed, an error is returned.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        self.inner.flush().context(Io)?;
        Ok(self.inner)
    }

    fn fill_grid(&mut self, series: &Series<'_>, window: &Window) {
        let slots = window.slots();

        self.values.clear();
        self.values.resize(slots, 0.0);
        self.absent.clear();
        self.absent.resize(slots, true);

        for sample in series.samples {
            if let Some(slot) = window.slot_of(sample.time) {
                if self.absent[slot] {
                    self.values[slot] = sample.value;
                    self.absent[slot] = false;
                }
            }
        }
    }

    fn encode_fetch_response(&mut self, name: &str, window: &Window) -> Result<(), protobuf::Error> {
        self.scratch.clear();

        let mut os = CodedOutputStream::vec(&mut self.scratch);
        os.write_string(FETCH_RESPONSE_NAME, name)?;
        os.write_int32(FETCH_RESPONSE_START_TIME, window.start())?;
        os.write_int32(FETCH_RESPONSE_STOP_TIME, window.end())?;
        os.write_int32(FETCH_RESPONSE_STEP_TIME, window.step())?;
        for value in &self.values {
            os.write_double(FETCH_RESPONSE_VALUES, *value)?;
        }
        for absent in &self.absent {
            os.write_bool(FETCH_RESPONSE_IS_ABSENT, *absent)?;
        }
        os.flush()
    }
}

impl<W: Write> SeriesSink for ProtobufEncoder<W> {
    type Error = EncodeError;

    fn write_series(&mut self, series: Series<'_>) -> Result<(), Self::Error> {
        let window = Window::new(self.from, self.until, series.step);
        self.fill_grid(&series, &window);

        let name = match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, series.name),
            None => series.name.to_string(),
        };
        self.encode_fetch_response(&name, &window).context(Protobuf)?;

        let mut os = CodedOutputStream::new(&mut self.inner);
        os.write_bytes(MULTI_FETCH_RESPONSE_METRICS, &self.scratch)
            .context(Protobuf)?;
        os.flush().context(Protobuf)
    }
}

#[cfg(test)]
mod tests {
    use carbonado_core::Sample;
    use proptest::prelude::*;
    use similar_asserts::assert_eq;

    use super::*;

    fn series<'s>(name: &'s str, step: i32, samples: &'s [Sample]) -> Series<'s> {
        Series { name, step, samples }
    }

    fn encode(from: i32, until: i32, prefix: &str, series: &[Series<'_>]) -> Vec<u8> {
        let mut encoder = ProtobufEncoder::new(Vec::new(), from, until).with_prefix(prefix);
        for s in series {
            encoder.write_series(*s).unwrap();
        }
        encoder.finish().unwrap()
    }

    /// Decodes a `MultiFetchResponse` into `(name, start, stop, step, values, absent)` tuples.
    #[allow(clippy::type_complexity)]
    fn decode(bytes: &[u8]) -> Vec<(String, i32, i32, i32, Vec<f64>, Vec<bool>)> {
        let mut is = protobuf::CodedInputStream::from_bytes(bytes);
        let mut responses = Vec::new();
        while !is.eof().unwrap() {
            let tag = is.read_raw_varint32().unwrap();
            assert_eq!(tag, (MULTI_FETCH_RESPONSE_METRICS << 3) | 2);
            let body = is.read_bytes().unwrap();

            let mut inner = protobuf::CodedInputStream::from_bytes(&body);
            let mut response = (String::new(), 0, 0, 0, Vec::new(), Vec::new());
            while !inner.eof().unwrap() {
                let tag = inner.read_raw_varint32().unwrap();
                match tag >> 3 {
                    FETCH_RESPONSE_NAME => response.0 = inner.read_string().unwrap(),
                    FETCH_RESPONSE_START_TIME => response.1 = inner.read_int32().unwrap(),
                    FETCH_RESPONSE_STOP_TIME => response.2 = inner.read_int32().unwrap(),
                    FETCH_RESPONSE_STEP_TIME => response.3 = inner.read_int32().unwrap(),
                    FETCH_RESPONSE_VALUES => response.4.push(inner.read_double().unwrap()),
                    FETCH_RESPONSE_IS_ABSENT => response.5.push(inner.read_bool().unwrap()),
                    other => panic!("unexpected field {}", other),
                }
            }
            responses.push(response);
        }
        responses
    }

    #[test]
    fn no_series_writes_nothing() {
        assert!(encode(0, 100, "", &[]).is_empty());
    }

    #[test]
    fn single_series_bytes() {
        let samples = [Sample::new(60, 1.0)];
        let actual = encode(60, 120, "", &[series("a", 60, &samples)]);

        let mut inner = vec![
            0x0a, 0x01, b'a', // name
            0x10, 0x3c, // startTime
            0x18, 0x78, // stopTime
            0x20, 0x3c, // stepTime
        ];
        inner.push(0x29);
        inner.extend_from_slice(&1.0f64.to_le_bytes());
        inner.push(0x29);
        inner.extend_from_slice(&0.0f64.to_le_bytes());
        inner.extend_from_slice(&[0x30, 0x00, 0x30, 0x01]);

        let mut expected = vec![0x0a, inner.len() as u8];
        expected.extend_from_slice(&inner);

        assert_eq!(actual, expected);
    }

    #[test]
    fn missing_slots_are_absent() {
        let samples = [
            Sample::new(0, 9.0),
            Sample::new(120, 1.0),
            Sample::new(150, 5.0),
            Sample::new(240, 2.0),
            Sample::new(600, 9.0),
        ];
        let actual = decode(&encode(60, 300, "dc1", &[series("cpu", 60, &samples)]));

        assert_eq!(
            actual,
            vec![(
                "dc1.cpu".to_string(),
                60,
                300,
                60,
                vec![0.0, 1.0, 0.0, 2.0, 0.0],
                vec![true, false, true, false, true],
            )]
        );
    }

    #[test]
    fn one_response_per_series() {
        let a = [Sample::new(10, 1.0)];
        let b = [Sample::new(20, 2.0)];
        let actual = decode(&encode(10, 20, "", &[series("a", 10, &a), series("b", 10, &b)]));

        assert_eq!(
            actual,
            vec![
                ("a".to_string(), 10, 20, 10, vec![1.0, 0.0], vec![false, true]),
                ("b".to_string(), 10, 20, 10, vec![0.0, 2.0], vec![true, false]),
            ]
        );
    }

    #[test]
    fn empty_window_has_no_slots() {
        let samples = [Sample::new(60, 1.0)];
        let actual = decode(&encode(61, 119, "", &[series("a", 60, &samples)]));

        assert_eq!(actual, vec![("a".to_string(), 120, 60, 60, vec![], vec![])]);
    }

    #[test]
    fn window_at_end_of_time_range() {
        let samples = [Sample::new(2_147_483_640, 1.0)];
        let actual = decode(&encode(i32::MAX - 10, i32::MAX, "", &[series("a", 60, &samples)]));
        assert_eq!(
            actual,
            vec![("a".to_string(), 2_147_483_640, 2_147_483_640, 60, vec![1.0], vec![false])]
        );

        let actual = decode(&encode(i32::MAX - 5, i32::MAX, "", &[series("a", 60, &samples)]));
        assert_eq!(actual, vec![("a".to_string(), i32::MAX, 2_147_483_640, 60, vec![], vec![])]);
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
            let actual = decode(&encode(from, from + len, "", &[series("m", step, &samples)]));

            let slots = Window::new(from, from + len, step).slots();
            prop_assert_eq!(actual.len(), 1);
            prop_assert_eq!(actual[0].4.len(), slots);
            prop_assert_eq!(actual[0].5.len(), slots);

            let present = actual[0].5.iter().filter(|absent| !**absent).count();
            let expected = samples
                .iter()
                .filter(|s| Window::new(from, from + len, step).slot_of(s.time).is_some())
                .count();
            prop_assert_eq!(present, expected);
        }
    }
}
