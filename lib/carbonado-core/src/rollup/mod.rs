//! Downsampling of per-metric point sequences.

use serde::Deserialize;

mod rules;
pub use self::rules::{Retention, RollupPattern, RollupRules, RulesError};

/// A single time/value pair of a metric series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Time of the sample, in seconds.
    pub time: i32,

    /// Sample value.
    pub value: f64,
}

impl Sample {
    /// Creates a new `Sample`.
    pub const fn new(time: i32, value: f64) -> Self {
        Self { time, value }
    }
}

/// Downsamples the points of a single metric.
///
/// Implementations receive the samples of one metric, ordered by time with no duplicate times, and return a possibly
/// shorter sequence, still ordered, along with the step in seconds between its samples.
pub trait Rollup {
    /// Downsamples `samples` of the metric `metric`.
    fn rollup(&self, metric: &str, samples: Vec<Sample>) -> (Vec<Sample>, i32);
}

impl<F> Rollup for F
where
    F: Fn(&str, Vec<Sample>) -> (Vec<Sample>, i32),
{
    fn rollup(&self, metric: &str, samples: Vec<Sample>) -> (Vec<Sample>, i32) {
        self(metric, samples)
    }
}

/// An aggregation function applied to the samples falling into the same rollup bucket.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Aggregation {
    /// Arithmetic mean.
    #[default]
    Avg,

    /// Sum.
    Sum,

    /// Minimum.
    Min,

    /// Maximum.
    Max,

    /// First sample in the bucket.
    Any,

    /// Last sample in the bucket.
    AnyLast,
}

impl Aggregation {
    /// Aggregates the given bucket of samples.
    ///
    /// Returns `None` if the bucket is empty.
    pub fn apply(&self, bucket: &[Sample]) -> Option<f64> {
        let values = bucket.iter().map(|s| s.value);
        match self {
            Self::Avg => {
                if bucket.is_empty() {
                    None
                } else {
                    Some(values.sum::<f64>() / bucket.len() as f64)
                }
            }
            Self::Sum => (!bucket.is_empty()).then(|| values.sum()),
            Self::Min => values.reduce(f64::min),
            Self::Max => values.reduce(f64::max),
            Self::Any => bucket.first().map(|s| s.value),
            Self::AnyLast => bucket.last().map(|s| s.value),
        }
    }
}
