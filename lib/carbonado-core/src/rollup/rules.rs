use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};

use super::{Aggregation, Rollup, Sample};

/// A rollup rules error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum RulesError {
    /// A pattern's regular expression failed to compile.
    #[snafu(display("invalid rollup pattern '{}'", pattern))]
    InvalidRegex {
        /// The offending pattern.
        pattern: String,

        /// Underlying regex error.
        source: regex::Error,
    },

    /// A retention entry has a precision of zero.
    #[snafu(display("retention precision must be positive (age {})", age))]
    ZeroPrecision {
        /// Age of the offending retention entry.
        age: u32,
    },
}

/// A retention entry: points older than `age` seconds are stored every `precision` seconds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub struct Retention {
    /// Minimum point age, in seconds, for this entry to apply.
    pub age: u32,

    /// Step between points, in seconds.
    pub precision: u32,
}

#[derive(Deserialize)]
struct RawRollupPattern {
    #[serde(default)]
    regexp: Option<String>,
    #[serde(default)]
    function: Aggregation,
    #[serde(default)]
    retention: Vec<Retention>,
}

/// Rollup settings for the metrics whose name matches a pattern.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "RawRollupPattern")]
pub struct RollupPattern {
    regex: Option<Regex>,
    function: Aggregation,
    retention: Vec<Retention>,
}

impl RollupPattern {
    /// Creates a new `RollupPattern`.
    ///
    /// `regex` restricts the pattern to matching metric names; without it, the pattern matches every metric.
    /// Retention entries may be given in any order.
    ///
    /// # Errors
    ///
    /// If the regular expression is invalid, or any retention entry has a precision of zero, an error is returned.
    pub fn new(regex: Option<&str>, function: Aggregation, mut retention: Vec<Retention>) -> Result<Self, RulesError> {
        let regex = regex
            .map(|pattern| Regex::new(pattern).context(InvalidRegex { pattern }))
            .transpose()?;

        if let Some(retention) = retention.iter().find(|r| r.precision == 0) {
            return ZeroPrecision { age: retention.age }.fail();
        }
        retention.sort_by_key(|r| r.age);

        Ok(Self {
            regex,
            function,
            retention,
        })
    }

    fn matches(&self, metric: &str) -> bool {
        self.regex.as_ref().map_or(true, |regex| regex.is_match(metric))
    }

    /// Returns the step for points that are `age` seconds old.
    ///
    /// The step is the precision of the oldest retention entry applying to `age`. Points younger than every entry use
    /// the first entry's precision, and a pattern without retention keeps points as they are, with a step of one
    /// second.
    pub fn precision_for(&self, age: i64) -> i32 {
        let mut precision = match self.retention.first() {
            Some(first) => first.precision,
            None => return 1,
        };

        for retention in &self.retention {
            if i64::from(retention.age) > age {
                break;
            }
            precision = retention.precision;
        }

        i32::try_from(precision).unwrap_or(i32::MAX)
    }

    /// Returns the aggregation function.
    pub fn function(&self) -> Aggregation {
        self.function
    }
}

impl TryFrom<RawRollupPattern> for RollupPattern {
    type Error = RulesError;

    fn try_from(raw: RawRollupPattern) -> Result<Self, Self::Error> {
        Self::new(raw.regexp.as_deref(), raw.function, raw.retention)
    }
}

impl Default for RollupPattern {
    fn default() -> Self {
        Self {
            regex: None,
            function: Aggregation::Avg,
            retention: vec![Retention { age: 0, precision: 60 }],
        }
    }
}

/// Retention-based rollup rules.
///
/// The first pattern whose regular expression matches the metric name decides how the metric is downsampled; metrics
/// matching no pattern use the default pattern.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RollupRules {
    #[serde(default)]
    patterns: Vec<RollupPattern>,
    #[serde(default)]
    default: RollupPattern,
}

impl RollupRules {
    /// Creates a new `RollupRules`.
    pub fn new(patterns: Vec<RollupPattern>, default: RollupPattern) -> Self {
        Self { patterns, default }
    }

    /// Returns the pattern that applies to `metric`.
    pub fn lookup(&self, metric: &str) -> &RollupPattern {
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(metric))
            .unwrap_or(&self.default)
    }

    /// Downsamples `samples` as of the given time, in seconds since the Unix epoch.
    ///
    /// The step is chosen from the age of the oldest sample. Samples are then grouped into buckets aligned on the step,
    /// and each bucket is collapsed into a single sample with the pattern's aggregation function.
    ///
    /// A run without samples is treated as having age zero, so it takes the precision of the pattern's first retention
    /// entry, exactly as a run of fresh samples would.
    pub fn rollup_at(&self, metric: &str, mut samples: Vec<Sample>, now: i64) -> (Vec<Sample>, i32) {
        let pattern = self.lookup(metric);

        let age = samples.first().map_or(0, |oldest| now - i64::from(oldest.time));
        let step = pattern.precision_for(age);
        if step <= 1 || samples.is_empty() {
            return (samples, step.max(1));
        }

        // Samples are ordered by time, so every bucket is a contiguous range, and the output position never overtakes
        // the start of the bucket being read.
        let mut written = 0;
        let mut start = 0;
        while start < samples.len() {
            let bucket_time = bucket_of(samples[start].time, step);
            let mut end = start + 1;
            while end < samples.len() && bucket_of(samples[end].time, step) == bucket_time {
                end += 1;
            }

            if let Some(value) = pattern.function.apply(&samples[start..end]) {
                samples[written] = Sample::new(bucket_time, value);
                written += 1;
            }
            start = end;
        }
        samples.truncate(written);

        (samples, step)
    }
}

fn bucket_of(time: i32, step: i32) -> i32 {
    time.wrapping_sub(time.rem_euclid(step))
}

impl Rollup for RollupRules {
    fn rollup(&self, metric: &str, samples: Vec<Sample>) -> (Vec<Sample>, i32) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        self.rollup_at(metric, samples, now)
    }
}
