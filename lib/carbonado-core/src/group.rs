//! Per-metric grouping and rollup.

use std::{
    borrow::Cow,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{
    rollup::{Rollup, Sample},
    store::PointStore,
};

/// A downsampled metric series, ready to be encoded.
#[derive(Clone, Copy, Debug)]
pub struct Series<'s> {
    /// Full metric name.
    pub name: &'s str,

    /// Step between samples, in seconds.
    pub step: i32,

    /// Samples, ordered by time.
    pub samples: &'s [Sample],
}

/// A consumer of downsampled series.
pub trait SeriesSink {
    /// Error returned when a series cannot be consumed.
    type Error;

    /// Consumes a single series.
    fn write_series(&mut self, series: Series<'_>) -> Result<(), Self::Error>;
}

/// Summary of a grouping pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GroupStats {
    /// Number of series handed to the sink.
    pub series: usize,

    /// Number of samples handed to the sink, after rollup.
    pub samples: usize,

    /// Time spent in the rollup.
    pub rollup_time: Duration,

    /// Time spent in the sink.
    pub sink_time: Duration,
}

/// Splits an ordered, deduplicated store into per-metric runs, rolls each one up, and hands it to `sink`.
///
/// Runs are processed one at a time, in store order, and share no state.
///
/// # Errors
///
/// If the sink fails to consume a series, processing stops and the sink's error is returned.
pub fn group_and_rollup<R, S>(store: &PointStore<'_>, rollup: &R, sink: &mut S) -> Result<GroupStats, S::Error>
where
    R: Rollup + ?Sized,
    S: SeriesSink,
{
    let mut stats = GroupStats::default();
    let mut buffer = Vec::new();

    let len = store.len();
    let mut run_start = 0;
    while run_start < len {
        let id = store.get(run_start).metric_id();

        buffer.clear();
        let mut run_end = run_start;
        while run_end < len && store.get(run_end).metric_id() == id {
            let point = store.get(run_end);
            buffer.push(Sample::new(point.time, point.value));
            run_end += 1;
        }

        let name = metric_name(store.metric_name(store.get(run_start)));

        let rollup_start = Instant::now();
        let (samples, step) = rollup.rollup(&name, std::mem::take(&mut buffer));
        stats.rollup_time += rollup_start.elapsed();

        let sink_start = Instant::now();
        sink.write_series(Series {
            name: &name,
            step,
            samples: &samples,
        })?;
        stats.sink_time += sink_start.elapsed();

        stats.series += 1;
        stats.samples += samples.len();

        // Hang on to the allocation for the next run.
        buffer = samples;
        run_start = run_end;
    }

    debug!(
        series = stats.series,
        samples = stats.samples,
        rollup_time = ?stats.rollup_time,
        sink_time = ?stats.sink_time,
        "Grouped and rolled up series."
    );

    Ok(stats)
}

fn metric_name(raw: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(raw)
}
