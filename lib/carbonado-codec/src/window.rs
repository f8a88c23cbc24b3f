//! Time window alignment.

/// A query window aligned on a series step.
///
/// The window covers every multiple of `step` from the first one at or after `from`, up to the last one at or before
/// `until`, both inclusive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Window {
    start: i32,
    end: i32,
    step: i32,
}

impl Window {
    /// Creates a new `Window` for the given bounds, in seconds, and step.
    ///
    /// A step of zero or less is treated as a step of one second. When the first aligned slot would fall past
    /// `i32::MAX`, the start is pinned to `i32::MAX` and the window has no slots.
    pub fn new(from: i32, until: i32, step: i32) -> Self {
        let step = step.max(1);

        // `from - from % step` never leaves the `i32` range, but rounding up past `from` can.
        let mut start = i64::from(from - from % step);
        if start < i64::from(from) {
            start += i64::from(step);
        }
        let start = i32::try_from(start).unwrap_or(i32::MAX);
        let end = until - until % step;

        Self { start, end, step }
    }

    /// Returns the time of the first slot.
    pub fn start(&self) -> i32 {
        self.start
    }

    /// Returns the time of the last slot.
    pub fn end(&self) -> i32 {
        self.end
    }

    /// Returns the step between slots.
    pub fn step(&self) -> i32 {
        self.step
    }

    /// Returns the number of slots in the window.
    ///
    /// A window whose end precedes its start has no slots.
    pub fn slots(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            ((i64::from(self.end) - i64::from(self.start)) / i64::from(self.step) + 1) as usize
        }
    }

    /// Returns the slot `time` falls on, if it is within the window and aligned on the step.
    pub fn slot_of(&self, time: i32) -> Option<usize> {
        if time < self.start || time > self.end {
            return None;
        }

        let offset = i64::from(time) - i64::from(self.start);
        let step = i64::from(self.step);
        (offset % step == 0).then(|| (offset / step) as usize)
    }
}
