//! Reply encoders for rendered series.
//!
//! Two wire formats are supported, both consumed by Graphite-compatible frontends: a pickled list of dicts, and a
//! protobuf `MultiFetchResponse`. Both encoders implement [`SeriesSink`], so they can be driven directly by
//! [`group_and_rollup`], and both place every series on the same grid: the multiples of the series step that fall
//! within the query window.
#![deny(missing_docs)]

use std::io::Write;

use carbonado_core::{group_and_rollup, GroupStats, PointStore, Rollup};
use tracing::debug;

mod error;
pub use self::error::EncodeError;

mod format;
pub use self::format::{Format, UnknownFormat};

pub mod pickle;
pub use self::pickle::PickleEncoder;

pub mod proto;
pub use self::proto::ProtobufEncoder;

mod window;
pub use self::window::Window;

/// Parameters of a render reply.
#[derive(Clone, Debug)]
pub struct ReplyOptions {
    /// Reply encoding.
    pub format: Format,

    /// Start of the query window, in seconds since the Unix epoch.
    pub from: i32,

    /// End of the query window, in seconds since the Unix epoch.
    pub until: i32,

    /// Prefix to prepend, dot-separated, to every series name. Ignored when empty.
    pub prefix: String,
}

/// Rolls up every series in `store` and writes the encoded reply to `writer`.
///
/// The store must already be ordered and deduplicated.
///
/// # Errors
///
/// If the reply cannot be encoded or written, an error is returned.
pub fn write_reply<R, W>(
    store: &PointStore<'_>, rollup: &R, options: &ReplyOptions, writer: W,
) -> Result<GroupStats, EncodeError>
where
    R: Rollup + ?Sized,
    W: Write,
{
    let stats = match options.format {
        Format::Pickle => {
            let mut encoder =
                PickleEncoder::new(writer, options.from, options.until).with_prefix(options.prefix.as_str());
            let stats = group_and_rollup(store, rollup, &mut encoder)?;
            encoder.finish()?;
            stats
        }
        Format::Protobuf => {
            let mut encoder =
                ProtobufEncoder::new(writer, options.from, options.until).with_prefix(options.prefix.as_str());
            let stats = group_and_rollup(store, rollup, &mut encoder)?;
            encoder.finish()?;
            stats
        }
    };

    debug!(format = %options.format, series = stats.series, "Wrote reply.");

    Ok(stats)
}
