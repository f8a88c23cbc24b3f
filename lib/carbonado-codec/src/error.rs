use snafu::Snafu;

/// An encoding error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum EncodeError {
    /// The output could not be written.
    #[snafu(display("failed to write encoded output"))]
    Io {
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A protobuf message could not be serialized.
    #[snafu(display("failed to serialize protobuf message"))]
    Protobuf {
        /// Underlying protobuf error.
        source: protobuf::Error,
    },
}
