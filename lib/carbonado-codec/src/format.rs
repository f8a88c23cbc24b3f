use std::{fmt, str::FromStr};

use snafu::Snafu;

/// An unrecognized reply format.
#[derive(Debug, Snafu)]
#[snafu(display("unknown format '{}' (expected 'pickle' or 'protobuf')", format))]
pub struct UnknownFormat {
    format: String,
}

/// Reply encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    /// Pickled list of dicts.
    Pickle,

    /// Protobuf `MultiFetchResponse`.
    Protobuf,
}

impl Format {
    /// Returns the name of the format, as given in a render request.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pickle => "pickle",
            Self::Protobuf => "protobuf",
        }
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickle" => Ok(Self::Pickle),
            "protobuf" => Ok(Self::Protobuf),
            other => UnknownFormatSnafu { format: other }.fail(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
