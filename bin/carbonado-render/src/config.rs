use std::path::{Path, PathBuf};

use anyhow::Context as _;
use carbonado_codec::Format;
use carbonado_core::{block::DEFAULT_MAX_RETAINED_BLOCKS, rollup::RollupRules};
use clap::Parser;
use figment::{
    providers::{Env, Format as _, Yaml},
    Figment,
};
use serde::Deserialize;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Prefix of the environment variables overriding the configuration file.
const ENV_PREFIX: &str = "CARBONADO_";

#[derive(Clone, Debug, Parser)]
#[command(about)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Path to the RowBinary query result to render.
    ///
    /// Reads from standard input when not given, or when set to `-`.
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Path to write the encoded reply to.
    ///
    /// Writes to standard output when not given, or when set to `-`.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Start of the query window, in seconds since the Unix epoch.
    #[arg(long, allow_negative_numbers = true)]
    pub from: i32,

    /// End of the query window, in seconds since the Unix epoch.
    #[arg(long, allow_negative_numbers = true)]
    pub until: i32,

    /// Reply format: `pickle` or `protobuf`.
    #[arg(long, default_value = "pickle")]
    pub format: Format,

    /// Prefix prepended, dot-separated, to every metric name in the reply.
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Metric names in the input are stored with their path segments reversed.
    #[arg(long)]
    pub reversed_names: bool,
}

fn default_log_level() -> LogLevel {
    LevelFilter::INFO.into()
}

const fn default_pool_max_retained_blocks() -> usize {
    DEFAULT_MAX_RETAINED_BLOCKS
}

/// Render configuration.
#[derive(Deserialize)]
pub struct RenderConfiguration {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default)]
    pub log_format_json: bool,

    /// Maximum number of idle point blocks kept around for reuse.
    #[serde(default = "default_pool_max_retained_blocks")]
    pub pool_max_retained_blocks: usize,

    #[serde(default)]
    pub rollup: RollupRules,
}

impl RenderConfiguration {
    /// Loads the configuration from the given YAML file, if any, overlaid with `CARBONADO_`-prefixed environment
    /// variables.
    ///
    /// # Errors
    ///
    /// If the file cannot be read, or the resulting configuration is invalid, an error is returned.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration file '{}'.", path.display()))?;
            figment = figment.merge(Yaml::string(&contents));
        }

        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        figment.extract().context("Failed to parse configuration.")
    }
}

#[derive(Deserialize)]
#[serde(try_from = "String")]
pub struct LogLevel(EnvFilter);

impl LogLevel {
    pub fn into_env_filter(self) -> EnvFilter {
        self.0
    }
}

impl From<LevelFilter> for LogLevel {
    fn from(level: LevelFilter) -> Self {
        Self(EnvFilter::default().add_directive(level.into()))
    }
}

impl TryFrom<String> for LogLevel {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            anyhow::bail!("Log level cannot be empty.");
        }

        EnvFilter::builder()
            .parse(value)
            .map(Self)
            .context("Failed to parse valid log level.")
    }
}
