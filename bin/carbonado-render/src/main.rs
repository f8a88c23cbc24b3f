//! Renders a raw RowBinary points query result as a Graphite render reply.
//!
//! The input is the body returned by the columnar store for a points query. Points are decoded, ordered and
//! deduplicated, rolled up according to the configured rules, and written out as either a pickled list of series or a
//! protobuf `MultiFetchResponse`.

#![deny(missing_docs)]

use std::{
    fs::File,
    io::{self, BufWriter, Read as _},
    path::Path,
    time::Instant,
};

use anyhow::Context as _;
use carbonado_codec::{write_reply, ReplyOptions};
use carbonado_core::{order::sort_and_dedup, rollup::RollupRules, BlockPool, Parser};
use clap::Parser as _;
use tracing::{debug, error, info, warn};

mod config;
use self::config::{Cli, RenderConfiguration};

mod logging;
use self::logging::{fatal_and_exit, initialize_logging};

/// Output buffer size.
const OUTPUT_BUFFER_SIZE: usize = 1024 * 1024;

fn main() {
    let cli = Cli::parse();

    let configuration = RenderConfiguration::load(cli.config.as_deref())
        .unwrap_or_else(|e| fatal_and_exit(format!("failed to load configuration: {:#}", e)));

    let RenderConfiguration {
        log_level,
        log_format_json,
        pool_max_retained_blocks,
        rollup,
    } = configuration;

    if let Err(e) = initialize_logging(log_level.into_env_filter(), log_format_json) {
        fatal_and_exit(format!("failed to initialize logging: {:#}", e));
    }

    if !BlockPool::initialize_global(pool_max_retained_blocks) {
        warn!("Block pool was already initialized. Ignoring configured pool size.");
    }

    match run(&cli, &rollup) {
        Ok(()) => debug!("Render complete."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli, rollup: &RollupRules) -> anyhow::Result<()> {
    let started = Instant::now();

    let body = read_input(cli.input.as_deref())?;

    let parser = Parser::new().with_reversed_names(cli.reversed_names);
    let mut store = parser.parse(&body).context("Failed to parse query result.")?;
    sort_and_dedup(&mut store);

    let options = ReplyOptions {
        format: cli.format,
        from: cli.from,
        until: cli.until,
        prefix: cli.prefix.clone(),
    };

    let stats = match cli.output.as_deref() {
        Some(path) if !is_stdio(path) => {
            let file =
                File::create(path).with_context(|| format!("Failed to create output file '{}'.", path.display()))?;
            write_reply(&store, rollup, &options, BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file))
        }
        _ => write_reply(
            &store,
            rollup,
            &options,
            BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, io::stdout().lock()),
        ),
    }
    .context("Failed to write reply.")?;

    info!(
        format = %cli.format,
        points = store.len(),
        series = stats.series,
        elapsed = ?started.elapsed(),
        "Rendered query result."
    );

    store.release();

    Ok(())
}

fn read_input(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) if !is_stdio(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read input file '{}'.", path.display()))
        }
        _ => {
            let mut body = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut body)
                .context("Failed to read standard input.")?;
            Ok(body)
        }
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}
