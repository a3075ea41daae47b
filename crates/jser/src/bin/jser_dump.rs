//! jser-dump
//!
//! Prints every top-level content of a serialization stream as a tree.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use jser::buffers::IoSource;
use jser::stream::DEFAULT_DUMP_DEPTH;
use jser::{DumpConfig, DumpContext, StreamDecoder};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "jser-dump")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dump a JVM object serialization stream", long_about = None)]
struct Cli {
    /// Stream file to read
    file: PathBuf,

    /// Print block data and byte arrays as hex
    #[arg(long)]
    hex: bool,

    /// Nesting depth below which elements are printed as a stub
    #[arg(long, default_value_t = DEFAULT_DUMP_DEPTH)]
    max_depth: usize,

    /// TOML file with a [stream] table of decoder limits
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => DumpConfig::load(path)?,
        None => DumpConfig::default(),
    };
    debug!(?config, "loaded configuration");

    let file = File::open(&cli.file)
        .with_context(|| format!("Failed to open {}", cli.file.display()))?;
    let source = IoSource::new(BufReader::new(file));
    let mut decoder = StreamDecoder::with_options(source, config.stream)
        .with_context(|| format!("{} is not a serialization stream", cli.file.display()))?;

    let mut cx = DumpContext::new()
        .with_octets(cli.hex)
        .with_max_depth(cli.max_depth);
    let mut count = 0usize;
    while !decoder.is_at_end()? {
        let read = decoder.read_content().with_context(|| {
            format!("Failed to read content {count} (offset {})", decoder.position())
        })?;
        if read.is_exception {
            println!("exception:");
        }
        println!("{}", decoder.arena().dump_content(&read.content, &mut cx));
        count += 1;
    }
    info!(
        contents = count,
        elements = decoder.arena().len(),
        bytes = decoder.position(),
        "done"
    );
    Ok(())
}
