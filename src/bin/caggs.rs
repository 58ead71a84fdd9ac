//! caggs command line: aggregate numeric JSON fields over an INDEX/DATA
//! file pair.
//!
//! Diagnostics go to stderr, gated by `-q`/`-v`; stdout carries only the
//! result JSON, emitted after a clean completion. SIGINT/SIGTERM request
//! a cooperative stop: the run winds down without output and exits 0.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};

use caggs::config::{parse_size, Config};
use caggs::pipeline;

#[derive(Parser, Debug)]
#[command(name = "caggs", version, about = "Calculate numeric aggregations over an INDEX/DATA dataset")]
struct Cli {
    /// Path to the INDEX file
    #[arg(short = 'i', long = "index")]
    index: PathBuf,

    /// Path to the DATA file
    #[arg(short = 'd', long = "data")]
    data: PathBuf,

    /// JSON field to aggregate, e.g. `foo.bar` or `a.[2]` (repeatable)
    #[arg(short = 'f', long = "field", required = true)]
    field: Vec<String>,

    /// Size of the DATA header in bytes (suffixes B/K/KB/M/MB/G/GB)
    #[arg(short = 'H', long = "header", default_value = "0", value_parser = size_arg)]
    header: u64,

    /// Size of the inter-record delimiter in bytes
    #[arg(short = 'D', long = "delim", visible_alias = "delimiter", default_value = "0", value_parser = size_arg)]
    delim: u64,

    /// Size of the DATA footer in bytes
    #[arg(short = 'F', long = "footer", default_value = "0", value_parser = size_arg)]
    footer: u64,

    /// INDEX window budget (min 1MB)
    #[arg(short = 'b', long = "index-chunk", default_value = "64MB", value_parser = size_arg)]
    index_chunk: u64,

    /// DATA window budget (min 1MB)
    #[arg(short = 'B', long = "data-chunk", default_value = "64MB", value_parser = size_arg)]
    data_chunk: u64,

    /// Maximum records per DATA chunk (min 1000; size suffixes allowed)
    #[arg(short = 'R', long = "max-records", default_value = "16M", value_parser = size_arg)]
    max_records: u64,

    /// Number of worker threads, 0..=64 (0 = in-line on the main thread)
    #[arg(short = 'X', long = "concurrency", default_value_t = 8)]
    concurrency: usize,

    /// Silence diagnostics
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn size_arg(text: &str) -> Result<u64, String> {
    parse_size(text).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // help/version exit 0; anything else is a configuration error
            let code: u8 = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    init_logging(cli.quiet, cli.verbose);

    match run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .context("failed to install signal handler")?;
    }

    let config = Config {
        index_path: cli.index,
        data_path: cli.data,
        fields: cli.field,
        header_len: cli.header,
        delim_len: cli.delim,
        footer_len: cli.footer,
        index_chunk_size: cli.index_chunk,
        data_chunk_size: cli.data_chunk,
        records_per_chunk: cli.max_records,
        concurrency: cli.concurrency,
    };

    let Some(stats) = pipeline::run(&config, &stop)? else {
        return Ok(ExitCode::SUCCESS); // stopped by signal, nothing to print
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    pipeline::write_summaries(&mut out, &stats).context("failed to write results")?;
    out.flush().context("failed to flush results")?;
    Ok(ExitCode::SUCCESS)
}

fn init_logging(quiet: bool, verbose: u8) {
    use tracing_subscriber::filter::LevelFilter;

    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
