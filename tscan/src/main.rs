//! tscan: transport stream channel scanner.
//!
//! Replays captured section recordings through the scan driver and
//! writes the discovered services as VDR channel lines or JSON.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use log::{error, info};

use tscan::adapter::RecordingAdapter;
use tscan::channels::{DEFAULT_CHANNEL_MAX, DEFAULT_CHANNEL_MIN};
use tscan::model::ScanType;
use tscan::output::{write_output, OutputFormat, ServiceSelection};
use tscan::scan::{AtscStandard, DedupPolicy, DvbtStandard, ScanConfig, ScanDriver};

/// tscan - transport stream channel scanner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory with recorded sections, one subdirectory per frequency
    #[arg(short, long)]
    recording: PathBuf,

    /// Scan mode: t = DVB-T/T2, a = ATSC
    #[arg(short = 'm', long, default_value = "t")]
    scan_mode: char,

    /// First channel of the sweep
    #[arg(long)]
    channel_min: Option<u32>,

    /// Last channel of the sweep
    #[arg(long)]
    channel_max: Option<u32>,

    /// Terrestrial delivery systems to try per channel
    #[arg(short = 't', long, value_enum, default_value = "both")]
    dvbt: DvbtStandard,

    /// ATSC modulations to try per channel (scan mode a)
    #[arg(long, value_enum, default_value = "vsb")]
    atsc: AtscStandard,

    /// Duplicate transport handling
    #[arg(short, long, value_enum, default_value = "skip-duplicates")]
    dedup: DedupPolicy,

    /// Multiply filter timeouts for slow links
    #[arg(long)]
    long_timeout: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "vdr")]
    output_format: OutputFormat,

    /// Output file (stdout when omitted)
    #[arg(short = 'f', long)]
    output: Option<PathBuf>,

    /// Service classes to emit: t = TV, r = radio, o = other
    #[arg(short, long, default_value = "tr", value_parser = ServiceSelection::parse)]
    services: ServiceSelection,

    /// Omit encrypted services from the output
    #[arg(long)]
    no_encrypted: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let scan_type = match args.scan_mode {
        't' => ScanType::Terrestrial,
        'a' => ScanType::Atsc,
        other => {
            error!("unknown scan mode '{}', expected t or a", other);
            return Err("unknown scan mode".into());
        }
    };

    let config = ScanConfig {
        scan_type,
        channel_min: args.channel_min.unwrap_or(DEFAULT_CHANNEL_MIN),
        channel_max: args.channel_max.unwrap_or(DEFAULT_CHANNEL_MAX),
        dvbt_standard: args.dvbt,
        atsc_standard: args.atsc,
        dedup: args.dedup,
        long_timeouts: args.long_timeout,
    };

    let mut selection = args.services;
    selection.include_encrypted = !args.no_encrypted;

    info!(
        "scanning channels {}..={} from {}",
        config.channel_min,
        config.channel_max,
        args.recording.display()
    );

    let adapter = RecordingAdapter::open(&args.recording)?;
    let mut driver = ScanDriver::new(adapter, config);

    // Ctrl-C stops the sweep at the next channel; whatever was decoded
    // so far is still written below.
    let stop = driver.stop_flag();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::Relaxed);
    })?;

    let result = driver.run();

    // Write what was found even when the sweep aborted.
    let found = driver.found();
    info!("found {} transport stream(s)", found.len());
    match &args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            write_output(&mut file, args.output_format, found, selection)?;
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            write_output(&mut lock, args.output_format, found, selection)?;
            lock.flush()?;
        }
    }

    if let Err(e) = result {
        error!("scan aborted: {}", e);
        return Err(e.into());
    }
    Ok(())
}
