use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use flate2::read::GzDecoder;
use fusion_tracker_rs::config::FilterArgs;
use fusion_tracker_rs::feed::{self, MeasurementSender};
use fusion_tracker_rs::{FusionEkf, RawMeasurement};

#[derive(Parser, Debug)]
#[command(name = "fusion_tracker")]
#[command(about = "Laser/radar EKF - JSON-lines measurements in, JSON-lines estimates out", long_about = None)]
struct Args {
    /// JSON-lines measurement file (.jsonl or .jsonl.gz); stdin when omitted
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    #[command(flatten)]
    filter: FilterArgs,

    /// Measurements buffered between the reader and the filter
    #[arg(long, default_value = "1024")]
    queue_capacity: usize,
}

fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn BufRead + Send>> {
    let Some(path) = path else {
        return Ok(Box::new(BufReader::new(io::stdin())));
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parse JSON lines and push them into the queue; returns lines forwarded
fn read_loop(reader: Box<dyn BufRead + Send>, tx: MeasurementSender) -> Result<u64> {
    let mut forwarded = 0u64;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawMeasurement>(&line) {
            Ok(raw) => {
                if tx.send(raw).is_err() {
                    log::warn!("[reader] filter stopped, {} lines forwarded", forwarded);
                    break;
                }
                forwarded += 1;
            }
            Err(e) => log::warn!("[reader] line {}: {}", idx + 1, e),
        }
    }
    Ok(forwarded)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.filter.load()?;
    let reader = open_input(args.input.as_ref())?;

    log::info!(
        "[{}] Fusion tracker starting (input: {}, covariance update: {:?})",
        Utc::now().format("%H:%M:%S"),
        args.input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".to_string()),
        config.covariance_update
    );

    let (tx, rx) = feed::measurement_queue(args.queue_capacity);
    let reader_handle = thread::spawn(move || read_loop(reader, tx));

    let mut ekf = FusionEkf::new(config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = rx.run_with(&mut ekf, |engine, result| {
        if result.is_err() {
            return;
        }
        let Some(snapshot) = engine.snapshot() else {
            return;
        };
        match serde_json::to_string(&snapshot) {
            Ok(line) => {
                if let Err(e) = writeln!(out, "{}", line) {
                    log::error!("write failed: {}", e);
                }
            }
            Err(e) => log::error!("serialize failed: {}", e),
        }
    });
    out.flush()?;

    let forwarded = match reader_handle.join() {
        Ok(res) => res?,
        Err(_) => anyhow::bail!("reader thread panicked"),
    };

    log::info!(
        "[{}] Done: {} read, {} initialized, {} updated, {} skipped, {} rejected",
        Utc::now().format("%H:%M:%S"),
        forwarded,
        report.initialized,
        report.updated,
        report.skipped,
        report.rejected
    );
    Ok(())
}
