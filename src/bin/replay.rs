use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Parser;
use fusion_tracker_rs::config::FilterArgs;
use fusion_tracker_rs::evaluation::RmseAccumulator;
use fusion_tracker_rs::replay::{self, ReplayRecord};
use fusion_tracker_rs::{FusionConfig, FusionEkf, FusionError, IngestOutcome, SensorKind};
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to a laser/radar dataset (.txt or .txt.gz)
    #[arg(long, conflicts_with = "data_dir")]
    data: Option<PathBuf>,

    /// Directory of datasets to batch replay (processes *.txt[.gz])
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(flatten)]
    filter: FilterArgs,
}

fn run_once(path: &Path, config: &FusionConfig) -> anyhow::Result<serde_json::Value> {
    let records = replay::load_dataset(path)?;
    let mut ekf = FusionEkf::new(config.clone());
    let mut rmse = RmseAccumulator::new();

    let mut laser_count = 0u64;
    let mut radar_count = 0u64;
    let mut skipped = 0u64;
    let mut rejected = 0u64;
    let mut max_trace = 0.0f64;

    for ReplayRecord {
        measurement,
        ground_truth,
    } in &records
    {
        match measurement.sensor_kind {
            SensorKind::Laser => laser_count += 1,
            SensorKind::Radar => radar_count += 1,
        }

        match ekf.ingest_raw(measurement) {
            Ok(IngestOutcome::Initialized) | Ok(IngestOutcome::Updated) => {}
            Err(FusionError::SingularInput { .. } | FusionError::UpdateFailure { .. }) => {
                skipped += 1;
                continue;
            }
            Err(e) => {
                log::warn!("[REPLAY] t={} rejected: {}", measurement.timestamp, e);
                rejected += 1;
                continue;
            }
        }

        if let Some(estimate) = ekf.estimate() {
            max_trace = max_trace.max(estimate.covariance.trace());
            if let Some(truth) = ground_truth {
                rmse.push(&estimate.state, truth);
            }
        }
    }

    let snapshot = ekf.snapshot();
    log::info!(
        "[REPLAY] {}: {} records ({} laser, {} radar), {} skipped, {} rejected",
        path.display(),
        records.len(),
        laser_count,
        radar_count,
        skipped,
        rejected
    );

    Ok(json!({
        "dataset": path.display().to_string(),
        "records": records.len(),
        "laser_measurements": laser_count,
        "radar_measurements": radar_count,
        "skipped_updates": skipped,
        "rejected_measurements": rejected,
        "max_covariance_trace": max_trace,
        "rmse": rmse.summary(),
        "final_state": snapshot,
    }))
}

fn is_dataset(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".txt") || name.ends_with(".txt.gz")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.filter.load()?;
    let mut results = Vec::new();

    if let Some(dir) = args.data_dir.as_ref() {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_dataset(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            match run_once(&path, &config) {
                Ok(res) => results.push(res),
                Err(e) => log::error!("Failed {}: {:#}", path.display(), e),
            }
        }
    } else if let Some(data) = args.data.as_ref() {
        results.push(run_once(data, &config)?);
    } else {
        anyhow::bail!("Provide --data or --data-dir");
    }

    let report = json!({
        "generated_at": Utc::now().to_rfc3339(),
        "config": config,
        "results": results,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
