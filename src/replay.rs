//! Dataset files for offline replay
//!
//! One measurement per line, whitespace separated:
//!
//! ```text
//! L  px   py     timestamp  [gt_px gt_py gt_vx gt_vy]
//! R  rho  theta  rho_dot    timestamp  [gt_px gt_py gt_vx gt_vy]
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Files ending in `.gz`
//! are decompressed on the fly.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{RecordError, ReplayError};
use crate::types::{RawMeasurement, SensorKind, StateVec};

const GROUND_TRUTH_FIELDS: usize = 4;

#[derive(Clone, Debug, PartialEq)]
pub struct ReplayRecord {
    pub measurement: RawMeasurement,
    /// [px, py, vx, vy] when the dataset carries it
    pub ground_truth: Option<StateVec>,
}

/// Parse one dataset line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<ReplayRecord>, RecordError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let sensor_kind = match fields.next() {
        Some("L") => SensorKind::Laser,
        Some("R") => SensorKind::Radar,
        Some(other) => return Err(RecordError::UnknownSensor(other.to_string())),
        None => return Ok(None),
    };
    let rest: Vec<&str> = fields.collect();

    let dim = sensor_kind.measurement_dim();
    // measurement values + timestamp
    let expected = dim + 1;
    if rest.len() != expected && rest.len() != expected + GROUND_TRUTH_FIELDS {
        return Err(RecordError::FieldCount {
            sensor: sensor_kind,
            expected,
            actual: rest.len(),
        });
    }

    let raw_values = rest[..dim]
        .iter()
        .map(|s| parse_f64(s))
        .collect::<Result<Vec<_>, _>>()?;
    let timestamp = rest[dim]
        .parse::<i64>()
        .map_err(|_| RecordError::InvalidNumber(rest[dim].to_string()))?;

    let ground_truth = if rest.len() > expected {
        let gt = rest[expected..]
            .iter()
            .map(|s| parse_f64(s))
            .collect::<Result<Vec<_>, _>>()?;
        Some(StateVec::from_column_slice(&gt))
    } else {
        None
    };

    Ok(Some(ReplayRecord {
        measurement: RawMeasurement {
            sensor_kind,
            raw_values,
            timestamp,
        },
        ground_truth,
    }))
}

fn parse_f64(field: &str) -> Result<f64, RecordError> {
    field
        .parse::<f64>()
        .map_err(|_| RecordError::InvalidNumber(field.to_string()))
}

/// Parse every record from a reader, tagging errors with 1-based line numbers
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<ReplayRecord>, ReplayError> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_line(&line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(source) => {
                return Err(ReplayError::Record {
                    line: idx + 1,
                    source,
                })
            }
        }
    }
    Ok(records)
}

/// Load a dataset file (plain text or `.gz`)
pub fn load_dataset(path: &Path) -> Result<Vec<ReplayRecord>, ReplayError> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        read_records(BufReader::new(GzDecoder::new(file)))
    } else {
        read_records(BufReader::new(file))
    }
}
