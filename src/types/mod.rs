pub mod linalg;

pub use linalg::*;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FusionError;

/// Which sensor produced a measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Linear position sensor: z = [px, py]
    Laser,
    /// Polar sensor: z = [rho, theta, rho_dot]
    Radar,
}

impl SensorKind {
    /// Number of raw values a reading of this kind carries
    pub fn measurement_dim(self) -> usize {
        match self {
            SensorKind::Laser => MEASURE_DIM_LASER,
            SensorKind::Radar => MEASURE_DIM_RADAR,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Laser => write!(f, "laser"),
            SensorKind::Radar => write!(f, "radar"),
        }
    }
}

/// Untyped measurement record as delivered by a transport (file, socket, simulator).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurement {
    pub sensor_kind: SensorKind,
    pub raw_values: Vec<f64>,
    /// Source ticks (microseconds by default, see `FusionConfig::timestamp_scale`)
    pub timestamp: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaserReading {
    pub px: f64,
    pub py: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadarReading {
    /// Range [m]
    pub rho: f64,
    /// Bearing [rad]
    pub theta: f64,
    /// Range rate [m/s]
    pub rho_dot: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Laser(LaserReading),
    Radar(RadarReading),
}

impl Reading {
    pub fn sensor_kind(&self) -> SensorKind {
        match self {
            Reading::Laser(_) => SensorKind::Laser,
            Reading::Radar(_) => SensorKind::Radar,
        }
    }
}

/// Validated, typed measurement ready for `FusionEkf::ingest`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: i64,
    pub reading: Reading,
}

impl Measurement {
    pub fn laser(timestamp: i64, px: f64, py: f64) -> Self {
        Self {
            timestamp,
            reading: Reading::Laser(LaserReading { px, py }),
        }
    }

    pub fn radar(timestamp: i64, rho: f64, theta: f64, rho_dot: f64) -> Self {
        Self {
            timestamp,
            reading: Reading::Radar(RadarReading {
                rho,
                theta,
                rho_dot,
            }),
        }
    }

    pub fn sensor_kind(&self) -> SensorKind {
        self.reading.sensor_kind()
    }

    /// Reject NaN/Inf readings before they reach the filter
    pub fn check_finite(&self) -> Result<(), FusionError> {
        let finite = match self.reading {
            Reading::Laser(l) => l.px.is_finite() && l.py.is_finite(),
            Reading::Radar(r) => {
                r.rho.is_finite() && r.theta.is_finite() && r.rho_dot.is_finite()
            }
        };
        if finite {
            Ok(())
        } else {
            Err(FusionError::NonFiniteMeasurement {
                sensor: self.sensor_kind(),
            })
        }
    }
}

impl TryFrom<&RawMeasurement> for Measurement {
    type Error = FusionError;

    fn try_from(raw: &RawMeasurement) -> Result<Self, Self::Error> {
        let sensor = raw.sensor_kind;
        let expected = sensor.measurement_dim();
        if raw.raw_values.len() != expected {
            return Err(FusionError::MalformedMeasurement {
                sensor,
                expected,
                actual: raw.raw_values.len(),
            });
        }
        if raw.raw_values.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::NonFiniteMeasurement { sensor });
        }

        let v = &raw.raw_values;
        Ok(match sensor {
            SensorKind::Laser => Measurement::laser(raw.timestamp, v[0], v[1]),
            SensorKind::Radar => Measurement::radar(raw.timestamp, v[0], v[1], v[2]),
        })
    }
}

impl TryFrom<RawMeasurement> for Measurement {
    type Error = FusionError;

    fn try_from(raw: RawMeasurement) -> Result<Self, Self::Error> {
        Measurement::try_from(&raw)
    }
}

impl From<Measurement> for RawMeasurement {
    fn from(m: Measurement) -> Self {
        let raw_values = match m.reading {
            Reading::Laser(l) => vec![l.px, l.py],
            Reading::Radar(r) => vec![r.rho, r.theta, r.rho_dot],
        };
        RawMeasurement {
            sensor_kind: m.sensor_kind(),
            raw_values,
            timestamp: m.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_laser_record_converts() {
        let raw = RawMeasurement {
            sensor_kind: SensorKind::Laser,
            raw_values: vec![1.0, 2.0],
            timestamp: 42,
        };
        let m = Measurement::try_from(&raw).unwrap();
        assert_eq!(m, Measurement::laser(42, 1.0, 2.0));
    }

    #[test]
    fn test_radar_record_converts() {
        let raw = RawMeasurement {
            sensor_kind: SensorKind::Radar,
            raw_values: vec![5.0, 0.1, -0.5],
            timestamp: 7,
        };
        let m = Measurement::try_from(raw).unwrap();
        assert_eq!(m.sensor_kind(), SensorKind::Radar);
        assert_eq!(m, Measurement::radar(7, 5.0, 0.1, -0.5));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let raw = RawMeasurement {
            sensor_kind: SensorKind::Radar,
            raw_values: vec![1.0, 2.0],
            timestamp: 0,
        };
        assert_eq!(
            Measurement::try_from(&raw),
            Err(FusionError::MalformedMeasurement {
                sensor: SensorKind::Radar,
                expected: 3,
                actual: 2,
            })
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let raw = RawMeasurement {
            sensor_kind: SensorKind::Laser,
            raw_values: vec![f64::NAN, 2.0],
            timestamp: 0,
        };
        assert!(matches!(
            Measurement::try_from(&raw),
            Err(FusionError::NonFiniteMeasurement { .. })
        ));
    }

    #[test]
    fn test_typed_measurement_finiteness() {
        assert!(Measurement::laser(0, 1.0, 2.0).check_finite().is_ok());
        assert!(Measurement::radar(0, 1.0, 0.0, 0.0).check_finite().is_ok());
        assert_eq!(
            Measurement::radar(0, 1.0, 0.0, f64::NEG_INFINITY).check_finite(),
            Err(FusionError::NonFiniteMeasurement {
                sensor: SensorKind::Radar
            })
        );
    }

    #[test]
    fn test_record_json_shape() {
        let json = r#"{"sensor_kind":"radar","raw_values":[1.0,0.5,0.2],"timestamp":1477010443000000}"#;
        let raw: RawMeasurement = serde_json::from_str(json).unwrap();
        assert_eq!(raw.sensor_kind, SensorKind::Radar);
        assert_eq!(raw.timestamp, 1_477_010_443_000_000);

        let back = RawMeasurement::from(Measurement::try_from(&raw).unwrap());
        assert_eq!(back, raw);
    }
}
