use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{
    LaserNoise, LaserVec, RadarNoise, RadarReading, RadarVec, StateMat, StateVec,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// How the posterior covariance is formed after a measurement update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceUpdate {
    /// P = (I - K·H)·P
    #[default]
    Standard,
    /// P = (I - K·H)·P·(I - K·H)ᵀ + K·R·Kᵀ
    Joseph,
}

/// Velocity seeded from the first radar reading
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadarVelocityInit {
    /// Project range rate along the bearing: v = rho_dot·(cosθ, sinθ)
    #[default]
    Radial,
    /// Radial projection plus the range-scaled tangential term:
    /// vx = rho_dot·cosθ - rho·sinθ, vy = rho_dot·sinθ + rho·cosθ
    RadialPlusRange,
}

impl RadarVelocityInit {
    pub fn velocity(self, reading: &RadarReading) -> (f64, f64) {
        let (sin_t, cos_t) = reading.theta.sin_cos();
        let (vx, vy) = (reading.rho_dot * cos_t, reading.rho_dot * sin_t);
        match self {
            RadarVelocityInit::Radial => (vx, vy),
            RadarVelocityInit::RadialPlusRange => {
                (vx - reading.rho * sin_t, vy + reading.rho * cos_t)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    // ── Process model ──
    pub noise_ax: f64,
    pub noise_ay: f64,

    // ── Measurement noise (diagonals of R) ──
    pub laser_noise: [f64; 2],
    pub radar_noise: [f64; 3],

    // ── Initial covariance (diagonals of P₀) ──
    pub laser_initial_variance: [f64; 4],
    pub radar_initial_variance: [f64; 4],
    pub radar_velocity_init: RadarVelocityInit,

    // ── Time base ──
    /// Seconds per timestamp tick
    pub timestamp_scale: f64,

    // ── Numerics ──
    pub min_range_squared: f64,
    pub covariance_update: CovarianceUpdate,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            noise_ax: 9.0,
            noise_ay: 9.0,
            laser_noise: [0.0225, 0.0225],
            radar_noise: [0.09, 0.0009, 0.09],
            laser_initial_variance: [1.0, 1.0, 1000.0, 1000.0],
            radar_initial_variance: [1.0, 1.0, 1000.0, 1000.0],
            radar_velocity_init: RadarVelocityInit::Radial,
            timestamp_scale: 1e-6,
            min_range_squared: 1e-4,
            covariance_update: CovarianceUpdate::Standard,
        }
    }
}

impl FusionConfig {
    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: FusionConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("noise_ax", self.noise_ax)?;
        check_non_negative("noise_ay", self.noise_ay)?;
        for v in self.laser_noise {
            check_positive("laser_noise", v)?;
        }
        for v in self.radar_noise {
            check_positive("radar_noise", v)?;
        }
        for v in self.laser_initial_variance {
            check_positive("laser_initial_variance", v)?;
        }
        for v in self.radar_initial_variance {
            check_positive("radar_initial_variance", v)?;
        }
        check_positive("timestamp_scale", self.timestamp_scale)?;
        check_positive("min_range_squared", self.min_range_squared)?;
        Ok(())
    }

    pub fn laser_noise_matrix(&self) -> LaserNoise {
        LaserNoise::from_diagonal(&LaserVec::from(self.laser_noise))
    }

    pub fn radar_noise_matrix(&self) -> RadarNoise {
        RadarNoise::from_diagonal(&RadarVec::from(self.radar_noise))
    }

    pub fn laser_initial_covariance(&self) -> StateMat {
        StateMat::from_diagonal(&StateVec::from(self.laser_initial_variance))
    }

    pub fn radar_initial_covariance(&self) -> StateMat {
        StateMat::from_diagonal(&StateVec::from(self.radar_initial_variance))
    }
}

/// Command-line config source shared by the binaries: an optional JSON file
/// plus per-field overrides
#[derive(clap::Args, Clone, Debug, Default)]
pub struct FilterArgs {
    /// JSON filter config (missing fields use defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Acceleration noise variance along x
    #[arg(long)]
    pub noise_ax: Option<f64>,

    /// Acceleration noise variance along y
    #[arg(long)]
    pub noise_ay: Option<f64>,

    /// Seconds per timestamp tick
    #[arg(long)]
    pub timestamp_scale: Option<f64>,

    /// Use the Joseph form for the covariance update
    #[arg(long, default_value_t = false)]
    pub joseph: bool,
}

impl FilterArgs {
    /// Resolve file + overrides into a validated config
    pub fn load(&self) -> Result<FusionConfig, ConfigError> {
        let mut config = match self.config.as_ref() {
            Some(path) => FusionConfig::from_json_file(path)?,
            None => FusionConfig::default(),
        };
        if let Some(v) = self.noise_ax {
            config.noise_ax = v;
        }
        if let Some(v) = self.noise_ay {
            config.noise_ay = v;
        }
        if let Some(v) = self.timestamp_scale {
            config.timestamp_scale = v;
        }
        if self.joseph {
            config.covariance_update = CovarianceUpdate::Joseph;
        }
        config.validate()?;
        Ok(config)
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be non-negative and finite, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_tuned_constants() {
        let config = FusionConfig::default();
        assert_eq!(config.noise_ax, 9.0);
        assert_eq!(config.noise_ay, 9.0);
        assert_eq!(config.timestamp_scale, 1e-6);

        let r = config.radar_noise_matrix();
        assert_eq!(r[(0, 0)], 0.09);
        assert_eq!(r[(1, 1)], 0.0009);
        assert_eq!(r[(2, 2)], 0.09);
        assert_eq!(r[(0, 1)], 0.0);

        let r = config.laser_noise_matrix();
        assert_eq!(r[(0, 0)], 0.0225);
        assert_eq!(r[(1, 1)], 0.0225);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FusionConfig =
            serde_json::from_str(r#"{"noise_ax": 4.0, "covariance_update": "joseph"}"#).unwrap();
        assert_eq!(config.noise_ax, 4.0);
        assert_eq!(config.noise_ay, 9.0);
        assert_eq!(config.covariance_update, CovarianceUpdate::Joseph);
        assert_eq!(config.radar_velocity_init, RadarVelocityInit::Radial);

        let config: FusionConfig =
            serde_json::from_str(r#"{"radar_velocity_init": "radial_plus_range"}"#).unwrap();
        assert_eq!(config.radar_velocity_init, RadarVelocityInit::RadialPlusRange);
    }

    #[test]
    fn test_radar_velocity_seed() {
        let reading = RadarReading {
            rho: 5.0,
            theta: 0.0,
            rho_dot: 2.0,
        };
        assert_eq!(RadarVelocityInit::Radial.velocity(&reading), (2.0, 0.0));
        assert_eq!(
            RadarVelocityInit::RadialPlusRange.velocity(&reading),
            (2.0, 5.0)
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = FusionConfig {
            timestamp_scale: 0.0,
            ..FusionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = FusionConfig {
            radar_noise: [0.09, f64::NAN, 0.09],
            ..FusionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[derive(clap::Parser)]
    struct TestCli {
        #[command(flatten)]
        filter: FilterArgs,
    }

    #[test]
    fn test_filter_args_overrides() {
        use clap::Parser;

        let cli = TestCli::parse_from(["test", "--noise-ax", "4", "--joseph"]);
        let config = cli.filter.load().unwrap();
        assert_eq!(config.noise_ax, 4.0);
        assert_eq!(config.noise_ay, 9.0);
        assert_eq!(config.covariance_update, CovarianceUpdate::Joseph);

        let cli = TestCli::parse_from(["test", "--timestamp-scale", "0"]);
        assert!(matches!(cli.filter.load(), Err(ConfigError::Invalid(_))));

        assert_eq!(FilterArgs::default().load().unwrap(), FusionConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "fusion_config_test_{}.json",
            std::process::id()
        ));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, r#"{{"timestamp_scale": 1e-3}}"#).unwrap();
        }
        let config = FusionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.timestamp_scale, 1e-3);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            FusionConfig::from_json_file(&path),
            Err(ConfigError::Io(_))
        ));
    }
}
