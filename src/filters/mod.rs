pub mod fusion_ekf;
pub mod jacobian;
pub mod kalman;

pub use fusion_ekf::{Estimate, FusionEkf, FusionEkfState, IngestOutcome, Innovation, TrackerPhase};
