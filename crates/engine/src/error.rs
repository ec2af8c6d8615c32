use std::path::PathBuf;

use drainwatch_protocol::Subsystem;

/// A device profile that cannot be used. Always fatal before polling starts.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("Failed to read device profile {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid device profile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Calibration table `{table}` is empty")]
    EmptyTable { table: &'static str },

    #[error("Calibration table `{table}` has {breakpoints} breakpoints but {ratios} ratios")]
    TableLength {
        table: &'static str,
        breakpoints: usize,
        ratios: usize,
    },

    #[error("Calibration table `{table}` breakpoints must be strictly ascending")]
    Unsorted { table: &'static str },

    #[error("Calibration constant `{field}` must be a finite, non-negative number")]
    InvalidConstant { field: String },

    #[error("Screen dimensions must be non-zero")]
    ZeroScreen,
}

/// An unrecoverable failure inside one monitor's iteration.
///
/// The estimator contains these to the failing subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("{subsystem} counters unavailable: {message}")]
    Unavailable {
        subsystem: Subsystem,
        message: String,
    },
}

impl MonitorError {
    pub fn unavailable(subsystem: Subsystem, error: impl std::fmt::Display) -> Self {
        MonitorError::Unavailable {
            subsystem,
            message: error.to_string(),
        }
    }
}
