//! Power estimation engine for drainwatch.
//!
//! Each [`Monitor`] turns platform counters into one [`IterationSnapshot`]
//! per polling round. The [`PowerEstimator`] drives every monitor on a fixed
//! interval and scores the snapshots against a device [`Calibration`].
//!
//! ```ignore
//! use drainwatch_engine::{Calibration, PowerEstimator};
//!
//! let calibration = Calibration::from_path("profiles/htc-dream.toml".as_ref())?;
//! let mut estimator = PowerEstimator::new(calibration, monitors, interval);
//! let report = estimator.sample_iteration(1);
//! println!("{:.3} W", report.total_watts());
//! ```
//!
//! [`IterationSnapshot`]: drainwatch_protocol::IterationSnapshot

mod calibration;
mod error;
mod estimator;
mod interpolate;
pub mod monitor;
mod screen_state;

pub use calibration::{
    AudioModel, Calibration, CpuModel, GpsModel, PixelCoefficients, RadioModel, RadioProfile,
    RadioTiming, ScreenModel, WifiModel,
};
pub use error::{CalibrationError, MonitorError};
pub use estimator::PowerEstimator;
pub use interpolate::{interpolate, upper_bound, Curve};
pub use monitor::Monitor;
pub use screen_state::ScreenState;
