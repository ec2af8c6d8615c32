//! Host collaborators for drainwatch.
//!
//! This crate defines the narrow traits the estimation engine reads counters
//! and device state through, plus sysfs/procfs implementations of them.
//!
//! # Features
//!
//! - `linux` - Enable the Linux/Android implementations (sysfs, procfs)
//!
//! # Example
//!
//! ```ignore
//! use drainwatch_platform::NetworkCounters;
//! use drainwatch_platform::linux::LinuxNetwork;
//!
//! let net = LinuxNetwork::new();
//! let counters = net.interface_counters("rmnet0")?;
//! println!("tx bytes: {}", counters.tx_bytes);
//! ```

mod sources;
mod types;

pub use sources::{
    AudioSource, CpuCounters, DisplaySource, ForegroundSource, GpsSource, NetworkCounters,
    OwnerSource, SensorSource, Telephony, WifiLink, BRIGHTNESS_UNAVAILABLE,
};
pub use types::{
    ConnectionState, CpuTimes, InterfaceCounters, NetworkType, OwnerTraffic, ProcessTimes,
    SensorRating, WifiLinkInfo,
};

#[cfg(target_os = "linux")]
#[cfg(feature = "linux")]
pub mod linux;
