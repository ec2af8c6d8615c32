//! Collaborator traits the estimation engine reads from.
//!
//! Each trait is deliberately narrow: it exposes only what one monitor needs
//! from the host. Implementations may be backed by sysfs/procfs, a vendor
//! service, or scripted values in tests.

use std::collections::BTreeMap;

use color_eyre::eyre::Result;

use crate::types::{
    ConnectionState, CpuTimes, InterfaceCounters, NetworkType, OwnerTraffic, ProcessTimes,
    SensorRating, WifiLinkInfo,
};

/// Brightness value reported when the display cannot be queried.
pub const BRIGHTNESS_UNAVAILABLE: i32 = -1;

/// Cellular network state.
pub trait Telephony: Send {
    fn network_type(&self) -> NetworkType;

    fn connection_state(&self) -> ConnectionState;

    /// Name of the network operator, e.g. "AT&T".
    fn operator_name(&self) -> String;
}

/// Per-interface and per-owner network counters.
pub trait NetworkCounters: Send {
    fn interface_counters(&self, iface: &str) -> Result<InterfaceCounters>;

    fn owner_counters(&self, uid: i32) -> Result<OwnerTraffic>;

    /// Whether per-owner counters exist on this system at all.
    fn has_owner_counters(&self) -> bool {
        true
    }
}

/// Enumerates owners that currently hold processes.
pub trait OwnerSource: Send {
    /// May end with a negative sentinel; consumers stop reading there.
    fn list_active_owners(&mut self) -> Result<Vec<i32>>;
}

pub trait ForegroundSource: Send {
    fn foreground_owner(&self) -> i32;
}

pub trait DisplaySource: Send {
    /// Brightness in `[0, 255]`, or a value outside that range when unknown.
    fn brightness(&self) -> i32;
}

pub trait CpuCounters: Send {
    fn system_times(&self) -> Result<CpuTimes>;

    fn frequency_mhz(&self) -> Result<f64>;

    fn process_times(&mut self) -> Result<Vec<ProcessTimes>>;
}

pub trait WifiLink: Send {
    fn link(&self, iface: &str) -> Result<WifiLinkInfo>;
}

pub trait GpsSource: Send {
    /// Whether the GPS engine is currently powered for a fix.
    fn engine_on(&self) -> Result<bool>;
}

pub trait AudioSource: Send {
    fn is_playing(&self) -> Result<bool>;

    /// Owners with an open playback stream, when the platform can tell.
    fn playing_owners(&self) -> Result<Vec<i32>> {
        Ok(Vec::new())
    }
}

pub trait SensorSource: Send {
    fn list_sensors_with_rated_power(&self) -> Result<Vec<SensorRating>>;

    /// Cumulative seconds each sensor has been on.
    fn on_times(&self) -> Result<BTreeMap<String, f64>>;
}
