//! Shared types reported by platform collaborators.

use std::fmt;

/// Cellular network technology currently in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkType {
    #[default]
    Unknown,
    Gprs,
    Edge,
    Umts,
    Hsdpa,
    Hsupa,
    Hspa,
    Lte,
    Nr,
}

impl NetworkType {
    pub fn label(&self) -> &'static str {
        match self {
            NetworkType::Unknown => "Unknown",
            NetworkType::Gprs => "GPRS",
            NetworkType::Edge => "EDGE",
            NetworkType::Umts => "UMTS",
            NetworkType::Hsdpa => "HSDPA",
            NetworkType::Hsupa => "HSUPA",
            NetworkType::Hspa => "HSPA",
            NetworkType::Lte => "LTE",
            NetworkType::Nr => "NR",
        }
    }

    /// Returns true for the UMTS family, whose radio follows the
    /// IDLE/FACH/DCH resource-control model.
    pub fn is_umts_family(&self) -> bool {
        matches!(
            self,
            NetworkType::Umts | NetworkType::Hsdpa | NetworkType::Hsupa | NetworkType::Hspa
        )
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gprs" => NetworkType::Gprs,
            "edge" => NetworkType::Edge,
            "umts" | "3g" => NetworkType::Umts,
            "hsdpa" => NetworkType::Hsdpa,
            "hsupa" => NetworkType::Hsupa,
            "hspa" | "hspa+" => NetworkType::Hspa,
            "lte" | "4g" => NetworkType::Lte,
            "nr" | "5g" => NetworkType::Nr,
            _ => NetworkType::Unknown,
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Mobile data connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connected,
    #[default]
    Other,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Cumulative counters for one network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterfaceCounters {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

impl InterfaceCounters {
    pub fn packets(&self) -> u64 {
        self.tx_packets + self.rx_packets
    }
}

/// Cumulative traffic attributed to one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OwnerTraffic {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

/// Cumulative CPU ticks for the whole machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub user: u64,
    pub system: u64,
    /// All ticks including idle and iowait.
    pub total: u64,
}

/// Cumulative CPU ticks for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTimes {
    pub pid: u32,
    pub uid: i32,
    pub user: u64,
    pub system: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WifiLinkInfo {
    pub enabled: bool,
    pub speed_mbps: f64,
}

/// A sensor together with the power it draws while on.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRating {
    pub name: String,
    pub watts: f64,
}
