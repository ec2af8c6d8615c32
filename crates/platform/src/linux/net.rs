use std::path::{Path, PathBuf};

use color_eyre::eyre::Result;

use super::{read_trimmed, read_u64};
use crate::sources::{NetworkCounters, WifiLink};
use crate::types::{InterfaceCounters, OwnerTraffic, WifiLinkInfo};

const NET_CLASS_PATH: &str = "/sys/class/net";
const UID_STAT_PATH: &str = "/proc/uid_stat";

pub struct LinuxNetwork {
    net_root: PathBuf,
    uid_stat_root: PathBuf,
}

impl LinuxNetwork {
    pub fn new() -> Self {
        Self::with_roots(NET_CLASS_PATH, UID_STAT_PATH)
    }

    pub fn with_roots(net_root: impl Into<PathBuf>, uid_stat_root: impl Into<PathBuf>) -> Self {
        Self {
            net_root: net_root.into(),
            uid_stat_root: uid_stat_root.into(),
        }
    }

    fn statistic(&self, iface: &str, name: &str) -> Result<u64> {
        read_u64(&self.net_root.join(iface).join("statistics").join(name))
    }
}

impl Default for LinuxNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkCounters for LinuxNetwork {
    fn interface_counters(&self, iface: &str) -> Result<InterfaceCounters> {
        Ok(InterfaceCounters {
            tx_packets: self.statistic(iface, "tx_packets")?,
            rx_packets: self.statistic(iface, "rx_packets")?,
            tx_bytes: self.statistic(iface, "tx_bytes")?,
            rx_bytes: self.statistic(iface, "rx_bytes")?,
        })
    }

    fn owner_counters(&self, uid: i32) -> Result<OwnerTraffic> {
        let dir = self.uid_stat_root.join(uid.to_string());
        Ok(OwnerTraffic {
            tx_bytes: read_u64(&dir.join("tcp_snd"))?,
            rx_bytes: read_u64(&dir.join("tcp_rcv"))?,
        })
    }

    fn has_owner_counters(&self) -> bool {
        self.uid_stat_root.is_dir()
    }
}

/// Wi-Fi link state from the interface's sysfs node.
pub struct LinuxWifiLink {
    net_root: PathBuf,
}

impl LinuxWifiLink {
    pub fn new() -> Self {
        Self::with_root(NET_CLASS_PATH)
    }

    pub fn with_root(net_root: impl Into<PathBuf>) -> Self {
        Self {
            net_root: net_root.into(),
        }
    }
}

impl Default for LinuxWifiLink {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiLink for LinuxWifiLink {
    fn link(&self, iface: &str) -> Result<WifiLinkInfo> {
        let dir = self.net_root.join(iface);
        let enabled = interface_up(&dir);

        // Many wireless drivers reject reads of `speed`; treat that as unknown.
        let speed_mbps = read_trimmed(&dir.join("speed"))
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|s| *s > 0)
            .map(|s| s as f64)
            .unwrap_or(0.0);

        Ok(WifiLinkInfo {
            enabled,
            speed_mbps,
        })
    }
}

pub(crate) fn interface_up(dir: &Path) -> bool {
    match read_trimmed(&dir.join("operstate")) {
        Ok(state) => state == "up" || state == "unknown",
        Err(_) => false,
    }
}
