use std::collections::BTreeMap;
use std::path::PathBuf;

use color_eyre::eyre::Result;

use super::net::interface_up;
use crate::sources::{ForegroundSource, GpsSource, SensorSource, Telephony};
use crate::types::{ConnectionState, NetworkType, SensorRating};

const NET_CLASS_PATH: &str = "/sys/class/net";

/// Telephony for hosts without a modem service.
///
/// Network type and operator come from configuration; the data connection
/// counts as up while the radio interface reports an up link.
pub struct StaticTelephony {
    network_type: NetworkType,
    operator: String,
    iface_dir: PathBuf,
}

impl StaticTelephony {
    pub fn new(network_type: NetworkType, operator: impl Into<String>, iface: &str) -> Self {
        Self::with_root(network_type, operator, iface, NET_CLASS_PATH)
    }

    pub fn with_root(
        network_type: NetworkType,
        operator: impl Into<String>,
        iface: &str,
        net_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            network_type,
            operator: operator.into(),
            iface_dir: net_root.into().join(iface),
        }
    }
}

impl Telephony for StaticTelephony {
    fn network_type(&self) -> NetworkType {
        self.network_type
    }

    fn connection_state(&self) -> ConnectionState {
        if interface_up(&self.iface_dir) {
            ConnectionState::Connected
        } else {
            ConnectionState::Other
        }
    }

    fn operator_name(&self) -> String {
        self.operator.clone()
    }
}

/// Treats the user running the estimator as the foreground owner unless a
/// fixed owner is configured.
pub struct InvokingUserForeground {
    fixed: Option<i32>,
}

impl InvokingUserForeground {
    pub fn new(fixed: Option<i32>) -> Self {
        Self { fixed }
    }
}

impl ForegroundSource for InvokingUserForeground {
    fn foreground_owner(&self) -> i32 {
        self.fixed.unwrap_or_else(|| {
            // SAFETY: getuid has no preconditions and cannot fail.
            unsafe { libc::getuid() as i32 }
        })
    }
}

/// GPS source for hosts without a location engine: always off.
pub struct UnavailableGps;

impl GpsSource for UnavailableGps {
    fn engine_on(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Sensor source for hosts that expose no sensor power ratings.
pub struct UnavailableSensors;

impl SensorSource for UnavailableSensors {
    fn list_sensors_with_rated_power(&self) -> Result<Vec<SensorRating>> {
        Ok(Vec::new())
    }

    fn on_times(&self) -> Result<BTreeMap<String, f64>> {
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_connection_follows_operstate() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("rmnet0")).unwrap();
        fs::write(dir.path().join("rmnet0/operstate"), "down\n").unwrap();

        let telephony =
            StaticTelephony::with_root(NetworkType::Hsdpa, "AT&T", "rmnet0", dir.path());
        assert_eq!(telephony.connection_state(), ConnectionState::Other);

        fs::write(dir.path().join("rmnet0/operstate"), "up\n").unwrap();
        assert!(telephony.connection_state().is_connected());
        assert_eq!(telephony.operator_name(), "AT&T");
    }

    #[test]
    fn test_fixed_foreground_owner() {
        assert_eq!(InvokingUserForeground::new(Some(10_054)).foreground_owner(), 10_054);
    }
}
