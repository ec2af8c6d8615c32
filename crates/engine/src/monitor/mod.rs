//! Per-subsystem monitors.
//!
//! A monitor owns every piece of state for its subsystem and is polled once
//! per iteration from a single thread. It always produces a device-wide
//! record; read failures degrade to the zero record with a warning.

mod audio;
mod cpu;
mod gps;
mod radio;
mod screen;
mod sensors;
mod wifi;

use std::time::Duration;

use drainwatch_protocol::{IterationSnapshot, Subsystem};

use crate::error::MonitorError;

pub use audio::AudioMonitor;
pub use cpu::CpuMonitor;
pub use gps::GpsMonitor;
pub use radio::{RadioConfig, RadioMonitor};
pub use screen::{ScreenConfig, ScreenMonitor, DEFAULT_SAMPLE_COUNT};
pub use sensors::SensorMonitor;
pub use wifi::{WifiConfig, WifiMonitor};

pub trait Monitor: Send {
    fn subsystem(&self) -> Subsystem;

    fn sample_iteration(&mut self, iteration: u64) -> Result<IterationSnapshot, MonitorError>;
}

impl<M: Monitor + ?Sized> Monitor for Box<M> {
    fn subsystem(&self) -> Subsystem {
        (**self).subsystem()
    }

    fn sample_iteration(&mut self, iteration: u64) -> Result<IterationSnapshot, MonitorError> {
        (**self).sample_iteration(iteration)
    }
}

/// Converts a dwell time into a whole number of polling iterations,
/// rounding up. Never returns less than one.
pub fn dwell_iterations(secs: f64, interval: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1) as f64;
    let iterations = (secs * 1000.0 / interval_ms).ceil();
    if iterations.is_finite() && iterations >= 1.0 {
        iterations.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use color_eyre::eyre::{eyre, Result};
    use drainwatch_platform::{
        ConnectionState, InterfaceCounters, NetworkCounters, NetworkType, OwnerSource,
        OwnerTraffic, Telephony,
    };

    /// Scripted host state shared between a test and the collaborators it
    /// hands to a monitor.
    #[derive(Debug, Default)]
    pub struct FakeHost {
        pub network_type: NetworkType,
        pub connection: ConnectionState,
        pub operator: String,
        pub interface: Option<InterfaceCounters>,
        pub owners: Vec<i32>,
        pub owner_traffic: BTreeMap<i32, OwnerTraffic>,
        pub owner_reads: BTreeMap<i32, u32>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Fake(pub Arc<Mutex<FakeHost>>);

    impl Fake {
        pub fn connected_umts(operator: &str) -> Self {
            let fake = Fake::default();
            {
                let mut host = fake.host();
                host.network_type = NetworkType::Umts;
                host.connection = ConnectionState::Connected;
                host.operator = operator.to_string();
                host.interface = Some(InterfaceCounters::default());
            }
            fake
        }

        pub fn host(&self) -> std::sync::MutexGuard<'_, FakeHost> {
            self.0.lock().unwrap()
        }

        /// Adds traffic to the interface counters.
        pub fn send(&self, bytes: u64) {
            let mut host = self.host();
            let counters = host.interface.get_or_insert_with(Default::default);
            counters.tx_bytes += bytes;
            counters.tx_packets += 1;
        }

        pub fn owner_send(&self, uid: i32, bytes: u64) {
            self.host().owner_traffic.entry(uid).or_default().tx_bytes += bytes;
        }

        pub fn reads_of(&self, uid: i32) -> u32 {
            self.host().owner_reads.get(&uid).copied().unwrap_or(0)
        }
    }

    impl Telephony for Fake {
        fn network_type(&self) -> NetworkType {
            self.host().network_type
        }

        fn connection_state(&self) -> ConnectionState {
            self.host().connection
        }

        fn operator_name(&self) -> String {
            self.host().operator.clone()
        }
    }

    impl NetworkCounters for Fake {
        fn interface_counters(&self, iface: &str) -> Result<InterfaceCounters> {
            self.host()
                .interface
                .ok_or_else(|| eyre!("no statistics for {}", iface))
        }

        fn owner_counters(&self, uid: i32) -> Result<OwnerTraffic> {
            let mut host = self.host();
            *host.owner_reads.entry(uid).or_default() += 1;
            host.owner_traffic
                .get(&uid)
                .copied()
                .ok_or_else(|| eyre!("no uid_stat entry for {}", uid))
        }
    }

    impl OwnerSource for Fake {
        fn list_active_owners(&mut self) -> Result<Vec<i32>> {
            Ok(self.host().owners.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dwell_iterations_scale_with_interval() {
        assert_eq!(dwell_iterations(5.0, Duration::from_millis(1000)), 5);
        assert_eq!(dwell_iterations(5.0, Duration::from_millis(500)), 10);
        assert_eq!(dwell_iterations(4.0, Duration::from_millis(1500)), 3);
        assert_eq!(dwell_iterations(6.0, Duration::from_millis(250)), 24);
    }

    #[test]
    fn test_dwell_iterations_never_zero() {
        assert_eq!(dwell_iterations(0.0, Duration::from_millis(1000)), 1);
        assert_eq!(dwell_iterations(0.1, Duration::from_secs(10)), 1);
        assert_eq!(dwell_iterations(3.0, Duration::ZERO), 3000);
    }
}
