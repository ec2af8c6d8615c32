use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use drainwatch_platform::{InterfaceCounters, NetworkCounters, OwnerSource, OwnerTraffic, WifiLink};
use drainwatch_protocol::{IterationSnapshot, Subsystem, Uid, UsageRecord, WifiState, WifiUsage};
use tracing::{debug, warn};

use super::Monitor;
use crate::calibration::Calibration;
use crate::error::MonitorError;

#[derive(Debug, Clone)]
pub struct WifiConfig {
    pub interface: String,
    pub interval: Duration,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            interval: Duration::from_secs(1),
        }
    }
}

pub struct WifiMonitor {
    calibration: Arc<Calibration>,
    config: WifiConfig,
    link: Box<dyn WifiLink>,
    counters: Box<dyn NetworkCounters>,
    owners: Box<dyn OwnerSource>,
    has_owner_counters: bool,
    state: WifiState,
    last: Option<(InterfaceCounters, Instant)>,
    last_owners: BTreeMap<Uid, OwnerTraffic>,
}

impl WifiMonitor {
    pub fn new(
        calibration: Arc<Calibration>,
        config: WifiConfig,
        link: Box<dyn WifiLink>,
        counters: Box<dyn NetworkCounters>,
        owners: Box<dyn OwnerSource>,
    ) -> Self {
        let has_owner_counters = counters.has_owner_counters();
        Self {
            calibration,
            config,
            link,
            counters,
            owners,
            has_owner_counters,
            state: WifiState::Off,
            last: None,
            last_owners: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    fn next_state(&self, packet_rate: f64) -> WifiState {
        let model = &self.calibration.wifi;
        match self.state {
            WifiState::Off => WifiState::Low,
            WifiState::Low if packet_rate > model.low_high_packets => WifiState::High,
            WifiState::High if packet_rate < model.high_low_packets => WifiState::Low,
            state => state,
        }
    }

    pub fn sample_at(&mut self, iteration: u64, now: Instant) -> IterationSnapshot {
        let link = match self.link.link(&self.config.interface) {
            Ok(link) => link,
            Err(e) => {
                warn!(iface = %self.config.interface, error = %e, "Failed to query Wi-Fi link");
                return IterationSnapshot::zero(Subsystem::Wifi, iteration);
            }
        };

        if !link.enabled {
            if self.state != WifiState::Off {
                debug!(iface = %self.config.interface, "Wi-Fi disabled");
            }
            self.state = WifiState::Off;
            self.last = None;
            self.last_owners.clear();
            return IterationSnapshot::zero(Subsystem::Wifi, iteration);
        }

        let counters = match self.counters.interface_counters(&self.config.interface) {
            Ok(counters) => counters,
            Err(e) => {
                warn!(iface = %self.config.interface, error = %e, "Failed to read Wi-Fi counters");
                return IterationSnapshot::zero(Subsystem::Wifi, iteration);
            }
        };

        let Some((previous, last_at)) = self.last.replace((counters, now)) else {
            self.state = WifiState::Low;
            self.sample_owners(None);
            return IterationSnapshot::new(
                iteration,
                UsageRecord::Wifi(WifiUsage {
                    state: self.state,
                    link_speed_mbps: link.speed_mbps,
                    ..Default::default()
                }),
            );
        };

        let mut secs = now.saturating_duration_since(last_at).as_secs_f64();
        if secs <= 0.0 {
            secs = self.config.interval.as_secs_f64().max(f64::EPSILON);
        }

        let packets = counters.packets().saturating_sub(previous.packets());
        let tx_bytes = counters.tx_bytes.saturating_sub(previous.tx_bytes);
        self.state = self.next_state(packets as f64 / secs);

        let mut snapshot = IterationSnapshot::new(
            iteration,
            UsageRecord::Wifi(WifiUsage {
                state: self.state,
                link_speed_mbps: link.speed_mbps,
                tx_rate: tx_bytes as f64 / secs,
                packets,
            }),
        );

        let owner_state = match self.state {
            WifiState::High => WifiState::High,
            _ => WifiState::Low,
        };
        for (uid, tx_rate) in self.sample_owners(Some(secs)) {
            snapshot.set_owner_usage(
                uid,
                UsageRecord::Wifi(WifiUsage {
                    state: owner_state,
                    link_speed_mbps: link.speed_mbps,
                    tx_rate,
                    packets: 0,
                }),
            );
        }

        snapshot
    }

    /// Reads owner counters and returns the uplink rate of every owner whose
    /// byte counts moved. Without a window only baselines are recorded.
    fn sample_owners(&mut self, window_secs: Option<f64>) -> Vec<(Uid, f64)> {
        if !self.has_owner_counters {
            return Vec::new();
        }

        let uids = match self.owners.list_active_owners() {
            Ok(uids) => uids,
            Err(e) => {
                warn!(error = %e, "Failed to list active owners");
                return Vec::new();
            }
        };

        let mut active = Vec::new();
        let mut current = BTreeMap::new();

        for raw in uids {
            let uid = Uid(raw);
            if uid.is_sentinel() {
                break;
            }

            let traffic = match self.counters.owner_counters(raw) {
                Ok(traffic) => traffic,
                Err(e) => {
                    debug!(uid = raw, error = %e, "No Wi-Fi counters for owner");
                    continue;
                }
            };

            if let (Some(secs), Some(previous)) = (window_secs, self.last_owners.get(&uid)) {
                let tx = traffic.tx_bytes.saturating_sub(previous.tx_bytes);
                let rx = traffic.rx_bytes.saturating_sub(previous.rx_bytes);
                if tx + rx > 0 {
                    active.push((uid, tx as f64 / secs));
                }
            }

            current.insert(uid, traffic);
        }

        self.last_owners = current;
        active
    }
}

impl Monitor for WifiMonitor {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Wifi
    }

    fn sample_iteration(&mut self, iteration: u64) -> Result<IterationSnapshot, MonitorError> {
        Ok(self.sample_at(iteration, Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::tests::test_calibration;
    use crate::monitor::fakes::Fake;
    use color_eyre::eyre::Result;
    use drainwatch_platform::WifiLinkInfo;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct FakeLink(Arc<Mutex<WifiLinkInfo>>);

    impl WifiLink for FakeLink {
        fn link(&self, _iface: &str) -> Result<WifiLinkInfo> {
            Ok(*self.0.lock().unwrap())
        }
    }

    const SECOND: Duration = Duration::from_secs(1);

    fn setup() -> (Fake, FakeLink, WifiMonitor) {
        let fake = Fake::default();
        fake.host().interface = Some(InterfaceCounters::default());
        let link = FakeLink(Arc::new(Mutex::new(WifiLinkInfo {
            enabled: true,
            speed_mbps: 54.0,
        })));
        let monitor = WifiMonitor::new(
            Arc::new(test_calibration()),
            WifiConfig::default(),
            Box::new(link.clone()),
            Box::new(fake.clone()),
            Box::new(fake.clone()),
        );
        (fake, link, monitor)
    }

    fn packets(fake: &Fake, count: u64, bytes: u64) {
        let mut host = fake.host();
        let counters = host.interface.get_or_insert_with(Default::default);
        counters.tx_packets += count;
        counters.tx_bytes += bytes;
    }

    fn wifi(snapshot: &IterationSnapshot) -> &WifiUsage {
        match &snapshot.system {
            UsageRecord::Wifi(usage) => usage,
            other => panic!("expected wifi record, got {:?}", other),
        }
    }

    #[test]
    fn test_low_high_hysteresis() {
        // Promote above 15 packets/s, demote below 8 packets/s.
        let (fake, _link, mut monitor) = setup();
        let start = Instant::now();

        monitor.sample_at(0, start);
        assert_eq!(monitor.state(), WifiState::Low);

        packets(&fake, 20, 20_000);
        let snapshot = monitor.sample_at(1, start + SECOND);
        assert_eq!(monitor.state(), WifiState::High);
        assert_eq!(wifi(&snapshot).tx_rate, 20_000.0);
        assert_eq!(wifi(&snapshot).packets, 20);

        packets(&fake, 10, 100);
        monitor.sample_at(2, start + SECOND * 2);
        assert_eq!(monitor.state(), WifiState::High);

        packets(&fake, 2, 100);
        monitor.sample_at(3, start + SECOND * 3);
        assert_eq!(monitor.state(), WifiState::Low);
    }

    #[test]
    fn test_rates_use_elapsed_time() {
        let (fake, _link, mut monitor) = setup();
        let start = Instant::now();
        monitor.sample_at(0, start);

        // 20 packets over two seconds stays under the promotion threshold.
        packets(&fake, 20, 4_000);
        let snapshot = monitor.sample_at(1, start + SECOND * 2);
        assert_eq!(monitor.state(), WifiState::Low);
        assert_eq!(wifi(&snapshot).tx_rate, 2_000.0);
    }

    #[test]
    fn test_disabled_link_is_off() {
        let (fake, link, mut monitor) = setup();
        let start = Instant::now();
        monitor.sample_at(0, start);
        packets(&fake, 50, 50_000);
        monitor.sample_at(1, start + SECOND);

        link.0.lock().unwrap().enabled = false;
        let snapshot = monitor.sample_at(2, start + SECOND * 2);
        assert_eq!(monitor.state(), WifiState::Off);
        assert_eq!(snapshot.system, UsageRecord::zero(Subsystem::Wifi));
    }

    #[test]
    fn test_owner_records_follow_device_state() {
        let (fake, _link, mut monitor) = setup();
        fake.host().owners = vec![10_001, 10_002];
        fake.owner_send(10_001, 0);
        fake.owner_send(10_002, 0);
        let start = Instant::now();
        monitor.sample_at(0, start);

        packets(&fake, 30, 9_000);
        fake.owner_send(10_001, 9_000);
        let snapshot = monitor.sample_at(1, start + SECOND);

        match snapshot.owner(Uid(10_001)) {
            Some(UsageRecord::Wifi(usage)) => {
                assert_eq!(usage.state, WifiState::High);
                assert_eq!(usage.tx_rate, 9_000.0);
            }
            other => panic!("expected owner record, got {:?}", other),
        }
        assert!(snapshot.owner(Uid(10_002)).is_none());
    }
}
