//! Cellular radio monitor.
//!
//! Tracks the IDLE/FACH/DCH resource-control state of the data interface as
//! a whole and, independently, of every owner that has sent traffic over it.
//! Per-owner counter reads are the expensive part of a poll, so owners that
//! have been idle a while are only re-read occasionally.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use drainwatch_platform::{InterfaceCounters, NetworkCounters, OwnerSource, Telephony};
use drainwatch_protocol::{
    IterationSnapshot, RadioPowerState, RadioUsage, Subsystem, Uid, UsageRecord,
};
use tracing::{debug, info, warn};

use super::{dwell_iterations, Monitor};
use crate::calibration::Calibration;
use crate::error::MonitorError;

/// Upper bound on the staleness window of an idle owner.
const STALE_CEILING: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RadioConfig {
    pub interface: String,
    pub interval: Duration,
    /// Consecutive skips after which a stale owner is read anyway.
    pub max_owner_skips: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            interface: "rmnet0".to_string(),
            interval: Duration::from_secs(1),
            max_owner_skips: 10,
        }
    }
}

/// Inactive iterations before each demotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Thresholds {
    dch_fach: u32,
    fach_idle: u32,
}

#[derive(Debug, Clone, Default)]
struct RadioTracker {
    state: RadioPowerState,
    counters: InterfaceCounters,
    delta_packets: u64,
    delta_tx_bytes: u64,
    delta_rx_bytes: u64,
    /// Consecutive inactive iterations in the current state.
    dwell: u32,
    inactive: Duration,
    last_update: Option<Instant>,
    skips: u32,
}

impl RadioTracker {
    fn is_initialized(&self) -> bool {
        self.last_update.is_some()
    }

    /// An idle owner whose last read is older than its accumulated inactive
    /// time (capped at ten seconds) is unlikely to have new traffic.
    fn is_stale(&self, now: Instant) -> bool {
        if self.state != RadioPowerState::Idle {
            return false;
        }
        match self.last_update {
            Some(last) => now.saturating_duration_since(last) > STALE_CEILING.min(self.inactive),
            None => false,
        }
    }

    fn update(&mut self, counters: InterfaceCounters, now: Instant, thresholds: Thresholds) {
        let Some(last) = self.last_update else {
            self.counters = counters;
            self.last_update = Some(now);
            return;
        };

        self.delta_packets = counters.packets().saturating_sub(self.counters.packets());
        self.delta_tx_bytes = counters.tx_bytes.saturating_sub(self.counters.tx_bytes);
        self.delta_rx_bytes = counters.rx_bytes.saturating_sub(self.counters.rx_bytes);

        let inactive = self.delta_tx_bytes == 0 && self.delta_rx_bytes == 0;
        if inactive {
            self.inactive += now.saturating_duration_since(last);
        } else {
            self.inactive = Duration::ZERO;
        }

        match self.state {
            RadioPowerState::Idle => {
                if !inactive {
                    self.state = RadioPowerState::Fach;
                    self.dwell = 0;
                }
            }
            RadioPowerState::Fach => {
                if inactive {
                    self.dwell += 1;
                    if self.dwell >= thresholds.fach_idle {
                        self.dwell = 0;
                        self.state = RadioPowerState::Idle;
                    }
                } else {
                    self.dwell = 0;
                    self.state = RadioPowerState::Dch;
                }
            }
            RadioPowerState::Dch => {
                if inactive {
                    self.dwell += 1;
                    if self.dwell >= thresholds.dch_fach {
                        self.dwell = 0;
                        self.state = RadioPowerState::Fach;
                    }
                } else {
                    self.dwell = 0;
                }
            }
        }

        self.counters = counters;
        self.last_update = Some(now);
    }

    /// Drops to IDLE while keeping the last counters, so traffic seen on
    /// the first sample after reconnecting still counts.
    fn force_idle(&mut self, now: Instant) {
        self.state = RadioPowerState::Idle;
        self.dwell = 0;
        self.inactive = Duration::ZERO;
        self.delta_packets = 0;
        self.delta_tx_bytes = 0;
        self.delta_rx_bytes = 0;
        if self.is_initialized() {
            self.last_update = Some(now);
        }
    }

    fn has_traffic(&self) -> bool {
        self.delta_tx_bytes + self.delta_rx_bytes != 0
    }

    fn usage(&self, provider: Option<&str>) -> RadioUsage {
        RadioUsage {
            packets: self.delta_packets,
            tx_bytes: self.delta_tx_bytes,
            rx_bytes: self.delta_rx_bytes,
            power_state: self.state,
            provider: provider.map(str::to_string),
        }
    }
}

pub struct RadioMonitor {
    calibration: Arc<Calibration>,
    config: RadioConfig,
    telephony: Box<dyn Telephony>,
    counters: Box<dyn NetworkCounters>,
    owners: Box<dyn OwnerSource>,
    has_owner_counters: bool,
    provider: Option<String>,
    device: RadioTracker,
    owner_trackers: BTreeMap<Uid, RadioTracker>,
}

impl RadioMonitor {
    pub fn new(
        calibration: Arc<Calibration>,
        config: RadioConfig,
        telephony: Box<dyn Telephony>,
        counters: Box<dyn NetworkCounters>,
        owners: Box<dyn OwnerSource>,
    ) -> Self {
        let has_owner_counters = counters.has_owner_counters();
        if !has_owner_counters {
            info!(
                iface = %config.interface,
                "Per-owner radio counters unavailable, reporting device totals only"
            );
        }

        Self {
            calibration,
            config,
            telephony,
            counters,
            owners,
            has_owner_counters,
            provider: None,
            device: RadioTracker::default(),
            owner_trackers: BTreeMap::new(),
        }
    }

    pub fn power_state(&self) -> RadioPowerState {
        self.device.state
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn tracked_owners(&self) -> usize {
        self.owner_trackers.len()
    }

    fn thresholds(&self) -> Thresholds {
        let timing = self.calibration.radio_timing(self.provider.as_deref());
        Thresholds {
            dch_fach: dwell_iterations(timing.dch_fach_secs, self.config.interval),
            fach_idle: dwell_iterations(timing.fach_idle_secs, self.config.interval),
        }
    }

    /// Forces the device to IDLE and forgets the provider and every owner
    /// after the data connection goes away.
    fn interface_off(&mut self, now: Instant) {
        if self.device.state != RadioPowerState::Idle || !self.owner_trackers.is_empty() {
            debug!(iface = %self.config.interface, "Radio interface reset");
        }
        self.provider = None;
        self.device.force_idle(now);
        self.owner_trackers.clear();
    }

    /// Runs one iteration as of `now`.
    pub fn sample_at(&mut self, iteration: u64, now: Instant) -> IterationSnapshot {
        let network_type = self.telephony.network_type();
        let connection = self.telephony.connection_state();

        if !connection.is_connected() || !network_type.is_umts_family() {
            self.interface_off(now);
            return IterationSnapshot::zero(Subsystem::Radio, iteration);
        }

        if self.provider.is_none() {
            let operator = self.telephony.operator_name();
            if !operator.is_empty() {
                debug!(operator = %operator, network = network_type.label(), "Radio provider");
                self.provider = Some(operator);
            }
        }

        let thresholds = self.thresholds();

        let counters = match self.counters.interface_counters(&self.config.interface) {
            Ok(counters) => counters,
            Err(e) => {
                warn!(iface = %self.config.interface, error = %e, "Failed to read radio counters");
                return IterationSnapshot::zero(Subsystem::Radio, iteration);
            }
        };

        self.device.update(counters, now, thresholds);
        let provider = self.provider.as_deref();
        let mut snapshot =
            IterationSnapshot::new(iteration, UsageRecord::Radio(self.device.usage(provider)));

        if self.has_owner_counters {
            self.sample_owners(&mut snapshot, now, thresholds);
        }

        snapshot
    }

    fn sample_owners(&mut self, snapshot: &mut IterationSnapshot, now: Instant, thresholds: Thresholds) {
        let uids = match self.owners.list_active_owners() {
            Ok(uids) => uids,
            Err(e) => {
                warn!(error = %e, "Failed to list active owners");
                return;
            }
        };

        for raw in uids {
            let uid = Uid(raw);
            if uid.is_sentinel() {
                break;
            }

            let tracker = self.owner_trackers.entry(uid).or_default();
            if tracker.is_stale(now) {
                if tracker.skips < self.config.max_owner_skips {
                    tracker.skips += 1;
                    continue;
                }
                debug!(uid = raw, skips = tracker.skips, "Re-reading stale owner");
            }
            tracker.skips = 0;

            let traffic = match self.counters.owner_counters(raw) {
                Ok(traffic) => traffic,
                Err(e) => {
                    warn!(uid = raw, error = %e, "Failed to read owner radio counters");
                    continue;
                }
            };

            let counters = InterfaceCounters {
                tx_bytes: traffic.tx_bytes,
                rx_bytes: traffic.rx_bytes,
                ..Default::default()
            };

            let was_initialized = tracker.is_initialized();
            tracker.update(counters, now, thresholds);

            if was_initialized && (tracker.has_traffic() || tracker.state != RadioPowerState::Idle)
            {
                let usage = tracker.usage(self.provider.as_deref());
                snapshot.set_owner_usage(uid, UsageRecord::Radio(usage));
            }
        }
    }
}

impl Monitor for RadioMonitor {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Radio
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
    use drainwatch_platform::{ConnectionState, NetworkType};
    use pretty_assertions::assert_eq;
    use RadioPowerState::{Dch, Fach, Idle};

    const SECOND: Duration = Duration::from_secs(1);

    fn monitor(fake: &Fake) -> RadioMonitor {
        monitor_with_skips(fake, RadioConfig::default().max_owner_skips)
    }

    /// With zero allowed skips every owner is read on every iteration.
    fn monitor_with_skips(fake: &Fake, max_owner_skips: u32) -> RadioMonitor {
        let config = RadioConfig {
            max_owner_skips,
            ..Default::default()
        };
        RadioMonitor::new(
            Arc::new(test_calibration()),
            config,
            Box::new(fake.clone()),
            Box::new(fake.clone()),
            Box::new(fake.clone()),
        )
    }

    fn radio(snapshot: &IterationSnapshot) -> &RadioUsage {
        match &snapshot.system {
            UsageRecord::Radio(usage) => usage,
            other => panic!("expected radio record, got {:?}", other),
        }
    }

    #[test]
    fn test_conformance_trace() {
        // Default profile: fach_idle 5 s, dch_fach 3 s, 1 s interval.
        let fake = Fake::connected_umts("Carrier");
        let mut monitor = monitor(&fake);
        let start = Instant::now();

        let baseline = monitor.sample_at(0, start);
        assert_eq!(radio(&baseline).power_state, Idle);

        let mut states = Vec::new();
        for i in 1..=10u64 {
            if (1..=3).contains(&i) || i == 10 {
                fake.send(1_500);
            }
            let snapshot = monitor.sample_at(i, start + SECOND * i as u32);
            states.push(radio(&snapshot).power_state);
        }

        assert_eq!(
            states,
            vec![Fach, Dch, Dch, Dch, Dch, Fach, Fach, Fach, Fach, Dch]
        );
    }

    #[test]
    fn test_idle_reaches_dch_within_two_iterations() {
        let fake = Fake::connected_umts("Carrier");
        let mut monitor = monitor(&fake);
        let start = Instant::now();
        monitor.sample_at(0, start);

        fake.send(100);
        monitor.sample_at(1, start + SECOND);
        assert_eq!(monitor.power_state(), Fach);

        fake.send(100);
        monitor.sample_at(2, start + SECOND * 2);
        assert_eq!(monitor.power_state(), Dch);
    }

    #[test]
    fn test_fach_demotes_to_idle() {
        let fake = Fake::connected_umts("Carrier");
        let mut monitor = monitor(&fake);
        let start = Instant::now();
        monitor.sample_at(0, start);

        fake.send(100);
        monitor.sample_at(1, start + SECOND);
        assert_eq!(monitor.power_state(), Fach);

        for i in 2..=5u32 {
            monitor.sample_at(i as u64, start + SECOND * i);
            assert_eq!(monitor.power_state(), Fach, "iteration {}", i);
        }
        monitor.sample_at(6, start + SECOND * 6);
        assert_eq!(monitor.power_state(), Idle);
    }

    #[test]
    fn test_provider_timing_follows_operator() {
        // Provider profile: dch_fach 6 s, fach_idle 4 s.
        let fake = Fake::connected_umts("T - Mobile");
        let mut monitor = monitor(&fake);
        let start = Instant::now();
        monitor.sample_at(0, start);
        assert_eq!(monitor.provider(), Some("T - Mobile"));

        fake.send(100);
        monitor.sample_at(1, start + SECOND);
        assert_eq!(monitor.power_state(), Fach);
        fake.send(100);
        monitor.sample_at(2, start + SECOND * 2);
        assert_eq!(monitor.power_state(), Dch);

        for i in 3..=7u32 {
            monitor.sample_at(i as u64, start + SECOND * i);
            assert_eq!(monitor.power_state(), Dch, "iteration {}", i);
        }
        monitor.sample_at(8, start + SECOND * 8);
        assert_eq!(monitor.power_state(), Fach);
    }

    #[test]
    fn test_light_traffic_promotes_for_shipped_carriers() {
        let profile = include_str!("../../../../profiles/htc-dream.toml");
        let calibration = Arc::new(Calibration::from_toml_str(profile).unwrap());

        for carrier in ["T - Mobile", "AT&T"] {
            let fake = Fake::connected_umts(carrier);
            let mut monitor = RadioMonitor::new(
                Arc::clone(&calibration),
                RadioConfig::default(),
                Box::new(fake.clone()),
                Box::new(fake.clone()),
                Box::new(fake.clone()),
            );
            let start = Instant::now();
            monitor.sample_at(0, start);

            let mut states = Vec::new();
            for i in 1..=4u32 {
                fake.send(100);
                monitor.sample_at(i as u64, start + SECOND * i);
                states.push(monitor.power_state());
            }
            assert_eq!(states, vec![Fach, Dch, Dch, Dch], "{}", carrier);
        }
    }

    #[test]
    fn test_disconnect_resets_everything() {
        let fake = Fake::connected_umts("Carrier");
        fake.host().owners = vec![10_001];
        fake.owner_send(10_001, 10);
        let mut monitor = monitor(&fake);
        let start = Instant::now();

        monitor.sample_at(0, start);
        fake.send(100);
        fake.owner_send(10_001, 100);
        monitor.sample_at(1, start + SECOND);
        assert_eq!(monitor.power_state(), Fach);
        assert_eq!(monitor.tracked_owners(), 1);

        fake.host().connection = ConnectionState::Other;
        let snapshot = monitor.sample_at(2, start + SECOND * 2);

        assert_eq!(snapshot.system, UsageRecord::zero(Subsystem::Radio));
        assert!(!snapshot.has_owners());
        assert_eq!(monitor.power_state(), Idle);
        assert_eq!(monitor.provider(), None);
        assert_eq!(monitor.tracked_owners(), 0);
    }

    #[test]
    fn test_unsupported_network_type_resets() {
        let fake = Fake::connected_umts("Carrier");
        let mut monitor = monitor(&fake);
        let start = Instant::now();
        monitor.sample_at(0, start);
        fake.send(100);
        monitor.sample_at(1, start + SECOND);

        fake.host().network_type = NetworkType::Lte;
        let snapshot = monitor.sample_at(2, start + SECOND * 2);
        assert_eq!(radio(&snapshot).power_state, Idle);
        assert_eq!(monitor.provider(), None);

        // Reconnecting re-reads the operator; traffic on the first sample
        // counts against the counters kept across the reset.
        fake.host().network_type = NetworkType::Hspa;
        fake.host().operator = "AT&T".to_string();
        fake.send(100);
        let snapshot = monitor.sample_at(3, start + SECOND * 3);
        assert_eq!(monitor.provider(), Some("AT&T"));
        assert_eq!(radio(&snapshot).tx_bytes, 100);
        assert_eq!(radio(&snapshot).power_state, Fach);
    }

    #[test]
    fn test_disconnect_from_dch() {
        let fake = Fake::connected_umts("Carrier");
        fake.host().owners = vec![10_001];
        fake.owner_send(10_001, 10);
        let mut monitor = monitor_with_skips(&fake, 0);
        let start = Instant::now();

        monitor.sample_at(0, start);
        for i in 1..=2u32 {
            fake.send(100);
            fake.owner_send(10_001, 100);
            monitor.sample_at(i as u64, start + SECOND * i);
        }
        assert_eq!(monitor.power_state(), Dch);
        assert_eq!(monitor.tracked_owners(), 1);

        fake.host().connection = ConnectionState::Other;
        let snapshot = monitor.sample_at(3, start + SECOND * 3);
        assert_eq!(snapshot.system, UsageRecord::zero(Subsystem::Radio));
        assert_eq!(monitor.power_state(), Idle);
        assert_eq!(monitor.provider(), None);
        assert_eq!(monitor.tracked_owners(), 0);

        // Back up with traffic: climbs from IDLE again rather than resuming DCH.
        fake.host().connection = ConnectionState::Connected;
        fake.send(100);
        let snapshot = monitor.sample_at(4, start + SECOND * 4);
        assert_eq!(radio(&snapshot).power_state, Fach);
        assert_eq!(monitor.provider(), Some("Carrier"));
    }

    #[test]
    fn test_owner_records_and_sentinel() {
        let fake = Fake::connected_umts("Carrier");
        fake.host().owners = vec![10_001, 10_002, -1, 10_003];
        for uid in [10_001, 10_002, 10_003] {
            fake.owner_send(uid, 1);
        }
        let mut monitor = monitor_with_skips(&fake, 0);
        let start = Instant::now();

        let snapshot = monitor.sample_at(0, start);
        assert!(!snapshot.has_owners());
        assert_eq!(fake.reads_of(10_003), 0);

        fake.send(200);
        fake.owner_send(10_001, 200);
        let snapshot = monitor.sample_at(1, start + SECOND);

        let usage = match snapshot.owner(Uid(10_001)) {
            Some(UsageRecord::Radio(usage)) => usage.clone(),
            other => panic!("expected owner record, got {:?}", other),
        };
        assert_eq!(usage.tx_bytes, 200);
        assert_eq!(usage.power_state, Fach);
        assert_eq!(usage.provider.as_deref(), Some("Carrier"));
        assert!(snapshot.owner(Uid(10_002)).is_none());
        assert_eq!(fake.reads_of(10_003), 0);
    }

    #[test]
    fn test_active_owner_never_skipped() {
        let fake = Fake::connected_umts("Carrier");
        fake.host().owners = vec![10_001];
        fake.owner_send(10_001, 1);
        let mut monitor = monitor_with_skips(&fake, 1);
        let start = Instant::now();

        // Baseline, then one skip while idle, then a forced read.
        monitor.sample_at(0, start);
        monitor.sample_at(1, start + SECOND);
        assert_eq!(fake.reads_of(10_001), 1);

        fake.owner_send(10_001, 50);
        monitor.sample_at(2, start + SECOND * 2);
        assert_eq!(fake.reads_of(10_001), 2);

        // Silent but still in FACH: read every iteration.
        for i in 3..=5u32 {
            let snapshot = monitor.sample_at(i as u64, start + SECOND * i);
            assert!(snapshot.owner(Uid(10_001)).is_some());
        }
        assert_eq!(fake.reads_of(10_001), 5);
    }

    #[test]
    fn test_stale_idle_owner_skipped_then_reread() {
        let fake = Fake::connected_umts("Carrier");
        fake.host().owners = vec![10_001];
        fake.owner_send(10_001, 1);
        let mut monitor = monitor_with_skips(&fake, 2);
        let start = Instant::now();

        // Baseline read; the owner is idle with no inactive time.
        monitor.sample_at(0, start);
        assert_eq!(fake.reads_of(10_001), 1);

        monitor.sample_at(1, start + SECOND);
        monitor.sample_at(2, start + SECOND * 2);
        assert_eq!(fake.reads_of(10_001), 1);

        // Third consecutive skip is not allowed.
        fake.owner_send(10_001, 80);
        let snapshot = monitor.sample_at(3, start + SECOND * 3);
        assert_eq!(fake.reads_of(10_001), 2);
        assert!(snapshot.owner(Uid(10_001)).is_some());
    }

    #[test]
    fn test_owner_read_failure_is_not_fatal() {
        let fake = Fake::connected_umts("Carrier");
        fake.host().owners = vec![10_001, 10_002];
        fake.owner_send(10_002, 1);
        let mut monitor = monitor_with_skips(&fake, 0);
        let start = Instant::now();

        monitor.sample_at(0, start);
        fake.send(10);
        fake.owner_send(10_002, 10);
        let snapshot = monitor.sample_at(1, start + SECOND);

        assert!(snapshot.owner(Uid(10_001)).is_none());
        assert!(snapshot.owner(Uid(10_002)).is_some());
    }

    #[test]
    fn test_missing_interface_counters_yield_zero_record() {
        let fake = Fake::connected_umts("Carrier");
        fake.host().interface = None;
        let mut monitor = monitor(&fake);

        let snapshot = monitor.sample_iteration(0).unwrap();
        assert_eq!(snapshot.system, UsageRecord::zero(Subsystem::Radio));
    }
}
