use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Subsystem, Uid, UsageRecord};
use crate::version::REPORT_VERSION;

/// What one monitor measured during one polling round.
///
/// Holds exactly one device-wide record and at most one record per owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSnapshot {
    pub subsystem: Subsystem,
    pub iteration: u64,
    pub system: UsageRecord,
    #[serde(default)]
    pub owners: BTreeMap<Uid, UsageRecord>,
}

impl IterationSnapshot {
    pub fn new(iteration: u64, system: UsageRecord) -> Self {
        Self {
            subsystem: system.subsystem(),
            iteration,
            system,
            owners: BTreeMap::new(),
        }
    }

    /// A snapshot carrying only the zero record for `subsystem`.
    pub fn zero(subsystem: Subsystem, iteration: u64) -> Self {
        Self::new(iteration, UsageRecord::zero(subsystem))
    }

    /// Records `usage` for `uid`, replacing any earlier record for that owner.
    pub fn set_owner_usage(&mut self, uid: Uid, usage: UsageRecord) {
        debug_assert_eq!(usage.subsystem(), self.subsystem);
        self.owners.insert(uid, usage);
    }

    pub fn owner(&self, uid: Uid) -> Option<&UsageRecord> {
        self.owners.get(&uid)
    }

    pub fn has_owners(&self) -> bool {
        !self.owners.is_empty()
    }
}

/// A snapshot together with the watts assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSnapshot {
    pub snapshot: IterationSnapshot,
    pub system_watts: f64,
    #[serde(default)]
    pub owner_watts: BTreeMap<Uid, f64>,
    /// Set when the monitor failed and a zero snapshot was substituted.
    #[serde(default)]
    pub degraded: bool,
}

/// Everything estimated during one iteration, indexed by subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedReport {
    pub version: u32,
    pub iteration: u64,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time spent sampling and scoring.
    pub elapsed_ms: u64,
    pub subsystems: BTreeMap<Subsystem, ScoredSnapshot>,
}

impl MergedReport {
    pub fn new(iteration: u64) -> Self {
        Self {
            version: REPORT_VERSION,
            iteration,
            timestamp: Utc::now(),
            elapsed_ms: 0,
            subsystems: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, scored: ScoredSnapshot) {
        self.subsystems.insert(scored.snapshot.subsystem, scored);
    }

    pub fn subsystem(&self, subsystem: Subsystem) -> Option<&ScoredSnapshot> {
        self.subsystems.get(&subsystem)
    }

    /// One device-wide record per subsystem that reported.
    pub fn system_record_count(&self) -> usize {
        self.subsystems.len()
    }

    pub fn system_watts(&self, subsystem: Subsystem) -> f64 {
        self.subsystem(subsystem)
            .map(|s| s.system_watts)
            .unwrap_or(0.0)
    }

    pub fn total_watts(&self) -> f64 {
        self.subsystems.values().map(|s| s.system_watts).sum()
    }

    /// Attributed watts per owner, summed over subsystems.
    pub fn owner_totals(&self) -> BTreeMap<Uid, f64> {
        let mut totals: BTreeMap<Uid, f64> = BTreeMap::new();
        for scored in self.subsystems.values() {
            for (uid, watts) in &scored.owner_watts {
                *totals.entry(*uid).or_default() += watts;
            }
        }
        totals
    }

    /// Owners with the highest attributed power, largest first.
    pub fn top_owners(&self, limit: usize) -> Vec<(Uid, f64)> {
        let mut owners: Vec<(Uid, f64)> = self.owner_totals().into_iter().collect();
        owners.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        owners.truncate(limit);
        owners
    }

    pub fn degraded_subsystems(&self) -> Vec<Subsystem> {
        self.subsystems
            .iter()
            .filter(|(_, s)| s.degraded)
            .map(|(kind, _)| *kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioUsage, CpuUsage};

    fn scored(snapshot: IterationSnapshot, system_watts: f64, owners: &[(i32, f64)]) -> ScoredSnapshot {
        ScoredSnapshot {
            snapshot,
            system_watts,
            owner_watts: owners.iter().map(|(u, w)| (Uid(*u), *w)).collect(),
            degraded: false,
        }
    }

    #[test]
    fn test_owner_record_replaced_not_duplicated() {
        let mut snapshot = IterationSnapshot::zero(Subsystem::Audio, 3);
        snapshot.set_owner_usage(Uid(10_001), UsageRecord::Audio(AudioUsage { playing: false }));
        snapshot.set_owner_usage(Uid(10_001), UsageRecord::Audio(AudioUsage { playing: true }));

        assert_eq!(snapshot.owners.len(), 1);
        assert_eq!(
            snapshot.owner(Uid(10_001)),
            Some(&UsageRecord::Audio(AudioUsage { playing: true }))
        );
    }

    #[test]
    fn test_owner_totals_and_top() {
        let mut report = MergedReport::new(1);
        report.insert(scored(
            IterationSnapshot::new(1, UsageRecord::Cpu(CpuUsage::default())),
            1.5,
            &[(10_001, 0.5), (10_002, 0.2)],
        ));
        report.insert(scored(
            IterationSnapshot::zero(Subsystem::Audio, 1),
            0.3,
            &[(10_002, 0.4)],
        ));

        assert_eq!(report.system_record_count(), 2);
        assert!((report.total_watts() - 1.8).abs() < 1e-9);

        let top = report.top_owners(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, Uid(10_002));
        assert!((top[0].1 - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_missing_subsystem_has_zero_watts() {
        let report = MergedReport::new(0);
        assert_eq!(report.system_watts(Subsystem::Gps), 0.0);
        assert!(report.degraded_subsystems().is_empty());
    }
}
