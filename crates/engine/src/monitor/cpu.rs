use std::collections::BTreeMap;

use drainwatch_platform::{CpuCounters, CpuTimes, ProcessTimes};
use drainwatch_protocol::{CpuUsage, IterationSnapshot, Subsystem, Uid, UsageRecord};
use tracing::warn;

use super::Monitor;
use crate::error::MonitorError;

#[derive(Debug, Clone, Copy)]
struct ProcessTicks {
    uid: i32,
    user: u64,
    system: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct OwnerTicks {
    user: u64,
    system: u64,
}

pub struct CpuMonitor {
    counters: Box<dyn CpuCounters>,
    last_times: Option<CpuTimes>,
    last_processes: BTreeMap<u32, ProcessTicks>,
}

impl CpuMonitor {
    pub fn new(counters: Box<dyn CpuCounters>) -> Self {
        Self {
            counters,
            last_times: None,
            last_processes: BTreeMap::new(),
        }
    }

    /// Per-owner tick deltas since the previous sample. Processes seen for
    /// the first time only set their baseline; exited ones are dropped.
    fn owner_ticks(&mut self, processes: Vec<ProcessTimes>) -> BTreeMap<Uid, OwnerTicks> {
        let mut owners: BTreeMap<Uid, OwnerTicks> = BTreeMap::new();
        let mut current = BTreeMap::new();

        for process in processes {
            let ticks = ProcessTicks {
                uid: process.uid,
                user: process.user,
                system: process.system,
            };

            if let Some(previous) = self.last_processes.get(&process.pid) {
                // A reused pid under another owner starts over.
                if previous.uid == ticks.uid {
                    let entry = owners.entry(Uid(ticks.uid)).or_default();
                    entry.user += ticks.user.saturating_sub(previous.user);
                    entry.system += ticks.system.saturating_sub(previous.system);
                }
            }

            current.insert(process.pid, ticks);
        }

        self.last_processes = current;
        owners
    }
}

fn percent(ticks: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * ticks as f64 / total as f64
    }
}

impl Monitor for CpuMonitor {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Cpu
    }

    fn sample_iteration(&mut self, iteration: u64) -> Result<IterationSnapshot, MonitorError> {
        let times = match self.counters.system_times() {
            Ok(times) => times,
            Err(e) => {
                warn!(error = %e, "Failed to read CPU times");
                return Ok(IterationSnapshot::zero(Subsystem::Cpu, iteration));
            }
        };

        let frequency_mhz = match self.counters.frequency_mhz() {
            Ok(freq) => freq,
            Err(e) => {
                warn!(error = %e, "Failed to read CPU frequency");
                0.0
            }
        };

        let processes = match self.counters.process_times() {
            Ok(processes) => Some(processes),
            Err(e) => {
                warn!(error = %e, "Failed to read process CPU times");
                None
            }
        };

        let Some(last) = self.last_times.replace(times) else {
            if let Some(processes) = processes {
                self.owner_ticks(processes);
            }
            return Ok(IterationSnapshot::zero(Subsystem::Cpu, iteration));
        };

        let total = times.total.saturating_sub(last.total);
        let user = times.user.saturating_sub(last.user);
        let system = times.system.saturating_sub(last.system);

        let mut snapshot = IterationSnapshot::new(
            iteration,
            UsageRecord::Cpu(CpuUsage {
                frequency_mhz,
                user_percent: percent(user, total),
                sys_percent: percent(system, total),
            }),
        );

        if let Some(processes) = processes {
            for (uid, ticks) in self.owner_ticks(processes) {
                if ticks.user + ticks.system == 0 || uid.is_sentinel() {
                    continue;
                }
                snapshot.set_owner_usage(
                    uid,
                    UsageRecord::Cpu(CpuUsage {
                        frequency_mhz,
                        user_percent: percent(ticks.user, total),
                        sys_percent: percent(ticks.system, total),
                    }),
                );
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::{eyre, Result};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Scripted {
        times: Option<CpuTimes>,
        processes: Vec<ProcessTimes>,
    }

    #[derive(Clone, Default)]
    struct FakeCpu(Arc<Mutex<Scripted>>);

    impl FakeCpu {
        fn set(&self, user: u64, system: u64, total: u64, processes: Vec<ProcessTimes>) {
            let mut scripted = self.0.lock().unwrap();
            scripted.times = Some(CpuTimes {
                user,
                system,
                total,
            });
            scripted.processes = processes;
        }
    }

    impl CpuCounters for FakeCpu {
        fn system_times(&self) -> Result<CpuTimes> {
            self.0
                .lock()
                .unwrap()
                .times
                .ok_or_else(|| eyre!("/proc/stat unreadable"))
        }

        fn frequency_mhz(&self) -> Result<f64> {
            Ok(528.0)
        }

        fn process_times(&mut self) -> Result<Vec<ProcessTimes>> {
            Ok(self.0.lock().unwrap().processes.clone())
        }
    }

    fn process(pid: u32, uid: i32, user: u64, system: u64) -> ProcessTimes {
        ProcessTimes {
            pid,
            uid,
            user,
            system,
        }
    }

    fn cpu(record: &UsageRecord) -> &CpuUsage {
        match record {
            UsageRecord::Cpu(usage) => usage,
            other => panic!("expected cpu record, got {:?}", other),
        }
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let fake = FakeCpu::default();
        fake.set(100, 50, 1_000, vec![process(10, 10_001, 40, 10)]);
        let mut monitor = CpuMonitor::new(Box::new(fake));

        let snapshot = monitor.sample_iteration(0).unwrap();
        assert_eq!(snapshot.system, UsageRecord::zero(Subsystem::Cpu));
        assert!(!snapshot.has_owners());
    }

    #[test]
    fn test_percentages_from_deltas() {
        let fake = FakeCpu::default();
        fake.set(100, 50, 1_000, vec![process(10, 10_001, 40, 10)]);
        let mut monitor = CpuMonitor::new(Box::new(fake.clone()));
        monitor.sample_iteration(0).unwrap();

        fake.set(
            130,
            60,
            1_100,
            vec![process(10, 10_001, 60, 15), process(11, 10_002, 5, 0)],
        );
        let snapshot = monitor.sample_iteration(1).unwrap();

        let system = cpu(&snapshot.system);
        assert_eq!(system.frequency_mhz, 528.0);
        assert!((system.user_percent - 30.0).abs() < 1e-9);
        assert!((system.sys_percent - 10.0).abs() < 1e-9);

        let owner = cpu(snapshot.owner(Uid(10_001)).unwrap());
        assert!((owner.user_percent - 20.0).abs() < 1e-9);
        assert!((owner.sys_percent - 5.0).abs() < 1e-9);

        // New processes only set a baseline.
        assert!(snapshot.owner(Uid(10_002)).is_none());
    }

    #[test]
    fn test_exited_processes_pruned() {
        let fake = FakeCpu::default();
        fake.set(0, 0, 100, vec![process(10, 10_001, 1, 1)]);
        let mut monitor = CpuMonitor::new(Box::new(fake.clone()));
        monitor.sample_iteration(0).unwrap();

        fake.set(10, 0, 200, vec![]);
        monitor.sample_iteration(1).unwrap();
        assert!(monitor.last_processes.is_empty());

        // The pid comes back under another owner: baseline again.
        fake.set(20, 0, 300, vec![process(10, 10_009, 50, 0)]);
        let snapshot = monitor.sample_iteration(2).unwrap();
        assert!(!snapshot.has_owners());
    }

    #[test]
    fn test_unreadable_stat_yields_zero_record() {
        let fake = FakeCpu::default();
        let mut monitor = CpuMonitor::new(Box::new(fake));

        let snapshot = monitor.sample_iteration(3).unwrap();
        assert_eq!(snapshot.iteration, 3);
        assert_eq!(snapshot.system, UsageRecord::zero(Subsystem::Cpu));
    }
}
