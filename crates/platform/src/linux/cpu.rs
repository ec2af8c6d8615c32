use std::fs;
use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result};

use super::{read_trimmed, read_u64};
use crate::sources::CpuCounters;
use crate::types::{CpuTimes, ProcessTimes};

const PROC_PATH: &str = "/proc";
const CPUFREQ_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq";

pub struct LinuxCpu {
    proc_root: PathBuf,
    cpufreq_path: PathBuf,
}

impl LinuxCpu {
    pub fn new() -> Self {
        Self::with_roots(PROC_PATH, CPUFREQ_PATH)
    }

    pub fn with_roots(proc_root: impl Into<PathBuf>, cpufreq_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            cpufreq_path: cpufreq_path.into(),
        }
    }

    fn read_process(&self, pid: u32) -> Option<ProcessTimes> {
        let dir = self.proc_root.join(pid.to_string());
        let stat = fs::read_to_string(dir.join("stat")).ok()?;
        let (user, system) = parse_process_stat(&stat)?;
        let status = fs::read_to_string(dir.join("status")).ok()?;
        let uid = parse_status_uid(&status)?;

        Some(ProcessTimes {
            pid,
            uid,
            user,
            system,
        })
    }
}

impl Default for LinuxCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuCounters for LinuxCpu {
    fn system_times(&self) -> Result<CpuTimes> {
        let content = read_trimmed(&self.proc_root.join("stat"))?;
        parse_system_stat(&content).ok_or_else(|| eyre!("no aggregate cpu line in /proc/stat"))
    }

    fn frequency_mhz(&self) -> Result<f64> {
        let khz = read_u64(&self.cpufreq_path)?;
        Ok(khz as f64 / 1000.0)
    }

    fn process_times(&mut self) -> Result<Vec<ProcessTimes>> {
        let mut times = Vec::new();

        for entry in fs::read_dir(&self.proc_root)?.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            // Processes may exit between listing and reading.
            if let Some(process) = self.read_process(pid) {
                times.push(process);
            }
        }

        Ok(times)
    }
}

/// Parses the aggregate `cpu` line: user+nice count as user time,
/// system+irq+softirq as system time.
fn parse_system_stat(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse().ok())
        .collect::<Option<Vec<_>>>()?;

    if fields.len() < 7 {
        return None;
    }

    let user = fields[0] + fields[1];
    let system = fields[2] + fields[5] + fields[6];
    let total = user + system + fields[3] + fields[4];

    Some(CpuTimes {
        user,
        system,
        total,
    })
}

/// Extracts utime and stime from `/proc/<pid>/stat`.
fn parse_process_stat(content: &str) -> Option<(u64, u64)> {
    // The command name may contain spaces; fields resume after the last ')'.
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();

    // utime and stime are fields 14 and 15; `rest` starts at field 3.
    let user = fields.get(11)?.parse().ok()?;
    let system = fields.get(12)?.parse().ok()?;
    Some((user, system))
}

fn parse_status_uid(content: &str) -> Option<i32> {
    content
        .lines()
        .find(|l| l.starts_with("Uid:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_STAT: &str = "cpu  100 20 50 1000 30 5 5 0 0 0\ncpu0 50 10 25 500 15 2 3 0 0 0\nintr 1234\n";

    #[test]
    fn test_parse_system_stat() {
        let times = parse_system_stat(PROC_STAT).unwrap();
        assert_eq!(times.user, 120);
        assert_eq!(times.system, 60);
        assert_eq!(times.total, 120 + 60 + 1000 + 30);
    }

    #[test]
    fn test_parse_process_stat_with_spaces() {
        let stat = "4242 (Web Content) S 1 4242 4242 0 -1 4194560 1000 0 0 0 77 33 0 0 20 0 12 0";
        assert_eq!(parse_process_stat(stat), Some((77, 33)));
    }

    #[test]
    fn test_parse_status_uid() {
        let status = "Name:\tcom.example\nState:\tS (sleeping)\nUid:\t10054\t10054\t10054\t10054\n";
        assert_eq!(parse_status_uid(status), Some(10_054));
        assert_eq!(parse_status_uid("Name:\tx\n"), None);
    }

    #[test]
    fn test_process_times_from_tree() {
        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path().join("321");
        fs::create_dir_all(&proc_dir).unwrap();
        fs::write(
            proc_dir.join("stat"),
            "321 (app) R 1 321 321 0 -1 0 0 0 0 0 40 10 0 0 20 0 1 0",
        )
        .unwrap();
        fs::write(proc_dir.join("status"), "Name:\tapp\nUid:\t10077\t10077\t10077\t10077\n")
            .unwrap();
        fs::create_dir_all(dir.path().join("self-not-a-pid")).unwrap();
        fs::write(dir.path().join("stat"), PROC_STAT).unwrap();
        fs::write(dir.path().join("freq"), "1512000\n").unwrap();

        let mut cpu = LinuxCpu::with_roots(dir.path(), dir.path().join("freq"));
        let times = cpu.process_times().unwrap();

        assert_eq!(
            times,
            vec![ProcessTimes {
                pid: 321,
                uid: 10_077,
                user: 40,
                system: 10,
            }]
        );
        assert_eq!(cpu.frequency_mhz().unwrap(), 1512.0);
        assert_eq!(cpu.system_times().unwrap().user, 120);
    }
}
