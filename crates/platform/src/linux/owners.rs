use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use color_eyre::eyre::Result;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::sources::OwnerSource;

const UID_STAT_PATH: &str = "/proc/uid_stat";

/// Lists owners from Android's `/proc/uid_stat`, falling back to the owners
/// of running processes on kernels without it.
pub struct LinuxOwners {
    uid_stat_root: PathBuf,
    system: System,
}

impl LinuxOwners {
    pub fn new() -> Self {
        Self::with_root(UID_STAT_PATH)
    }

    pub fn with_root(uid_stat_root: impl Into<PathBuf>) -> Self {
        Self {
            uid_stat_root: uid_stat_root.into(),
            system: System::new(),
        }
    }

    fn owners_from_uid_stat(&self) -> Result<Vec<i32>> {
        let uids = fs::read_dir(&self.uid_stat_root)?
            .flatten()
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse::<u32>().ok()));
        Ok(signed_owners(uids))
    }

    fn owners_from_processes(&mut self) -> Vec<i32> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_user(UpdateKind::OnlyIfNotSet),
        );

        signed_owners(
            self.system
                .processes()
                .values()
                .filter_map(|p| p.user_id())
                .map(|uid| **uid),
        )
    }
}

/// Sorted, deduplicated owners. UIDs that don't fit an `i32` are dropped so
/// they can never wrap into the negative end-of-list marker.
fn signed_owners(uids: impl IntoIterator<Item = u32>) -> Vec<i32> {
    let owners: BTreeSet<i32> = uids
        .into_iter()
        .filter_map(|uid| i32::try_from(uid).ok())
        .collect();
    owners.into_iter().collect()
}

impl Default for LinuxOwners {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnerSource for LinuxOwners {
    fn list_active_owners(&mut self) -> Result<Vec<i32>> {
        if self.uid_stat_root.is_dir() {
            return self.owners_from_uid_stat();
        }
        Ok(self.owners_from_processes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owners_from_uid_stat_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for uid in ["10054", "0", "1000", "not-an-owner"] {
            fs::create_dir_all(dir.path().join(uid)).unwrap();
        }

        let mut owners = LinuxOwners::with_root(dir.path());
        assert_eq!(owners.list_active_owners().unwrap(), vec![0, 1000, 10_054]);
    }

    #[test]
    fn test_large_uids_never_become_negative() {
        // 4294967294 is the overflow uid on many kernels.
        let owners = signed_owners([1000, 4_294_967_294, 0, 2_147_483_648, 1000]);
        assert_eq!(owners, vec![0, 1000]);
        assert!(owners.iter().all(|uid| *uid >= 0));
    }

    #[test]
    fn test_uid_stat_skips_out_of_range_names() {
        let dir = tempfile::tempdir().unwrap();
        for uid in ["10054", "-1", "4294967294", "1000"] {
            fs::create_dir_all(dir.path().join(uid)).unwrap();
        }

        let mut owners = LinuxOwners::with_root(dir.path());
        assert_eq!(owners.list_active_owners().unwrap(), vec![1000, 10_054]);
    }

    #[test]
    fn test_falls_back_to_processes() {
        let dir = tempfile::tempdir().unwrap();
        let mut owners = LinuxOwners::with_root(dir.path().join("missing"));

        // The test process itself is always running.
        let listed = owners.list_active_owners().unwrap();
        assert!(!listed.is_empty());
        assert!(listed.iter().all(|uid| *uid >= 0));
    }
}
