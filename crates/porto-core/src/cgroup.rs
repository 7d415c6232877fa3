//! Cgroup controllers and the statistics backend.
//!
//! The engine only records which controllers a container needs and asks a
//! backend for live numbers; all cgroup filesystem I/O lives behind the
//! [`CgroupBackend`] trait.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::codec::{self, FlagName};
use crate::error::{Error, Result};

bitflags! {
    /// Cgroup controllers a container may be attached to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Controllers: u32 {
        const MEMORY = 1 << 0;
        const CPU = 1 << 1;
        const CPUACCT = 1 << 2;
        const CPUSET = 1 << 3;
        const BLKIO = 1 << 4;
        const DEVICES = 1 << 5;
        const FREEZER = 1 << 6;
        const HUGETLB = 1 << 7;
        const PIDS = 1 << 8;
        const NET_CLS = 1 << 9;
    }
}

/// Controller name table, in the order names are listed to clients.
pub const CONTROLLER_NAMES: &[FlagName] = &[
    FlagName { bits: Controllers::MEMORY.bits() as u64, name: "memory" },
    FlagName { bits: Controllers::CPU.bits() as u64, name: "cpu" },
    FlagName { bits: Controllers::CPUACCT.bits() as u64, name: "cpuacct" },
    FlagName { bits: Controllers::CPUSET.bits() as u64, name: "cpuset" },
    FlagName { bits: Controllers::BLKIO.bits() as u64, name: "blkio" },
    FlagName { bits: Controllers::DEVICES.bits() as u64, name: "devices" },
    FlagName { bits: Controllers::FREEZER.bits() as u64, name: "freezer" },
    FlagName { bits: Controllers::HUGETLB.bits() as u64, name: "hugetlb" },
    FlagName { bits: Controllers::PIDS.bits() as u64, name: "pids" },
    FlagName { bits: Controllers::NET_CLS.bits() as u64, name: "net_cls" },
];

impl Controllers {
    /// Controllers every container is attached to from creation.
    #[must_use]
    pub const fn base() -> Self {
        Self::MEMORY
            .union(Self::CPU)
            .union(Self::CPUACCT)
            .union(Self::FREEZER)
            .union(Self::DEVICES)
    }

    /// Parse a `;`-separated controller list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown controller names.
    pub fn parse(s: &str) -> Result<Self> {
        let bits = codec::parse_flags(s, CONTROLLER_NAMES)?;
        #[allow(clippy::cast_possible_truncation)]
        let bits = bits as u32;
        Ok(Self::from_bits_retain(bits))
    }

    /// Format as a `;`-separated controller list.
    #[must_use]
    pub fn format(self) -> String {
        codec::format_flags(u64::from(self.bits()), CONTROLLER_NAMES)
    }

    /// Name of a single controller bit.
    #[must_use]
    pub fn name(self) -> &'static str {
        CONTROLLER_NAMES
            .iter()
            .find(|f| f.bits == u64::from(self.bits()))
            .map_or("?", |f| f.name)
    }
}

/// Direction of an io statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    /// Bytes or operations read.
    Read,
    /// Bytes or operations written.
    Write,
    /// Reads plus writes.
    Both,
}

/// Live cgroup numbers for a container, keyed by the container name.
///
/// Implementations read the cgroup filesystem; the engine never does.
/// Methods may fail with [`Error::Unknown`] and the engine surfaces the
/// failure without retry.
pub trait CgroupBackend: Send + Sync {
    /// Memory usage in bytes.
    fn memory_usage(&self, name: &str) -> Result<u64>;

    /// Anonymous memory usage in bytes.
    fn anon_usage(&self, name: &str) -> Result<u64>;

    /// Hugetlb usage in bytes.
    fn huge_usage(&self, name: &str) -> Result<u64>;

    /// Memory controller statistics map.
    fn memory_stats(&self, name: &str) -> Result<BTreeMap<String, u64>>;

    /// Consumed cpu time in nanoseconds.
    fn cpu_usage(&self, name: &str) -> Result<u64>;

    /// Consumed system cpu time in nanoseconds.
    fn cpu_system(&self, name: &str) -> Result<u64>;

    /// Io bytes or operations per disk, with the `fs` pseudo-disk for the
    /// filesystem-level counters the memory controller keeps.
    fn io_stat(&self, name: &str, dir: IoDirection, ops: bool) -> Result<BTreeMap<String, u64>>;

    /// Disk name for a block device path.
    fn disk_name(&self, path: &str) -> Result<String>;

    /// Canonical disk key for a path or name used in io limit maps.
    fn resolve_disk(&self, key: &str) -> Result<String>;

    /// Number of tasks (processes, or threads when `threads` is set).
    fn task_count(&self, name: &str, threads: bool) -> Result<u64>;

    /// Filesystem path of the container's cgroup in a controller.
    fn cgroup_path(&self, ctrl: Controllers, name: &str) -> String {
        format!("/sys/fs/cgroup/{}/porto/{}", ctrl.name(), name.trim_start_matches('/'))
    }
}

/// Backend used when no cgroup tree is available; every statistic fails.
#[derive(Debug, Default)]
pub struct NoCgroups;

impl NoCgroups {
    fn unavailable() -> Error {
        Error::Unknown("cgroup backend not available".to_string())
    }
}

impl CgroupBackend for NoCgroups {
    fn memory_usage(&self, _name: &str) -> Result<u64> {
        Err(Self::unavailable())
    }

    fn anon_usage(&self, _name: &str) -> Result<u64> {
        Err(Self::unavailable())
    }

    fn huge_usage(&self, _name: &str) -> Result<u64> {
        Err(Self::unavailable())
    }

    fn memory_stats(&self, _name: &str) -> Result<BTreeMap<String, u64>> {
        Err(Self::unavailable())
    }

    fn cpu_usage(&self, _name: &str) -> Result<u64> {
        Err(Self::unavailable())
    }

    fn cpu_system(&self, _name: &str) -> Result<u64> {
        Err(Self::unavailable())
    }

    fn io_stat(&self, _name: &str, _dir: IoDirection, _ops: bool) -> Result<BTreeMap<String, u64>> {
        Err(Self::unavailable())
    }

    fn disk_name(&self, path: &str) -> Result<String> {
        Err(Error::InvalidValue(format!("unknown disk: {path}")))
    }

    fn resolve_disk(&self, key: &str) -> Result<String> {
        Err(Error::InvalidValue(format!("unknown disk: {key}")))
    }

    fn task_count(&self, _name: &str, _threads: bool) -> Result<u64> {
        Err(Self::unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let ctrls = Controllers::parse("memory;cpu;pids").unwrap();
        assert_eq!(
            ctrls,
            Controllers::MEMORY | Controllers::CPU | Controllers::PIDS
        );
        assert_eq!(ctrls.format(), "memory;cpu;pids");
        assert!(Controllers::parse("memory;bogus").is_err());
    }

    #[test]
    fn test_base_controllers() {
        let base = Controllers::base();
        assert!(base.contains(Controllers::MEMORY));
        assert!(base.contains(Controllers::FREEZER));
        assert!(!base.contains(Controllers::PIDS));
    }

    #[test]
    fn test_single_name() {
        assert_eq!(Controllers::NET_CLS.name(), "net_cls");
        assert_eq!(Controllers::HUGETLB.name(), "hugetlb");
    }

    #[test]
    fn test_default_cgroup_path() {
        let backend = NoCgroups;
        assert_eq!(
            backend.cgroup_path(Controllers::MEMORY, "a/b"),
            "/sys/fs/cgroup/memory/porto/a/b"
        );
    }
}
