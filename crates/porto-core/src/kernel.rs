//! Kernel feature probe.
//!
//! Runs once at daemon start and feeds the `supported` flag of every
//! property handler. Probes are plain file existence checks against the
//! cgroup tree and procfs.

use std::path::Path;

/// Kernel features the property schema depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelFeatures {
    /// Ambient capabilities (Linux 4.3+).
    pub ambient_caps: bool,
    /// Memory controller supports guarantees (`memory.low`).
    pub memory_guarantee: bool,
    /// Memory controller supports an anonymous memory limit.
    pub anon_limit: bool,
    /// Memory controller supports a dirty page limit.
    pub dirty_limit: bool,
    /// Memory controller supports filesystem io limits.
    pub io_limit: bool,
    /// Memory controller supports recharge-on-pgfault.
    pub recharge_on_pgfault: bool,
    /// Blkio controller supports weights.
    pub blkio_weight: bool,
    /// Blkio controller has the throttler.
    pub blkio_throttler: bool,
    /// Hugetlb controller is mounted.
    pub hugetlb: bool,
    /// Pids controller is mounted.
    pub pids: bool,
    /// Memory statistics report `total_max_rss`.
    pub total_max_rss: bool,
    /// Cpu controller supports SMART scheduling.
    pub cpu_smart: bool,
}

impl KernelFeatures {
    /// Everything supported; the usual fixture for tests.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            ambient_caps: true,
            memory_guarantee: true,
            anon_limit: true,
            dirty_limit: true,
            io_limit: true,
            recharge_on_pgfault: true,
            blkio_weight: true,
            blkio_throttler: true,
            hugetlb: true,
            pids: true,
            total_max_rss: true,
            cpu_smart: true,
        }
    }

    /// Interrogate the running kernel.
    #[must_use]
    pub fn probe() -> Self {
        let cg = Path::new("/sys/fs/cgroup");
        let memory = cg.join("memory");
        let features = Self {
            ambient_caps: std::fs::read_to_string("/proc/self/status")
                .map(|s| s.contains("CapAmb:"))
                .unwrap_or(false),
            memory_guarantee: memory.join("memory.low").exists()
                || memory.join("memory.guarantee").exists(),
            anon_limit: memory.join("memory.anon.limit").exists(),
            dirty_limit: memory.join("memory.dirty_limit_in_bytes").exists(),
            io_limit: memory.join("memory.fs_bps_limit").exists(),
            recharge_on_pgfault: memory.join("memory.recharge_on_pgfault").exists(),
            blkio_weight: cg.join("blkio/blkio.weight").exists(),
            blkio_throttler: cg.join("blkio/blkio.throttle.read_bps_device").exists(),
            hugetlb: cg.join("hugetlb").exists(),
            pids: cg.join("pids").exists(),
            total_max_rss: std::fs::read_to_string(memory.join("memory.stat"))
                .map(|s| s.contains("total_max_rss"))
                .unwrap_or(false),
            cpu_smart: cg.join("cpu/cpu.smart").exists(),
        };
        tracing::debug!(?features, "kernel feature probe");
        features
    }
}
