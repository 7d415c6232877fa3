//! Daemon counters surfaced through the `porto_stat` property.

use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate daemon counters. All fields are lock-free; the engine bumps
/// them as requests flow through.
#[derive(Debug, Default)]
pub struct DaemonStats {
    /// Containers created since daemon start.
    pub created: AtomicU64,
    /// Containers started since daemon start.
    pub started: AtomicU64,
    /// Tasks spawned, respawns included.
    pub spawned: AtomicU64,
    /// Requests that returned an error.
    pub errors: AtomicU64,
    /// Warnings logged.
    pub warnings: AtomicU64,
    /// Containers whose restore failed.
    pub restore_failed: AtomicU64,
    /// Dead containers removed by aging.
    pub remove_dead: AtomicU64,
}

impl DaemonStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a counter.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter.
    #[must_use]
    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_and_read() {
        let stats = DaemonStats::new();
        DaemonStats::bump(&stats.errors);
        DaemonStats::bump(&stats.errors);
        assert_eq!(DaemonStats::read(&stats.errors), 2);
        assert_eq!(DaemonStats::read(&stats.created), 0);
    }
}
