//! System facts and the engine clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Host facts sampled once at daemon start.
#[derive(Debug, Clone, Copy)]
pub struct SystemInfo {
    /// Total system memory in bytes.
    pub total_memory: u64,
    /// Number of online cpu cores.
    pub num_cores: usize,
}

impl SystemInfo {
    /// Build from explicit values.
    #[must_use]
    pub const fn new(total_memory: u64, num_cores: usize) -> Self {
        Self {
            total_memory,
            num_cores,
        }
    }

    /// Sample the running host.
    #[must_use]
    pub fn detect() -> Self {
        let total_memory = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|text| {
                text.lines().find_map(|line| {
                    let rest = line.strip_prefix("MemTotal:")?;
                    let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
                    Some(kb * 1024)
                })
            })
            .unwrap_or(0);
        let num_cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            total_memory,
            num_cores,
        }
    }
}

/// Monotonic time source for lifecycle timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds on the monotonic clock.
    fn now_ms(&self) -> u64;

    /// Seconds the host has been up.
    fn uptime_secs(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn uptime_secs(&self) -> u64 {
        (**self).uptime_secs()
    }
}

/// Clock backed by the host monotonic clock and `/proc/uptime`.
#[derive(Debug)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    /// Create a clock anchored at daemon start.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn uptime_secs(&self) -> u64 {
        std::fs::read_to_string("/proc/uptime")
            .ok()
            .and_then(|text| {
                let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
                Some(secs as u64)
            })
            .unwrap_or(0)
    }
}

/// Hand-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
    uptime: AtomicU64,
}

impl ManualClock {
    /// Create at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the monotonic clock.
    pub fn advance_ms(&self, delta: u64) {
        self.now_ms.fetch_add(delta, Ordering::Relaxed);
    }

    /// Set the reported host uptime.
    pub fn set_uptime_secs(&self, secs: u64) {
        self.uptime.store(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }

    fn uptime_secs(&self) -> u64 {
        self.uptime.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance_ms(1500);
        assert_eq!(clock.now_ms(), 1500);
        clock.set_uptime_secs(33);
        assert_eq!(clock.uptime_secs(), 33);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
