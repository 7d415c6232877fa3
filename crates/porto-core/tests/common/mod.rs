//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use porto_core::cgroup::{CgroupBackend, IoDirection};
use porto_core::config::Config;
use porto_core::cred::{Client, Cred, StaticUsers};
use porto_core::engine::{Engine, EngineBuilder, TaskPids};
use porto_core::error::{Error, Result};
use porto_core::kernel::KernelFeatures;
use porto_core::net::{NetBackend, NetDevice, NetStatKind};
use porto_core::sysinfo::{ManualClock, SystemInfo};

/// Cgroup backend with canned numbers.
#[derive(Debug, Default, Clone)]
pub struct FakeCgroups {
    pub memory: u64,
    pub anon: u64,
    pub huge: u64,
    pub mem_stats: BTreeMap<String, u64>,
    pub cpu: u64,
    pub cpu_sys: u64,
    pub io: BTreeMap<String, u64>,
    pub procs: u64,
    pub threads: u64,
    pub disks: Vec<String>,
}

impl CgroupBackend for FakeCgroups {
    fn memory_usage(&self, _name: &str) -> Result<u64> {
        Ok(self.memory)
    }

    fn anon_usage(&self, _name: &str) -> Result<u64> {
        Ok(self.anon)
    }

    fn huge_usage(&self, _name: &str) -> Result<u64> {
        Ok(self.huge)
    }

    fn memory_stats(&self, _name: &str) -> Result<BTreeMap<String, u64>> {
        Ok(self.mem_stats.clone())
    }

    fn cpu_usage(&self, _name: &str) -> Result<u64> {
        Ok(self.cpu)
    }

    fn cpu_system(&self, _name: &str) -> Result<u64> {
        Ok(self.cpu_sys)
    }

    fn io_stat(&self, _name: &str, _dir: IoDirection, _ops: bool) -> Result<BTreeMap<String, u64>> {
        Ok(self.io.clone())
    }

    fn disk_name(&self, path: &str) -> Result<String> {
        self.resolve_disk(path)
    }

    fn resolve_disk(&self, key: &str) -> Result<String> {
        if self.disks.iter().any(|d| d == key) {
            Ok(key.to_string())
        } else {
            Err(Error::InvalidValue(format!("unknown disk: {key}")))
        }
    }

    fn task_count(&self, _name: &str, threads: bool) -> Result<u64> {
        Ok(if threads { self.threads } else { self.procs })
    }
}

/// Network backend with a fixed device list and counters.
#[derive(Debug, Default, Clone)]
pub struct FakeNet {
    pub devices: Vec<(String, bool)>,
    pub stats: BTreeMap<String, u64>,
}

impl NetBackend for FakeNet {
    fn devices(&self) -> Vec<NetDevice> {
        self.devices
            .iter()
            .map(|(name, managed)| NetDevice {
                name: name.clone(),
                managed: *managed,
            })
            .collect()
    }

    fn stat(&self, _name: &str, _kind: NetStatKind) -> Result<BTreeMap<String, u64>> {
        Ok(self.stats.clone())
    }
}

pub fn users() -> StaticUsers {
    StaticUsers::new()
        .user("alice", 1000, 1000, &[2000])
        .user("bob", 1001, 1001, &[])
        .group("staff", 2000)
        .group("alice", 1000)
        .group("bob", 1001)
}

/// 10 GiB host with 4 cores and a 1 GiB guarantee reserve, everything
/// supported.
pub fn config() -> Config {
    Config {
        memory_guarantee_reserve: 1 << 30,
        ..Config::default()
    }
}

fn init_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub fn builder() -> EngineBuilder {
    init_logging();
    Engine::builder()
        .config(config())
        .features(KernelFeatures::all())
        .sysinfo(SystemInfo::new(10 << 30, 4))
        .users(users())
}

pub fn engine() -> Engine {
    builder().build()
}

pub fn engine_with_clock() -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let engine = builder().clock(Arc::clone(&clock)).build();
    (engine, clock)
}

pub fn root() -> Client {
    Client::superuser()
}

pub fn alice() -> Client {
    Client::regular(
        Cred {
            uid: 1000,
            gid: 1000,
            groups: vec![1000, 2000],
        },
        42,
    )
}

pub fn pids(pid: i32) -> TaskPids {
    TaskPids {
        pid,
        vpid: 1,
        wait_pid: pid,
    }
}

/// Assert an error kind without insisting on the message.
#[macro_export]
macro_rules! assert_err_kind {
    ($result:expr, $kind:ident) => {
        match $result {
            Err(porto_core::error::Error::$kind(_)) => {}
            other => panic!(
                "expected {} error, got {:?}",
                stringify!($kind),
                other
            ),
        }
    };
}
