//! Resource limit and guarantee properties.

use nix::sys::resource::Resource;

use crate::cgroup::Controllers;
use crate::codec::{self, UintMap};
use crate::config::Config;
use crate::container::{ContainerId, CpuPolicy, IoPolicy, PropId, RlimitPair, SchedAttrs};
use crate::error::{Error, Result};
use crate::kernel::KernelFeatures;
use crate::stats::DaemonStats;

use super::{BoolProp, Desc, Property, SizeProp, View, ViewMut};

pub(super) fn register(out: &mut Vec<Box<dyn Property>>) {
    out.push(Box::new(MemoryLimitProp));
    out.push(Box::new(MemoryGuaranteeProp {
        desc: Desc::new(
            "memory_guarantee",
            PropId::MemGuarantee,
            "guaranteed amount of memory [bytes] (dynamic)",
        )
        .dynamic(),
    }));
    out.push(SizeProp::new(
        Desc::new(
            "anon_limit",
            PropId::AnonLimit,
            "anonymous memory limit [bytes] (dynamic)",
        )
        .dynamic(),
        Controllers::MEMORY,
        Some(|f| f.anon_limit),
        |ct| ct.anon_mem_limit,
        |ct, v| ct.anon_mem_limit = v,
    ));
    out.push(SizeProp::new(
        Desc::new(
            "dirty_limit",
            PropId::DirtyLimit,
            "dirty file cache limit [bytes] (dynamic)",
        )
        .dynamic(),
        Controllers::MEMORY,
        Some(|f| f.dirty_limit),
        |ct| ct.dirty_mem_limit,
        |ct, v| ct.dirty_mem_limit = v,
    ));
    out.push(BoolProp::new(
        Desc::new(
            "recharge_on_pgfault",
            PropId::RechargeOnPgfault,
            "recharge memory on page fault (dynamic)",
        )
        .dynamic(),
        Controllers::MEMORY,
        Some(|f| f.recharge_on_pgfault),
        |ct| ct.recharge_on_pgfault,
        |ct, v| ct.recharge_on_pgfault = v,
    ));
    out.push(Box::new(HugetlbLimitProp {
        desc: Desc::new(
            "hugetlb_limit",
            PropId::HugetlbLimit,
            "hugetlb memory limit [bytes] (dynamic)",
        )
        .dynamic(),
    }));
    out.push(Box::new(CpuLimitProp));
    out.push(Box::new(CpuGuaranteeProp));
    out.push(Box::new(CpuSetProp));
    out.push(Box::new(CpuPolicyProp));
    out.push(Box::new(IoPolicyProp {
        desc: Desc::new(
            "io_policy",
            PropId::IoPolicy,
            "io policy: normal | batch (dynamic)",
        )
        .dynamic(),
    }));
    out.push(Box::new(IoMapProp {
        desc: Desc::new(
            "io_limit",
            PropId::IoLimit,
            "io bandwidth limit: fs|<disk> [r|w]: <bytes/s>;... (dynamic)",
        )
        .dynamic(),
        ops: false,
    }));
    out.push(Box::new(IoMapProp {
        desc: Desc::new(
            "io_ops_limit",
            PropId::IoOpsLimit,
            "io operations limit: fs|<disk> [r|w]: <ops/s>;... (dynamic)",
        )
        .dynamic(),
        ops: true,
    }));
    out.push(Box::new(ThreadLimitProp {
        desc: Desc::new(
            "thread_limit",
            PropId::ThreadLimit,
            "thread count limit (dynamic)",
        )
        .dynamic(),
    }));
    out.push(Box::new(UlimitProp));
}

struct MemoryLimitProp;

impl Property for MemoryLimitProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "memory_limit",
            PropId::MemLimit,
            "memory hard limit [bytes] (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().mem_limit.to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("memory_limit")?;
        let limit = codec::parse_size(value)?;
        if limit != 0 && limit < view.env.config.min_memory_limit {
            return Err(Error::InvalidValue(format!(
                "memory limit below minimum {}",
                view.env.config.min_memory_limit
            )));
        }
        view.want_controllers(Controllers::MEMORY)?;
        if view.ct().mem_limit != limit {
            view.ct_mut().mem_limit = limit;
            view.ct_mut().set_prop(PropId::MemLimit);
        }
        Ok(())
    }
}

struct MemoryGuaranteeProp {
    desc: Desc,
}

impl Property for MemoryGuaranteeProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.memory_guarantee;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().mem_guarantee.to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("memory_guarantee")?;
        let guarantee = codec::parse_size(value)?;
        view.want_controllers(Controllers::MEMORY)?;

        let committed = view.ct().current_mem_guarantee;
        view.ct_mut().current_mem_guarantee = guarantee;
        let usage = view.tree.hierarchy_mem_guarantee(ContainerId::ROOT);
        let total = view.env.sys.total_memory;
        let reserve = view.env.config.memory_guarantee_reserve;
        if usage.saturating_add(reserve) > total {
            view.ct_mut().current_mem_guarantee = committed;
            let used = view.tree.hierarchy_mem_guarantee(ContainerId::ROOT);
            let remaining = total.saturating_sub(reserve).saturating_sub(used);
            return Err(Error::ResourceNotAvailable(format!(
                "not enough memory for guarantee: requested {guarantee}, remaining {remaining} bytes"
            )));
        }

        view.ct_mut().mem_guarantee = guarantee;
        view.ct_mut().set_prop(PropId::MemGuarantee);
        Ok(())
    }
}

struct HugetlbLimitProp {
    desc: Desc,
}

impl Property for HugetlbLimitProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.hugetlb;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().hugetlb_limit.to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("hugetlb_limit")?;
        let limit = codec::parse_size(value)?;
        view.want_controllers(Controllers::HUGETLB)?;
        if view.ct().state.is_active() {
            let name = view.ct().name.clone();
            if let Ok(usage) = view.env.cgroups.huge_usage(&name) {
                if limit < usage {
                    return Err(Error::InvalidValue(format!(
                        "current hugetlb usage {usage} is greater than limit"
                    )));
                }
            }
        }
        view.ct_mut().hugetlb_limit = limit;
        view.ct_mut().set_prop(PropId::HugetlbLimit);
        Ok(())
    }
}

struct CpuLimitProp;

impl Property for CpuLimitProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "cpu_limit",
            PropId::CpuLimit,
            "cpu limit: 0-100% | <cores>c (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::format_cpu_value(view.ct().cpu_limit))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("cpu_limit")?;
        let limit = codec::parse_cpu_value(value, view.env.sys.num_cores)?;
        view.want_controllers(Controllers::CPU)?;

        if !view.env.client.is_super_user() && !view.env.restoring {
            if let Some(parent) = view.ct().parent {
                let parent_limit = view.tree.node(parent).cpu_limit;
                if parent_limit != 0.0 && limit > parent_limit {
                    return Err(Error::InvalidValue(format!(
                        "cpu limit above parent limit {parent_limit}c"
                    )));
                }
            }
        }

        if (view.ct().cpu_limit - limit).abs() > f64::EPSILON {
            view.ct_mut().cpu_limit = limit;
            view.ct_mut().set_prop(PropId::CpuLimit);
        }
        Ok(())
    }
}

struct CpuGuaranteeProp;

impl Property for CpuGuaranteeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "cpu_guarantee",
            PropId::CpuGuarantee,
            "cpu guarantee: 0-100% | <cores>c (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::format_cpu_value(view.ct().cpu_guarantee))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("cpu_guarantee")?;
        let guarantee = codec::parse_cpu_value(value, view.env.sys.num_cores)?;
        view.want_controllers(Controllers::CPU)?;

        // exceeding the parent guarantee is tolerated, only logged
        if let Some(parent) = view.ct().parent {
            let parent_guarantee = view.tree.node(parent).cpu_guarantee;
            if parent_guarantee > 0.0 && guarantee > parent_guarantee {
                tracing::warn!(
                    container = %view.ct().name,
                    guarantee,
                    parent_guarantee,
                    "cpu guarantee above parent guarantee"
                );
                DaemonStats::bump(&view.env.stats.warnings);
            }
        }

        if (view.ct().cpu_guarantee - guarantee).abs() > f64::EPSILON {
            view.ct_mut().cpu_guarantee = guarantee;
            view.ct_mut().set_prop(PropId::CpuGuarantee);
        }
        Ok(())
    }
}

fn validate_cpu_list(list: &str) -> Result<()> {
    for part in list.split(',') {
        let part = part.trim();
        let ok = match part.split_once('-') {
            Some((lo, hi)) => match (lo.parse::<usize>(), hi.parse::<usize>()) {
                (Ok(lo), Ok(hi)) => lo <= hi,
                _ => false,
            },
            None => part.parse::<usize>().is_ok(),
        };
        if !ok {
            return Err(Error::InvalidValue(format!("invalid cpu list: {list}")));
        }
    }
    Ok(())
}

struct CpuSetProp;

impl Property for CpuSetProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "cpu_set",
            PropId::CpuSet,
            "cpu placement: [node] <cpu list>",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().cpu_set.clone())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("cpu_set")?;
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            match trimmed.strip_prefix("node ") {
                Some(nodes) => validate_cpu_list(nodes)?,
                None => validate_cpu_list(trimmed)?,
            }
        }
        view.want_controllers(Controllers::CPUSET)?;
        view.ct_mut().cpu_set = trimmed.to_string();
        view.ct_mut().set_prop(PropId::CpuSet);
        Ok(())
    }
}

const SCHED_OTHER: i32 = 0;
const SCHED_RR: i32 = 2;
const SCHED_BATCH: i32 = 3;
const SCHED_ISO: i32 = 4;
const SCHED_IDLE: i32 = 5;

fn derive_sched(policy: CpuPolicy, config: &Config) -> SchedAttrs {
    match policy {
        CpuPolicy::Rt => {
            if config.rt_priority > 0 && !config.enable_smart {
                SchedAttrs {
                    policy: SCHED_RR,
                    nice: config.rt_nice,
                    prio: config.rt_priority,
                }
            } else {
                SchedAttrs {
                    policy: SCHED_OTHER,
                    nice: config.rt_nice,
                    prio: 0,
                }
            }
        }
        CpuPolicy::High => SchedAttrs {
            policy: SCHED_OTHER,
            nice: config.high_nice,
            prio: 0,
        },
        CpuPolicy::Normal => SchedAttrs {
            policy: SCHED_OTHER,
            nice: 0,
            prio: 0,
        },
        CpuPolicy::Batch => SchedAttrs {
            policy: SCHED_BATCH,
            nice: 0,
            prio: 0,
        },
        CpuPolicy::Idle => SchedAttrs {
            policy: SCHED_IDLE,
            nice: 0,
            prio: 0,
        },
        CpuPolicy::Iso => SchedAttrs {
            policy: SCHED_ISO,
            nice: config.high_nice,
            prio: 0,
        },
    }
}

struct CpuPolicyProp;

impl Property for CpuPolicyProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "cpu_policy",
            PropId::CpuPolicy,
            "cpu policy: rt | high | normal | batch | idle | iso (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().cpu_policy.as_str().to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("cpu_policy")?;
        let policy = CpuPolicy::parse(value)?;
        view.want_controllers(Controllers::CPU)?;
        let sched = derive_sched(policy, view.env.config);
        let ct = view.ct_mut();
        ct.cpu_policy = policy;
        ct.sched = sched;
        ct.set_prop(PropId::CpuPolicy);
        Ok(())
    }
}

struct IoPolicyProp {
    desc: Desc,
}

impl Property for IoPolicyProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.blkio_weight;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().io_policy.as_str().to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("io_policy")?;
        let policy = match value {
            "normal" => IoPolicy::Normal,
            "batch" => IoPolicy::Batch,
            _ => return Err(Error::InvalidValue(format!("invalid io policy: {value}"))),
        };
        view.want_controllers(Controllers::BLKIO)?;
        view.ct_mut().io_policy = policy;
        view.ct_mut().set_prop(PropId::IoPolicy);
        Ok(())
    }
}

/// `io_limit` and `io_ops_limit`: maps keyed by `fs` or a disk, where the
/// `fs` dial is enforced by the memory controller and disk dials by the
/// blkio throttler. Disk keys may carry an `r` or `w` direction suffix.
struct IoMapProp {
    desc: Desc,
    ops: bool,
}

impl IoMapProp {
    fn map<'a>(&self, ct: &'a crate::container::Container) -> &'a UintMap {
        if self.ops {
            &ct.io_ops_limit
        } else {
            &ct.io_bps_limit
        }
    }

    fn route(&self, view: &ViewMut<'_>, key: &str) -> Result<(String, Controllers)> {
        if key == "fs" {
            if !view.env.features.io_limit {
                return Err(Error::NotSupported(
                    "filesystem io limit is not supported".to_string(),
                ));
            }
            return Ok(("fs".to_string(), Controllers::MEMORY));
        }
        if !view.env.features.blkio_throttler {
            return Err(Error::NotSupported(
                "disk io limit is not supported".to_string(),
            ));
        }
        let (disk, suffix) = match key.strip_suffix(" r") {
            Some(disk) => (disk, " r"),
            None => match key.strip_suffix(" w") {
                Some(disk) => (disk, " w"),
                None => (key, ""),
            },
        };
        let resolved = view.env.cgroups.resolve_disk(disk)?;
        Ok((format!("{resolved}{suffix}"), Controllers::BLKIO))
    }
}

impl Property for IoMapProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.io_limit || features.blkio_throttler;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::format_uint_map(self.map(view.ct())))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        self.map(view.ct())
            .get(index)
            .map(ToString::to_string)
            .ok_or_else(|| Error::InvalidValue(format!("invalid index: {index}")))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive(self.desc.name)?;
        let parsed = codec::parse_uint_map(value)?;
        let mut routed = UintMap::new();
        let mut mask = Controllers::empty();
        for (key, limit) in parsed {
            let (resolved, ctrl) = self.route(view, &key)?;
            mask |= ctrl;
            routed.insert(resolved, limit);
        }
        view.want_controllers(mask)?;
        let ops = self.ops;
        let ct = view.ct_mut();
        if ops {
            ct.io_ops_limit = routed;
        } else {
            ct.io_bps_limit = routed;
        }
        ct.set_prop(self.desc.prop);
        Ok(())
    }

    fn set_indexed(&self, view: &mut ViewMut<'_>, index: &str, value: &str) -> Result<()> {
        view.gate_alive(self.desc.name)?;
        let (resolved, ctrl) = self.route(view, index)?;
        if value.is_empty() {
            let ops = self.ops;
            let ct = view.ct_mut();
            let map = if ops {
                &mut ct.io_ops_limit
            } else {
                &mut ct.io_bps_limit
            };
            map.remove(&resolved);
            ct.set_prop(self.desc.prop);
            return Ok(());
        }
        let limit = codec::parse_size(value)?;
        view.want_controllers(ctrl)?;
        let ops = self.ops;
        let ct = view.ct_mut();
        let map = if ops {
            &mut ct.io_ops_limit
        } else {
            &mut ct.io_bps_limit
        };
        map.insert(resolved, limit);
        ct.set_prop(self.desc.prop);
        Ok(())
    }
}

struct ThreadLimitProp {
    desc: Desc,
}

impl Property for ThreadLimitProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.pids;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().thread_limit.to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("thread_limit")?;
        // a limit below current usage is accepted, the kernel enforces it
        let limit = codec::parse_size(value)?;
        view.want_controllers(Controllers::PIDS)?;
        view.ct_mut().thread_limit = limit;
        view.ct_mut().set_prop(PropId::ThreadLimit);
        Ok(())
    }
}

const ULIMIT_RESOURCES: &[(&str, Resource)] = &[
    ("as", Resource::RLIMIT_AS),
    ("core", Resource::RLIMIT_CORE),
    ("cpu", Resource::RLIMIT_CPU),
    ("data", Resource::RLIMIT_DATA),
    ("fsize", Resource::RLIMIT_FSIZE),
    ("locks", Resource::RLIMIT_LOCKS),
    ("memlock", Resource::RLIMIT_MEMLOCK),
    ("msgqueue", Resource::RLIMIT_MSGQUEUE),
    ("nice", Resource::RLIMIT_NICE),
    ("nofile", Resource::RLIMIT_NOFILE),
    ("nproc", Resource::RLIMIT_NPROC),
    ("rss", Resource::RLIMIT_RSS),
    ("rtprio", Resource::RLIMIT_RTPRIO),
    ("rttime", Resource::RLIMIT_RTTIME),
    ("sigpending", Resource::RLIMIT_SIGPENDING),
    ("stack", Resource::RLIMIT_STACK),
];

/// Kernel resource behind a `ulimit` map key; the task spawner applies
/// the stored pairs through this mapping.
#[must_use]
pub fn ulimit_resource(name: &str) -> Option<Resource> {
    ULIMIT_RESOURCES
        .iter()
        .find(|&&(n, _)| n == name)
        .map(|&(_, resource)| resource)
}

fn ulimit_name_valid(name: &str) -> bool {
    ulimit_resource(name).is_some()
}

fn parse_limit_field(field: &str) -> Result<u64> {
    if field == "unlim" || field == "unlimited" {
        return Ok(u64::MAX);
    }
    field
        .parse()
        .map_err(|_| Error::InvalidValue(format!("invalid ulimit value: {field}")))
}

fn format_limit_field(value: u64) -> String {
    if value == u64::MAX {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

fn parse_limit_pair(name: &str, value: &str) -> Result<RlimitPair> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    let [soft, hard] = fields.as_slice() else {
        return Err(Error::InvalidValue(format!(
            "expected <soft> <hard> for ulimit {name}"
        )));
    };
    Ok(RlimitPair {
        soft: parse_limit_field(soft)?,
        hard: parse_limit_field(hard)?,
    })
}

struct UlimitProp;

impl Property for UlimitProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "ulimit",
            PropId::Ulimit,
            "resource limits: <type>: <soft> <hard>;... (man 2 getrlimit)",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        let entries: Vec<String> = view
            .ct()
            .ulimits
            .iter()
            .map(|(name, pair)| {
                format!(
                    "{name}: {} {}",
                    format_limit_field(pair.soft),
                    format_limit_field(pair.hard)
                )
            })
            .collect();
        Ok(entries.join("; "))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        view.ct()
            .ulimits
            .get(index)
            .map(|pair| {
                format!(
                    "{} {}",
                    format_limit_field(pair.soft),
                    format_limit_field(pair.hard)
                )
            })
            .ok_or_else(|| Error::InvalidValue(format!("invalid index: {index}")))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("ulimit")?;
        let mut limits = std::collections::BTreeMap::new();
        for entry in codec::split_escaped(value, ';') {
            let (name, pair) = entry
                .split_once(':')
                .ok_or_else(|| Error::InvalidValue(format!("invalid ulimit entry: {entry}")))?;
            let name = name.trim();
            if !ulimit_name_valid(name) {
                return Err(Error::InvalidValue(format!("invalid ulimit: {name}")));
            }
            limits.insert(name.to_string(), parse_limit_pair(name, pair)?);
        }
        view.ct_mut().ulimits = limits;
        view.ct_mut().set_prop(PropId::Ulimit);
        Ok(())
    }

    fn set_indexed(&self, view: &mut ViewMut<'_>, index: &str, value: &str) -> Result<()> {
        view.gate_stopped("ulimit")?;
        if !ulimit_name_valid(index) {
            return Err(Error::InvalidValue(format!("invalid ulimit: {index}")));
        }
        if value.is_empty() {
            view.ct_mut().ulimits.remove(index);
            view.ct_mut().set_prop(PropId::Ulimit);
            return Ok(());
        }
        let pair = parse_limit_pair(index, value)?;
        view.ct_mut().ulimits.insert(index.to_string(), pair);
        view.ct_mut().set_prop(PropId::Ulimit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_sched_rt_without_smart() {
        let config = Config::default();
        let sched = derive_sched(CpuPolicy::Rt, &config);
        assert_eq!(sched.policy, SCHED_RR);
        assert_eq!(sched.nice, config.rt_nice);
        assert_eq!(sched.prio, config.rt_priority);
    }

    #[test]
    fn test_derive_sched_rt_with_smart_falls_back() {
        let config = Config {
            enable_smart: true,
            ..Config::default()
        };
        let sched = derive_sched(CpuPolicy::Rt, &config);
        assert_eq!(sched.policy, SCHED_OTHER);
        assert_eq!(sched.prio, 0);
    }

    #[test]
    fn test_derive_sched_table() {
        let config = Config::default();
        assert_eq!(derive_sched(CpuPolicy::Normal, &config).policy, SCHED_OTHER);
        assert_eq!(derive_sched(CpuPolicy::Batch, &config).policy, SCHED_BATCH);
        assert_eq!(derive_sched(CpuPolicy::Idle, &config).policy, SCHED_IDLE);
        assert_eq!(derive_sched(CpuPolicy::Iso, &config).policy, SCHED_ISO);
        assert_eq!(derive_sched(CpuPolicy::High, &config).nice, config.high_nice);
        assert_eq!(derive_sched(CpuPolicy::Iso, &config).nice, config.high_nice);
    }

    #[test]
    fn test_validate_cpu_list() {
        assert!(validate_cpu_list("0").is_ok());
        assert!(validate_cpu_list("0-3").is_ok());
        assert!(validate_cpu_list("0,2,4-7").is_ok());
        assert!(validate_cpu_list("3-1").is_err());
        assert!(validate_cpu_list("a-b").is_err());
        assert!(validate_cpu_list("").is_err());
    }

    #[test]
    fn test_parse_limit_pair() {
        let pair = parse_limit_pair("nofile", "1024 4096").unwrap();
        assert_eq!(pair.soft, 1024);
        assert_eq!(pair.hard, 4096);
        let pair = parse_limit_pair("core", "0 unlimited").unwrap();
        assert_eq!(pair.hard, u64::MAX);
        assert!(parse_limit_pair("cpu", "1").is_err());
        assert!(parse_limit_pair("cpu", "a b").is_err());
    }

    #[test]
    fn test_ulimit_names() {
        assert!(ulimit_name_valid("nofile"));
        assert!(ulimit_name_valid("memlock"));
        assert!(!ulimit_name_valid("files"));
    }
}
