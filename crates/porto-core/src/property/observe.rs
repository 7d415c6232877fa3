//! Read-only observable properties.

use crate::cgroup::{IoDirection, CONTROLLER_NAMES};
use crate::codec::{self, UintMap};
use crate::container::PropId;
use crate::error::{Error, Result};
use crate::kernel::KernelFeatures;
use crate::net::{format_tc_class, NetStatKind};
use crate::state::ContainerState;
use crate::stats::DaemonStats;

use super::{Desc, Property, View, ViewMut};

pub(super) fn register(out: &mut Vec<Box<dyn Property>>) {
    out.push(Box::new(StateProp));
    out.push(Box::new(ExitStatusProp));
    out.push(Box::new(ExitCodeProp));
    out.push(Box::new(OomKilledProp));
    out.push(Box::new(StartTimeProp));
    out.push(Box::new(CreationTimeProp));
    out.push(Box::new(TimeProp));
    out.push(Box::new(MemUsageProp));
    out.push(Box::new(AnonUsageProp));
    out.push(Box::new(HugetlbUsageProp {
        desc: Desc::new(
            "hugetlb_usage",
            PropId::None,
            "current hugetlb memory usage [bytes] (ro)",
        )
        .read_only(),
    }));
    out.push(Box::new(MaxRssProp {
        desc: Desc::new(
            "max_rss",
            PropId::None,
            "peak anonymous memory usage [bytes] (ro)",
        )
        .read_only(),
    }));
    out.push(Box::new(MinorFaultsProp));
    out.push(Box::new(MajorFaultsProp));
    out.push(Box::new(CpuUsageProp));
    out.push(Box::new(CpuSystemProp));
    out.push(Box::new(NetClassIdProp));
    for &(name, kind, help) in NET_STATS {
        out.push(Box::new(NetStatProp {
            desc: Desc::new(name, PropId::None, help).read_only(),
            kind,
        }));
    }
    out.push(Box::new(IoStatProp {
        desc: Desc::new("io_read", PropId::None, "read from disk [bytes] (ro)").read_only(),
        dir: IoDirection::Read,
        ops: false,
    }));
    out.push(Box::new(IoStatProp {
        desc: Desc::new("io_write", PropId::None, "written to disk [bytes] (ro)").read_only(),
        dir: IoDirection::Write,
        ops: false,
    }));
    out.push(Box::new(IoStatProp {
        desc: Desc::new("io_ops", PropId::None, "io operations (ro)").read_only(),
        dir: IoDirection::Both,
        ops: true,
    }));
    out.push(Box::new(ProcessCountProp));
    out.push(Box::new(ThreadCountProp));
    out.push(Box::new(CgroupsProp));
    out.push(Box::new(AbsoluteNameProp));
    out.push(Box::new(AbsoluteNamespaceProp));
    out.push(Box::new(ParentProp));
    out.push(Box::new(RootPidProp));
    out.push(Box::new(MemTotalLimitProp));
    out.push(Box::new(MemTotalGuaranteeProp {
        desc: Desc::new(
            "mem_total_guarantee",
            PropId::None,
            "total memory guaranteed below this container (ro)",
        )
        .read_only(),
    }));
    out.push(Box::new(PortoStatProp));
    out.push(Box::new(StdStreamOffsetProp {
        desc: Desc::new(
            "stdout_offset",
            PropId::None,
            "offset of stored stdout (ro)",
        )
        .read_only(),
        stderr: false,
    }));
    out.push(Box::new(StdStreamOffsetProp {
        desc: Desc::new(
            "stderr_offset",
            PropId::None,
            "offset of stored stderr (ro)",
        )
        .read_only(),
        stderr: true,
    }));
}

struct StateProp;

impl Property for StateProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("state", PropId::State, "container state (ro)").read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().state.as_str().to_string())
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        // only the value indication; the restore driver re-applies the
        // actual lifecycle transition
        view.ct_mut().state = ContainerState::parse(value)?;
        Ok(())
    }
}

struct ExitStatusProp;

impl Property for ExitStatusProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "exit_status",
            PropId::ExitStatus,
            "container exit status (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_dead("exit_status")?;
        Ok(view.ct().exit_status.to_string())
    }

    fn get_to_save(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().exit_status.to_string())
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.ct_mut().exit_status = value
            .parse()
            .map_err(|_| Error::InvalidValue(format!("invalid exit status: {value}")))?;
        Ok(())
    }
}

const fn term_signal(status: i32) -> i32 {
    status & 0x7f
}

struct ExitCodeProp;

impl Property for ExitCodeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "exit_code",
            PropId::None,
            "exit code, -99 for OOM kill, negative signal number for a signal death (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_dead("exit_code")?;
        let ct = view.ct();
        let code = if ct.oom_killed {
            -99
        } else if term_signal(ct.exit_status) != 0 {
            -term_signal(ct.exit_status)
        } else {
            (ct.exit_status >> 8) & 0xff
        };
        Ok(code.to_string())
    }
}

struct OomKilledProp;

impl Property for OomKilledProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "oom_killed",
            PropId::OomKilled,
            "container has been killed by OOM (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_dead("oom_killed")?;
        Ok(codec::format_bool(view.ct().oom_killed).to_string())
    }

    fn get_to_save(&self, view: View<'_>) -> Result<String> {
        Ok(codec::format_bool(view.ct().oom_killed).to_string())
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.ct_mut().oom_killed = codec::parse_bool(value)?;
        Ok(())
    }
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

struct StartTimeProp;

impl Property for StartTimeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc =
            Desc::new("start_time", PropId::None, "container start time (ro)").read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view
            .ct()
            .real_start_time
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_default())
    }
}

struct CreationTimeProp;

impl Property for CreationTimeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "creation_time",
            PropId::None,
            "container creation time (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().real_creation_time.format(TIME_FORMAT).to_string())
    }
}

struct TimeProp;

impl Property for TimeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc =
            Desc::new("time", PropId::None, "container running time [seconds] (ro)").read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("time")?;
        let ct = view.ct();
        if ct.is_root() {
            return Ok(view.env.clock.uptime_secs().to_string());
        }
        if !ct.has_prop(PropId::StartTime) {
            // restored from a daemon that predates raw start times
            return Ok("0".to_string());
        }
        let end = if ct.state.is_dead() {
            ct.death_time_ms
        } else {
            view.env.clock.now_ms()
        };
        Ok((end.saturating_sub(ct.start_time_ms) / 1000).to_string())
    }
}

struct MemUsageProp;

impl Property for MemUsageProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "memory_usage",
            PropId::None,
            "current memory usage [bytes] (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("memory_usage")?;
        let usage = view.env.cgroups.memory_usage(&view.ct().name)?;
        Ok(usage.to_string())
    }
}

struct AnonUsageProp;

impl Property for AnonUsageProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "anon_usage",
            PropId::None,
            "current anonymous memory usage [bytes] (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("anon_usage")?;
        Ok(view
            .env
            .cgroups
            .anon_usage(&view.ct().name)
            .unwrap_or(0)
            .to_string())
    }
}

struct HugetlbUsageProp {
    desc: Desc,
}

impl Property for HugetlbUsageProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.hugetlb;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("hugetlb_usage")?;
        let usage = view.env.cgroups.huge_usage(&view.ct().name)?;
        Ok(usage.to_string())
    }
}

struct MaxRssProp {
    desc: Desc,
}

impl Property for MaxRssProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.total_max_rss;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("max_rss")?;
        let value = view
            .env
            .cgroups
            .memory_stats(&view.ct().name)
            .ok()
            .and_then(|stats| stats.get("total_max_rss").copied());
        Ok(value.map_or_else(|| "-1".to_string(), |v| v.to_string()))
    }
}

fn fault_stat(view: &View<'_>, major: bool) -> String {
    view.env
        .cgroups
        .memory_stats(&view.ct().name)
        .ok()
        .and_then(|stats| {
            let major_faults = stats.get("total_pgmajfault").copied()?;
            if major {
                Some(major_faults)
            } else {
                let total = stats.get("total_pgfault").copied()?;
                Some(total.saturating_sub(major_faults))
            }
        })
        .map_or_else(|| "-1".to_string(), |v| v.to_string())
}

struct MinorFaultsProp;

impl Property for MinorFaultsProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc =
            Desc::new("minor_faults", PropId::None, "minor page faults (ro)").read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("minor_faults")?;
        Ok(fault_stat(&view, false))
    }
}

struct MajorFaultsProp;

impl Property for MajorFaultsProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc =
            Desc::new("major_faults", PropId::None, "major page faults (ro)").read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("major_faults")?;
        Ok(fault_stat(&view, true))
    }
}

struct CpuUsageProp;

impl Property for CpuUsageProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "cpu_usage",
            PropId::None,
            "consumed cpu time [nanoseconds] (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("cpu_usage")?;
        match view.env.cgroups.cpu_usage(&view.ct().name) {
            Ok(usage) => Ok(usage.to_string()),
            Err(err) => {
                tracing::warn!(%err, "cannot get cpu usage");
                Ok("-1".to_string())
            }
        }
    }
}

struct CpuSystemProp;

impl Property for CpuSystemProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "cpu_system",
            PropId::None,
            "consumed system cpu time [nanoseconds] (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("cpu_system")?;
        match view.env.cgroups.cpu_system(&view.ct().name) {
            Ok(usage) => Ok(usage.to_string()),
            Err(err) => {
                tracing::warn!(%err, "cannot get system cpu usage");
                Ok("-1".to_string())
            }
        }
    }
}

struct NetClassIdProp;

impl NetClassIdProp {
    fn classes(view: &View<'_>) -> Vec<(String, String)> {
        let class = format_tc_class(view.ct().container_tc);
        view.env
            .network
            .devices()
            .into_iter()
            .filter(|dev| dev.managed)
            .map(|dev| (dev.name, class.clone()))
            .collect()
    }
}

impl Property for NetClassIdProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "net_class_id",
            PropId::None,
            "tc class id per network interface (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("net_class_id")?;
        let entries: Vec<String> = Self::classes(&view)
            .into_iter()
            .map(|(dev, class)| format!("{dev}: {class}"))
            .collect();
        Ok(entries.join("; "))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        view.gate_running("net_class_id")?;
        Self::classes(&view)
            .into_iter()
            .find_map(|(dev, class)| (dev == index).then_some(class))
            .ok_or_else(|| {
                Error::InvalidProperty(format!("network device {index} is not managed"))
            })
    }
}

const NET_STATS: &[(&str, NetStatKind, &str)] = &[
    ("net_bytes", NetStatKind::Bytes, "tx bytes: <interface>: <bytes>;... (ro)"),
    ("net_packets", NetStatKind::Packets, "tx packets: <interface>: <packets>;... (ro)"),
    ("net_drops", NetStatKind::Drops, "tx drops: <interface>: <packets>;... (ro)"),
    ("net_overlimits", NetStatKind::Overlimits, "tx overlimits: <interface>: <packets>;... (ro)"),
    ("net_rx_bytes", NetStatKind::RxBytes, "device rx bytes: <interface>: <bytes>;... (ro)"),
    ("net_rx_packets", NetStatKind::RxPackets, "device rx packets: <interface>: <packets>;... (ro)"),
    ("net_rx_drops", NetStatKind::RxDrops, "device rx drops: <interface>: <packets>;... (ro)"),
    ("net_tx_bytes", NetStatKind::TxBytes, "device tx bytes: <interface>: <bytes>;... (ro)"),
    ("net_tx_packets", NetStatKind::TxPackets, "device tx packets: <interface>: <packets>;... (ro)"),
    ("net_tx_drops", NetStatKind::TxDrops, "device tx drops: <interface>: <packets>;... (ro)"),
];

struct NetStatProp {
    desc: Desc,
    kind: NetStatKind,
}

impl Property for NetStatProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running(self.desc.name)?;
        let stat = view.env.network.stat(&view.ct().name, self.kind)?;
        Ok(codec::format_uint_map(&stat))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        view.gate_running(self.desc.name)?;
        let stat = view.env.network.stat(&view.ct().name, self.kind)?;
        stat.get(index)
            .map(ToString::to_string)
            .ok_or_else(|| Error::InvalidValue(format!("network device {index} not found")))
    }
}

struct IoStatProp {
    desc: Desc,
    dir: IoDirection,
    ops: bool,
}

impl IoStatProp {
    fn populate(&self, view: &View<'_>) -> UintMap {
        view.env
            .cgroups
            .io_stat(&view.ct().name, self.dir, self.ops)
            .unwrap_or_default()
    }
}

impl Property for IoStatProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running(self.desc.name)?;
        Ok(codec::format_uint_map(&self.populate(&view)))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        view.gate_running(self.desc.name)?;
        self.populate(&view)
            .get(index)
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::InvalidValue(format!(
                    "invalid subscript for property: {}",
                    self.desc.name
                ))
            })
    }
}

struct ProcessCountProp;

impl Property for ProcessCountProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc =
            Desc::new("process_count", PropId::None, "process count (ro)").read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("process_count")?;
        let count = view.env.cgroups.task_count(&view.ct().name, false)?;
        Ok(count.to_string())
    }
}

struct ThreadCountProp;

impl Property for ThreadCountProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc =
            Desc::new("thread_count", PropId::None, "thread count (ro)").read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("thread_count")?;
        let count = view.env.cgroups.task_count(&view.ct().name, true)?;
        Ok(count.to_string())
    }
}

struct CgroupsProp;

impl CgroupsProp {
    fn paths(view: &View<'_>) -> Vec<(String, String)> {
        let ct = view.ct();
        CONTROLLER_NAMES
            .iter()
            .filter(|flag| u64::from(ct.controllers.bits()) & flag.bits != 0)
            .map(|flag| {
                let ctrl = crate::cgroup::Controllers::from_bits_retain(
                    u32::try_from(flag.bits).unwrap_or(0),
                );
                (
                    flag.name.to_string(),
                    view.env.cgroups.cgroup_path(ctrl, &ct.name),
                )
            })
            .collect()
    }
}

impl Property for CgroupsProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc =
            Desc::new("cgroups", PropId::None, "cgroup path per controller (ro)").read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        let entries: Vec<String> = Self::paths(&view)
            .into_iter()
            .map(|(ctrl, path)| format!("{ctrl}: {path}"))
            .collect();
        Ok(entries.join("; "))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        Self::paths(&view)
            .into_iter()
            .find_map(|(ctrl, path)| (ctrl == index).then_some(path))
            .ok_or_else(|| Error::InvalidProperty(format!("unknown cgroup subsystem: {index}")))
    }
}

struct AbsoluteNameProp;

impl Property for AbsoluteNameProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "absolute_name",
            PropId::None,
            "container name including namespace prefixes (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        let ct = view.ct();
        if ct.is_root() {
            Ok(ct.name.clone())
        } else {
            Ok(format!("/porto/{}", ct.name))
        }
    }
}

struct AbsoluteNamespaceProp;

impl Property for AbsoluteNamespaceProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "absolute_namespace",
            PropId::None,
            "container namespace including parent namespaces (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        let mut chain: Vec<_> = view.tree.ancestors(view.id).collect();
        chain.reverse();
        chain.push(view.id);
        let namespace: String = chain
            .into_iter()
            .map(|id| view.tree.node(id).ns_name.as_str())
            .collect();
        Ok(format!("/porto/{namespace}"))
    }
}

struct ParentProp;

impl Property for ParentProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc =
            Desc::new("parent", PropId::None, "parent container name (ro)")
                .read_only()
                .hidden();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view
            .ct()
            .parent
            .map(|id| view.tree.node(id).name.clone())
            .unwrap_or_default())
    }
}

struct RootPidProp;

impl Property for RootPidProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("root_pid", PropId::None, "root task pid (ro)")
            .read_only()
            .hidden();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running("root_pid")?;
        Ok(view.ct().task_pid.to_string())
    }
}

struct MemTotalLimitProp;

impl Property for MemTotalLimitProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "mem_total_limit",
            PropId::None,
            "effective memory limit in the hierarchy (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.tree.hierarchy_mem_limit(view.id).to_string())
    }
}

struct MemTotalGuaranteeProp {
    desc: Desc,
}

impl Property for MemTotalGuaranteeProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.memory_guarantee;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.tree.hierarchy_mem_guarantee(view.id).to_string())
    }
}

struct PortoStatProp;

impl PortoStatProp {
    fn populate(view: &View<'_>) -> UintMap {
        let stats = view.env.stats;
        let mut map = UintMap::new();
        map.insert("spawned".into(), DaemonStats::read(&stats.spawned));
        map.insert("errors".into(), DaemonStats::read(&stats.errors));
        map.insert("warnings".into(), DaemonStats::read(&stats.warnings));
        map.insert("created".into(), DaemonStats::read(&stats.created));
        map.insert("started".into(), DaemonStats::read(&stats.started));
        map.insert(
            "restore_failed".into(),
            DaemonStats::read(&stats.restore_failed),
        );
        map.insert("remove_dead".into(), DaemonStats::read(&stats.remove_dead));
        map.insert("daemon_uptime".into(), view.env.clock.now_ms() / 1000);
        map.insert("containers".into(), view.tree.len() as u64);
        map.insert("running".into(), view.tree.running_in_subtree(view.id));
        map
    }
}

impl Property for PortoStatProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("porto_stat", PropId::None, "daemon statistics (ro)")
            .read_only()
            .hidden();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::format_uint_map(&Self::populate(&view)))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        Self::populate(&view)
            .get(index)
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::InvalidValue("invalid subscript for property: porto_stat".to_string())
            })
    }
}

struct StdStreamOffsetProp {
    desc: Desc,
    stderr: bool,
}

impl Property for StdStreamOffsetProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        view.gate_running(self.desc.name)?;
        let ct = view.ct();
        let offset = if self.stderr {
            ct.stderr_offset
        } else {
            ct.stdout_offset
        };
        Ok(offset.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_signal() {
        assert_eq!(term_signal(0), 0);
        assert_eq!(term_signal(9), 9);
        assert_eq!(term_signal(0x0100), 0);
    }
}
