//! The container record and the container tree.
//!
//! Containers live in a slot arena owned by [`ContainerTree`]; parent
//! links are arena indices, never references, so teardown of a subtree is
//! plain slot clearing. The record holds every settable value, the
//! explicitly-set bitmap and the lifecycle bookkeeping the property
//! handlers read and write.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::caps::Capabilities;
use crate::cgroup::Controllers;
use crate::codec::UintMap;
use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::state::ContainerState;

/// Index of a container in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(u32);

impl ContainerId {
    /// The root container `/`.
    pub const ROOT: Self = Self(0);

    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a settable property for the explicitly-set bitmap and
/// persistence. `None` marks values that are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
#[repr(u8)]
pub enum PropId {
    None = 0,
    Command,
    Cwd,
    Root,
    RootRdOnly,
    Umask,
    Hostname,
    BindDns,
    Isolate,
    VirtMode,
    Bind,
    Env,
    Devices,
    ResolvConf,
    Stdin,
    Stdout,
    Stderr,
    StdoutLimit,
    User,
    Group,
    OwnerUser,
    OwnerGroup,
    EnablePorto,
    Capabilities,
    CapabilitiesAmbient,
    Private,
    MemLimit,
    MemGuarantee,
    AnonLimit,
    DirtyLimit,
    HugetlbLimit,
    RechargeOnPgfault,
    CpuPolicy,
    CpuLimit,
    CpuGuarantee,
    CpuSet,
    IoPolicy,
    IoLimit,
    IoOpsLimit,
    ThreadLimit,
    Ulimit,
    Net,
    Ip,
    DefaultGw,
    NetGuarantee,
    NetLimit,
    NetPrio,
    NetTos,
    Respawn,
    MaxRespawns,
    RespawnCount,
    Weak,
    AgingTime,
    OomIsFatal,
    PortoNamespace,
    State,
    OomKilled,
    ExitStatus,
    RootPid,
    SeizePid,
    LoopDev,
    StartTime,
    DeathTime,
}

impl PropId {
    const fn mask(self) -> u128 {
        1u128 << (self as u8)
    }
}

/// Virtualization mode of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VirtMode {
    /// Single entry command.
    #[default]
    App,
    /// Init-like entry with the expanded default capability set.
    Os,
}

impl VirtMode {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Os => "os",
        }
    }
}

/// Whether a container may talk to the daemon, ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    /// No access at all.
    None,
    /// Read-only requests.
    ReadOnly,
    /// Full access to its own subtree only.
    ChildOnly,
    /// Full access.
    Normal,
}

impl AccessLevel {
    /// Wire name, matching the `enable_porto` value set.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "false",
            Self::ReadOnly => "read-only",
            Self::ChildOnly => "child-only",
            Self::Normal => "true",
        }
    }

    /// Parse an `enable_porto` value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown levels.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "false" => Ok(Self::None),
            "read-only" => Ok(Self::ReadOnly),
            "child-only" => Ok(Self::ChildOnly),
            "true" => Ok(Self::Normal),
            _ => Err(Error::InvalidValue(format!("unknown access level: {s}"))),
        }
    }
}

/// Cpu scheduling policy requested through `cpu_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum CpuPolicy {
    Rt,
    High,
    #[default]
    Normal,
    Batch,
    Idle,
    Iso,
}

impl CpuPolicy {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rt => "rt",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Batch => "batch",
            Self::Idle => "idle",
            Self::Iso => "iso",
        }
    }

    /// Parse a policy name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown policies.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "rt" => Ok(Self::Rt),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "batch" => Ok(Self::Batch),
            "idle" => Ok(Self::Idle),
            "iso" => Ok(Self::Iso),
            _ => Err(Error::InvalidValue(format!("invalid cpu policy: {s}"))),
        }
    }
}

/// Io scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum IoPolicy {
    #[default]
    Normal,
    Batch,
}

impl IoPolicy {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Batch => "batch",
        }
    }
}

/// One `bind` entry: a host directory shared into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path.
    pub source: String,
    /// Path inside the container.
    pub dest: String,
    /// Mount read-only.
    pub read_only: bool,
    /// Mount read-write explicitly.
    pub read_write: bool,
}

impl BindMount {
    /// Format back to the wire tuple.
    #[must_use]
    pub fn format(&self) -> String {
        let mode = if self.read_only {
            " ro"
        } else if self.read_write {
            " rw"
        } else {
            ""
        };
        format!("{} {}{mode}", self.source, self.dest)
    }
}

/// One `devices` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Device node path.
    pub path: String,
    /// Access string over `rwm`, or `-` for none.
    pub access: String,
    /// Optional node name inside the container.
    pub name: Option<String>,
    /// Optional mode, octal.
    pub mode: Option<String>,
    /// Optional owner user.
    pub user: Option<String>,
    /// Optional owner group.
    pub group: Option<String>,
}

impl DeviceSpec {
    /// Format back to the wire tuple.
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = format!("{} {}", self.path, self.access);
        for part in [&self.name, &self.mode, &self.user, &self.group].into_iter().flatten() {
            out.push(' ');
            out.push_str(part);
        }
        out
    }
}

/// Soft/hard pair of one resource limit; `u64::MAX` is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlimitPair {
    /// Soft limit.
    pub soft: u64,
    /// Hard limit.
    pub hard: u64,
}

/// Scheduler attributes derived from `cpu_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedAttrs {
    /// Kernel scheduling policy number.
    pub policy: i32,
    /// Nice value.
    pub nice: i32,
    /// Realtime priority.
    pub prio: i32,
}

/// The in-memory record of one container.
#[derive(Debug, Clone)]
pub struct Container {
    // identity
    /// Slash-separated name; `/` for the root.
    pub name: String,
    /// Parent link; `None` only for the root.
    pub parent: Option<ContainerId>,
    /// Ordered children.
    pub children: Vec<ContainerId>,
    /// Daemon namespace prefix for nested clients.
    pub ns_name: String,

    // lifecycle
    /// Current state.
    pub state: ContainerState,
    /// Wall-clock creation time.
    pub real_creation_time: DateTime<Utc>,
    /// Wall-clock start time of the last start.
    pub real_start_time: Option<DateTime<Utc>>,
    /// Monotonic start time [ms].
    pub start_time_ms: u64,
    /// Monotonic death time [ms].
    pub death_time_ms: u64,
    /// Time a dead container lingers before auto-removal [ms].
    pub aging_time_ms: u64,
    /// Raw wait status of the exited task.
    pub exit_status: i32,
    /// Whether the task died from an OOM kill.
    pub oom_killed: bool,
    /// Whether an OOM kill terminates the container.
    pub oom_is_fatal: bool,
    /// Respawn dead container automatically.
    pub to_respawn: bool,
    /// Respawn budget; negative means unlimited.
    pub max_respawns: i64,
    /// Respawns done so far.
    pub respawn_count: u64,
    /// Destroy when the owning client disconnects.
    pub is_weak: bool,

    // permission
    /// Owner of the container object.
    pub owner_cred: Cred,
    /// Identity the entry command runs under.
    pub task_cred: Cred,
    /// Daemon access level granted to processes inside.
    pub access_level: AccessLevel,
    /// Capability limit.
    pub cap_limit: Capabilities,
    /// Ambient capabilities raised for the task.
    pub cap_ambient: Capabilities,
    /// Derived bound: what this container may be allowed at all.
    pub cap_allowed: Capabilities,
    /// Virtualization mode.
    pub virt_mode: VirtMode,
    /// User-defined opaque string.
    pub private: String,

    // resources
    /// Memory hard limit [bytes]; 0 is unlimited.
    pub mem_limit: u64,
    /// Committed memory guarantee [bytes].
    pub mem_guarantee: u64,
    /// Pending guarantee used while a set is validated.
    pub current_mem_guarantee: u64,
    /// Anonymous memory limit [bytes]; 0 is unlimited.
    pub anon_mem_limit: u64,
    /// Dirty page limit [bytes]; 0 is unlimited.
    pub dirty_mem_limit: u64,
    /// Hugetlb limit [bytes]; 0 is unlimited.
    pub hugetlb_limit: u64,
    /// Recharge pages to the faulting cgroup.
    pub recharge_on_pgfault: bool,
    /// Cpu limit in cores; 0 is unlimited.
    pub cpu_limit: f64,
    /// Cpu guarantee in cores.
    pub cpu_guarantee: f64,
    /// Requested cpu policy.
    pub cpu_policy: CpuPolicy,
    /// Scheduler attributes derived from the policy.
    pub sched: SchedAttrs,
    /// Textual cpu placement.
    pub cpu_set: String,
    /// Io policy.
    pub io_policy: IoPolicy,
    /// Io bandwidth limits per disk, `fs` for the filesystem dial.
    pub io_bps_limit: UintMap,
    /// Io operation limits per disk.
    pub io_ops_limit: UintMap,
    /// Thread count limit; 0 is unlimited.
    pub thread_limit: u64,
    /// Resource limits by name.
    pub ulimits: BTreeMap<String, RlimitPair>,

    // isolation
    /// Entry command.
    pub command: String,
    /// Working directory; empty derives a default.
    pub cwd: String,
    /// Root path of the container filesystem.
    pub root: String,
    /// Mount the root read-only.
    pub root_ro: bool,
    /// File creation mask.
    pub umask: u32,
    /// Hostname inside the container.
    pub hostname: String,
    /// Bind host resolv.conf/hosts into the root.
    pub bind_dns: bool,
    /// Isolate pid/ipc namespaces from the parent.
    pub isolate: bool,
    /// Bind mounts.
    pub bind_mounts: Vec<BindMount>,
    /// Environment, ordered `NAME=value` entries.
    pub env: Vec<String>,
    /// Device access list.
    pub devices: Vec<DeviceSpec>,
    /// resolv.conf override lines.
    pub resolv_conf: Vec<String>,
    /// Stdin path.
    pub stdin_path: String,
    /// Stdout path.
    pub stdout_path: String,
    /// Stderr path.
    pub stderr_path: String,
    /// Stored stdout/stderr size limit [bytes].
    pub stdout_limit: u64,
    /// Bytes already rotated away from stored stdout.
    pub stdout_offset: u64,
    /// Bytes already rotated away from stored stderr.
    pub stderr_offset: u64,

    // network
    /// `net` directives, raw text.
    pub net_prop: Vec<String>,
    /// `ip` entries, raw text.
    pub ip_list: Vec<String>,
    /// `default_gw` entries, raw text.
    pub default_gw: Vec<String>,
    /// Network guarantee per interface [bytes/s].
    pub net_guarantee: UintMap,
    /// Network limit per interface [bytes/s].
    pub net_limit: UintMap,
    /// Network priority per interface, 0-7.
    pub net_priority: UintMap,
    /// Assigned traffic class id.
    pub container_tc: u32,

    // control
    /// Controllers the container is attached to.
    pub controllers: Controllers,
    /// Controllers some property requires.
    pub required_controllers: Controllers,

    // runtime ids
    /// Main task pid.
    pub task_pid: i32,
    /// Main task pid in its own namespace.
    pub task_vpid: i32,
    /// Pid waited on for exit.
    pub wait_task_pid: i32,
    /// Helper pid used for seizing an adopted task.
    pub seize_task_pid: i32,
    /// Loop device number backing the root; -1 for none.
    pub loop_dev: i32,

    prop_mask: u128,
    change_count: u64,
}

impl Container {
    fn new(name: String, parent: Option<ContainerId>, owner: Cred, defaults: &Defaults) -> Self {
        let base_caps = Capabilities::suid_mode();
        Self {
            name,
            parent,
            children: Vec::new(),
            ns_name: String::new(),
            state: ContainerState::Stopped,
            real_creation_time: Utc::now(),
            real_start_time: None,
            start_time_ms: 0,
            death_time_ms: 0,
            aging_time_ms: defaults.aging_time_ms,
            exit_status: 0,
            oom_killed: false,
            oom_is_fatal: true,
            to_respawn: false,
            max_respawns: -1,
            respawn_count: 0,
            is_weak: false,
            owner_cred: owner.clone(),
            task_cred: owner,
            access_level: AccessLevel::Normal,
            cap_limit: base_caps,
            cap_ambient: Capabilities::empty(),
            cap_allowed: base_caps,
            virt_mode: VirtMode::App,
            private: String::new(),
            mem_limit: 0,
            mem_guarantee: 0,
            current_mem_guarantee: 0,
            anon_mem_limit: 0,
            dirty_mem_limit: 0,
            hugetlb_limit: 0,
            recharge_on_pgfault: false,
            cpu_limit: defaults.cpu_limit,
            cpu_guarantee: 0.0,
            cpu_policy: CpuPolicy::Normal,
            sched: SchedAttrs::default(),
            cpu_set: String::new(),
            io_policy: IoPolicy::Normal,
            io_bps_limit: UintMap::new(),
            io_ops_limit: UintMap::new(),
            thread_limit: 0,
            ulimits: BTreeMap::new(),
            command: String::new(),
            cwd: String::new(),
            root: "/".to_string(),
            root_ro: false,
            umask: 0o002,
            hostname: String::new(),
            bind_dns: false,
            isolate: true,
            bind_mounts: Vec::new(),
            env: Vec::new(),
            devices: Vec::new(),
            resolv_conf: Vec::new(),
            stdin_path: String::new(),
            stdout_path: String::new(),
            stderr_path: String::new(),
            stdout_limit: defaults.stdout_limit,
            stdout_offset: 0,
            stderr_offset: 0,
            net_prop: vec!["inherited".to_string()],
            ip_list: Vec::new(),
            default_gw: Vec::new(),
            net_guarantee: UintMap::new(),
            net_limit: UintMap::new(),
            net_priority: UintMap::new(),
            container_tc: 0,
            controllers: Controllers::base(),
            required_controllers: Controllers::empty(),
            task_pid: 0,
            task_vpid: 0,
            wait_task_pid: 0,
            seize_task_pid: 0,
            loop_dev: -1,
            prop_mask: 0,
            change_count: 0,
        }
    }

    /// Whether this is the root container.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Mark a property explicitly set and bump the change counter.
    pub fn set_prop(&mut self, prop: PropId) {
        self.prop_mask |= prop.mask();
        self.change_count += 1;
    }

    /// Clear an explicitly-set mark.
    pub fn clear_prop(&mut self, prop: PropId) {
        self.prop_mask &= !prop.mask();
        self.change_count += 1;
    }

    /// Whether a property was ever explicitly set.
    #[must_use]
    pub const fn has_prop(&self, prop: PropId) -> bool {
        self.prop_mask & prop.mask() != 0
    }

    /// Number of record mutations, used by persistence to detect dirt.
    #[must_use]
    pub const fn change_count(&self) -> u64 {
        self.change_count
    }
}

/// Per-container defaults derived from config and host facts.
#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    /// Default aging time [ms].
    pub aging_time_ms: u64,
    /// Default stdout/stderr limit [bytes].
    pub stdout_limit: u64,
    /// Default cpu limit [cores].
    pub cpu_limit: f64,
}

/// Longest single name component.
pub const MAX_NAME_COMPONENT: usize = 128;
/// Longest full container path.
pub const MAX_NAME: usize = 1024;

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME {
        return Err(Error::InvalidValue(format!("invalid container name: {name}")));
    }
    for component in name.split('/') {
        if component.is_empty() || component.len() > MAX_NAME_COMPONENT {
            return Err(Error::InvalidValue(format!(
                "invalid container name component in: {name}"
            )));
        }
        if component == "." || component == ".." {
            return Err(Error::InvalidValue(format!(
                "invalid container name component in: {name}"
            )));
        }
        if !component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-.@:".contains(c))
        {
            return Err(Error::InvalidValue(format!(
                "forbidden character in container name: {name}"
            )));
        }
    }
    Ok(())
}

/// The arena of containers.
#[derive(Debug)]
pub struct ContainerTree {
    slots: Vec<Option<Container>>,
    by_name: BTreeMap<String, ContainerId>,
}

impl ContainerTree {
    /// Create a tree holding only the root container.
    #[must_use]
    pub fn new(defaults: &Defaults) -> Self {
        let mut root = Container::new("/".to_string(), None, Cred::new(0, 0), defaults);
        root.state = ContainerState::Meta;
        root.cap_limit = Capabilities::all();
        root.cap_allowed = Capabilities::all();
        let mut by_name = BTreeMap::new();
        by_name.insert("/".to_string(), ContainerId::ROOT);
        Self {
            slots: vec![Some(root)],
            by_name,
        }
    }

    /// Borrow a container by id.
    ///
    /// # Panics
    ///
    /// Panics on a stale id; ids never leave the engine, so a stale id is
    /// an engine bug.
    #[must_use]
    pub fn node(&self, id: ContainerId) -> &Container {
        self.slots[id.index()].as_ref().expect("stale container id")
    }

    /// Mutably borrow a container by id.
    ///
    /// # Panics
    ///
    /// Panics on a stale id, as [`Self::node`].
    pub fn node_mut(&mut self, id: ContainerId) -> &mut Container {
        self.slots[id.index()].as_mut().expect("stale container id")
    }

    /// Find a container by full name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] when no such container exists.
    pub fn find(&self, name: &str) -> Result<ContainerId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidValue(format!("container does not exist: {name}")))
    }

    /// Create a container under its named parent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for a bad name, a missing parent or
    /// a duplicate.
    pub fn create(&mut self, name: &str, owner: Cred, defaults: &Defaults) -> Result<ContainerId> {
        validate_name(name)?;
        if self.by_name.contains_key(name) {
            return Err(Error::InvalidValue(format!(
                "container already exists: {name}"
            )));
        }
        let parent_id = match name.rsplit_once('/') {
            Some((parent, _)) => self.find(parent).map_err(|_| {
                Error::InvalidValue(format!("parent container does not exist: {name}"))
            })?,
            None => ContainerId::ROOT,
        };

        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let id = ContainerId(u32::try_from(index).unwrap_or(u32::MAX));

        let ct = Container::new(name.to_string(), Some(parent_id), owner, defaults);
        self.slots[id.index()] = Some(ct);
        self.node_mut(parent_id).children.push(id);
        self.by_name.insert(name.to_string(), id);
        self.sanitize_capabilities(id);
        Ok(id)
    }

    /// Remove a container and its whole subtree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] when removing the root.
    pub fn remove(&mut self, id: ContainerId) -> Result<()> {
        let Some(parent) = self.node(id).parent else {
            return Err(Error::InvalidValue(
                "cannot remove the root container".to_string(),
            ));
        };
        let children = self.node(id).children.clone();
        for child in children {
            self.remove(child)?;
        }
        self.node_mut(parent).children.retain(|&c| c != id);
        let name = self.node(id).name.clone();
        self.by_name.remove(&name);
        self.slots[id.index()] = None;
        Ok(())
    }

    /// All container names in creation-stable sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    /// Number of live containers, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.len() <= 1
    }

    /// Iterator over the ancestors of a container, nearest first, root
    /// last.
    pub fn ancestors(&self, id: ContainerId) -> impl Iterator<Item = ContainerId> + '_ {
        let mut current = self.node(id).parent;
        std::iter::from_fn(move || {
            let next = current?;
            current = self.node(next).parent;
            Some(next)
        })
    }

    /// Containers running under a node, node included.
    #[must_use]
    pub fn running_in_subtree(&self, id: ContainerId) -> u64 {
        let mut count = u64::from(self.node(id).state == ContainerState::Running);
        for &child in &self.node(id).children {
            count += self.running_in_subtree(child);
        }
        count
    }

    /// Hierarchical memory guarantee: the pending guarantee of the node or
    /// the sum over its children, whichever is larger.
    #[must_use]
    pub fn hierarchy_mem_guarantee(&self, id: ContainerId) -> u64 {
        let sum: u64 = self
            .node(id)
            .children
            .iter()
            .map(|&c| self.hierarchy_mem_guarantee(c))
            .sum();
        self.node(id).current_mem_guarantee.max(sum)
    }

    /// Tightest memory limit on the path to the root; 0 when unlimited.
    #[must_use]
    pub fn hierarchy_mem_limit(&self, id: ContainerId) -> u64 {
        let mut limit = self.node(id).mem_limit;
        for anc in self.ancestors(id) {
            let anc_limit = self.node(anc).mem_limit;
            if anc_limit != 0 && (limit == 0 || anc_limit < limit) {
                limit = anc_limit;
            }
        }
        limit
    }

    /// Recompute the derived capability bound of a container and narrow
    /// its limit and ambient sets to it. Called after changes to the
    /// owner, the virtualization mode or the capability limit.
    pub fn sanitize_capabilities(&mut self, id: ContainerId) {
        let mut allowed = if self.node(id).owner_cred.is_root_user() {
            Capabilities::all()
        } else {
            match self.node(id).virt_mode {
                VirtMode::Os => Capabilities::os_mode(),
                VirtMode::App => Capabilities::suid_mode(),
            }
        };
        if !self.node(id).owner_cred.is_root_user() {
            for anc in self.ancestors(id).collect::<Vec<_>>() {
                if !self.node(anc).is_root() {
                    allowed &= self.node(anc).cap_limit;
                }
            }
        }

        let ct = self.node_mut(id);
        ct.cap_allowed = allowed;
        if !ct.has_prop(PropId::Capabilities) {
            ct.cap_limit = allowed;
        } else if !ct.cap_limit.is_subset(allowed) {
            tracing::warn!(name = %ct.name, "narrowing capabilities over the allowed bound");
            ct.cap_limit &= allowed;
        }
        if !ct.cap_ambient.is_subset(ct.cap_allowed) {
            ct.cap_ambient &= ct.cap_allowed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Defaults {
        Defaults {
            aging_time_ms: 86_400_000,
            stdout_limit: 8 << 20,
            cpu_limit: 4.0,
        }
    }

    fn tree_with(names: &[&str]) -> ContainerTree {
        let mut tree = ContainerTree::new(&defaults());
        for name in names {
            tree.create(name, Cred::new(1000, 1000), &defaults()).unwrap();
        }
        tree
    }

    #[test]
    fn test_create_and_find() {
        let tree = tree_with(&["a", "a/b", "a/b/c"]);
        assert_eq!(tree.len(), 4);
        let id = tree.find("a/b").unwrap();
        assert_eq!(tree.node(id).name, "a/b");
        assert!(tree.find("nope").is_err());
    }

    #[test]
    fn test_create_requires_parent() {
        let mut tree = ContainerTree::new(&defaults());
        assert!(tree.create("a/b", Cred::new(0, 0), &defaults()).is_err());
        tree.create("a", Cred::new(0, 0), &defaults()).unwrap();
        assert!(tree.create("a", Cred::new(0, 0), &defaults()).is_err());
        assert!(tree.create("a/b", Cred::new(0, 0), &defaults()).is_ok());
    }

    #[test]
    fn test_name_validation() {
        let mut tree = ContainerTree::new(&defaults());
        assert!(tree.create("ok-name_1.z@x", Cred::new(0, 0), &defaults()).is_ok());
        assert!(tree.create("bad name", Cred::new(0, 0), &defaults()).is_err());
        assert!(tree.create("..", Cred::new(0, 0), &defaults()).is_err());
        assert!(tree.create("", Cred::new(0, 0), &defaults()).is_err());
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = tree_with(&["a", "a/b", "a/b/c"]);
        let a = tree.find("a").unwrap();
        tree.remove(a).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.find("a/b/c").is_err());
        assert!(tree.remove(ContainerId::ROOT).is_err());
    }

    #[test]
    fn test_slot_reuse() {
        let mut tree = tree_with(&["a"]);
        let a = tree.find("a").unwrap();
        tree.remove(a).unwrap();
        let b = tree.create("b", Cred::new(0, 0), &defaults()).unwrap();
        assert_eq!(tree.node(b).name, "b");
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_ancestors_order() {
        let tree = tree_with(&["a", "a/b", "a/b/c"]);
        let c = tree.find("a/b/c").unwrap();
        let names: Vec<String> = tree
            .ancestors(c)
            .map(|id| tree.node(id).name.clone())
            .collect();
        assert_eq!(names, vec!["a/b", "a", "/"]);
    }

    #[test]
    fn test_prop_mask() {
        let mut tree = tree_with(&["a"]);
        let a = tree.find("a").unwrap();
        let ct = tree.node_mut(a);
        assert!(!ct.has_prop(PropId::MemLimit));
        ct.set_prop(PropId::MemLimit);
        assert!(ct.has_prop(PropId::MemLimit));
        ct.clear_prop(PropId::MemLimit);
        assert!(!ct.has_prop(PropId::MemLimit));
        assert_eq!(ct.change_count(), 2);
    }

    #[test]
    fn test_hierarchy_mem_guarantee_takes_max() {
        let mut tree = tree_with(&["a", "a/b", "a/c"]);
        let a = tree.find("a").unwrap();
        let b = tree.find("a/b").unwrap();
        let c = tree.find("a/c").unwrap();
        tree.node_mut(b).current_mem_guarantee = 3 << 30;
        tree.node_mut(c).current_mem_guarantee = 2 << 30;
        assert_eq!(tree.hierarchy_mem_guarantee(a), 5 << 30);
        tree.node_mut(a).current_mem_guarantee = 8 << 30;
        assert_eq!(tree.hierarchy_mem_guarantee(a), 8 << 30);
        assert_eq!(tree.hierarchy_mem_guarantee(ContainerId::ROOT), 8 << 30);
    }

    #[test]
    fn test_hierarchy_mem_limit_takes_tightest() {
        let mut tree = tree_with(&["a", "a/b"]);
        let a = tree.find("a").unwrap();
        let b = tree.find("a/b").unwrap();
        assert_eq!(tree.hierarchy_mem_limit(b), 0);
        tree.node_mut(a).mem_limit = 4 << 30;
        assert_eq!(tree.hierarchy_mem_limit(b), 4 << 30);
        tree.node_mut(b).mem_limit = 8 << 30;
        assert_eq!(tree.hierarchy_mem_limit(b), 4 << 30);
        tree.node_mut(b).mem_limit = 1 << 30;
        assert_eq!(tree.hierarchy_mem_limit(b), 1 << 30);
    }

    #[test]
    fn test_sanitize_narrows_to_ancestor_limit() {
        let mut tree = tree_with(&["a", "a/b"]);
        let a = tree.find("a").unwrap();
        let b = tree.find("a/b").unwrap();
        tree.node_mut(a).cap_limit = Capabilities::NET_ADMIN | Capabilities::KILL;
        tree.node_mut(a).set_prop(PropId::Capabilities);
        tree.sanitize_capabilities(b);
        assert!(tree
            .node(b)
            .cap_limit
            .is_subset(Capabilities::NET_ADMIN | Capabilities::KILL));
    }

    #[test]
    fn test_sanitize_root_owner_keeps_all() {
        let mut tree = ContainerTree::new(&defaults());
        tree.create("a", Cred::new(0, 0), &defaults()).unwrap();
        let a = tree.find("a").unwrap();
        tree.sanitize_capabilities(a);
        assert_eq!(tree.node(a).cap_allowed, Capabilities::all());
    }
}
