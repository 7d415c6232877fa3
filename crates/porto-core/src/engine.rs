//! The engine façade.
//!
//! Owns the container tree behind one read-write lock, the immutable
//! property registry and the collaborator backends. Every external
//! request enters here: container lifecycle, property access,
//! persistence and supervisor callbacks.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::cgroup::CgroupBackend;
use crate::config::Config;
use crate::container::{ContainerId, ContainerTree, Defaults, PropId};
use crate::cred::{Client, SystemUsers, UserDb};
use crate::error::{Error, Result};
use crate::kernel::KernelFeatures;
use crate::net::NetBackend;
use crate::property::{parse_property_name, Desc, Env, Registry};
use crate::state::ContainerState;
use crate::stats::DaemonStats;
use crate::sysinfo::{Clock, SystemClock, SystemInfo};
use crate::{cgroup::NoCgroups, net::NoNetwork};

/// Pids of a freshly started container task.
#[derive(Debug, Clone, Copy)]
pub struct TaskPids {
    /// Host pid of the main task.
    pub pid: i32,
    /// Pid inside the container's namespace.
    pub vpid: i32,
    /// Pid the supervisor waits on.
    pub wait_pid: i32,
}

/// Builder for [`Engine`], in the crate's usual builder shape.
pub struct EngineBuilder {
    config: Config,
    features: Option<KernelFeatures>,
    sys: Option<SystemInfo>,
    cgroups: Box<dyn CgroupBackend>,
    network: Box<dyn NetBackend>,
    clock: Box<dyn Clock>,
    users: Box<dyn UserDb>,
}

impl EngineBuilder {
    fn new() -> Self {
        Self {
            config: Config::default(),
            features: None,
            sys: None,
            cgroups: Box::new(NoCgroups),
            network: Box::new(NoNetwork),
            clock: Box::new(SystemClock::new()),
            users: Box::new(SystemUsers),
        }
    }

    /// Set the daemon config.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set probed kernel features instead of probing the host.
    #[must_use]
    pub fn features(mut self, features: KernelFeatures) -> Self {
        self.features = Some(features);
        self
    }

    /// Set host facts instead of sampling the host.
    #[must_use]
    pub fn sysinfo(mut self, sys: SystemInfo) -> Self {
        self.sys = Some(sys);
        self
    }

    /// Set the cgroup statistics backend.
    #[must_use]
    pub fn cgroups(mut self, cgroups: impl CgroupBackend + 'static) -> Self {
        self.cgroups = Box::new(cgroups);
        self
    }

    /// Set the network backend.
    #[must_use]
    pub fn network(mut self, network: impl NetBackend + 'static) -> Self {
        self.network = Box::new(network);
        self
    }

    /// Set the clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Set the user database.
    #[must_use]
    pub fn users(mut self, users: impl UserDb + 'static) -> Self {
        self.users = Box::new(users);
        self
    }

    /// Probe what was not injected, build the registry and the tree.
    #[must_use]
    pub fn build(self) -> Engine {
        let features = self.features.unwrap_or_else(KernelFeatures::probe);
        let sys = self.sys.unwrap_or_else(SystemInfo::detect);
        let registry = Registry::build(&features);
        let defaults = Defaults {
            aging_time_ms: self.config.aging_time_default_ms,
            stdout_limit: self.config.stdout_limit_default,
            cpu_limit: sys.num_cores as f64,
        };
        Engine {
            registry,
            tree: RwLock::new(ContainerTree::new(&defaults)),
            defaults,
            config: self.config,
            features,
            sys,
            cgroups: self.cgroups,
            network: self.network,
            clock: self.clock,
            users: self.users,
            stats: DaemonStats::new(),
        }
    }
}

/// The container property and state engine.
pub struct Engine {
    registry: Registry,
    tree: RwLock<ContainerTree>,
    defaults: Defaults,
    config: Config,
    features: KernelFeatures,
    sys: SystemInfo,
    cgroups: Box<dyn CgroupBackend>,
    network: Box<dyn NetBackend>,
    clock: Box<dyn Clock>,
    users: Box<dyn UserDb>,
    stats: DaemonStats,
}

impl Engine {
    /// Start building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Engine with host-probed features and no live backends.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::builder().config(config).build()
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, ContainerTree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, ContainerTree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn env<'a>(&'a self, client: &'a Client, restoring: bool) -> Env<'a> {
        Env {
            client,
            config: &self.config,
            features: &self.features,
            sys: &self.sys,
            cgroups: self.cgroups.as_ref(),
            network: self.network.as_ref(),
            clock: self.clock.as_ref(),
            stats: &self.stats,
            users: self.users.as_ref(),
            restoring,
        }
    }

    /// Daemon counters.
    #[must_use]
    pub const fn stats(&self) -> &DaemonStats {
        &self.stats
    }

    /// Property descriptors for enumeration requests.
    #[must_use]
    pub fn properties(&self, include_hidden: bool) -> Vec<Desc> {
        self.registry
            .list(include_hidden)
            .into_iter()
            .cloned()
            .collect()
    }

    /// All container names.
    #[must_use]
    pub fn containers(&self) -> Vec<String> {
        self.read_tree().names()
    }

    // =========================================================================
    // Container lifecycle
    // =========================================================================

    /// Create a container owned by the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for bad names, missing parents or
    /// duplicates.
    pub fn create_container(&self, name: &str, client: &Client) -> Result<()> {
        let mut tree = self.write_tree();
        tree.create(name, client.cred.clone(), &self.defaults)?;
        DaemonStats::bump(&self.stats.created);
        tracing::info!(container = name, uid = client.cred.uid, "container created");
        Ok(())
    }

    /// Destroy a container and its subtree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`] when the client does not control the
    /// container owner.
    pub fn destroy_container(&self, name: &str, client: &Client) -> Result<()> {
        let mut tree = self.write_tree();
        let id = tree.find(name)?;
        client.can_control(&tree.node(id).owner_cred)?;
        tree.remove(id)?;
        tracing::info!(container = name, "container destroyed");
        Ok(())
    }

    /// Remove dead containers whose aging time has passed.
    #[must_use]
    pub fn remove_aged(&self) -> Vec<String> {
        let mut tree = self.write_tree();
        let now = self.clock.now_ms();
        let aged: Vec<ContainerId> = tree
            .names()
            .iter()
            .filter_map(|name| tree.find(name).ok())
            .filter(|&id| {
                let ct = tree.node(id);
                ct.state.is_dead() && now.saturating_sub(ct.death_time_ms) >= ct.aging_time_ms
            })
            .collect();
        let mut removed = Vec::new();
        for id in aged {
            let name = tree.node(id).name.clone();
            if tree.remove(id).is_ok() {
                DaemonStats::bump(&self.stats.remove_dead);
                removed.push(name);
            }
        }
        removed
    }

    // =========================================================================
    // Property access
    // =========================================================================

    /// Read a property; `request` may carry an `[index]` suffix.
    ///
    /// # Errors
    ///
    /// Any of the property error kinds.
    pub fn get_property(&self, name: &str, request: &str, client: &Client) -> Result<String> {
        let (prop, index) = parse_property_name(request);
        let env = self.env(client, false);
        let tree = self.read_tree();
        let id = tree.find(name)?;
        let result = match index {
            Some(index) => self.registry.get_indexed(&tree, id, &env, prop, index),
            None => self.registry.get(&tree, id, &env, prop),
        };
        if result.is_err() {
            DaemonStats::bump(&self.stats.errors);
        }
        result
    }

    /// Write a property; `request` may carry an `[index]` suffix. Atomic:
    /// on error the container is unchanged.
    ///
    /// # Errors
    ///
    /// Any of the property error kinds.
    pub fn set_property(
        &self,
        name: &str,
        request: &str,
        value: &str,
        client: &Client,
    ) -> Result<()> {
        let (prop, index) = parse_property_name(request);
        let env = self.env(client, false);
        let mut tree = self.write_tree();
        let id = tree.find(name)?;
        let result = if tree.node(id).is_root() {
            Err(Error::Permission(
                "cannot modify properties of the root container".to_string(),
            ))
        } else if let Err(err) = client.can_control(&tree.node(id).owner_cred) {
            Err(err)
        } else {
            match index {
                Some(index) => self
                    .registry
                    .set_indexed(&mut tree, id, &env, prop, index, value),
                None => self.registry.set(&mut tree, id, &env, prop, value),
            }
        };
        if result.is_err() {
            DaemonStats::bump(&self.stats.errors);
        }
        result
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Persistence records of one container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown containers.
    pub fn save_container(&self, name: &str) -> Result<Vec<(String, String)>> {
        let client = Client::superuser();
        let env = self.env(&client, false);
        let tree = self.read_tree();
        let id = tree.find(name)?;
        Ok(self.registry.save_records(&tree, id, &env))
    }

    /// Serialize one property for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unknown`] for non-persistable properties.
    pub fn save_property(&self, name: &str, prop: &str) -> Result<String> {
        let client = Client::superuser();
        let env = self.env(&client, false);
        let tree = self.read_tree();
        let id = tree.find(name)?;
        self.registry.get_to_save(&tree, id, &env, prop)
    }

    /// Re-create a container from persisted records.
    ///
    /// Records are applied through the trusted restore path; a bad record
    /// aborts the restore and removes the half-built container.
    ///
    /// # Errors
    ///
    /// Creation errors, or the first record error.
    pub fn restore_container(&self, name: &str, records: &[(String, String)]) -> Result<()> {
        let client = Client::superuser();
        let env = self.env(&client, true);
        let mut tree = self.write_tree();
        let id = tree.create(name, client.cred.clone(), &self.defaults)?;

        for (prop, value) in records {
            if let Err(err) = self
                .registry
                .set_from_restore(&mut tree, id, &env, prop, value)
            {
                tracing::error!(container = name, property = %prop, %err, "restore failed");
                DaemonStats::bump(&self.stats.restore_failed);
                let _ = tree.remove(id);
                return Err(err);
            }
        }

        let guarantee = tree.node(id).mem_guarantee;
        tree.node_mut(id).current_mem_guarantee = guarantee;
        tree.sanitize_capabilities(id);
        tracing::info!(container = name, records = records.len(), "container restored");
        Ok(())
    }

    // =========================================================================
    // Supervisor callbacks
    // =========================================================================

    /// Force a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown containers.
    pub fn set_state(&self, name: &str, state: ContainerState) -> Result<()> {
        let mut tree = self.write_tree();
        let id = tree.find(name)?;
        let ct = tree.node_mut(id);
        ct.state = state;
        ct.set_prop(PropId::State);
        Ok(())
    }

    /// Record a started task: pids, start times, running state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown containers.
    pub fn on_start(&self, name: &str, pids: TaskPids) -> Result<()> {
        let mut tree = self.write_tree();
        let id = tree.find(name)?;
        let now = self.clock.now_ms();
        let ct = tree.node_mut(id);
        ct.task_pid = pids.pid;
        ct.task_vpid = pids.vpid;
        ct.wait_task_pid = pids.wait_pid;
        ct.start_time_ms = now;
        ct.real_start_time = Some(Utc::now());
        ct.state = ContainerState::Running;
        ct.set_prop(PropId::RootPid);
        ct.set_prop(PropId::StartTime);
        ct.set_prop(PropId::State);
        DaemonStats::bump(&self.stats.started);
        DaemonStats::bump(&self.stats.spawned);
        Ok(())
    }

    /// Record a task exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown containers.
    pub fn on_exit(&self, name: &str, exit_status: i32, oom_killed: bool) -> Result<()> {
        let mut tree = self.write_tree();
        let id = tree.find(name)?;
        let now = self.clock.now_ms();
        let ct = tree.node_mut(id);
        ct.exit_status = exit_status;
        ct.oom_killed = oom_killed;
        ct.death_time_ms = now;
        ct.state = ContainerState::Dead;
        ct.set_prop(PropId::ExitStatus);
        ct.set_prop(PropId::OomKilled);
        ct.set_prop(PropId::DeathTime);
        ct.set_prop(PropId::State);
        Ok(())
    }

    /// Record a full stop: runtime state is cleared, configuration stays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown containers.
    pub fn on_stop(&self, name: &str) -> Result<()> {
        let mut tree = self.write_tree();
        let id = tree.find(name)?;
        let ct = tree.node_mut(id);
        ct.state = ContainerState::Stopped;
        ct.task_pid = 0;
        ct.task_vpid = 0;
        ct.wait_task_pid = 0;
        ct.seize_task_pid = 0;
        ct.exit_status = 0;
        ct.oom_killed = false;
        ct.start_time_ms = 0;
        ct.death_time_ms = 0;
        ct.real_start_time = None;
        ct.stdout_offset = 0;
        ct.stderr_offset = 0;
        ct.clear_prop(PropId::RootPid);
        ct.clear_prop(PropId::SeizePid);
        ct.clear_prop(PropId::StartTime);
        ct.clear_prop(PropId::DeathTime);
        ct.clear_prop(PropId::ExitStatus);
        ct.clear_prop(PropId::OomKilled);
        ct.set_prop(PropId::State);
        Ok(())
    }

    /// Record a respawn performed by the supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown containers.
    pub fn on_respawn(&self, name: &str) -> Result<()> {
        let mut tree = self.write_tree();
        let id = tree.find(name)?;
        let ct = tree.node_mut(id);
        ct.respawn_count += 1;
        ct.set_prop(PropId::RespawnCount);
        DaemonStats::bump(&self.stats.spawned);
        Ok(())
    }

    /// Assign the traffic class id the network layer picked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown containers.
    pub fn assign_net_class(&self, name: &str, classid: u32) -> Result<()> {
        let mut tree = self.write_tree();
        let id = tree.find(name)?;
        tree.node_mut(id).container_tc = classid;
        Ok(())
    }
}
