//! Property registry and dispatcher.
//!
//! Every container knob is a [`Property`]: a named handler with uniform
//! get/set/indexed-get/indexed-set, persistence and support-probing
//! entry points. Handlers register in an explicit build phase at daemon
//! start; afterwards the registry is immutable and every client mutation
//! funnels through [`Registry::set`].

mod identity;
mod isolation;
mod lifecycle;
mod network;
mod observe;
mod raw;
mod resource;

pub use resource::ulimit_resource;

use std::collections::BTreeMap;

use crate::cgroup::{CgroupBackend, Controllers};
use crate::codec::{self, UintMap};
use crate::config::Config;
use crate::container::{Container, ContainerId, ContainerTree, PropId};
use crate::cred::{Client, UserDb};
use crate::error::{Error, Result};
use crate::kernel::KernelFeatures;
use crate::net::NetBackend;
use crate::state::ContainerState;
use crate::stats::DaemonStats;
use crate::sysinfo::{Clock, SystemInfo};

/// Immutable descriptor of a property.
#[derive(Debug, Clone)]
pub struct Desc {
    /// Property name on the wire.
    pub name: &'static str,
    /// Persistence id; [`PropId::None`] for derived values.
    pub prop: PropId,
    /// One-line description shown to clients.
    pub help: &'static str,
    /// Rejects all writes.
    pub read_only: bool,
    /// Omitted from enumeration, still reachable by name.
    pub hidden: bool,
    /// Writable while the container runs.
    pub dynamic: bool,
    /// Backed by the running kernel; probed at startup.
    pub supported: bool,
}

impl Desc {
    /// New descriptor with the common defaults.
    #[must_use]
    pub const fn new(name: &'static str, prop: PropId, help: &'static str) -> Self {
        Self {
            name,
            prop,
            help,
            read_only: false,
            hidden: false,
            dynamic: false,
            supported: true,
        }
    }

    /// Mark read-only.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Mark hidden.
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Mark runtime-writable.
    #[must_use]
    pub const fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Mark permanently unsupported.
    #[must_use]
    pub const fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }
}

/// Per-request ambient state, passed explicitly into every handler.
pub struct Env<'a> {
    /// The acting client.
    pub client: &'a Client,
    /// Daemon config.
    pub config: &'a Config,
    /// Kernel feature probe results.
    pub features: &'a KernelFeatures,
    /// Host facts.
    pub sys: &'a SystemInfo,
    /// Cgroup statistics backend.
    pub cgroups: &'a dyn CgroupBackend,
    /// Network backend.
    pub network: &'a dyn NetBackend,
    /// Engine clock.
    pub clock: &'a dyn Clock,
    /// Daemon counters.
    pub stats: &'a DaemonStats,
    /// User/group database.
    pub users: &'a dyn UserDb,
    /// Trusted restore path: state gates and permission checks pass.
    pub restoring: bool,
}

/// Read-only view of one container for a get.
pub struct View<'a> {
    /// The container tree, read-locked by the engine.
    pub tree: &'a ContainerTree,
    /// Target container.
    pub id: ContainerId,
    /// Request environment.
    pub env: &'a Env<'a>,
}

impl View<'_> {
    /// The target container record.
    #[must_use]
    pub fn ct(&self) -> &Container {
        self.tree.node(self.id)
    }

    /// Gate for values that exist only while the container runs.
    pub fn gate_running(&self, prop: &str) -> Result<()> {
        if self.ct().state == ContainerState::Stopped {
            return Err(Error::InvalidState(format!(
                "not available in stopped state: {prop}"
            )));
        }
        Ok(())
    }

    /// Gate for values that exist only after death.
    pub fn gate_dead(&self, prop: &str) -> Result<()> {
        if !self.ct().state.is_dead() {
            return Err(Error::InvalidState(format!(
                "available only in dead state: {prop}"
            )));
        }
        Ok(())
    }
}

/// Mutable view of one container for a set.
pub struct ViewMut<'a> {
    /// The container tree, write-locked by the engine.
    pub tree: &'a mut ContainerTree,
    /// Target container.
    pub id: ContainerId,
    /// Request environment.
    pub env: &'a Env<'a>,
}

impl ViewMut<'_> {
    /// The target container record.
    #[must_use]
    pub fn ct(&self) -> &Container {
        self.tree.node(self.id)
    }

    /// The target container record, mutably.
    pub fn ct_mut(&mut self) -> &mut Container {
        self.tree.node_mut(self.id)
    }

    /// Reborrow as a read-only view.
    #[must_use]
    pub fn view(&self) -> View<'_> {
        View {
            tree: self.tree,
            id: self.id,
            env: self.env,
        }
    }

    /// Gate for properties mutable only before start.
    pub fn gate_stopped(&self, prop: &str) -> Result<()> {
        if self.env.restoring {
            return Ok(());
        }
        match self.ct().state {
            ContainerState::Dead => Err(Error::InvalidState(format!(
                "cannot change property while in the dead state: {prop}"
            ))),
            ContainerState::Stopped => Ok(()),
            _ => Err(Error::InvalidState(format!(
                "cannot change property in runtime: {prop}"
            ))),
        }
    }

    /// Gate for dynamic properties, mutable until death.
    pub fn gate_alive(&self, prop: &str) -> Result<()> {
        if self.env.restoring {
            return Ok(());
        }
        if self.ct().state.is_dead() {
            return Err(Error::InvalidState(format!(
                "cannot change property while in the dead state: {prop}"
            )));
        }
        Ok(())
    }

    /// Record a controller requirement.
    ///
    /// Before start the controllers are simply attached; afterwards the
    /// attachment is frozen and a missing controller is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] when the container already runs
    /// without one of the controllers.
    pub fn want_controllers(&mut self, mask: Controllers) -> Result<()> {
        if mask.is_empty() {
            return Ok(());
        }
        let restoring = self.env.restoring;
        let ct = self.ct_mut();
        if restoring || ct.state.is_stopped() {
            ct.controllers |= mask;
            ct.required_controllers |= mask;
            return Ok(());
        }
        if ct.controllers.contains(mask) {
            ct.required_controllers |= mask;
            return Ok(());
        }
        Err(Error::NotSupported(format!(
            "cannot enable controllers at runtime: {}",
            mask.format()
        )))
    }
}

/// A container property handler.
///
/// One implementation per property; the registry owns the set. Handlers
/// are stateless apart from their descriptor, whose `supported` flag the
/// startup probe may clear.
pub trait Property: Send + Sync {
    /// Descriptor of this property.
    fn desc(&self) -> &Desc;

    /// Probe kernel support once at registry build time.
    fn init(&mut self, features: &KernelFeatures) {
        let _ = features;
    }

    /// Serialize the current value.
    fn get(&self, view: View<'_>) -> Result<String>;

    /// Parse, validate and apply a new value.
    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        let _ = (view, value);
        Err(Error::NotSupported(format!(
            "not implemented: {}",
            self.desc().name
        )))
    }

    /// Read one sub-key of an indexed property.
    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        let _ = (view, index);
        Err(Error::InvalidValue(format!(
            "invalid subscript for property: {}",
            self.desc().name
        )))
    }

    /// Write one sub-key of an indexed property.
    fn set_indexed(&self, view: &mut ViewMut<'_>, index: &str, value: &str) -> Result<()> {
        let _ = (view, index, value);
        Err(Error::InvalidValue(format!(
            "invalid subscript for property: {}",
            self.desc().name
        )))
    }

    /// Serialize for persistence. The dispatcher has already rejected
    /// non-persistable properties.
    fn get_to_save(&self, view: View<'_>) -> Result<String> {
        self.get(view)
    }

    /// Apply a persisted record. Parsing is still validated; state and
    /// permission checks pass because the environment is trusted.
    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        self.set(view, value)
    }
}

/// Split the `name[index]` request syntax.
#[must_use]
pub fn parse_property_name(request: &str) -> (&str, Option<&str>) {
    if let Some(open) = request.find('[') {
        if let Some(rest) = request[open + 1..].strip_suffix(']') {
            return (&request[..open], Some(rest));
        }
    }
    (request, None)
}

/// The property registry: name-ordered handler map.
pub struct Registry {
    props: BTreeMap<&'static str, Box<dyn Property>>,
}

impl Registry {
    /// Construct every handler and run the kernel support probes.
    #[must_use]
    pub fn build(features: &KernelFeatures) -> Self {
        let mut all: Vec<Box<dyn Property>> = Vec::new();
        identity::register(&mut all);
        resource::register(&mut all);
        isolation::register(&mut all);
        network::register(&mut all);
        lifecycle::register(&mut all);
        observe::register(&mut all);
        raw::register(&mut all);

        let mut props = BTreeMap::new();
        for mut prop in all {
            prop.init(features);
            let name = prop.desc().name;
            props.insert(name, prop);
        }
        tracing::debug!(count = props.len(), "property registry built");
        Self { props }
    }

    fn find(&self, name: &str) -> Result<&dyn Property> {
        self.props
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| Error::InvalidProperty(format!("unknown container property: {name}")))
    }

    fn find_supported(&self, name: &str) -> Result<&dyn Property> {
        let prop = self.find(name)?;
        if !prop.desc().supported {
            return Err(Error::NotSupported(format!("not supported: {name}")));
        }
        Ok(prop)
    }

    /// Descriptors of all properties, hidden ones on request.
    #[must_use]
    pub fn list(&self, include_hidden: bool) -> Vec<&Desc> {
        self.props
            .values()
            .map(|p| p.desc())
            .filter(|d| include_hidden || !d.hidden)
            .collect()
    }

    /// Serialize a property value.
    ///
    /// # Errors
    ///
    /// Any of the error kinds a handler may raise.
    pub fn get(
        &self,
        tree: &ContainerTree,
        id: ContainerId,
        env: &Env<'_>,
        name: &str,
    ) -> Result<String> {
        let prop = self.find_supported(name)?;
        prop.get(View { tree, id, env })
    }

    /// Serialize one sub-key of an indexed property.
    ///
    /// # Errors
    ///
    /// Any of the error kinds a handler may raise.
    pub fn get_indexed(
        &self,
        tree: &ContainerTree,
        id: ContainerId,
        env: &Env<'_>,
        name: &str,
        index: &str,
    ) -> Result<String> {
        let prop = self.find_supported(name)?;
        prop.get_indexed(View { tree, id, env }, index)
    }

    /// Parse, validate and apply a property value. Atomic: on error the
    /// container is unchanged.
    ///
    /// # Errors
    ///
    /// Any of the error kinds a handler may raise.
    pub fn set(
        &self,
        tree: &mut ContainerTree,
        id: ContainerId,
        env: &Env<'_>,
        name: &str,
        value: &str,
    ) -> Result<()> {
        let prop = self.find_supported(name)?;
        if prop.desc().read_only {
            return Err(Error::InvalidValue(format!("read-only value: {name}")));
        }
        prop.set(&mut ViewMut { tree, id, env }, value)
    }

    /// Read-modify-write one sub-key of an indexed property.
    ///
    /// # Errors
    ///
    /// Any of the error kinds a handler may raise.
    pub fn set_indexed(
        &self,
        tree: &mut ContainerTree,
        id: ContainerId,
        env: &Env<'_>,
        name: &str,
        index: &str,
        value: &str,
    ) -> Result<()> {
        let prop = self.find_supported(name)?;
        if prop.desc().read_only {
            return Err(Error::InvalidValue(format!("read-only value: {name}")));
        }
        prop.set_indexed(&mut ViewMut { tree, id, env }, index, value)
    }

    /// Serialize a property for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unknown`] for non-persistable properties.
    pub fn get_to_save(
        &self,
        tree: &ContainerTree,
        id: ContainerId,
        env: &Env<'_>,
        name: &str,
    ) -> Result<String> {
        let prop = self.find(name)?;
        if prop.desc().prop == PropId::None {
            return Err(Error::Unknown(format!(
                "trying to save non-serializable value: {name}"
            )));
        }
        prop.get_to_save(View { tree, id, env })
    }

    /// Apply a persisted record, bypassing permission and state checks
    /// but still validating the parse.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unknown`] for non-persistable properties, or the
    /// handler's parse error.
    pub fn set_from_restore(
        &self,
        tree: &mut ContainerTree,
        id: ContainerId,
        env: &Env<'_>,
        name: &str,
        value: &str,
    ) -> Result<()> {
        let prop = self.find(name)?;
        let prop_id = prop.desc().prop;
        if prop_id == PropId::None {
            return Err(Error::Unknown(format!(
                "trying to restore non-serializable value: {name}"
            )));
        }
        prop.set_from_restore(&mut ViewMut { tree, id, env }, value)?;
        tree.node_mut(id).set_prop(prop_id);
        Ok(())
    }

    /// Emit the persistence records of one container: every property with
    /// a persistence id the container has explicitly set.
    #[must_use]
    pub fn save_records(
        &self,
        tree: &ContainerTree,
        id: ContainerId,
        env: &Env<'_>,
    ) -> Vec<(String, String)> {
        let mut records = Vec::new();
        for (name, prop) in &self.props {
            let prop_id = prop.desc().prop;
            if prop_id == PropId::None || !tree.node(id).has_prop(prop_id) {
                continue;
            }
            match prop.get_to_save(View { tree, id, env }) {
                Ok(value) => records.push(((*name).to_string(), value)),
                Err(err) => {
                    tracing::warn!(property = name, %err, "skipping unsaveable property");
                }
            }
        }
        records
    }
}

// =============================================================================
// Shared handler shapes
// =============================================================================

/// Boolean property over one record field.
pub(crate) struct BoolProp {
    desc: Desc,
    required: Controllers,
    support: Option<fn(&KernelFeatures) -> bool>,
    read: fn(&Container) -> bool,
    write: fn(&mut Container, bool),
}

impl BoolProp {
    pub(crate) fn new(
        desc: Desc,
        required: Controllers,
        support: Option<fn(&KernelFeatures) -> bool>,
        read: fn(&Container) -> bool,
        write: fn(&mut Container, bool),
    ) -> Box<Self> {
        Box::new(Self {
            desc,
            required,
            support,
            read,
            write,
        })
    }
}

impl Property for BoolProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        if let Some(support) = self.support {
            self.desc.supported = support(features);
        }
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::format_bool((self.read)(view.ct())).to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        if self.desc.dynamic {
            view.gate_alive(self.desc.name)?;
        } else {
            view.gate_stopped(self.desc.name)?;
        }
        let parsed = codec::parse_bool(value)?;
        view.want_controllers(self.required)?;
        (self.write)(view.ct_mut(), parsed);
        view.ct_mut().set_prop(self.desc.prop);
        Ok(())
    }
}

/// Size property over one `u64` record field.
pub(crate) struct SizeProp {
    desc: Desc,
    required: Controllers,
    support: Option<fn(&KernelFeatures) -> bool>,
    read: fn(&Container) -> u64,
    write: fn(&mut Container, u64),
}

impl SizeProp {
    pub(crate) fn new(
        desc: Desc,
        required: Controllers,
        support: Option<fn(&KernelFeatures) -> bool>,
        read: fn(&Container) -> u64,
        write: fn(&mut Container, u64),
    ) -> Box<Self> {
        Box::new(Self {
            desc,
            required,
            support,
            read,
            write,
        })
    }
}

impl Property for SizeProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        if let Some(support) = self.support {
            self.desc.supported = support(features);
        }
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok((self.read)(view.ct()).to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        if self.desc.dynamic {
            view.gate_alive(self.desc.name)?;
        } else {
            view.gate_stopped(self.desc.name)?;
        }
        let parsed = codec::parse_size(value)?;
        view.want_controllers(self.required)?;
        if (self.read)(view.ct()) != parsed {
            (self.write)(view.ct_mut(), parsed);
            view.ct_mut().set_prop(self.desc.prop);
        }
        Ok(())
    }
}

/// Plain string property over one record field, mutable while stopped.
pub(crate) struct StrProp {
    desc: Desc,
    read: fn(&Container) -> &str,
    write: fn(&mut Container, String),
}

impl StrProp {
    pub(crate) fn new(
        desc: Desc,
        read: fn(&Container) -> &str,
        write: fn(&mut Container, String),
    ) -> Box<Self> {
        Box::new(Self { desc, read, write })
    }
}

impl Property for StrProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok((self.read)(view.ct()).to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped(self.desc.name)?;
        (self.write)(view.ct_mut(), value.to_string());
        view.ct_mut().set_prop(self.desc.prop);
        Ok(())
    }
}

/// Per-interface uint map property, runtime-writable and indexed.
pub(crate) struct UintMapProp {
    desc: Desc,
    required: Controllers,
    max_value: Option<u64>,
    read: fn(&Container) -> &UintMap,
    write: fn(&mut Container) -> &mut UintMap,
}

impl UintMapProp {
    pub(crate) fn new(
        desc: Desc,
        required: Controllers,
        max_value: Option<u64>,
        read: fn(&Container) -> &UintMap,
        write: fn(&mut Container) -> &mut UintMap,
    ) -> Box<Self> {
        Box::new(Self {
            desc,
            required,
            max_value,
            read,
            write,
        })
    }

    fn check_value(&self, value: u64) -> Result<()> {
        if let Some(max) = self.max_value {
            if value > max {
                return Err(Error::InvalidValue(format!(
                    "value out of range for {}: {value}",
                    self.desc.name
                )));
            }
        }
        Ok(())
    }
}

impl Property for UintMapProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::format_uint_map((self.read)(view.ct())))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        (self.read)(view.ct())
            .get(index)
            .map(ToString::to_string)
            .ok_or_else(|| Error::InvalidValue(format!("invalid index: {index}")))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive(self.desc.name)?;
        let parsed = codec::parse_uint_map(value)?;
        for entry in parsed.values() {
            self.check_value(*entry)?;
        }
        view.want_controllers(self.required)?;
        *(self.write)(view.ct_mut()) = parsed;
        view.ct_mut().set_prop(self.desc.prop);
        Ok(())
    }

    fn set_indexed(&self, view: &mut ViewMut<'_>, index: &str, value: &str) -> Result<()> {
        view.gate_alive(self.desc.name)?;
        if value.is_empty() {
            view.want_controllers(self.required)?;
            (self.write)(view.ct_mut()).remove(index);
            view.ct_mut().set_prop(self.desc.prop);
            return Ok(());
        }
        let parsed = codec::parse_size(value)
            .map_err(|_| Error::InvalidValue(format!("invalid value: {value}")))?;
        self.check_value(parsed)?;
        view.want_controllers(self.required)?;
        (self.write)(view.ct_mut()).insert(index.to_string(), parsed);
        view.ct_mut().set_prop(self.desc.prop);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property_name() {
        assert_eq!(parse_property_name("memory_limit"), ("memory_limit", None));
        assert_eq!(parse_property_name("env[PATH]"), ("env", Some("PATH")));
        assert_eq!(parse_property_name("a[b][c]"), ("a", Some("b][c")));
        assert_eq!(parse_property_name("odd["), ("odd[", None));
    }

    #[test]
    fn test_registry_is_name_sorted_and_complete() {
        let registry = Registry::build(&KernelFeatures::all());
        let all = registry.list(true);
        let mut names: Vec<&str> = all.iter().map(|d| d.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.len() > 80, "expected full schema, got {}", names.len());

        names.retain(|n| *n == "memory_limit" || *n == "capabilities" || *n == "state");
        assert_eq!(names, vec!["capabilities", "memory_limit", "state"]);
    }

    #[test]
    fn test_hidden_properties_are_listed_on_request() {
        let registry = Registry::build(&KernelFeatures::all());
        let public = registry.list(false);
        let full = registry.list(true);
        assert!(public.len() < full.len());
        assert!(full.iter().any(|d| d.name == "raw_root_pid"));
        assert!(!public.iter().any(|d| d.name == "raw_root_pid"));
    }
}
