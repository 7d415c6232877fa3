//! Identity and permission properties.

use crate::caps::Capabilities;
use crate::codec;
use crate::container::{AccessLevel, PropId, VirtMode};
use crate::cred::{group_to_string, user_to_string};
use crate::error::{Error, Result};
use crate::kernel::KernelFeatures;

use super::{Desc, Property, View, ViewMut};

pub(super) fn register(out: &mut Vec<Box<dyn Property>>) {
    out.push(Box::new(UserProp));
    out.push(Box::new(GroupProp));
    out.push(Box::new(OwnerUserProp));
    out.push(Box::new(OwnerGroupProp));
    out.push(Box::new(VirtModeProp));
    out.push(Box::new(EnablePortoProp));
    out.push(Box::new(CapLimitProp {
        desc: Desc::new(
            "capabilities",
            PropId::Capabilities,
            "limit capabilities in container: SYS_ADMIN;NET_ADMIN;... see man capabilities",
        ),
    }));
    out.push(Box::new(CapAmbientProp {
        desc: Desc::new(
            "capabilities_ambient",
            PropId::CapabilitiesAmbient,
            "raise capabilities in container: NET_BIND_SERVICE;SYS_PTRACE;...",
        ),
    }));
    out.push(Box::new(PrivateProp));
}

/// Commit a new capability limit, shared by `capabilities` and the
/// auto-raise path of `capabilities_ambient`.
fn commit_cap_limit(view: &mut ViewMut<'_>, limit: Capabilities) -> Result<()> {
    view.gate_stopped("capabilities")?;

    let client = view.env.client;
    let mut bound = if client.is_super_user() {
        Capabilities::all()
    } else if view.ct().virt_mode == VirtMode::Os {
        Capabilities::os_mode()
    } else {
        Capabilities::suid_mode()
    };

    // the root user may allow anything inside containers it owns
    if !(client.is_super_user() && view.ct().owner_cred.is_root_user()) {
        for anc in view.tree.ancestors(view.id).collect::<Vec<_>>() {
            if !view.tree.node(anc).is_root() {
                bound &= view.tree.node(anc).cap_limit;
            }
        }
    }

    if !limit.is_subset(bound) && !view.env.restoring {
        return Err(Error::Permission(format!(
            "not allowed capability: {}, you can set only: {}",
            (limit & !bound).format(),
            bound.format()
        )));
    }

    view.ct_mut().cap_limit = limit;
    view.ct_mut().set_prop(PropId::Capabilities);
    view.tree.sanitize_capabilities(view.id);
    Ok(())
}

fn commit_cap_ambient(view: &mut ViewMut<'_>, ambient: Capabilities) -> Result<()> {
    view.gate_stopped("capabilities_ambient")?;

    let allowed = view.ct().cap_allowed;
    if !ambient.is_subset(allowed)
        && !view.env.client.is_super_user()
        && !view.env.restoring
    {
        return Err(Error::Permission(format!(
            "not allowed ambient capability: {}, you can set only: {}",
            (ambient & !allowed).format(),
            allowed.format()
        )));
    }

    // raise the capability limit if the ambient set outgrew it
    if !ambient.is_subset(view.ct().cap_limit) {
        let limit = view.ct().cap_limit | ambient;
        commit_cap_limit(view, limit)?;
    }

    view.ct_mut().cap_ambient = ambient;
    view.ct_mut().set_prop(PropId::CapabilitiesAmbient);
    view.tree.sanitize_capabilities(view.id);
    Ok(())
}

struct CapLimitProp {
    desc: Desc,
}

impl Property for CapLimitProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().cap_limit.format())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        commit_cap_limit(view, Capabilities::parse(value)?)
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        let caps = Capabilities::parse(index)?;
        Ok(codec::format_bool(caps.is_subset(view.ct().cap_limit)).to_string())
    }

    fn set_indexed(&self, view: &mut ViewMut<'_>, index: &str, value: &str) -> Result<()> {
        let caps = Capabilities::parse(index)?;
        let enable = codec::parse_bool(value)?;
        let limit = if enable {
            view.ct().cap_limit | caps
        } else {
            view.ct().cap_limit & !caps
        };
        commit_cap_limit(view, limit)
    }
}

struct CapAmbientProp {
    desc: Desc,
}

impl Property for CapAmbientProp {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn init(&mut self, features: &KernelFeatures) {
        self.desc.supported = features.ambient_caps;
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().cap_ambient.format())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        commit_cap_ambient(view, Capabilities::parse(value)?)
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        let caps = Capabilities::parse(index)?;
        Ok(codec::format_bool(caps.is_subset(view.ct().cap_ambient)).to_string())
    }

    fn set_indexed(&self, view: &mut ViewMut<'_>, index: &str, value: &str) -> Result<()> {
        let caps = Capabilities::parse(index)?;
        let enable = codec::parse_bool(value)?;
        let ambient = if enable {
            view.ct().cap_ambient | caps
        } else {
            view.ct().cap_ambient & !caps
        };
        commit_cap_ambient(view, ambient)
    }
}

struct UserProp;

impl Property for UserProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("user", PropId::User, "start command with given user");
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(user_to_string(view.env.users, view.ct().task_cred.uid))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("user")?;
        let client = view.env.client;
        let old_gid = view.ct().task_cred.gid;
        let mut cred = client.resolve_user(view.env.users, value, old_gid)?;

        // the current group survives the switch when the new user holds it
        if cred.is_member_of(old_gid) {
            cred.gid = old_gid;
        }

        if !view.env.restoring {
            client.can_control(&cred)?;
        }

        view.ct_mut().task_cred = cred;
        view.ct_mut().set_prop(PropId::User);
        Ok(())
    }
}

struct GroupProp;

impl Property for GroupProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("group", PropId::Group, "start command with given group");
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(group_to_string(view.env.users, view.ct().task_cred.gid))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("group")?;
        let client = view.env.client;
        let gid = client.resolve_group(view.env.users, value)?;
        if !view.env.restoring
            && !view.ct().task_cred.is_member_of(gid)
            && !client.cred.is_member_of(gid)
            && !client.is_super_user()
        {
            return Err(Error::Permission(format!(
                "desired group {value} is not in the user supplementary group list"
            )));
        }
        view.ct_mut().task_cred.gid = gid;
        view.ct_mut().set_prop(PropId::Group);
        Ok(())
    }
}

struct OwnerUserProp;

impl Property for OwnerUserProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("owner_user", PropId::OwnerUser, "container owner user");
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(user_to_string(view.env.users, view.ct().owner_cred.uid))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("owner_user")?;
        let client = view.env.client;
        let old_gid = view.ct().owner_cred.gid;
        let mut cred = client.resolve_user(view.env.users, value, old_gid)?;
        if cred.is_member_of(old_gid) {
            cred.gid = old_gid;
        }
        if !view.env.restoring {
            client.can_control(&cred)?;
        }
        view.ct_mut().owner_cred = cred;
        view.ct_mut().set_prop(PropId::OwnerUser);
        view.tree.sanitize_capabilities(view.id);
        Ok(())
    }
}

struct OwnerGroupProp;

impl Property for OwnerGroupProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("owner_group", PropId::OwnerGroup, "container owner group");
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(group_to_string(view.env.users, view.ct().owner_cred.gid))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("owner_group")?;
        let client = view.env.client;
        let gid = client.resolve_group(view.env.users, value)?;
        if !view.env.restoring
            && !view.ct().owner_cred.is_member_of(gid)
            && !client.cred.is_member_of(gid)
            && !client.is_super_user()
        {
            return Err(Error::Permission(format!(
                "desired group {value} is not in the owner supplementary group list"
            )));
        }
        view.ct_mut().owner_cred.gid = gid;
        view.ct_mut().set_prop(PropId::OwnerGroup);
        Ok(())
    }
}

struct VirtModeProp;

impl Property for VirtModeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("virt_mode", PropId::VirtMode, "virtualization mode: os|app");
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().virt_mode.as_str().to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("virt_mode")?;
        let mode = match value {
            "app" => VirtMode::App,
            "os" => VirtMode::Os,
            _ => {
                return Err(Error::InvalidValue(format!(
                    "unsupported virt_mode: {value}"
                )))
            }
        };
        view.ct_mut().virt_mode = mode;
        view.ct_mut().set_prop(PropId::VirtMode);
        view.tree.sanitize_capabilities(view.id);
        Ok(())
    }
}

struct EnablePortoProp;

impl Property for EnablePortoProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "enable_porto",
            PropId::EnablePorto,
            "daemon access level: false | read-only | child-only | true (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().access_level.as_str().to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("enable_porto")?;
        let level = AccessLevel::parse(value)?;
        if level > AccessLevel::ChildOnly
            && !view.env.client.is_super_user()
            && !view.env.restoring
        {
            for anc in view.tree.ancestors(view.id).collect::<Vec<_>>() {
                if view.tree.node(anc).access_level < AccessLevel::ChildOnly {
                    return Err(Error::Permission(
                        "parent container has access lower than child".to_string(),
                    ));
                }
            }
        }
        view.ct_mut().access_level = level;
        view.ct_mut().set_prop(PropId::EnablePorto);
        Ok(())
    }
}

struct PrivateProp;

impl Property for PrivateProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "private",
            PropId::Private,
            "user-defined property (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().private.clone())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("private")?;
        if value.len() > view.env.config.private_max {
            return Err(Error::InvalidValue("value is too long".to_string()));
        }
        view.ct_mut().private = value.to_string();
        view.ct_mut().set_prop(PropId::Private);
        Ok(())
    }
}
