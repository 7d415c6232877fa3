//! Credentials and the acting client.
//!
//! Resolves user and group names through a pluggable database, tests
//! group membership and answers the "may this client control that user"
//! question every owner-changing property asks.

use crate::error::{Error, Result};

/// A resolved user identity: uid, primary gid and supplementary groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cred {
    /// User id.
    pub uid: u32,
    /// Primary group id.
    pub gid: u32,
    /// Supplementary groups, primary included.
    pub groups: Vec<u32>,
}

impl Cred {
    /// Build a credential from raw ids with no supplementary groups.
    #[must_use]
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            groups: vec![gid],
        }
    }

    /// Whether this is the root user.
    #[must_use]
    pub const fn is_root_user(&self) -> bool {
        self.uid == 0
    }

    /// Whether `gid` is the primary or a supplementary group.
    #[must_use]
    pub fn is_member_of(&self, gid: u32) -> bool {
        self.gid == gid || self.groups.contains(&gid)
    }
}

/// User/group database the credential model resolves names through.
///
/// Production uses [`SystemUsers`]; tests inject [`StaticUsers`].
pub trait UserDb: Send + Sync {
    /// Resolve a user name to a full credential.
    fn find_user(&self, name: &str) -> Option<Cred>;

    /// Name of a uid, if the database knows it.
    fn user_name(&self, uid: u32) -> Option<String>;

    /// Resolve a group name to its gid.
    fn find_group(&self, name: &str) -> Option<u32>;

    /// Name of a gid, if the database knows it.
    fn group_name(&self, gid: u32) -> Option<String>;
}

/// Database backed by the system passwd/group files.
#[derive(Debug, Default)]
pub struct SystemUsers;

impl UserDb for SystemUsers {
    fn find_user(&self, name: &str) -> Option<Cred> {
        let user = nix::unistd::User::from_name(name).ok().flatten()?;
        let uid = user.uid.as_raw();
        let gid = user.gid.as_raw();
        let cname = std::ffi::CString::new(name).ok()?;
        let groups = nix::unistd::getgrouplist(&cname, user.gid)
            .map(|gids| gids.iter().map(|g| g.as_raw()).collect())
            .unwrap_or_else(|_| vec![gid]);
        Some(Cred { uid, gid, groups })
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
            .ok()
            .flatten()
            .map(|u| u.name)
    }

    fn find_group(&self, name: &str) -> Option<u32> {
        nix::unistd::Group::from_name(name)
            .ok()
            .flatten()
            .map(|g| g.gid.as_raw())
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        nix::unistd::Group::from_gid(nix::unistd::Gid::from_raw(gid))
            .ok()
            .flatten()
            .map(|g| g.name)
    }
}

/// Fixed in-memory database for tests and embedders.
#[derive(Debug, Default)]
pub struct StaticUsers {
    users: Vec<(String, Cred)>,
    groups: Vec<(String, u32)>,
}

impl StaticUsers {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with its supplementary groups.
    #[must_use]
    pub fn user(mut self, name: &str, uid: u32, gid: u32, groups: &[u32]) -> Self {
        let mut all = vec![gid];
        all.extend_from_slice(groups);
        self.users.push((
            name.to_string(),
            Cred {
                uid,
                gid,
                groups: all,
            },
        ));
        self
    }

    /// Add a group.
    #[must_use]
    pub fn group(mut self, name: &str, gid: u32) -> Self {
        self.groups.push((name.to_string(), gid));
        self
    }
}

impl UserDb for StaticUsers {
    fn find_user(&self, name: &str) -> Option<Cred> {
        self.users
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        self.users
            .iter()
            .find(|(_, c)| c.uid == uid)
            .map(|(n, _)| n.clone())
    }

    fn find_group(&self, name: &str) -> Option<u32> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, gid)| gid)
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        self.groups
            .iter()
            .find(|&&(_, g)| g == gid)
            .map(|(n, _)| n.clone())
    }
}

/// The client a request acts on behalf of.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client credentials taken from the connection.
    pub cred: Cred,
    /// Client pid, used by pid-translation getters.
    pub pid: u32,
    /// Membership in the daemon admin group grants the set-uid/gid
    /// privilege: numeric ids without database entries and control over
    /// foreign users in the client's subtree.
    pub may_set_ids: bool,
}

impl Client {
    /// A superuser client.
    #[must_use]
    pub fn superuser() -> Self {
        Self {
            cred: Cred::new(0, 0),
            pid: 0,
            may_set_ids: true,
        }
    }

    /// A regular unprivileged client.
    #[must_use]
    pub fn regular(cred: Cred, pid: u32) -> Self {
        Self {
            cred,
            pid,
            may_set_ids: false,
        }
    }

    /// Whether the client is the root user.
    #[must_use]
    pub const fn is_super_user(&self) -> bool {
        self.cred.uid == 0
    }

    /// Check that this client may hand containers to `target`.
    ///
    /// Succeeds for superusers, for the client's own uid, and for any uid
    /// when the client holds the set-uid/gid privilege.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`] otherwise.
    pub fn can_control(&self, target: &Cred) -> Result<()> {
        if self.is_super_user() || self.cred.uid == target.uid || self.may_set_ids {
            return Ok(());
        }
        Err(Error::Permission(format!(
            "client uid {} cannot control uid {}",
            self.cred.uid, target.uid
        )))
    }

    /// Resolve a user name or, for privileged clients, a bare numeric id.
    ///
    /// The gid of a numeric id without a database entry is taken from
    /// `fallback_gid`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] when the name cannot be resolved.
    pub fn resolve_user(&self, db: &dyn UserDb, name: &str, fallback_gid: u32) -> Result<Cred> {
        if let Some(cred) = db.find_user(name) {
            return Ok(cred);
        }
        if self.may_set_ids || self.is_super_user() {
            if let Ok(uid) = name.parse::<u32>() {
                return Ok(Cred::new(uid, fallback_gid));
            }
        }
        Err(Error::InvalidValue(format!("cannot find user: {name}")))
    }

    /// Resolve a group name or, for privileged clients, a bare numeric id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] when the name cannot be resolved.
    pub fn resolve_group(&self, db: &dyn UserDb, name: &str) -> Result<u32> {
        if let Some(gid) = db.find_group(name) {
            return Ok(gid);
        }
        if self.may_set_ids || self.is_super_user() {
            if let Ok(gid) = name.parse::<u32>() {
                return Ok(gid);
            }
        }
        Err(Error::InvalidValue(format!("cannot find group: {name}")))
    }
}

/// Format a uid for clients: name when known, the raw id otherwise.
#[must_use]
pub fn user_to_string(db: &dyn UserDb, uid: u32) -> String {
    db.user_name(uid).unwrap_or_else(|| uid.to_string())
}

/// Format a gid for clients: name when known, the raw id otherwise.
#[must_use]
pub fn group_to_string(db: &dyn UserDb, gid: u32) -> String {
    db.group_name(gid).unwrap_or_else(|| gid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> StaticUsers {
        StaticUsers::new()
            .user("alice", 1000, 1000, &[2000])
            .user("bob", 1001, 1001, &[])
            .group("staff", 2000)
    }

    #[test]
    fn test_membership() {
        let alice = db().find_user("alice").unwrap();
        assert!(alice.is_member_of(1000));
        assert!(alice.is_member_of(2000));
        assert!(!alice.is_member_of(3000));
    }

    #[test]
    fn test_can_control() {
        let alice = Client::regular(db().find_user("alice").unwrap(), 1);
        assert!(alice.can_control(&Cred::new(1000, 1000)).is_ok());
        assert!(alice.can_control(&Cred::new(1001, 1001)).is_err());
        assert!(Client::superuser().can_control(&Cred::new(1001, 1001)).is_ok());
    }

    #[test]
    fn test_numeric_ids_need_privilege() {
        let users = db();
        let alice = Client::regular(users.find_user("alice").unwrap(), 1);
        assert!(alice.resolve_user(&users, "4242", 0).is_err());

        let root = Client::superuser();
        let cred = root.resolve_user(&users, "4242", 7).unwrap();
        assert_eq!(cred.uid, 4242);
        assert_eq!(cred.gid, 7);
        assert_eq!(root.resolve_group(&users, "4242").unwrap(), 4242);
    }

    #[test]
    fn test_name_formatting_falls_back_to_id() {
        let users = db();
        assert_eq!(user_to_string(&users, 1000), "alice");
        assert_eq!(user_to_string(&users, 9999), "9999");
        assert_eq!(group_to_string(&users, 2000), "staff");
    }
}
