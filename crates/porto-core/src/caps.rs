//! Linux capability masks.
//!
//! Capability sets are plain bit masks with union/intersection arithmetic
//! and a `;`-separated textual form using the kernel capability names.
//! The engine keeps three per container: the limit, the ambient set and
//! the derived allowed set.

use bitflags::bitflags;

use crate::codec::{self, FlagName};
use crate::error::Result;

bitflags! {
    /// A set of Linux capabilities, one bit per `CAP_*` constant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u64 {
        const CHOWN = 1 << 0;
        const DAC_OVERRIDE = 1 << 1;
        const DAC_READ_SEARCH = 1 << 2;
        const FOWNER = 1 << 3;
        const FSETID = 1 << 4;
        const KILL = 1 << 5;
        const SETGID = 1 << 6;
        const SETUID = 1 << 7;
        const SETPCAP = 1 << 8;
        const LINUX_IMMUTABLE = 1 << 9;
        const NET_BIND_SERVICE = 1 << 10;
        const NET_BROADCAST = 1 << 11;
        const NET_ADMIN = 1 << 12;
        const NET_RAW = 1 << 13;
        const IPC_LOCK = 1 << 14;
        const IPC_OWNER = 1 << 15;
        const SYS_MODULE = 1 << 16;
        const SYS_RAWIO = 1 << 17;
        const SYS_CHROOT = 1 << 18;
        const SYS_PTRACE = 1 << 19;
        const SYS_PACCT = 1 << 20;
        const SYS_ADMIN = 1 << 21;
        const SYS_BOOT = 1 << 22;
        const SYS_NICE = 1 << 23;
        const SYS_RESOURCE = 1 << 24;
        const SYS_TIME = 1 << 25;
        const SYS_TTY_CONFIG = 1 << 26;
        const MKNOD = 1 << 27;
        const LEASE = 1 << 28;
        const AUDIT_WRITE = 1 << 29;
        const AUDIT_CONTROL = 1 << 30;
        const SETFCAP = 1 << 31;
        const MAC_OVERRIDE = 1 << 32;
        const MAC_ADMIN = 1 << 33;
        const SYSLOG = 1 << 34;
        const WAKE_ALARM = 1 << 35;
        const BLOCK_SUSPEND = 1 << 36;
        const AUDIT_READ = 1 << 37;
        const PERFMON = 1 << 38;
        const BPF = 1 << 39;
        const CHECKPOINT_RESTORE = 1 << 40;
    }
}

macro_rules! cap_names {
    ($($cap:ident),* $(,)?) => {
        &[$(FlagName { bits: Capabilities::$cap.bits(), name: stringify!($cap) }),*]
    };
}

/// Capability name table in bit order.
pub const CAP_NAMES: &[FlagName] = cap_names![
    CHOWN,
    DAC_OVERRIDE,
    DAC_READ_SEARCH,
    FOWNER,
    FSETID,
    KILL,
    SETGID,
    SETUID,
    SETPCAP,
    LINUX_IMMUTABLE,
    NET_BIND_SERVICE,
    NET_BROADCAST,
    NET_ADMIN,
    NET_RAW,
    IPC_LOCK,
    IPC_OWNER,
    SYS_MODULE,
    SYS_RAWIO,
    SYS_CHROOT,
    SYS_PTRACE,
    SYS_PACCT,
    SYS_ADMIN,
    SYS_BOOT,
    SYS_NICE,
    SYS_RESOURCE,
    SYS_TIME,
    SYS_TTY_CONFIG,
    MKNOD,
    LEASE,
    AUDIT_WRITE,
    AUDIT_CONTROL,
    SETFCAP,
    MAC_OVERRIDE,
    MAC_ADMIN,
    SYSLOG,
    WAKE_ALARM,
    BLOCK_SUSPEND,
    AUDIT_READ,
    PERFMON,
    BPF,
    CHECKPOINT_RESTORE,
];

impl Capabilities {
    /// Default capability set for `os` virtualization mode.
    #[must_use]
    pub const fn os_mode() -> Self {
        Self::CHOWN
            .union(Self::DAC_OVERRIDE)
            .union(Self::FOWNER)
            .union(Self::FSETID)
            .union(Self::KILL)
            .union(Self::SETGID)
            .union(Self::SETUID)
            .union(Self::SETPCAP)
            .union(Self::LINUX_IMMUTABLE)
            .union(Self::NET_BIND_SERVICE)
            .union(Self::NET_ADMIN)
            .union(Self::NET_RAW)
            .union(Self::IPC_LOCK)
            .union(Self::SYS_CHROOT)
            .union(Self::SYS_PTRACE)
            .union(Self::SYS_BOOT)
            .union(Self::SYS_NICE)
            .union(Self::SYS_RESOURCE)
            .union(Self::MKNOD)
            .union(Self::AUDIT_WRITE)
            .union(Self::SETFCAP)
    }

    /// Default capability set for `app` virtualization mode.
    #[must_use]
    pub const fn suid_mode() -> Self {
        Self::CHOWN
            .union(Self::DAC_OVERRIDE)
            .union(Self::FOWNER)
            .union(Self::FSETID)
            .union(Self::KILL)
            .union(Self::SETGID)
            .union(Self::SETUID)
            .union(Self::SETPCAP)
            .union(Self::NET_BIND_SERVICE)
            .union(Self::NET_RAW)
            .union(Self::IPC_LOCK)
            .union(Self::SYS_CHROOT)
            .union(Self::SYS_PTRACE)
            .union(Self::SYS_NICE)
            .union(Self::MKNOD)
            .union(Self::AUDIT_WRITE)
            .union(Self::SETFCAP)
    }

    /// Parse a `;`-separated list of capability names.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidValue`] for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(Self::from_bits_retain(codec::parse_flags(s, CAP_NAMES)?))
    }

    /// Format as `;`-separated names with residual bits in hex.
    #[must_use]
    pub fn format(self) -> String {
        codec::format_flags(self.bits(), CAP_NAMES)
    }

    /// Whether every capability in `self` is present in `other`.
    #[must_use]
    pub const fn is_subset(self, other: Self) -> bool {
        self.bits() & !other.bits() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let caps = Capabilities::parse("NET_ADMIN;SYS_ADMIN").unwrap();
        assert_eq!(caps, Capabilities::NET_ADMIN | Capabilities::SYS_ADMIN);
        assert_eq!(caps.format(), "NET_ADMIN;SYS_ADMIN");
    }

    #[test]
    fn test_parse_unknown_name() {
        assert!(Capabilities::parse("NET_ADMIN;NO_SUCH_CAP").is_err());
    }

    #[test]
    fn test_parse_empty_is_empty_set() {
        assert_eq!(Capabilities::parse("").unwrap(), Capabilities::empty());
        assert_eq!(Capabilities::empty().format(), "");
    }

    #[test]
    fn test_mode_sets_are_subsets_of_all() {
        assert!(Capabilities::os_mode().is_subset(Capabilities::all()));
        assert!(Capabilities::suid_mode().is_subset(Capabilities::os_mode()));
    }

    #[test]
    fn test_set_arithmetic() {
        let a = Capabilities::NET_ADMIN | Capabilities::KILL;
        let b = Capabilities::KILL | Capabilities::SYS_NICE;
        assert_eq!(a & b, Capabilities::KILL);
        assert_eq!(a | b, Capabilities::NET_ADMIN | Capabilities::KILL | Capabilities::SYS_NICE);
        assert!((a & !b).is_subset(a));
    }
}
