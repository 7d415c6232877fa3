//! Network configuration grammar and the network backend.
//!
//! The `net` property takes `;`-separated directives describing how the
//! container gets its network; the engine validates them and stores the
//! raw text. Live device lists and counters come from [`NetBackend`].

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A parsed `net` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetDirective {
    /// No networking at all.
    None,
    /// Share the parent's namespace (the default).
    Inherited,
    /// Move a host interface into the container.
    Steal {
        /// Host interface name.
        device: String,
    },
    /// Join another container's network namespace.
    Container {
        /// Target container name.
        name: String,
    },
    /// New macvlan on a host master device.
    Macvlan {
        /// Host master device.
        master: String,
        /// Interface name inside the container.
        device: String,
        /// Bridge mode: `bridge`, `private`, `vepa` or `passthru`.
        mode: Option<String>,
        /// Optional mtu.
        mtu: Option<u32>,
        /// Optional hardware address.
        hw: Option<String>,
    },
    /// New ipvlan on a host master device.
    Ipvlan {
        /// Host master device.
        master: String,
        /// Interface name inside the container.
        device: String,
        /// `l2` or `l3`.
        mode: Option<String>,
        /// Optional mtu.
        mtu: Option<u32>,
    },
    /// Veth pair with one end enslaved to a host bridge.
    Veth {
        /// Interface name inside the container.
        device: String,
        /// Host bridge.
        bridge: String,
        /// Optional mtu.
        mtu: Option<u32>,
        /// Optional hardware address.
        hw: Option<String>,
    },
    /// L3 routed interface.
    L3 {
        /// Interface name inside the container.
        device: String,
        /// Optional host master device.
        master: Option<String>,
    },
    /// NAT through the host.
    Nat {
        /// Optional interface name.
        device: Option<String>,
    },
    /// Override the mtu of a configured interface.
    Mtu {
        /// Interface name.
        device: String,
        /// New mtu.
        mtu: u32,
    },
    /// Enable SLAAC autoconfiguration on an interface.
    Autoconf {
        /// Interface name.
        device: String,
    },
    /// Join a named network namespace.
    NetNs {
        /// Namespace name.
        name: String,
    },
}

const MACVLAN_MODES: &[&str] = &["bridge", "private", "vepa", "passthru"];
const IPVLAN_MODES: &[&str] = &["l2", "l3"];

fn parse_mtu(token: &str) -> Result<u32> {
    token
        .parse()
        .map_err(|_| Error::InvalidValue(format!("invalid mtu: {token}")))
}

fn need(tokens: &[&str], at: usize, what: &str, line: &str) -> Result<String> {
    tokens
        .get(at)
        .map(|s| (*s).to_string())
        .ok_or_else(|| Error::InvalidValue(format!("missing {what} in net directive: {line}")))
}

impl NetDirective {
    /// Parse one directive line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for unknown directives, missing
    /// arguments or malformed numbers.
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&kind) = tokens.first() else {
            return Err(Error::InvalidValue("empty net directive".to_string()));
        };
        let parsed = match kind {
            "none" => Self::None,
            "inherited" => Self::Inherited,
            "steal" | "host" => Self::Steal {
                device: need(&tokens, 1, "interface", line)?,
            },
            "container" => Self::Container {
                name: need(&tokens, 1, "container name", line)?,
            },
            "macvlan" => {
                let master = need(&tokens, 1, "master", line)?;
                let device = need(&tokens, 2, "interface", line)?;
                let mode = match tokens.get(3) {
                    Some(&m) if MACVLAN_MODES.contains(&m) => Some(m.to_string()),
                    Some(&m) => {
                        return Err(Error::InvalidValue(format!("invalid macvlan mode: {m}")))
                    }
                    Option::None => Option::None,
                };
                Self::Macvlan {
                    master,
                    device,
                    mode,
                    mtu: tokens.get(4).map(|t| parse_mtu(t)).transpose()?,
                    hw: tokens.get(5).map(|s| (*s).to_string()),
                }
            }
            "ipvlan" => {
                let master = need(&tokens, 1, "master", line)?;
                let device = need(&tokens, 2, "interface", line)?;
                let mode = match tokens.get(3) {
                    Some(&m) if IPVLAN_MODES.contains(&m) => Some(m.to_string()),
                    Some(&m) => {
                        return Err(Error::InvalidValue(format!("invalid ipvlan mode: {m}")))
                    }
                    Option::None => Option::None,
                };
                Self::Ipvlan {
                    master,
                    device,
                    mode,
                    mtu: tokens.get(4).map(|t| parse_mtu(t)).transpose()?,
                }
            }
            "veth" => Self::Veth {
                device: need(&tokens, 1, "interface", line)?,
                bridge: need(&tokens, 2, "bridge", line)?,
                mtu: tokens.get(3).map(|t| parse_mtu(t)).transpose()?,
                hw: tokens.get(4).map(|s| (*s).to_string()),
            },
            "L3" => Self::L3 {
                device: need(&tokens, 1, "interface", line)?,
                master: tokens.get(2).map(|s| (*s).to_string()),
            },
            "NAT" => Self::Nat {
                device: tokens.get(1).map(|s| (*s).to_string()),
            },
            "MTU" => Self::Mtu {
                device: need(&tokens, 1, "interface", line)?,
                mtu: parse_mtu(&need(&tokens, 2, "mtu", line)?)?,
            },
            "autoconf" => Self::Autoconf {
                device: need(&tokens, 1, "interface", line)?,
            },
            "netns" => Self::NetNs {
                name: need(&tokens, 1, "namespace", line)?,
            },
            other => {
                return Err(Error::InvalidValue(format!(
                    "unknown net directive: {other}"
                )))
            }
        };
        Ok(parsed)
    }
}

/// Validate a full `net` property value.
///
/// `none` and `inherited` are exclusive with interface-creating
/// directives.
///
/// # Errors
///
/// Returns [`Error::InvalidValue`] on any malformed directive or an
/// inconsistent combination.
pub fn validate_net_config(lines: &[String]) -> Result<Vec<NetDirective>> {
    let directives = lines
        .iter()
        .map(|l| NetDirective::parse(l))
        .collect::<Result<Vec<_>>>()?;
    let exclusive = directives
        .iter()
        .filter(|d| matches!(d, NetDirective::None | NetDirective::Inherited))
        .count();
    if exclusive > 0 && directives.len() > 1 {
        return Err(Error::InvalidValue(
            "none/inherited excludes other net directives".to_string(),
        ));
    }
    Ok(directives)
}

/// Validate an `ip` or `default_gw` entry: `<interface> <address>`.
///
/// # Errors
///
/// Returns [`Error::InvalidValue`] on a malformed pair or address.
pub fn validate_addr_entry(line: &str, with_prefix: bool) -> Result<()> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [_iface, addr] = tokens.as_slice() else {
        return Err(Error::InvalidValue(format!(
            "expected <interface> <address>: {line}"
        )));
    };
    let ip_part = if with_prefix {
        let (ip, prefix) = addr.split_once('/').unwrap_or((*addr, ""));
        if !prefix.is_empty() && prefix.parse::<u8>().map_or(true, |p| p > 128) {
            return Err(Error::InvalidValue(format!("invalid prefix: {addr}")));
        }
        ip
    } else {
        addr
    };
    ip_part
        .parse::<std::net::IpAddr>()
        .map_err(|_| Error::InvalidValue(format!("invalid address: {addr}")))?;
    Ok(())
}

/// Format a tc class id as `major:minor` in hex, e.g. `0x10002` → `1:2`.
#[must_use]
pub fn format_tc_class(classid: u32) -> String {
    format!("{:x}:{:x}", classid >> 16, classid & 0xffff)
}

/// One host network device as the network layer sees it.
#[derive(Debug, Clone)]
pub struct NetDevice {
    /// Interface name.
    pub name: String,
    /// Whether the daemon manages traffic classes on it.
    pub managed: bool,
}

/// Per-device counter families exposed as read-only properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetStatKind {
    /// Tx bytes through the container class.
    Bytes,
    /// Tx packets through the container class.
    Packets,
    /// Tx drops in the container class.
    Drops,
    /// Tx overlimits in the container class.
    Overlimits,
    /// Device rx bytes.
    RxBytes,
    /// Device rx packets.
    RxPackets,
    /// Device rx drops.
    RxDrops,
    /// Device tx bytes.
    TxBytes,
    /// Device tx packets.
    TxPackets,
    /// Device tx drops.
    TxDrops,
}

/// Live network state: device list and per-container counters.
pub trait NetBackend: Send + Sync {
    /// Host device list.
    fn devices(&self) -> Vec<NetDevice>;

    /// Per-interface counters of one kind for a container.
    fn stat(&self, name: &str, kind: NetStatKind) -> Result<BTreeMap<String, u64>>;
}

/// Backend used when no network layer is attached.
#[derive(Debug, Default)]
pub struct NoNetwork;

impl NetBackend for NoNetwork {
    fn devices(&self) -> Vec<NetDevice> {
        Vec::new()
    }

    fn stat(&self, _name: &str, _kind: NetStatKind) -> Result<BTreeMap<String, u64>> {
        Err(Error::Unknown("network backend not available".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_directives() {
        assert_eq!(NetDirective::parse("none").unwrap(), NetDirective::None);
        assert_eq!(
            NetDirective::parse("inherited").unwrap(),
            NetDirective::Inherited
        );
        assert_eq!(
            NetDirective::parse("steal eth1").unwrap(),
            NetDirective::Steal {
                device: "eth1".into()
            }
        );
        assert_eq!(
            NetDirective::parse("MTU eth0 9000").unwrap(),
            NetDirective::Mtu {
                device: "eth0".into(),
                mtu: 9000
            }
        );
    }

    #[test]
    fn test_parse_macvlan() {
        let d = NetDirective::parse("macvlan eth0 eth0 bridge 1500").unwrap();
        assert_eq!(
            d,
            NetDirective::Macvlan {
                master: "eth0".into(),
                device: "eth0".into(),
                mode: Some("bridge".into()),
                mtu: Some(1500),
                hw: None,
            }
        );
        assert!(NetDirective::parse("macvlan eth0 eth0 sideways").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_and_incomplete() {
        assert!(NetDirective::parse("teleport eth0").is_err());
        assert!(NetDirective::parse("steal").is_err());
        assert!(NetDirective::parse("MTU eth0 soup").is_err());
    }

    #[test]
    fn test_validate_exclusive_none() {
        let ok = validate_net_config(&["veth eth0 br0".into()]);
        assert!(ok.is_ok());
        let bad = validate_net_config(&["none".into(), "veth eth0 br0".into()]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_validate_addr_entry() {
        assert!(validate_addr_entry("eth0 192.168.1.2/24", true).is_ok());
        assert!(validate_addr_entry("eth0 fe80::1", false).is_ok());
        assert!(validate_addr_entry("eth0", true).is_err());
        assert!(validate_addr_entry("eth0 not-an-ip", true).is_err());
        assert!(validate_addr_entry("eth0 10.0.0.1/99", true).is_err());
    }

    #[test]
    fn test_format_tc_class() {
        assert_eq!(format_tc_class(0x0001_0002), "1:2");
        assert_eq!(format_tc_class(0x000a_00ff), "a:ff");
    }
}
