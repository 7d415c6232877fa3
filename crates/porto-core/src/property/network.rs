//! Network configuration properties.

use crate::cgroup::Controllers;
use crate::codec;
use crate::container::PropId;
use crate::error::{Error, Result};
use crate::net::{validate_addr_entry, validate_net_config};

use super::{Desc, Property, UintMapProp, View, ViewMut};

pub(super) fn register(out: &mut Vec<Box<dyn Property>>) {
    out.push(Box::new(NetProp));
    out.push(Box::new(IpProp));
    out.push(Box::new(DefaultGwProp));
    out.push(UintMapProp::new(
        Desc::new(
            "net_guarantee",
            PropId::NetGuarantee,
            "guaranteed network bandwidth: <interface>|default: <Bps>;... (dynamic)",
        )
        .dynamic(),
        Controllers::NET_CLS,
        None,
        |ct| &ct.net_guarantee,
        |ct| &mut ct.net_guarantee,
    ));
    out.push(UintMapProp::new(
        Desc::new(
            "net_limit",
            PropId::NetLimit,
            "maximum network bandwidth: <interface>|default: <Bps>;... (dynamic)",
        )
        .dynamic(),
        Controllers::NET_CLS,
        None,
        |ct| &ct.net_limit,
        |ct| &mut ct.net_limit,
    ));
    out.push(UintMapProp::new(
        Desc::new(
            "net_priority",
            PropId::NetPrio,
            "network priority: <interface>|default: 0-7;... (dynamic)",
        )
        .dynamic(),
        Controllers::NET_CLS,
        Some(7),
        |ct| &ct.net_priority,
        |ct| &mut ct.net_priority,
    ));
    out.push(Box::new(NetTosProp));
}

struct NetProp;

impl Property for NetProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "net",
            PropId::Net,
            "container network settings: \
             none | inherited | steal <if> | container <name> | \
             macvlan <master> <if> [bridge|private|vepa|passthru] [mtu] [hw] | \
             ipvlan <master> <if> [l2|l3] [mtu] | veth <if> <bridge> [mtu] [hw] | \
             L3 <if> [master] | NAT [if] | MTU <if> <mtu> | autoconf <if> | netns <name>",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::merge_escaped(&view.ct().net_prop, ';'))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("net")?;
        let lines = codec::split_escaped(value, ';');
        validate_net_config(&lines)?;
        view.ct_mut().net_prop = lines;
        view.ct_mut().set_prop(PropId::Net);
        Ok(())
    }
}

struct IpProp;

impl Property for IpProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "ip",
            PropId::Ip,
            "ip configuration: <interface> <ip>/<prefix>;...",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::merge_escaped(&view.ct().ip_list, ';'))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("ip")?;
        let lines = codec::split_escaped(value, ';');
        for line in &lines {
            validate_addr_entry(line, true)?;
        }
        view.ct_mut().ip_list = lines;
        view.ct_mut().set_prop(PropId::Ip);
        Ok(())
    }
}

struct DefaultGwProp;

impl Property for DefaultGwProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "default_gw",
            PropId::DefaultGw,
            "default gateway: <interface> <ip>;...",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::merge_escaped(&view.ct().default_gw, ';'))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("default_gw")?;
        let lines = codec::split_escaped(value, ';');
        for line in &lines {
            validate_addr_entry(line, false)?;
        }
        view.ct_mut().default_gw = lines;
        view.ct_mut().set_prop(PropId::DefaultGw);
        Ok(())
    }
}

/// Declared in the schema but never implemented by any kernel the daemon
/// supports.
struct NetTosProp;

impl Property for NetTosProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("net_tos", PropId::NetTos, "IP TOS")
            .read_only()
            .hidden()
            .unsupported();
        &DESC
    }

    fn get(&self, _view: View<'_>) -> Result<String> {
        Err(Error::NotSupported("not supported: net_tos".to_string()))
    }
}
