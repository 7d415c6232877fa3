//! Isolation and execution environment properties.

use crate::cgroup::Controllers;
use crate::codec;
use crate::container::{BindMount, DeviceSpec, PropId};
use crate::error::{Error, Result};

use super::{BoolProp, Desc, Property, StrProp, View, ViewMut};

pub(super) fn register(out: &mut Vec<Box<dyn Property>>) {
    out.push(StrProp::new(
        Desc::new(
            "command",
            PropId::Command,
            "command executed upon container start",
        ),
        |ct| &ct.command,
        |ct, v| ct.command = v,
    ));
    out.push(StrProp::new(
        Desc::new("cwd", PropId::Cwd, "container working directory"),
        |ct| &ct.cwd,
        |ct, v| ct.cwd = v,
    ));
    out.push(StrProp::new(
        Desc::new(
            "root",
            PropId::Root,
            "container root directory (the task is chrooted into it)",
        ),
        |ct| &ct.root,
        |ct, v| ct.root = v,
    ));
    out.push(BoolProp::new(
        Desc::new(
            "root_readonly",
            PropId::RootRdOnly,
            "mount root directory in read-only mode",
        ),
        Controllers::empty(),
        None,
        |ct| ct.root_ro,
        |ct, v| ct.root_ro = v,
    ));
    out.push(Box::new(UmaskProp));
    out.push(StrProp::new(
        Desc::new("hostname", PropId::Hostname, "container hostname"),
        |ct| &ct.hostname,
        |ct, v| ct.hostname = v,
    ));
    out.push(BoolProp::new(
        Desc::new(
            "bind_dns",
            PropId::BindDns,
            "bind resolv.conf and hosts from host into container root",
        ),
        Controllers::empty(),
        None,
        |ct| ct.bind_dns,
        |ct, v| ct.bind_dns = v,
    ));
    out.push(BoolProp::new(
        Desc::new("isolate", PropId::Isolate, "isolate container from parent"),
        Controllers::empty(),
        None,
        |ct| ct.isolate,
        |ct, v| ct.isolate = v,
    ));
    out.push(Box::new(BindProp));
    out.push(Box::new(EnvProp));
    out.push(Box::new(DevicesProp));
    out.push(Box::new(ResolvConfProp));
    out.push(StrProp::new(
        Desc::new("stdin_path", PropId::Stdin, "container standard input path"),
        |ct| &ct.stdin_path,
        |ct, v| ct.stdin_path = v,
    ));
    out.push(StrProp::new(
        Desc::new(
            "stdout_path",
            PropId::Stdout,
            "container standard output path",
        ),
        |ct| &ct.stdout_path,
        |ct, v| ct.stdout_path = v,
    ));
    out.push(StrProp::new(
        Desc::new(
            "stderr_path",
            PropId::Stderr,
            "container standard error path",
        ),
        |ct| &ct.stderr_path,
        |ct, v| ct.stderr_path = v,
    ));
    out.push(Box::new(StdoutLimitProp));
    out.push(StrProp::new(
        Desc::new(
            "porto_namespace",
            PropId::PortoNamespace,
            "containers namespace (container name prefix)",
        ),
        |ct| &ct.ns_name,
        |ct, v| ct.ns_name = v,
    ));
}

struct UmaskProp;

impl Property for UmaskProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("umask", PropId::Umask, "file mode creation mask");
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::format_octal(view.ct().umask))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("umask")?;
        let umask = codec::parse_octal(value)?;
        view.ct_mut().umask = umask;
        view.ct_mut().set_prop(PropId::Umask);
        Ok(())
    }
}

fn parse_bind_tuple(line: &str) -> Result<BindMount> {
    let tokens = codec::split_escaped(line, ' ');
    let (source, dest, mode) = match tokens.as_slice() {
        [source, dest] => (source.clone(), dest.clone(), ""),
        [source, dest, mode] => (source.clone(), dest.clone(), mode.as_str()),
        _ => return Err(Error::InvalidValue(format!("invalid bind: {line}"))),
    };
    let (read_only, read_write) = match mode {
        "" => (false, false),
        "ro" => (true, false),
        "rw" => (false, true),
        _ => return Err(Error::InvalidValue(format!("invalid bind type in: {line}"))),
    };
    Ok(BindMount {
        source,
        dest,
        read_only,
        read_write,
    })
}

struct BindProp;

impl Property for BindProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "bind",
            PropId::Bind,
            "share host directories: <host_path> <container_path> [ro|rw];...",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        let tuples: Vec<String> = view.ct().bind_mounts.iter().map(BindMount::format).collect();
        Ok(codec::merge_escaped(&tuples, ';'))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("bind")?;
        let mounts = codec::split_escaped(value, ';')
            .iter()
            .map(|line| parse_bind_tuple(line))
            .collect::<Result<Vec<_>>>()?;
        view.ct_mut().bind_mounts = mounts;
        view.ct_mut().set_prop(PropId::Bind);
        Ok(())
    }
}

fn split_env_entry(entry: &str) -> Result<(&str, &str)> {
    let (name, value) = entry
        .split_once('=')
        .ok_or_else(|| Error::InvalidValue(format!("invalid environment variable: {entry}")))?;
    if name.is_empty() {
        return Err(Error::InvalidValue(format!(
            "empty environment variable name: {entry}"
        )));
    }
    Ok((name, value))
}

/// Merge an entry into an ordered `NAME=value` list: an existing name is
/// overwritten in place, a new one appended.
fn merge_env_entry(env: &mut Vec<String>, name: &str, value: &str) {
    let entry = format!("{name}={value}");
    for existing in env.iter_mut() {
        if existing.split('=').next() == Some(name) {
            *existing = entry;
            return;
        }
    }
    env.push(entry);
}

struct EnvProp;

impl Property for EnvProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "env",
            PropId::Env,
            "container environment variables: <name>=<value>;...",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::merge_escaped(&view.ct().env, ';'))
    }

    fn get_indexed(&self, view: View<'_>, index: &str) -> Result<String> {
        view.ct()
            .env
            .iter()
            .find_map(|entry| {
                let (name, value) = entry.split_once('=')?;
                (name == index).then(|| value.to_string())
            })
            .ok_or_else(|| Error::InvalidValue(format!("variable {index} not defined")))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("env")?;
        let mut env = Vec::new();
        for entry in codec::split_escaped(value, ';') {
            let (name, value) = split_env_entry(&entry)?;
            merge_env_entry(&mut env, name, value);
        }
        view.ct_mut().env = env;
        view.ct_mut().set_prop(PropId::Env);
        Ok(())
    }

    fn set_indexed(&self, view: &mut ViewMut<'_>, index: &str, value: &str) -> Result<()> {
        view.gate_stopped("env")?;
        if index.is_empty() || index.contains('=') {
            return Err(Error::InvalidValue(format!(
                "invalid environment variable name: {index}"
            )));
        }
        let ct = view.ct_mut();
        if value.is_empty() {
            ct.env.retain(|entry| entry.split('=').next() != Some(index));
        } else {
            let mut env = std::mem::take(&mut ct.env);
            merge_env_entry(&mut env, index, value);
            ct.env = env;
        }
        ct.set_prop(PropId::Env);
        Ok(())
    }
}

fn parse_device_tuple(line: &str) -> Result<DeviceSpec> {
    let tokens = codec::split_escaped(line, ' ');
    if tokens.len() < 2 || tokens.len() > 6 {
        return Err(Error::InvalidValue(format!("invalid device: {line}")));
    }
    if !tokens[0].starts_with('/') {
        return Err(Error::InvalidValue(format!(
            "device path must be absolute: {line}"
        )));
    }
    let access = &tokens[1];
    if access.is_empty() || !access.chars().all(|c| "rwm-".contains(c)) {
        return Err(Error::InvalidValue(format!(
            "invalid device access in: {line}"
        )));
    }
    Ok(DeviceSpec {
        path: tokens[0].clone(),
        access: access.clone(),
        name: tokens.get(2).cloned(),
        mode: tokens.get(3).cloned(),
        user: tokens.get(4).cloned(),
        group: tokens.get(5).cloned(),
    })
}

struct DevicesProp;

impl Property for DevicesProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "devices",
            PropId::Devices,
            "devices the container can access: <device> [r][w][m][-] [name] [mode] [user] [group];...",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        let tuples: Vec<String> = view.ct().devices.iter().map(DeviceSpec::format).collect();
        Ok(codec::merge_escaped(&tuples, ';'))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("devices")?;
        let devices = codec::split_escaped(value, ';')
            .iter()
            .map(|line| parse_device_tuple(line))
            .collect::<Result<Vec<_>>>()?;
        view.want_controllers(Controllers::DEVICES)?;
        view.ct_mut().devices = devices;
        view.ct_mut().set_prop(PropId::Devices);
        Ok(())
    }
}

struct ResolvConfProp;

impl Property for ResolvConfProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "resolv_conf",
            PropId::ResolvConf,
            "DNS resolver configuration: <resolv.conf option>;...",
        );
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(codec::merge_escaped(&view.ct().resolv_conf, ';'))
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_stopped("resolv_conf")?;
        view.ct_mut().resolv_conf = codec::split_escaped(value, ';');
        view.ct_mut().set_prop(PropId::ResolvConf);
        Ok(())
    }
}

struct StdoutLimitProp;

impl Property for StdoutLimitProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "stdout_limit",
            PropId::StdoutLimit,
            "limit for stored stdout and stderr size (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().stdout_limit.to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("stdout_limit")?;
        let limit = codec::parse_size(value)?;
        let max = view.env.config.stdout_limit_max;
        if limit > max && !view.env.client.is_super_user() && !view.env.restoring {
            return Err(Error::InvalidValue(format!("maximum limit is: {max}")));
        }
        // one dial governs both stored streams
        view.ct_mut().stdout_limit = limit;
        view.ct_mut().set_prop(PropId::StdoutLimit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_tuple() {
        let bind = parse_bind_tuple("/host /ct ro").unwrap();
        assert_eq!(bind.source, "/host");
        assert_eq!(bind.dest, "/ct");
        assert!(bind.read_only);
        assert!(!parse_bind_tuple("/host /ct rw").unwrap().read_only);
        assert!(parse_bind_tuple("/host").is_err());
        assert!(parse_bind_tuple("/host /ct sideways").is_err());
    }

    #[test]
    fn test_merge_env_entry_preserves_order() {
        let mut env = Vec::new();
        merge_env_entry(&mut env, "A", "1");
        merge_env_entry(&mut env, "B", "2");
        merge_env_entry(&mut env, "A", "3");
        assert_eq!(env, vec!["A=3", "B=2"]);
    }

    #[test]
    fn test_parse_device_tuple() {
        let dev = parse_device_tuple("/dev/null rwm").unwrap();
        assert_eq!(dev.path, "/dev/null");
        assert_eq!(dev.access, "rwm");
        let full = parse_device_tuple("/dev/kvm rw kvm 0660 root kvm").unwrap();
        assert_eq!(full.group.as_deref(), Some("kvm"));
        assert!(parse_device_tuple("null rwm").is_err());
        assert!(parse_device_tuple("/dev/null xyz").is_err());
    }
}
