//! Hidden persistence-only properties.
//!
//! These carry runtime state across a daemon restart and are never set by
//! clients; their only writer is the restore path.

use crate::container::PropId;
use crate::error::{Error, Result};

use super::{Desc, Property, View, ViewMut};

pub(super) fn register(out: &mut Vec<Box<dyn Property>>) {
    out.push(Box::new(RawRootPidProp));
    out.push(Box::new(RawSeizePidProp));
    out.push(Box::new(RawLoopDevProp));
    out.push(Box::new(RawStartTimeProp));
    out.push(Box::new(RawDeathTimeProp));
    out.push(Box::new(RespawnCountProp));
}

fn parse_int<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidValue(format!("invalid {what}: {value}")))
}

struct RawRootPidProp;

impl Property for RawRootPidProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("raw_root_pid", PropId::RootPid, "")
            .read_only()
            .hidden();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        let ct = view.ct();
        Ok(format!(
            "{};{};{}",
            ct.task_pid, ct.task_vpid, ct.wait_task_pid
        ))
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        let fields: Vec<&str> = value.split(';').collect();
        let task_pid = match fields.first() {
            Some(field) => parse_int(field, "root pid")?,
            None => 0,
        };
        let task_vpid = match fields.get(1) {
            Some(field) => parse_int(field, "root vpid")?,
            None => 0,
        };
        let wait_task_pid = match fields.get(2) {
            Some(field) => parse_int(field, "wait pid")?,
            None => task_pid,
        };
        let ct = view.ct_mut();
        ct.task_pid = task_pid;
        ct.task_vpid = task_vpid;
        ct.wait_task_pid = wait_task_pid;
        Ok(())
    }
}

struct RawSeizePidProp;

impl Property for RawSeizePidProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("raw_seize_pid", PropId::SeizePid, "")
            .read_only()
            .hidden();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().seize_task_pid.to_string())
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.ct_mut().seize_task_pid = parse_int(value, "seize pid")?;
        Ok(())
    }
}

struct RawLoopDevProp;

impl Property for RawLoopDevProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("raw_loop_dev", PropId::LoopDev, "")
            .read_only()
            .hidden();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().loop_dev.to_string())
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.ct_mut().loop_dev = parse_int(value, "loop device")?;
        Ok(())
    }
}

struct RawStartTimeProp;

impl Property for RawStartTimeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("raw_start_time", PropId::StartTime, "")
            .read_only()
            .hidden();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().start_time_ms.to_string())
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.ct_mut().start_time_ms = parse_int(value, "start time")?;
        Ok(())
    }
}

struct RawDeathTimeProp;

impl Property for RawDeathTimeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new("raw_death_time", PropId::DeathTime, "")
            .read_only()
            .hidden();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().death_time_ms.to_string())
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.ct_mut().death_time_ms = parse_int(value, "death time")?;
        Ok(())
    }
}

struct RespawnCountProp;

impl Property for RespawnCountProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "respawn_count",
            PropId::RespawnCount,
            "current respawn count (ro)",
        )
        .read_only();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().respawn_count.to_string())
    }

    fn set_from_restore(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.ct_mut().respawn_count = parse_int(value, "respawn count")?;
        Ok(())
    }
}
