//! Lifecycle flag properties.

use crate::cgroup::Controllers;
use crate::container::PropId;
use crate::error::{Error, Result};

use super::{BoolProp, Desc, Property, View, ViewMut};

pub(super) fn register(out: &mut Vec<Box<dyn Property>>) {
    out.push(BoolProp::new(
        Desc::new(
            "respawn",
            PropId::Respawn,
            "automatically respawn dead container (dynamic)",
        )
        .dynamic(),
        Controllers::empty(),
        None,
        |ct| ct.to_respawn,
        |ct, v| ct.to_respawn = v,
    ));
    out.push(Box::new(MaxRespawnsProp));
    out.push(BoolProp::new(
        Desc::new(
            "weak",
            PropId::Weak,
            "destroy container when its client disconnects (dynamic)",
        )
        .dynamic(),
        Controllers::empty(),
        None,
        |ct| ct.is_weak,
        |ct, v| ct.is_weak = v,
    ));
    out.push(Box::new(AgingTimeProp));
    out.push(BoolProp::new(
        Desc::new(
            "oom_is_fatal",
            PropId::OomIsFatal,
            "kill container on OOM (dynamic)",
        )
        .dynamic(),
        Controllers::empty(),
        None,
        |ct| ct.oom_is_fatal,
        |ct, v| ct.oom_is_fatal = v,
    ));
}

struct MaxRespawnsProp;

impl Property for MaxRespawnsProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "max_respawns",
            PropId::MaxRespawns,
            "limit respawn count, -1 for unlimited (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok(view.ct().max_respawns.to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("max_respawns")?;
        let max: i64 = value
            .parse()
            .map_err(|_| Error::InvalidValue(format!("invalid integer value: {value}")))?;
        view.ct_mut().max_respawns = max;
        view.ct_mut().set_prop(PropId::MaxRespawns);
        Ok(())
    }
}

/// Accepted in seconds, stored in milliseconds.
struct AgingTimeProp;

impl Property for AgingTimeProp {
    fn desc(&self) -> &Desc {
        static DESC: Desc = Desc::new(
            "aging_time",
            PropId::AgingTime,
            "seconds before a dead container is removed (dynamic)",
        )
        .dynamic();
        &DESC
    }

    fn get(&self, view: View<'_>) -> Result<String> {
        Ok((view.ct().aging_time_ms / 1000).to_string())
    }

    fn set(&self, view: &mut ViewMut<'_>, value: &str) -> Result<()> {
        view.gate_alive("aging_time")?;
        let seconds: u64 = value
            .parse()
            .map_err(|_| Error::InvalidValue(format!("invalid aging time: {value}")))?;
        view.ct_mut().aging_time_ms = seconds.saturating_mul(1000);
        view.ct_mut().set_prop(PropId::AgingTime);
        Ok(())
    }
}
