//! Container lifecycle states.

use crate::error::{Error, Result};

/// State of a container in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Created but not started; configuration is fully mutable.
    Stopped,
    /// Start requested, task not yet running.
    Starting,
    /// Task is running.
    Running,
    /// Frozen by the freezer controller.
    Paused,
    /// Task exited; only dead-state readings and removal remain.
    Dead,
    /// No own task, groups running children.
    Meta,
}

impl ContainerState {
    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Dead => "dead",
            Self::Meta => "meta",
        }
    }

    /// Parse a wire state name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unknown`] for an unrecognized name, which during
    /// restore marks a corrupt record.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "dead" => Ok(Self::Dead),
            "meta" => Ok(Self::Meta),
            _ => Err(Error::Unknown(format!("invalid container state: {s}"))),
        }
    }

    /// Whether the container has not been started.
    #[must_use]
    pub const fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether the container is past its death.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }

    /// Whether the container has a live cgroup footprint.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Paused | Self::Meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for state in [
            ContainerState::Stopped,
            ContainerState::Starting,
            ContainerState::Running,
            ContainerState::Paused,
            ContainerState::Dead,
            ContainerState::Meta,
        ] {
            assert_eq!(ContainerState::parse(state.as_str()).unwrap(), state);
        }
        assert!(ContainerState::parse("unknown").is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(ContainerState::Stopped.is_stopped());
        assert!(ContainerState::Dead.is_dead());
        assert!(ContainerState::Meta.is_active());
        assert!(!ContainerState::Stopped.is_active());
    }
}
