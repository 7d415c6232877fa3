//! # porto-core
//!
//! Container property and state engine for the porto daemon.
//!
//! This crate is the sole funnel through which requests change container
//! configuration: it defines the complete property schema (~70 named
//! properties), enforces per-property validation, permission and
//! state-gating rules, cross-property invariants, and the hierarchical
//! resource accounting of the container tree.
//!
//! The engine never touches cgroup files, sockets or disks itself; live
//! numbers and side effects go through narrow backend traits
//! ([`cgroup::CgroupBackend`], [`net::NetBackend`], [`sysinfo::Clock`]),
//! which makes the whole schema testable in memory.
//!
//! ## Example
//!
//! ```rust
//! use porto_core::config::Config;
//! use porto_core::cred::Client;
//! use porto_core::engine::Engine;
//! use porto_core::kernel::KernelFeatures;
//! use porto_core::sysinfo::SystemInfo;
//!
//! let engine = Engine::builder()
//!     .config(Config::default())
//!     .features(KernelFeatures::all())
//!     .sysinfo(SystemInfo::new(16 << 30, 8))
//!     .build();
//!
//! let root = Client::superuser();
//! engine.create_container("web", &root).unwrap();
//! engine.set_property("web", "memory_limit", "1G", &root).unwrap();
//! assert_eq!(
//!     engine.get_property("web", "memory_limit", &root).unwrap(),
//!     "1073741824"
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod caps;
pub mod cgroup;
pub mod codec;
pub mod config;
pub mod container;
pub mod cred;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod net;
pub mod property;
pub mod state;
pub mod stats;
pub mod sysinfo;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::caps::Capabilities;
    pub use crate::cgroup::Controllers;
    pub use crate::config::Config;
    pub use crate::container::{AccessLevel, ContainerId, CpuPolicy, PropId, VirtMode};
    pub use crate::cred::{Client, Cred};
    pub use crate::engine::{Engine, TaskPids};
    pub use crate::error::{Error, Result};
    pub use crate::kernel::KernelFeatures;
    pub use crate::state::ContainerState;
}

/// Re-export commonly used types at the crate root.
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use state::ContainerState;
