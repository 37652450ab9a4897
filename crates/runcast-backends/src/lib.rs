//! `runcast-backends`: projecting scheduled tasks onto OS facilities.
//!
//! Every backend implements [`BackendAdapter`]; [`adapter_for`] picks the
//! implementation for a [`BackendKind`](runcast_schedule::BackendKind).
//! Adapters never spawn processes themselves: they go through a
//! [`ToolRunner`], normally [`ProcessRunner`].
//!
//! | Backend     | Artifact                                   | Tool                   |
//! |-------------|--------------------------------------------|------------------------|
//! | `launchd`   | `~/Library/LaunchAgents/<label>.plist`     | `launchctl`, `plutil`  |
//! | `cron`      | marked lines in the user's crontab         | `crontab`              |
//! | `container` | a labelled container                       | `docker` / `podman`    |
//! | `vm`        | a prefixed Lima instance                   | `limactl`              |

pub mod adapter;
pub mod atomic;
pub mod container;
pub mod crontab;
pub mod error;
pub mod launchd;
pub mod runner;
pub mod select;
pub mod truncate;
pub mod vm;

#[cfg(test)]
mod fake;

pub use adapter::BackendAdapter;
pub use error::{BackendError, Result};
pub use runner::{Invocation, ProcessRunner, ToolRunner};
pub use select::adapter_for;
