//! `runcast-container`: container specification translator.
//!
//! Converts between the structured [`ContainerInfo`] model and the flat
//! strings container tooling speaks, in both directions:
//!
//! | Direction  | Input                                   | Output                      |
//! |------------|-----------------------------------------|-----------------------------|
//! | install    | [`ContainerInfo`]                       | `create` argument list      |
//! | discovery  | runtime `inspect` JSON                  | [`ContainerInfo`]           |
//! | editor     | form rows ([`editor::ContainerEditor`]) | [`ContainerInfo`]           |
//! | import     | `.env` text                             | merged environment map      |
//!
//! [`diff::needs_recreation`] decides whether a configuration change can be
//! applied to a live container or requires destroy-and-recreate.

pub mod command;
pub mod diff;
pub mod editor;
pub mod env;
pub mod ports;
pub mod translate;
pub mod types;
pub mod volumes;

pub use diff::needs_recreation;
pub use env::{import_env, EnvImport, MAX_ENV_ENTRIES};
pub use ports::PortMapping;
pub use types::{ContainerInfo, RestartPolicy};
pub use volumes::VolumeMount;
