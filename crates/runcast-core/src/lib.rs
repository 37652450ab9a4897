//! `runcast-core`: configuration and the top-level error type shared by
//! every runcast crate.

pub mod config;
pub mod error;

pub use config::RuncastConfig;
pub use error::{CoreError, Result};
