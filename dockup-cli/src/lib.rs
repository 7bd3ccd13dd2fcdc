//! dockup: installs Docker Engine and the Compose plugin on Debian-family
//! hosts as a sequence of verifiable, re-runnable steps.

pub mod apt;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod host;
pub mod pipeline;
pub mod provisioner;
pub mod report;
pub mod steps;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ProvisionConfig;
pub use error::{ProvisionError, Result};
pub use provisioner::Provisioner;
