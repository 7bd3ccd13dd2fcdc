pub mod provision;

pub use provision::{HostArgs, ProvisionCommands, handle_provision_command};
