use clap::Parser;
use dockup_cli::commands::{HostArgs, ProvisionCommands, handle_provision_command};

#[derive(Parser)]
#[clap(
    name = "dockup",
    version,
    about = "Install Docker Engine and the Compose plugin on Debian/Ubuntu hosts"
)]
struct Cli {
    #[clap(flatten)]
    host: HostArgs,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: ProvisionCommands,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    handle_provision_command(cli.command, &cli.host).await
}
