mod commands;
mod input;
mod opts;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::flags::FlagSetArgs;
use commands::load::{LoadStartArgs, LoadStopArgs};
use commands::services::ServiceArgs;
use commands::simulate::SimulateArgs;
use opts::FleetOpts;

#[derive(Parser, Debug)]
#[command(name = "journey", version, about = "Journey fleet CLI")]
struct Cli {
    #[command(flatten)]
    opts: FleetOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one journey and print the result
    Simulate(SimulateArgs),

    /// Rate-controlled load tests
    #[command(subcommand)]
    Load(LoadCommand),

    /// Fault-injection feature flags
    #[command(subcommand)]
    Flags(FlagsCommand),

    /// Worker services managed by the control plane
    #[command(subcommand)]
    Services(ServicesCommand),
}

#[derive(Subcommand, Debug)]
enum LoadCommand {
    /// Start a load test
    Start(LoadStartArgs),

    /// Stop a load test and print its final statistics
    Stop(LoadStopArgs),

    /// List load tests
    Status,

    /// Stop every load test
    StopAll,
}

#[derive(Subcommand, Debug)]
enum FlagsCommand {
    /// Show the current flag set
    Get,

    /// Update one or more flags
    Set(FlagSetArgs),
}

#[derive(Subcommand, Debug)]
enum ServicesCommand {
    /// List known services
    List,

    /// Start a worker for a service if none is running
    Ensure(ServiceArgs),

    /// Stop a service's worker
    Terminate(ServiceArgs),

    /// Show circuit breaker state per service
    Breakers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    match cli.command {
        Command::Simulate(args) => commands::simulate::cmd_simulate(opts, &args).await,
        Command::Load(cmd) => match cmd {
            LoadCommand::Start(args) => commands::load::cmd_start(opts, &args).await,
            LoadCommand::Stop(args) => commands::load::cmd_stop(opts, &args).await,
            LoadCommand::Status => commands::load::cmd_status(opts).await,
            LoadCommand::StopAll => commands::load::cmd_stop_all(opts).await,
        },
        Command::Flags(cmd) => match cmd {
            FlagsCommand::Get => commands::flags::cmd_get(opts).await,
            FlagsCommand::Set(args) => commands::flags::cmd_set(opts, &args).await,
        },
        Command::Services(cmd) => match cmd {
            ServicesCommand::List => commands::services::cmd_list(opts).await,
            ServicesCommand::Ensure(args) => commands::services::cmd_ensure(opts, &args).await,
            ServicesCommand::Terminate(args) => {
                commands::services::cmd_terminate(opts, &args).await
            }
            ServicesCommand::Breakers => commands::services::cmd_breakers(opts).await,
        },
    }
}
