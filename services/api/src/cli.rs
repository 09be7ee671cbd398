use crate::demo::{run_demo, run_resolve, DemoArgs, ResolveArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use internship_ats::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "internship-ats-api",
    about = "Serve and exercise the internship external-apply workflow",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Resolve an effective ATS configuration and print it as JSON
    Resolve(ResolveArgs),
    /// Walk through invite gating, bulk invites and confirmation in memory
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Resolve(args) => run_resolve(args),
        Command::Demo(args) => run_demo(args),
    }
}
