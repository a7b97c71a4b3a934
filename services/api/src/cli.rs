use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ta_allocation::error::AppError;

use crate::demo::{run_demo, DemoArgs};
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "TA Allocation Service",
    about = "Run the teaching-assistant allocation service or walk through a demo round",
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
    /// Walk through a round-one / round-two allocation scenario on sample data
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
    /// JSON file with coordinators, professors, students, courses and rounds to preload
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    match cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_accepts_overrides_and_seed() {
        let cli = Cli::try_parse_from([
            "ta-allocation-api",
            "serve",
            "--port",
            "8081",
            "--seed",
            "fixtures/seed.json",
        ])
        .expect("arguments parse");

        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.port, Some(8081));
        assert_eq!(args.seed, Some(PathBuf::from("fixtures/seed.json")));
        assert!(args.host.is_none());
    }

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["ta-allocation-api"]).expect("arguments parse");
        assert!(cli.command.is_none());
    }
}
