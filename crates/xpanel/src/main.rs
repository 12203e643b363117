mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "xpanel", &mut std::io::stdout());
            Ok(())
        }
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),
        Command::Check(args) => commands::check::handle(&args, &cli.global),
        Command::Resolve(args) => commands::sim::resolve(&args, &cli.global).await,
        Command::Set(args) => commands::sim::set(&args, &cli.global).await,
        Command::Fire(args) => commands::sim::fire(&args, &cli.global).await,
        Command::Run(args) => commands::run::handle(args, &cli.global).await,
    }
}
