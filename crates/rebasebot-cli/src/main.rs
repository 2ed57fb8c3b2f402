//! rebasebot - keeps a downstream fork rebased onto its upstream and
//! publishes the result as a pull request.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod lock;
mod output;
mod services;
mod signals;

use commands::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    output::set_quiet(cli.quiet);

    let result = match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Watch { args, interval } => commands::watch::run(args, *interval),
        Commands::Completions { shell } => {
            commands::completions::run(*shell);
            Ok(0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

/// Diagnostics go to stderr so `--json` output stays parseable.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
