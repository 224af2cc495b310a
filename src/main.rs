use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use casetree::cli::{self, Cli, Command, ExitStatus};

fn main() {
    let args = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli::log_filter(args.command.verbosity())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let status = match execute(args.command) {
        Ok(status) => status,
        Err(err) => {
            error!("{err:#}");
            ExitStatus::Error
        }
    };
    std::process::exit(status.code());
}

fn execute(command: Command) -> anyhow::Result<ExitStatus> {
    match command {
        Command::Run(args) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let report = runtime.block_on(cli::run(&args))?;
            Ok(ExitStatus::from_report(&report))
        }
        Command::Plan(args) => {
            for line in cli::plan(&args)? {
                println!("{line}");
            }
            Ok(ExitStatus::Passed)
        }
    }
}
