use clap::Parser;
use tracing::error;
use wr_cli::cli::Cli;
use wr_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli.command).await {
		error!(target = "wr", error = %err, "command failed");
		std::process::exit(1);
	}
}
