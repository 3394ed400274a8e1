mod record;
mod targets;

pub use record::PageDebuggee;

use crate::cli::Commands;
use crate::error::Result;

pub async fn dispatch(command: Commands) -> Result<()> {
	match command {
		Commands::Targets { port } => targets::execute(port).await,
		Commands::Record(args) => record::execute(args).await,
	}
}
