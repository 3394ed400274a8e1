use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_PORT: u16 = 9222;

#[derive(Parser, Debug)]
#[command(name = "wr")]
#[command(about = "Record a browser page's network traffic over the DevTools protocol")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// List the page targets of a browser started with --remote-debugging-port
	#[command(alias = "ls")]
	Targets {
		/// Remote debugging port
		#[arg(short, long, default_value_t = DEFAULT_PORT)]
		port: u16,
	},

	/// Record a page until Ctrl-C or the duration elapses
	Record(RecordArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RecordArgs {
	/// Remote debugging port
	#[arg(short, long, default_value_t = DEFAULT_PORT)]
	pub port: u16,

	/// Target id, or a substring of the page URL (defaults to the first page)
	#[arg(short, long)]
	pub target: Option<String>,

	/// Manifest file (JSON lines); stdout when omitted
	#[arg(short, long, value_name = "FILE")]
	pub out: Option<PathBuf>,

	/// Recorder configuration (JSON)
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Stop after this many seconds
	#[arg(long, value_name = "N")]
	pub duration_secs: Option<u64>,

	/// Do not intercept (or rewrite) responses
	#[arg(long)]
	pub no_intercept: bool,
}
