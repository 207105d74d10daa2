use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod feed;
pub mod load;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve tab-separated rows from stdin as framed records on a socket channel.
    Feed(FeedArgs),
    /// Run a reader and print the rows it loads.
    Load(LoadArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Feed(args) => feed::run(args, format),
        Command::Load(args) => load::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Channel key the loader opens with `INPUT = :<key>`.
    pub key: u32,
    /// Directory holding channel sockets.
    #[arg(long, value_name = "DIR", env = "BULKLOAD_CHANNEL_DIR")]
    pub dir: Option<PathBuf>,
    /// Read rows from a file instead of stdin.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Parser kind (FUNCTION, TUPLE or a registered extension).
    #[arg(long = "type", value_name = "KIND")]
    pub kind: String,
    /// Input locator: a function call or `:<key>` for a channel.
    #[arg(long, value_name = "INPUT")]
    pub input: String,
    /// Destination columns as `name:type,...`; a trailing `!` marks NOT NULL.
    #[arg(long, value_name = "COLUMNS")]
    pub columns: String,
    /// Directory holding channel sockets.
    #[arg(long, value_name = "DIR", env = "BULKLOAD_CHANNEL_DIR")]
    pub dir: Option<PathBuf>,
    /// Extra reader option as KEYWORD=VALUE (repeatable).
    #[arg(long = "option", short = 'o', value_name = "KEYWORD=VALUE")]
    pub options: Vec<String>,
    /// Skip the closing summary.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

/// Socket directory used when `--dir` is not given.
pub fn default_channel_dir() -> PathBuf {
    std::env::temp_dir()
}
