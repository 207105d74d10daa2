mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "bulkload", version, about = "Bulk-load ingestion front end")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "BULKLOAD_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "BULKLOAD_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_load_subcommand() {
        let cli = Cli::try_parse_from([
            "bulkload",
            "load",
            "--type",
            "FUNCTION",
            "--input",
            "generate_series(1, 3)",
            "--columns",
            "n:int4",
            "-o",
            "LIMIT=2",
            "-o",
            "PARSE_ERRORS=INFINITE",
        ])
        .expect("load args should parse");

        match cli.command {
            Command::Load(args) => {
                assert_eq!(args.kind, "FUNCTION");
                assert_eq!(args.options, vec!["LIMIT=2", "PARSE_ERRORS=INFINITE"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn load_requires_columns() {
        let err = Cli::try_parse_from([
            "bulkload", "load", "--type", "TUPLE", "--input", ":1",
        ])
        .expect_err("missing --columns should fail");

        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn parses_feed_subcommand() {
        let cli = Cli::try_parse_from(["bulkload", "feed", "7", "--dir", "/tmp/chan"])
            .expect("feed args should parse");
        assert!(matches!(cli.command, Command::Feed(ref args) if args.key == 7));
    }
}
