use std::sync::Arc;

use bulkload_channel::SocketDirectory;
use bulkload_reader::{load, FunctionCatalog, ParserFactory, Reader, RowShape};

use crate::cmd::{default_channel_dir, LoadArgs};
use crate::exit::{reader_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_load_summary, OutputFormat, RowPrinter};

pub fn run(args: LoadArgs, format: OutputFormat) -> CliResult<i32> {
    let columns = RowShape::parse_columns(&args.columns)
        .map_err(|err| CliError::new(USAGE, format!("invalid --columns: {err}")))?;
    if columns.is_empty() {
        return Err(CliError::new(USAGE, "invalid --columns: no columns given"));
    }
    let shape = RowShape::anonymous(columns);

    let dir = args.dir.unwrap_or_else(default_channel_dir);
    let factory = ParserFactory::new(
        Arc::new(FunctionCatalog::with_builtins()),
        Arc::new(SocketDirectory::new(dir)),
    );

    let mut builder = Reader::builder(factory, shape);
    builder
        .param("TYPE", &args.kind)
        .map_err(|err| reader_error("invalid option", err))?;
    builder
        .param("INPUT", &args.input)
        .map_err(|err| reader_error("invalid option", err))?;
    for option in &args.options {
        let (keyword, value) = split_option(option)?;
        builder
            .param(keyword, value)
            .map_err(|err| reader_error("invalid option", err))?;
    }

    let reader = builder
        .open()
        .map_err(|err| reader_error("open failed", err))?;
    reader.dump_params();

    let mut printer = RowPrinter::new(reader.shape(), format);
    let summary = load(reader, &mut printer).map_err(|err| reader_error("load failed", err))?;
    printer.finish();

    if !args.quiet {
        print_load_summary(&summary, format);
    }
    Ok(SUCCESS)
}

/// Split `KEYWORD=VALUE`. Whitespace around either side is dropped.
fn split_option(option: &str) -> CliResult<(&str, &str)> {
    option
        .split_once('=')
        .map(|(keyword, value)| (keyword.trim(), value.trim()))
        .filter(|(keyword, _)| !keyword.is_empty())
        .ok_or_else(|| {
            CliError::new(
                USAGE,
                format!("invalid --option \"{option}\": expected KEYWORD=VALUE"),
            )
        })
}
