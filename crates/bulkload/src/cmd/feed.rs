use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use bulkload_channel::SocketQueue;
use bulkload_frame::FrameWriter;
use bulkload_reader::{encode_row, Datum};
use bytes::BytesMut;
use tracing::{info, warn};

use crate::cmd::{default_channel_dir, FeedArgs};
use crate::exit::{channel_error, frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_feed_summary, OutputFormat};

pub fn run(args: FeedArgs, format: OutputFormat) -> CliResult<i32> {
    let dir = args.dir.unwrap_or_else(default_channel_dir);
    let queue = SocketQueue::bind(&dir, args.key).map_err(|err| channel_error("bind failed", err))?;
    let socket = queue.path().to_path_buf();
    install_ctrlc_handler(socket.clone())?;

    let input: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).map_err(|err| io_error("open input failed", err))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    info!(key = args.key, socket = %socket.display(), "waiting for loader");
    let stream = queue
        .accept()
        .map_err(|err| channel_error("accept failed", err))?;
    let mut writer = FrameWriter::new(stream);

    let mut scratch = BytesMut::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.map_err(|err| io_error("read input failed", err))?;
        let values = parse_line(&line);
        scratch.clear();
        encode_row(&values, &mut scratch).map_err(|err| {
            CliError::new(DATA_INVALID, format!("line {}: {err}", index + 1))
        })?;
        writer
            .send(&scratch)
            .map_err(|err| frame_error("send failed", err))?;
    }

    let sent = writer.sent();
    if let Err(err) = writer.close() {
        warn!(error = %err, "closing channel failed");
        return Err(frame_error("close failed", err));
    }
    info!(key = args.key, sent, "feed finished");

    print_feed_summary(args.key, &socket.display().to_string(), sent, format);
    Ok(SUCCESS)
}

/// Split one tab-separated line into text fields. `\N` is NULL.
fn parse_line(line: &str) -> Vec<Datum> {
    line.split('\t')
        .map(|field| match field {
            "\\N" => Datum::Null,
            text => Datum::Text(text.to_string()),
        })
        .collect()
}

// The listener's Drop never runs when the process is interrupted while
// blocked in accept, so the handler removes the socket itself.
fn install_ctrlc_handler(socket: PathBuf) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = std::fs::remove_file(&socket);
        std::process::exit(130);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
