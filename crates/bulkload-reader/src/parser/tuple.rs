use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bulkload_channel::{Channel, ChannelOpener};
use bulkload_frame::{decode_length, DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX_SIZE};
use bytes::BytesMut;
use tracing::{debug, warn};

use super::{Parser, ReadProfile, Record};
use crate::checker::Checker;
use crate::error::{ReaderError, Result};
use crate::types::RowShape;

/// Initial scratch buffer size: one page.
pub const BLCKSZ: usize = 8192;

/// Reads length-framed records from a channel opened by key.
///
/// The locator is `:<key>`. Each record aliases the parser's scratch buffer,
/// which grows to the largest frame seen and never shrinks.
pub struct TupleParser {
    channels: Arc<dyn ChannelOpener>,
    channel: Option<Box<dyn Channel>>,
    key: Option<u32>,
    scratch: BytesMut,
    max_payload: usize,
    count: u64,
    finished: bool,
}

impl TupleParser {
    pub fn new(channels: Arc<dyn ChannelOpener>) -> Self {
        Self {
            channels,
            channel: None,
            key: None,
            scratch: BytesMut::new(),
            max_payload: DEFAULT_MAX_PAYLOAD,
            count: 0,
            finished: false,
        }
    }

    /// Reject frames longer than `max` bytes.
    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max;
        self
    }

    /// Length of the zero-filled scratch buffer in bytes. Starts at
    /// [`BLCKSZ`], grows to fit the largest frame seen and never shrinks.
    pub fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    pub fn key(&self) -> Option<u32> {
        self.key
    }
}

/// Parse a `:<u32>` channel locator; only whitespace may follow the key.
pub fn parse_channel_key(locator: &str) -> Result<u32> {
    let invalid = || ReaderError::Configuration(format!("invalid channel key format: {locator}"));
    let digits = locator.strip_prefix(':').ok_or_else(invalid)?.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse::<u32>().map_err(|_| invalid())
}

impl Parser for TupleParser {
    fn kind(&self) -> &'static str {
        "TUPLE"
    }

    fn init(&mut self, _checker: &Checker, locator: &str, shape: &RowShape) -> Result<()> {
        if self.channel.is_some() {
            return Err(ReaderError::Configuration(
                "tuple parser is already initialized".to_string(),
            ));
        }
        let key = parse_channel_key(locator)?;
        self.channel = Some(self.channels.open(key)?);
        self.key = Some(key);
        self.scratch = BytesMut::zeroed(BLCKSZ);
        debug!(key, columns = shape.len(), "opened tuple channel");
        Ok(())
    }

    fn read(
        &mut self,
        _checker: &Checker,
        profile: &mut ReadProfile,
    ) -> Result<Option<Record<'_>>> {
        if self.finished {
            return Ok(None);
        }
        let channel = self.channel.as_mut().ok_or_else(|| {
            ReaderError::Configuration("tuple parser is not initialized".to_string())
        })?;

        let started = Instant::now();
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let n = channel.read_full(&mut prefix)?;
        if n < LENGTH_PREFIX_SIZE {
            profile.source += started.elapsed();
            if n > 0 {
                warn!(bytes = n, "channel closed inside a length prefix");
            }
            self.finished = true;
            return Ok(None);
        }

        let len = decode_length(prefix) as usize;
        if len == 0 {
            profile.source += started.elapsed();
            debug!(records = self.count, "end of tuple stream");
            self.finished = true;
            return Ok(None);
        }
        if len > self.max_payload {
            self.finished = true;
            return Err(ReaderError::ProtocolViolation(format!(
                "frame of {len} bytes exceeds maximum {}",
                self.max_payload
            )));
        }

        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        let got = channel.read_full(&mut self.scratch[..len])?;
        profile.source += started.elapsed();
        if got < len {
            self.finished = true;
            return Err(ReaderError::ProtocolViolation(format!(
                "truncated frame: expected {len} bytes, got {got}"
            )));
        }

        self.count += 1;
        profile.bytes += len as u64;
        Ok(Some(Record::new(&self.scratch[..len])))
    }

    fn term(mut self: Box<Self>) -> u64 {
        if let Some(mut channel) = self.channel.take() {
            if let Err(err) = channel.close() {
                warn!(key = ?self.key, error = %err, "failed to close tuple channel");
            }
        }
        self.count
    }

    fn param(&mut self, _keyword: &str, _value: &str) -> Result<bool> {
        Ok(false)
    }

    fn dump_params(&self) -> Vec<String> {
        vec!["TYPE = TUPLE".to_string()]
    }

    fn dump_record(&self, _sink: &mut dyn Write, _badfile: &Path) -> Result<()> {
        // Framed records are never rejected by this parser.
        Ok(())
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use bulkload_channel::QueueRegistry;
    use bulkload_frame::FrameWriter;

    use super::*;

    fn setup() -> (Arc<QueueRegistry>, TupleParser) {
        let registry = Arc::new(QueueRegistry::new());
        let parser = TupleParser::new(registry.clone());
        (registry, parser)
    }

    fn init(parser: &mut TupleParser, locator: &str) -> Result<()> {
        parser.init(&Checker::new(), locator, &RowShape::anonymous(Vec::new()))
    }

    fn next(parser: &mut TupleParser, profile: &mut ReadProfile) -> Result<Option<Vec<u8>>> {
        Ok(parser
            .read(&Checker::new(), profile)?
            .map(|r| r.payload().to_vec()))
    }

    #[test]
    fn locator_forms() {
        assert_eq!(parse_channel_key(":42").unwrap(), 42);
        assert_eq!(parse_channel_key(":7  ").unwrap(), 7);
        assert_eq!(parse_channel_key(":4294967295").unwrap(), u32::MAX);
        for bad in ["42", ":", ":abc", ":12x", ":12 x", ":-1", ":4294967296", "stdin", ""] {
            assert!(
                matches!(parse_channel_key(bad), Err(ReaderError::Configuration(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn valid_locator_opens_channel() {
        let (registry, mut parser) = setup();
        let _writer = registry.create(5).unwrap();
        init(&mut parser, ":5").unwrap();
        assert_eq!(parser.key(), Some(5));
        assert_eq!(parser.scratch_len(), BLCKSZ);
    }

    #[test]
    fn invalid_locator_fails_before_opening() {
        let (registry, mut parser) = setup();
        let _writer = registry.create(5).unwrap();
        let err = init(&mut parser, ":5x").unwrap_err();
        assert!(matches!(err, ReaderError::Configuration(_)));
        // The queue was not consumed by the failed init.
        init(&mut parser, ":5").unwrap();
    }

    #[test]
    fn unknown_key_is_a_channel_error() {
        let (_registry, mut parser) = setup();
        assert!(matches!(
            init(&mut parser, ":99"),
            Err(ReaderError::Channel(_))
        ));
    }

    #[test]
    fn frames_read_back_in_order_then_end() {
        let (registry, mut parser) = setup();
        let mut writer = FrameWriter::new(registry.create(1).unwrap());
        writer.send(b"AB").unwrap();
        writer.send(b"C").unwrap();
        writer.finish().unwrap();
        init(&mut parser, ":1").unwrap();

        let mut profile = ReadProfile::default();
        assert_eq!(next(&mut parser, &mut profile).unwrap().unwrap(), b"AB");
        assert_eq!(next(&mut parser, &mut profile).unwrap().unwrap(), b"C");
        assert_eq!(next(&mut parser, &mut profile).unwrap(), None);
        assert_eq!(next(&mut parser, &mut profile).unwrap(), None);
        assert_eq!(profile.bytes, 3);
        assert_eq!(Box::new(parser).term(), 2);
    }

    #[test]
    fn closed_channel_without_terminator_is_end_of_stream() {
        let (registry, mut parser) = setup();
        let mut writer = FrameWriter::new(registry.create(1).unwrap());
        writer.send(b"only").unwrap();
        drop(writer);
        init(&mut parser, ":1").unwrap();

        let mut profile = ReadProfile::default();
        assert!(next(&mut parser, &mut profile).unwrap().is_some());
        assert_eq!(next(&mut parser, &mut profile).unwrap(), None);
    }

    #[test]
    fn truncated_payload_is_protocol_violation() {
        let (registry, mut parser) = setup();
        let mut raw = registry.create(1).unwrap();
        raw.write_all(&10u32.to_le_bytes()).unwrap();
        raw.write_all(b"abc").unwrap();
        drop(raw);
        init(&mut parser, ":1").unwrap();

        let err = next(&mut parser, &mut ReadProfile::default()).unwrap_err();
        assert!(matches!(err, ReaderError::ProtocolViolation(_)));
        assert_eq!(parser.count(), 0);
    }

    #[test]
    fn oversized_frame_is_protocol_violation() {
        let (registry, parser) = setup();
        let mut parser = parser.with_max_payload(4);
        let mut writer = FrameWriter::new(registry.create(1).unwrap());
        writer.send(b"12345").unwrap();
        init(&mut parser, ":1").unwrap();

        let err = next(&mut parser, &mut ReadProfile::default()).unwrap_err();
        assert!(matches!(err, ReaderError::ProtocolViolation(_)));
    }

    #[test]
    fn scratch_grows_and_never_shrinks() {
        let (registry, mut parser) = setup();
        let queue = registry.create(1).unwrap();
        let small = vec![1u8; 10];
        let large = vec![2u8; 10_000];
        let frames = vec![small.clone(), large.clone(), small.clone()];

        let producer = thread::spawn(move || {
            let mut writer = FrameWriter::new(queue);
            for frame in &frames {
                writer.send(frame).unwrap();
            }
            writer.finish().unwrap();
        });

        init(&mut parser, ":1").unwrap();
        let mut profile = ReadProfile::default();
        let mut lengths = Vec::new();
        let mut payloads = Vec::new();
        while let Some(payload) = next(&mut parser, &mut profile).unwrap() {
            lengths.push(parser.scratch_len());
            payloads.push(payload);
        }
        producer.join().unwrap();

        assert_eq!(payloads, vec![small.clone(), large, small]);
        assert!(lengths.windows(2).all(|w| w[0] <= w[1]));
        assert!(lengths[1] >= 10_000);
    }

    #[test]
    fn term_without_read_returns_zero() {
        let (registry, mut parser) = setup();
        let _writer = registry.create(1).unwrap();
        init(&mut parser, ":1").unwrap();
        assert_eq!(Box::new(parser).term(), 0);

        let (_registry, parser) = setup();
        assert_eq!(Box::new(parser).term(), 0);
    }

    #[test]
    fn recognizes_no_keywords() {
        let (_registry, mut parser) = setup();
        assert!(!parser.param("OFFSET", "1").unwrap());
        assert_eq!(parser.dump_params(), vec!["TYPE = TUPLE"]);
    }
}
