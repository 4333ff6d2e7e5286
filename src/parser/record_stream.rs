use std::io::Read;

use nom::Err;

use crate::errors::CollateError;
use crate::parser::json_tokenizer::is_filler_byte;
use crate::parser::record_extractor::{RecordExtractor, parse_record};

// 64 KB chunks keep stdin latency low while amortizing syscalls.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Chunked record reader over any byte source. Records are re-parsed from
/// the start of the working buffer whenever the tokenizer reports
/// `Incomplete`, after pulling another chunk from the reader.
pub struct RecordStream<R> {
    reader: R,
    buffer: Vec<u8>,
    consumed: usize,
    processed: usize,
    eof: bool,
}

impl<R: Read> RecordStream<R> {
    pub fn new(reader: R) -> Self {
        RecordStream {
            reader,
            buffer: Vec::with_capacity(READ_BUFFER_SIZE),
            consumed: 0,
            processed: 0,
            eof: false,
        }
    }

    /// Parses the next top-level object into the extractor's scratch.
    /// Returns `false` at clean end of input. The captured spans stay
    /// valid (via `record_bytes`) until the next call.
    pub fn next_record(&mut self, extractor: &mut RecordExtractor) -> Result<bool, CollateError> {
        self.buffer.drain(..self.consumed);
        self.processed += self.consumed;
        self.consumed = 0;
        loop {
            match parse_record(&self.buffer, extractor) {
                Ok((rest, ())) => {
                    self.consumed = self.buffer.len() - rest.len();
                    return Ok(true);
                }
                Err(Err::Incomplete(_)) => {
                    if self.eof {
                        if self.buffer.iter().all(|b| is_filler_byte(*b)) {
                            return Ok(false);
                        }
                        return Err(CollateError::TruncatedRecord);
                    }
                    self.fill()?;
                }
                Err(Err::Error(e)) | Err(Err::Failure(e)) => {
                    let offset = self.processed + (self.buffer.len() - e.input.len());
                    return Err(CollateError::MalformedRecord { offset });
                }
            }
        }
    }

    /// The working buffer the most recent record's spans index into.
    pub fn record_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn fill(&mut self) -> std::io::Result<()> {
        let start = self.buffer.len();
        self.buffer.resize(start + READ_BUFFER_SIZE, 0);
        let n = self.reader.read(&mut self.buffer[start..])?;
        self.buffer.truncate(start + n);
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }
}
