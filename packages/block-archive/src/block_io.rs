//! Newline-delimited JSON encoding of block streams.
//!
//! Partial bundles, merged bundles and one-block files all share this format:
//! one serialized [Block] per line. Blank lines are skipped.
use std::io::{BufRead, BufReader, Read};

use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum BlockDecodeError {
    #[error("I/O error while reading blocks: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid block on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Yields decoded blocks one at a time.
pub trait BlockReader: Send {
    /// Read the next block. `Ok(None)` signals the end of the stream.
    fn read(&mut self) -> Result<Option<Block>, BlockDecodeError>;
}

/// Produces a [BlockReader] for a raw byte stream.
pub trait BlockReaderFactory: Send + Sync {
    fn new_reader(
        &self,
        input: Box<dyn Read + Send>,
    ) -> Result<Box<dyn BlockReader>, BlockDecodeError>;
}

/// Default factory, reading the newline-delimited JSON format.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonBlockReaderFactory;

impl BlockReaderFactory for JsonBlockReaderFactory {
    fn new_reader(
        &self,
        input: Box<dyn Read + Send>,
    ) -> Result<Box<dyn BlockReader>, BlockDecodeError> {
        Ok(Box::new(JsonBlockReader::new(input)))
    }
}

pub struct JsonBlockReader<R> {
    input: BufReader<R>,
    line: usize,
    buf: String,
}

impl<R: Read> JsonBlockReader<R> {
    pub fn new(input: R) -> Self {
        JsonBlockReader {
            input: BufReader::new(input),
            line: 0,
            buf: String::new(),
        }
    }
}

impl<R: Read + Send> BlockReader for JsonBlockReader<R> {
    fn read(&mut self) -> Result<Option<Block>, BlockDecodeError> {
        loop {
            self.buf.clear();
            if self.input.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(|source| BlockDecodeError::Json {
                    line: self.line,
                    source,
                });
        }
    }
}

/// Render a block as a single line, including the trailing newline.
pub fn encode_block(block: &Block) -> Result<String> {
    let mut line = serde_json::to_string(block)
        .with_context(|| format!("Unable to serialize block {block}"))?;
    line.push('\n');
    Ok(line)
}

/// Render a sequence of blocks, one per line.
pub fn encode_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Result<String> {
    blocks
        .into_iter()
        .map(encode_block)
        .collect::<Result<Vec<_>>>()
        .map(|lines| lines.concat())
}
