//! Line framing for the controller's byte stream.
//!
//! TCP reads carry no message boundaries. [`FrameAssembler`] accumulates
//! bytes until a read ends on a newline, then yields every complete line
//! in arrival order.

use bytes::{Bytes, BytesMut};

use crate::error::Error;

const LINE_TERMINATOR: u8 = b'\n';

/// Default cap on pending bytes without a terminator (1 MiB).
pub const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;

/// Accumulates stream chunks into complete protocol lines.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    max_buffer: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER)
    }
}

impl FrameAssembler {
    pub fn new(max_buffer: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_buffer,
        }
    }

    /// Feed one chunk; returns the complete lines it finished, as raw
    /// bytes. Text decoding is left to [`crate::codec::decode_line`].
    ///
    /// Only a chunk that itself ends in `\n` flushes the buffer. Empty
    /// segments are dropped and a trailing `\r` is stripped. If the pending
    /// buffer grows past the limit it is discarded and
    /// [`Error::FrameOverflow`] is returned; the assembler stays usable.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, Error> {
        self.buffer.extend_from_slice(chunk);

        if chunk.last() == Some(&LINE_TERMINATOR) {
            let pending = self.buffer.split().freeze();
            let lines = pending[..]
                .split(|b| *b == LINE_TERMINATOR)
                .map(|segment| segment.strip_suffix(b"\r").unwrap_or(segment))
                .filter(|segment| !segment.is_empty())
                .map(|segment| pending.slice_ref(segment))
                .collect();
            return Ok(lines);
        }

        if self.buffer.len() > self.max_buffer {
            self.buffer.clear();
            return Err(Error::FrameOverflow {
                limit: self.max_buffer,
            });
        }

        Ok(Vec::new())
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line, e.g. after a disconnect.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
