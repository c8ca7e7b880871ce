use bytes::{Bytes, BytesMut};

/// Buffers incoming bytes until a full part is available
///
/// The whole pending buffer is flushed as one part as soon as it reaches the
/// threshold, so a single chunk larger than the threshold becomes one
/// oversized part rather than being split.
#[derive(Debug)]
pub struct ChunkAccumulator {
    buffer: BytesMut,
    threshold: usize,
}

impl ChunkAccumulator {
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            threshold: threshold.max(1),
        }
    }

    /// Append `chunk`; returns the completed part if the threshold was reached
    pub fn absorb(&mut self, chunk: &[u8]) -> Option<Bytes> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() >= self.threshold {
            Some(self.buffer.split().freeze())
        } else {
            None
        }
    }

    /// Take whatever is left at end of stream
    pub fn drain(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().freeze())
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
