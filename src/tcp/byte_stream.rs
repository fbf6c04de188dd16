//! A bounded, single-owner FIFO of bytes: the one place backpressure lives.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

/// A capacity-bounded byte buffer with an EOF flag and an error flag.
///
/// Writes beyond `remaining_capacity` are silently truncated; the caller
/// must inspect the returned count. Reading never blocks: `peek_output`
/// never returns more than `buffer_size` bytes.
#[derive(Debug)]
pub struct ByteStream {
    buffer: VecDeque<u8>,
    capacity: usize,
    bytes_written: u64,
    bytes_read: u64,
    input_ended: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            bytes_written: 0,
            bytes_read: 0,
            input_ended: false,
            error: false,
        }
    }

    /// Writes as much of `data` as fits in the remaining capacity.
    /// Returns the number of bytes actually accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(self.remaining_capacity());
        self.buffer.extend(&data[..accepted]);
        self.bytes_written += accepted as u64;
        accepted
    }

    /// Returns up to `len` bytes from the head of the buffer without
    /// removing them.
    pub fn peek_output(&self, len: usize) -> Bytes {
        let len = len.min(self.buffer.len());
        let mut out = BytesMut::with_capacity(len);
        out.extend(self.buffer.iter().take(len));
        out.freeze()
    }

    /// Discards up to `len` bytes from the head of the buffer.
    pub fn pop_output(&mut self, len: usize) {
        let len = len.min(self.buffer.len());
        self.buffer.drain(..len);
        self.bytes_read += len as u64;
    }

    /// Convenience: peek then pop.
    pub fn read(&mut self, len: usize) -> Bytes {
        let out = self.peek_output(len);
        self.pop_output(out.len());
        out
    }

    pub fn end_input(&mut self) {
        self.input_ended = true;
    }

    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn input_ended(&self) -> bool {
        self.input_ended
    }

    pub fn error(&self) -> bool {
        self.error
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn eof(&self) -> bool {
        self.input_ended && self.buffer.is_empty()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip() {
        let mut s = ByteStream::new(16);
        assert_eq!(s.write(b"hello"), 5);
        assert_eq!(s.buffer_size(), 5);
        assert_eq!(s.read(5).as_ref(), b"hello");
        assert_eq!(s.bytes_written(), 5);
        assert_eq!(s.bytes_read(), 5);
    }

    #[test]
    fn write_truncates_at_capacity() {
        let mut s = ByteStream::new(3);
        assert_eq!(s.write(b"hello"), 3);
        assert_eq!(s.remaining_capacity(), 0);
        assert_eq!(s.peek_output(10).as_ref(), b"hel");
    }

    #[test]
    fn eof_requires_empty_buffer() {
        let mut s = ByteStream::new(4);
        s.write(b"ab");
        s.end_input();
        assert!(s.input_ended());
        assert!(!s.eof());
        s.pop_output(2);
        assert!(s.eof());
    }

    #[test]
    fn peek_does_not_remove() {
        let mut s = ByteStream::new(4);
        s.write(b"ab");
        assert_eq!(s.peek_output(1).as_ref(), b"a");
        assert_eq!(s.buffer_size(), 2);
    }
}
