//! Buffered byte cursor over files and streams.
//!
//! `ByteSource` is the single I/O primitive the decoders and drivers consume:
//! `peek`/`next`/`pos` for forward parsing, `seek` for rewinds and bisect
//! probes, `scan_to` for boundary resync, and a pin that obliges the source
//! to retain already-read bytes so a later backward seek can replay them on
//! a non-seekable stream.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use memchr::memmem;

use crate::error::{ParseError, Result};

const READ_CHUNK: usize = 64 * 1024;
/// Don't bother shifting the buffer until at least this many bytes are dead.
const COMPACT_THRESHOLD: usize = 256 * 1024;

trait SeekRead: Read + Seek {}
impl<T: Read + Seek> SeekRead for T {}

enum Input {
    Seekable(Box<dyn SeekRead>),
    Stream(Box<dyn Read>),
}

pub struct ByteSource {
    input: Input,
    name: String,
    /// Retained bytes; `buf[0]` sits at absolute offset `buf_pos`.
    buf: Vec<u8>,
    buf_pos: u64,
    /// Index into `buf` of the next byte to hand out.
    cursor: usize,
    pin: Option<u64>,
    known_end: Option<u64>,
}

impl ByteSource {
    fn new(input: Input, name: String) -> Self {
        ByteSource {
            input,
            name,
            buf: Vec::with_capacity(READ_CHUNK),
            buf_pos: 0,
            cursor: 0,
            pin: None,
            known_end: None,
        }
    }

    pub fn open(path: &str) -> Result<ByteSource> {
        let file = File::open(path)?;
        Ok(ByteSource::new(
            Input::Seekable(Box::new(file)),
            path.to_string(),
        ))
    }

    pub fn stdin() -> ByteSource {
        ByteSource::new(Input::Stream(Box::new(io::stdin())), "-".to_string())
    }

    /// Seekable in-memory source.
    pub fn from_bytes(data: Vec<u8>, name: &str) -> ByteSource {
        ByteSource::new(Input::Seekable(Box::new(Cursor::new(data))), name.to_string())
    }

    /// Non-seekable in-memory source, for exercising the pipe paths.
    pub fn stream_from_bytes(data: Vec<u8>, name: &str) -> ByteSource {
        ByteSource::new(Input::Stream(Box::new(Cursor::new(data))), name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self.input, Input::Seekable(_))
    }

    /// Absolute offset of the next byte.
    pub fn pos(&self) -> u64 {
        self.buf_pos + self.cursor as u64
    }

    /// Oblige the source to retain bytes from `pos` onward.
    pub fn set_pin(&mut self, pos: u64) {
        self.pin = Some(pos);
    }

    pub fn clear_pin(&mut self) {
        self.pin = None;
    }

    fn compact(&mut self) {
        let keep_abs = match self.pin {
            Some(p) => p.min(self.pos()),
            None => self.pos(),
        };
        let keep_idx = keep_abs.saturating_sub(self.buf_pos) as usize;
        if keep_idx >= COMPACT_THRESHOLD {
            self.buf.drain(..keep_idx);
            self.buf_pos += keep_idx as u64;
            self.cursor -= keep_idx;
        }
    }

    /// Pull one chunk from the underlying input. Returns the number of bytes
    /// appended; 0 means end of stream.
    fn fill(&mut self) -> io::Result<usize> {
        self.compact();
        let old_len = self.buf.len();
        self.buf.resize(old_len + READ_CHUNK, 0);
        let n = loop {
            let res = match &mut self.input {
                Input::Seekable(r) => r.read(&mut self.buf[old_len..]),
                Input::Stream(r) => r.read(&mut self.buf[old_len..]),
            };
            match res {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(old_len);
                    return Err(e);
                }
            }
        };
        self.buf.truncate(old_len + n);
        Ok(n)
    }

    pub fn peek(&mut self) -> Result<Option<u8>> {
        if self.cursor >= self.buf.len() && self.fill()? == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf[self.cursor]))
    }

    pub fn next(&mut self) -> Result<Option<u8>> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.cursor += 1;
        }
        Ok(byte)
    }

    /// Reposition the cursor. Always possible within the retained buffer;
    /// elsewhere only on seekable inputs.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        let lo = self.buf_pos;
        let hi = self.buf_pos + self.buf.len() as u64;
        if pos >= lo && pos <= hi {
            self.cursor = (pos - lo) as usize;
            return Ok(());
        }
        match &mut self.input {
            Input::Seekable(r) => {
                r.seek(SeekFrom::Start(pos))?;
                self.buf.clear();
                self.buf_pos = pos;
                self.cursor = 0;
                Ok(())
            }
            Input::Stream(_) => {
                if pos < lo {
                    Err(ParseError::SeekBeforeWindow {
                        name: self.name.clone(),
                        target: pos,
                    })
                } else {
                    Err(ParseError::NotSeekable(self.name.clone()))
                }
            }
        }
    }

    /// Total length of the input. Seekable sources only.
    pub fn end_pos(&mut self) -> Result<u64> {
        if let Some(end) = self.known_end {
            return Ok(end);
        }
        match &mut self.input {
            Input::Seekable(r) => {
                let end = r.seek(SeekFrom::End(0))?;
                // The next fill continues where the buffer left off.
                r.seek(SeekFrom::Start(self.buf_pos + self.buf.len() as u64))?;
                self.known_end = Some(end);
                Ok(end)
            }
            Input::Stream(_) => Err(ParseError::NotSeekable(self.name.clone())),
        }
    }

    /// Advance past the next occurrence of `needle`. Returns false (cursor at
    /// end of stream) if the needle never occurs again.
    pub fn scan_to(&mut self, needle: &[u8]) -> Result<bool> {
        debug_assert!(!needle.is_empty());
        loop {
            if let Some(idx) = memmem::find(&self.buf[self.cursor..], needle) {
                self.cursor += idx + needle.len();
                return Ok(true);
            }
            // Consume everything except a needle-sized overlap tail.
            let tail = self.buf.len().saturating_sub(needle.len() - 1);
            self.cursor = self.cursor.max(tail);
            if self.fill()? == 0 {
                self.cursor = self.buf.len();
                return Ok(false);
            }
        }
    }

    /// Copy up to `dst.len()` bytes into `dst`. Returns 0 only at EOF.
    pub fn read_chunk(&mut self, dst: &mut [u8]) -> Result<usize> {
        if self.cursor >= self.buf.len() && self.fill()? == 0 {
            return Ok(0);
        }
        let n = dst.len().min(self.buf.len() - self.cursor);
        dst[..n].copy_from_slice(&self.buf[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    /// Consume up to `n` bytes; returns how many were actually available.
    pub fn skip(&mut self, mut n: u64) -> Result<u64> {
        let mut skipped = 0u64;
        while n > 0 {
            if self.cursor >= self.buf.len() && self.fill()? == 0 {
                break;
            }
            let take = ((self.buf.len() - self.cursor) as u64).min(n);
            self.cursor += take as usize;
            n -= take;
            skipped += take;
        }
        Ok(skipped)
    }

    /// Read one line (including the trailing newline, when present) into
    /// `out`. Returns false when the stream is exhausted and nothing was read.
    pub fn read_line(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        out.clear();
        loop {
            if self.cursor >= self.buf.len() && self.fill()? == 0 {
                return Ok(!out.is_empty());
            }
            match memchr::memchr(b'\n', &self.buf[self.cursor..]) {
                Some(idx) => {
                    out.extend_from_slice(&self.buf[self.cursor..self.cursor + idx + 1]);
                    self.cursor += idx + 1;
                    return Ok(true);
                }
                None => {
                    out.extend_from_slice(&self.buf[self.cursor..]);
                    self.cursor = self.buf.len();
                }
            }
        }
    }

    /// Non-consuming check of the bytes at the cursor.
    pub fn starts_with(&mut self, prefix: &[u8]) -> Result<bool> {
        while self.buf.len() - self.cursor < prefix.len() {
            if self.fill()? == 0 {
                break;
            }
        }
        let avail = &self.buf[self.cursor..];
        Ok(avail.len() >= prefix.len() && &avail[..prefix.len()] == prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_next_pos() {
        let mut src = ByteSource::from_bytes(b"abc".to_vec(), "t");
        assert_eq!(src.peek().unwrap(), Some(b'a'));
        assert_eq!(src.pos(), 0);
        assert_eq!(src.next().unwrap(), Some(b'a'));
        assert_eq!(src.next().unwrap(), Some(b'b'));
        assert_eq!(src.pos(), 2);
        assert_eq!(src.next().unwrap(), Some(b'c'));
        assert_eq!(src.next().unwrap(), None);
        assert_eq!(src.peek().unwrap(), None);
    }

    #[test]
    fn seek_within_buffer_on_stream() {
        let mut src = ByteSource::stream_from_bytes(b"hello world".to_vec(), "t");
        let mut b = [0u8; 6];
        assert_eq!(src.read_chunk(&mut b).unwrap(), 6);
        src.seek(0).unwrap();
        assert_eq!(src.next().unwrap(), Some(b'h'));
    }

    #[test]
    fn stream_refuses_forward_seek_past_buffer() {
        let mut src = ByteSource::stream_from_bytes(vec![0u8; 16], "t");
        assert!(matches!(
            src.seek(1 << 40),
            Err(ParseError::NotSeekable(_))
        ));
    }

    #[test]
    fn pin_retains_bytes_on_stream() {
        // Big enough that compaction would discard unpinned history.
        let data: Vec<u8> = (0..(COMPACT_THRESHOLD * 3)).map(|i| (i % 251) as u8).collect();
        let mut src = ByteSource::stream_from_bytes(data.clone(), "t");
        src.set_pin(10);
        src.skip((COMPACT_THRESHOLD * 2) as u64).unwrap();
        src.peek().unwrap();
        src.seek(10).unwrap();
        assert_eq!(src.next().unwrap(), Some(data[10]));
    }

    #[test]
    fn unpinned_history_is_discarded_on_stream() {
        let data: Vec<u8> = vec![7u8; COMPACT_THRESHOLD * 3];
        let mut src = ByteSource::stream_from_bytes(data, "t");
        src.skip((COMPACT_THRESHOLD * 2) as u64).unwrap();
        src.peek().unwrap();
        assert!(matches!(
            src.seek(0),
            Err(ParseError::SeekBeforeWindow { .. })
        ));
    }

    #[test]
    fn seekable_rewinds_anywhere() {
        let data: Vec<u8> = (0..(COMPACT_THRESHOLD * 3)).map(|i| (i % 251) as u8).collect();
        let mut src = ByteSource::from_bytes(data.clone(), "t");
        src.skip((COMPACT_THRESHOLD * 2 + 5) as u64).unwrap();
        src.seek(3).unwrap();
        assert_eq!(src.next().unwrap(), Some(data[3]));
    }

    #[test]
    fn scan_to_spans_fill_boundaries() {
        // Put the needle well past one read chunk, split across fills.
        let mut data = vec![b'x'; READ_CHUNK + 17];
        data.extend_from_slice(b"\xFE\nrest");
        let mut src = ByteSource::from_bytes(data, "t");
        assert!(src.scan_to(&[0xFE, b'\n']).unwrap());
        assert_eq!(src.pos(), (READ_CHUNK + 17 + 2) as u64);
        assert_eq!(src.next().unwrap(), Some(b'r'));
    }

    #[test]
    fn scan_to_miss_lands_at_eof() {
        let mut src = ByteSource::from_bytes(vec![b'x'; 100], "t");
        assert!(!src.scan_to(&[0xFE, b'\n']).unwrap());
        assert_eq!(src.peek().unwrap(), None);
        assert_eq!(src.pos(), 100);
    }

    #[test]
    fn end_pos_reports_length_without_moving_cursor() {
        let mut src = ByteSource::from_bytes(vec![1, 2, 3, 4], "t");
        src.next().unwrap();
        assert_eq!(src.end_pos().unwrap(), 4);
        assert_eq!(src.pos(), 1);
        assert_eq!(src.next().unwrap(), Some(2));
    }

    #[test]
    fn end_pos_fails_on_stream() {
        let mut src = ByteSource::stream_from_bytes(vec![1], "t");
        assert!(matches!(src.end_pos(), Err(ParseError::NotSeekable(_))));
    }

    #[test]
    fn read_line_keeps_newline() {
        let mut src = ByteSource::from_bytes(b"one\ntwo".to_vec(), "t");
        let mut line = Vec::new();
        assert!(src.read_line(&mut line).unwrap());
        assert_eq!(line, b"one\n");
        assert!(src.read_line(&mut line).unwrap());
        assert_eq!(line, b"two");
        assert!(!src.read_line(&mut line).unwrap());
    }

    #[test]
    fn starts_with_does_not_consume() {
        let mut src = ByteSource::from_bytes(b"Jabc".to_vec(), "t");
        assert!(src.starts_with(b"Jab").unwrap());
        assert!(!src.starts_with(b"Jax").unwrap());
        assert_eq!(src.pos(), 0);
        assert_eq!(src.next().unwrap(), Some(b'J'));
    }
}
