//! Binary record decoder.
//!
//! `RecordDecoder::parse_record` consumes framing records (header, dictionary
//! reset, dictionary add) transparently and streams exactly one value record
//! into a [`ValueSink`], without ever materialising the value. `seek_sync`
//! re-establishes a record boundary after an arbitrary seek: scan for the
//! terminator, validate the candidate record, and if its dictionary
//! generation is not cached, rebuild it by replaying forward from the
//! governing reset.

use crate::dictionary::Dictionary;
use crate::error::{ParseError, Result};
use crate::format::{marker, tag, unzigzag, TERMINATOR};
use crate::sink::ValueSink;
use crate::source::ByteSource;

/// Strings are streamed to sinks in fragments of at most this size.
const STRING_CHUNK: usize = 4096;

/// Container nesting limit; prevents unbounded recursion on hostile input.
const MAX_DEPTH: usize = 192;

/// Decode a varint directly off the source.
fn read_varint(src: &mut ByteSource) -> Result<u64> {
    let start = src.pos();
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let pos = src.pos();
        let byte = src.next()?.ok_or(ParseError::Truncated(pos))?;
        let bits = (byte & 0x7f) as u64;
        if shift > 63 || (shift == 63 && bits > 1) {
            return Err(ParseError::VarintOverflow(start));
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn read_exact(src: &mut ByteSource, dst: &mut [u8]) -> Result<()> {
    let mut off = 0;
    while off < dst.len() {
        let n = src.read_chunk(&mut dst[off..])?;
        if n == 0 {
            return Err(ParseError::Truncated(src.pos()));
        }
        off += n;
    }
    Ok(())
}

fn expect_terminator(src: &mut ByteSource) -> Result<()> {
    let pos = src.pos();
    let mut t = [0u8; 2];
    read_exact(src, &mut t)?;
    if t != TERMINATOR {
        return Err(ParseError::MissingTerminator(pos));
    }
    Ok(())
}

/// Read one length-prefixed string body.
fn read_string(src: &mut ByteSource, len: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(len.min(64 * 1024) as usize);
    let mut remaining = len;
    let mut chunk = [0u8; STRING_CHUNK];
    while remaining > 0 {
        let want = chunk.len().min(remaining as usize);
        let n = src.read_chunk(&mut chunk[..want])?;
        if n == 0 {
            return Err(ParseError::Truncated(src.pos()));
        }
        out.extend_from_slice(&chunk[..n]);
        remaining -= n as u64;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Raw record headers (stats, resync replay)
// ---------------------------------------------------------------------------

/// One record header with its payload skipped, not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawRecord {
    Header { version: u64 },
    Reset,
    Add { count: u64, bytes: u64 },
    Value { len: u64 },
}

/// Read and skip one record, reporting only its shape. `None` at end of
/// stream.
pub fn read_raw_record(src: &mut ByteSource) -> Result<Option<RawRecord>> {
    let sor = src.pos();
    let Some(m) = src.next()? else {
        return Ok(None);
    };
    let raw = match m {
        marker::HEADER => {
            let version = read_varint(src)?;
            RawRecord::Header { version }
        }
        marker::RESET => RawRecord::Reset,
        marker::ADD => {
            let _backref = read_varint(src)?;
            let count = read_varint(src)?;
            let mut bytes = 0u64;
            for _ in 0..count {
                let len = read_varint(src)?;
                if src.skip(len)? < len {
                    return Err(ParseError::Truncated(src.pos()));
                }
                bytes += len;
            }
            RawRecord::Add { count, bytes }
        }
        marker::VALUE => {
            let _backref = read_varint(src)?;
            let len = read_varint(src)?;
            if src.skip(len)? < len {
                return Err(ParseError::Truncated(src.pos()));
            }
            RawRecord::Value { len }
        }
        other => return Err(ParseError::BadMarker { pos: sor, marker: other }),
    };
    expect_terminator(src)?;
    Ok(Some(raw))
}

// ---------------------------------------------------------------------------
// Record decoder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordDecoder {
    dictionary: Dictionary,
}

impl RecordDecoder {
    pub fn new() -> Self {
        RecordDecoder::default()
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Consume records until one value record has been streamed into `sink`.
    /// Framing records update the dictionary on the way. Returns false at a
    /// clean end of stream.
    pub fn parse_record<S: ValueSink>(
        &mut self,
        src: &mut ByteSource,
        sink: &mut S,
    ) -> Result<bool> {
        loop {
            let sor = src.pos();
            let Some(m) = src.next()? else {
                return Ok(false);
            };
            match m {
                marker::HEADER => {
                    let _version = read_varint(src)?;
                    expect_terminator(src)?;
                }
                marker::RESET => {
                    expect_terminator(src)?;
                    let end = src.pos();
                    self.dictionary.reset(sor, end);
                }
                marker::ADD => {
                    self.consume_add(src, sor)?;
                }
                marker::VALUE => {
                    let backref = read_varint(src)?;
                    let len = read_varint(src)?;
                    let reset_pos = sor
                        .checked_sub(backref)
                        .ok_or(ParseError::Truncated(sor))?;
                    let end = src
                        .pos()
                        .checked_add(len)
                        .ok_or(ParseError::PayloadOverrun(sor))?;
                    {
                        let dict = self
                            .dictionary
                            .find(reset_pos)
                            .ok_or(ParseError::DictMiss(reset_pos))?;
                        parse_value(src, dict, end, 0, sink)?;
                    }
                    if src.pos() != end {
                        return Err(ParseError::PayloadOverrun(src.pos()));
                    }
                    expect_terminator(src)?;
                    return Ok(true);
                }
                other => {
                    return Err(ParseError::BadMarker { pos: sor, marker: other });
                }
            }
        }
    }

    /// Parse a dictionary-add record. The strings are always consumed; they
    /// are applied to the generation only if a rewind has not already
    /// replayed this record.
    fn consume_add(&mut self, src: &mut ByteSource, sor: u64) -> Result<()> {
        let backref = read_varint(src)?;
        let count = read_varint(src)?;
        let reset_pos = sor
            .checked_sub(backref)
            .ok_or(ParseError::Truncated(sor))?;
        let mut strings = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let len = read_varint(src)?;
            let pos = src.pos();
            let bytes = read_string(src, len)?;
            let s = String::from_utf8(bytes).map_err(|_| ParseError::BadUtf8(pos))?;
            strings.push(s);
        }
        expect_terminator(src)?;
        let end = src.pos();
        let dict = self
            .dictionary
            .find(reset_pos)
            .ok_or(ParseError::DictMiss(reset_pos))?;
        if dict.needs_add(sor) {
            dict.apply_add(strings, end);
        }
        Ok(())
    }

    /// Position the source at the first record boundary at or after `pos`,
    /// with the dictionary ready for it. Reaching end of stream without
    /// finding a boundary is not an error; the next parse reports no value.
    pub fn seek_sync(&mut self, src: &mut ByteSource, pos: u64) -> Result<()> {
        src.seek(pos)?;
        if pos == 0 {
            // Well-formed files start at a boundary; only scan if this one
            // doesn't.
            if self.prepare_at(src, 0)? {
                return src.seek(0);
            }
            src.seek(0)?;
        }
        loop {
            if !src.scan_to(&TERMINATOR)? {
                return Ok(());
            }
            let sor = src.pos();
            if src.peek()?.is_none() {
                return Ok(());
            }
            if self.prepare_at(src, sor)? {
                return src.seek(sor);
            }
            src.seek(sor)?;
        }
    }

    /// Validate the record at `sor` and ready its dictionary generation.
    /// Structural problems mean "not a real boundary" (false); I/O errors
    /// propagate.
    fn prepare_at(&mut self, src: &mut ByteSource, sor: u64) -> Result<bool> {
        match self.try_prepare(src, sor) {
            Ok(()) => Ok(true),
            Err(ParseError::Io(e)) => Err(ParseError::Io(e)),
            Err(_) => Ok(false),
        }
    }

    fn try_prepare(&mut self, src: &mut ByteSource, sor: u64) -> Result<()> {
        src.seek(sor)?;
        let Some(m) = src.next()? else {
            // Terminator right at end of stream: a valid (empty) boundary.
            return Ok(());
        };
        match m {
            marker::HEADER => {
                read_varint(src)?;
                expect_terminator(src)
            }
            marker::RESET => expect_terminator(src),
            marker::ADD | marker::VALUE => {
                let backref = read_varint(src)?;
                let reset_pos = sor
                    .checked_sub(backref)
                    .ok_or(ParseError::Truncated(sor))?;
                if m == marker::VALUE {
                    let len = read_varint(src)?;
                    let term_pos = src
                        .pos()
                        .checked_add(len)
                        .ok_or(ParseError::PayloadOverrun(sor))?;
                    src.seek(term_pos)?;
                    expect_terminator(src)?;
                }
                if !self.dictionary.contains(reset_pos) {
                    self.rebuild_generation(src, reset_pos, sor)?;
                }
                Ok(())
            }
            other => Err(ParseError::BadMarker { pos: sor, marker: other }),
        }
    }

    /// Rebuild the generation rooted at `reset_pos` by replaying forward to
    /// `stop`, consuming dictionary records and skipping value payloads.
    fn rebuild_generation(
        &mut self,
        src: &mut ByteSource,
        reset_pos: u64,
        stop: u64,
    ) -> Result<()> {
        src.seek(reset_pos)?;
        let Some(m) = src.next()? else {
            return Err(ParseError::Truncated(reset_pos));
        };
        if m != marker::RESET {
            return Err(ParseError::BadMarker { pos: reset_pos, marker: m });
        }
        expect_terminator(src)?;
        let end = src.pos();
        self.dictionary.reset(reset_pos, end);
        while src.pos() < stop {
            let sor = src.pos();
            let Some(m) = src.next()? else {
                return Err(ParseError::Truncated(sor));
            };
            match m {
                marker::HEADER => {
                    read_varint(src)?;
                    expect_terminator(src)?;
                }
                marker::RESET => {
                    expect_terminator(src)?;
                    let end = src.pos();
                    self.dictionary.reset(sor, end);
                }
                marker::ADD => self.consume_add(src, sor)?,
                marker::VALUE => {
                    let _backref = read_varint(src)?;
                    let len = read_varint(src)?;
                    if src.skip(len)? < len {
                        return Err(ParseError::Truncated(src.pos()));
                    }
                    expect_terminator(src)?;
                }
                other => {
                    return Err(ParseError::BadMarker { pos: sor, marker: other });
                }
            }
        }
        Ok(())
    }
}

/// Stream one value payload into the sink. `end` is the absolute offset just
/// past the payload.
fn parse_value<S: ValueSink>(
    src: &mut ByteSource,
    dict: &crate::dictionary::Dict,
    end: u64,
    depth: usize,
    sink: &mut S,
) -> Result<()> {
    let pos = src.pos();
    if pos >= end {
        return Err(ParseError::PayloadOverrun(pos));
    }
    if depth > MAX_DEPTH {
        return Err(ParseError::TooDeep(pos));
    }
    let t = src.next()?.ok_or(ParseError::Truncated(pos))?;
    match t {
        tag::NULL => sink.on_null(),
        tag::TRUE => sink.on_bool(true),
        tag::FALSE => sink.on_bool(false),
        tag::INT => {
            let v = read_varint(src)?;
            sink.on_int(unzigzag(v));
        }
        tag::UINT => {
            let v = read_varint(src)?;
            sink.on_uint(v);
        }
        tag::TIME => {
            let v = read_varint(src)?;
            sink.on_time(unzigzag(v));
        }
        tag::DOUBLE => {
            let mut b = [0u8; 8];
            read_exact(src, &mut b)?;
            sink.on_double(f64::from_le_bytes(b));
        }
        tag::STR => {
            let len = read_varint(src)?;
            let body_end = src
                .pos()
                .checked_add(len)
                .ok_or(ParseError::PayloadOverrun(pos))?;
            if body_end > end {
                return Err(ParseError::PayloadOverrun(pos));
            }
            sink.on_string_start(len as usize);
            let mut remaining = len as usize;
            let mut chunk = [0u8; STRING_CHUNK];
            while remaining > 0 {
                let want = chunk.len().min(remaining);
                let n = src.read_chunk(&mut chunk[..want])?;
                if n == 0 {
                    return Err(ParseError::Truncated(src.pos()));
                }
                sink.on_string_fragment(&chunk[..n]);
                remaining -= n;
            }
            sink.on_string_end();
        }
        tag::DICT_REF => {
            let idx = read_varint(src)? as usize;
            let s = dict
                .get(idx)
                .ok_or(ParseError::DictIndex { pos, index: idx })?;
            sink.on_dict_ref(idx, s);
        }
        tag::ARRAY_START => {
            sink.on_array_start();
            loop {
                let p = src.pos();
                if p >= end {
                    return Err(ParseError::PayloadOverrun(p));
                }
                if src.peek()? == Some(tag::ARRAY_END) {
                    src.next()?;
                    break;
                }
                parse_value(src, dict, end, depth + 1, sink)?;
            }
            sink.on_array_end();
        }
        tag::OBJECT_START => {
            sink.on_object_start();
            loop {
                let p = src.pos();
                if p >= end {
                    return Err(ParseError::PayloadOverrun(p));
                }
                if src.peek()? == Some(tag::OBJECT_END) {
                    src.next()?;
                    break;
                }
                parse_value(src, dict, end, depth + 1, sink)?;
            }
            sink.on_object_end();
        }
        other => return Err(ParseError::BadTag { pos, tag: other }),
    }
    Ok(())
}
