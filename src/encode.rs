//! `enc`: JSON lines in, jot binary out.
//!
//! An [`EncodeSink`] assembles each value payload from the same SAX events
//! the decoders produce. The framing layer interns short strings, flushes
//! newly interned entries as a dict-add record immediately before the value
//! record that first references them, and roots a fresh generation whenever
//! the intern table reaches its cap. Strings shaped like RFC 3339 instants
//! are stored as native timestamps (object keys excepted).

use std::collections::HashMap;
use std::io::Write;

use crate::error::Result;
use crate::format::{self, marker, tag, write_varint, zigzag, FORMAT_VERSION, TERMINATOR};
use crate::jsontext;
use crate::sink::ValueSink;

/// Intern table cap; reaching it roots a new generation.
const DICT_CAP: usize = 1024;
/// Strings longer than this are stored inline, not interned.
const INTERN_MAX_LEN: usize = 64;

pub struct Encoder<W: Write> {
    out: W,
    written: u64,
    last_reset_pos: u64,
    table: HashMap<String, usize>,
    dict_cap: usize,
    started: bool,
}

impl<W: Write> Encoder<W> {
    pub fn new(out: W) -> Self {
        Encoder::with_dict_cap(out, DICT_CAP)
    }

    /// Smaller caps force frequent generation resets; used by tests.
    pub fn with_dict_cap(out: W, dict_cap: usize) -> Self {
        Encoder {
            out,
            written: 0,
            last_reset_pos: 0,
            table: HashMap::new(),
            dict_cap: dict_cap.max(1),
            started: false,
        }
    }

    /// Encode one JSON line as one value record. Blank lines are ignored.
    pub fn encode_line(&mut self, line: &[u8]) -> Result<()> {
        if jsontext::is_blank(line) {
            return Ok(());
        }
        if !self.started {
            self.started = true;
            let mut rec = vec![marker::HEADER];
            write_varint(&mut rec, FORMAT_VERSION);
            rec.extend_from_slice(&TERMINATOR);
            self.emit(&rec)?;
            self.emit_reset()?;
        }
        if self.table.len() >= self.dict_cap {
            self.emit_reset()?;
        }

        let mut pending: Vec<String> = Vec::new();
        let mut payload = Vec::new();
        {
            let mut sink = EncodeSink {
                payload: &mut payload,
                table: &mut self.table,
                pending: &mut pending,
                scratch: Vec::new(),
                frames: vec![EncFrame { object: false, counter: 0 }],
            };
            jsontext::parse_json_value(line, self.written, &mut sink)?;
        }

        if !pending.is_empty() {
            let sor = self.written;
            let mut rec = vec![marker::ADD];
            write_varint(&mut rec, sor - self.last_reset_pos);
            write_varint(&mut rec, pending.len() as u64);
            for s in &pending {
                write_varint(&mut rec, s.len() as u64);
                rec.extend_from_slice(s.as_bytes());
            }
            rec.extend_from_slice(&TERMINATOR);
            self.emit(&rec)?;
        }

        let sor = self.written;
        let mut rec = vec![marker::VALUE];
        write_varint(&mut rec, sor - self.last_reset_pos);
        write_varint(&mut rec, payload.len() as u64);
        rec.extend_from_slice(&payload);
        rec.extend_from_slice(&TERMINATOR);
        self.emit(&rec)?;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn emit_reset(&mut self) -> Result<()> {
        let sor = self.written;
        let mut rec = vec![marker::RESET];
        rec.extend_from_slice(&TERMINATOR);
        self.emit(&rec)?;
        self.last_reset_pos = sor;
        self.table.clear();
        Ok(())
    }
}

struct EncFrame {
    object: bool,
    counter: usize,
}

/// Builds one value payload from SAX events.
struct EncodeSink<'a> {
    payload: &'a mut Vec<u8>,
    table: &'a mut HashMap<String, usize>,
    pending: &'a mut Vec<String>,
    scratch: Vec<u8>,
    frames: Vec<EncFrame>,
}

impl EncodeSink<'_> {
    fn is_key(&self) -> bool {
        self.frames
            .last()
            .is_some_and(|f| f.object && f.counter % 2 == 0)
    }

    fn incr(&mut self) {
        if let Some(f) = self.frames.last_mut() {
            f.counter += 1;
        }
    }

    /// Cheap shape gate before attempting a full RFC 3339 parse.
    fn looks_like_timestamp(s: &str) -> bool {
        let b = s.as_bytes();
        b.len() >= 10 && b[4] == b'-' && b[..4].iter().all(u8::is_ascii_digit)
    }

    fn put_string(&mut self) {
        let Ok(s) = std::str::from_utf8(&self.scratch) else {
            // Non-UTF-8 content is stored inline untouched.
            self.payload.push(tag::STR);
            write_varint(self.payload, self.scratch.len() as u64);
            self.payload.extend_from_slice(&self.scratch);
            return;
        };
        if !self.is_key() && Self::looks_like_timestamp(s) {
            if let Some(nanos) = format::parse_time(s) {
                self.payload.push(tag::TIME);
                write_varint(self.payload, zigzag(nanos));
                return;
            }
        }
        if let Some(&idx) = self.table.get(s) {
            self.payload.push(tag::DICT_REF);
            write_varint(self.payload, idx as u64);
            return;
        }
        if s.len() <= INTERN_MAX_LEN {
            let idx = self.table.len();
            self.table.insert(s.to_string(), idx);
            self.pending.push(s.to_string());
            self.payload.push(tag::DICT_REF);
            write_varint(self.payload, idx as u64);
            return;
        }
        self.payload.push(tag::STR);
        write_varint(self.payload, s.len() as u64);
        self.payload.extend_from_slice(s.as_bytes());
    }
}

impl ValueSink for EncodeSink<'_> {
    fn on_null(&mut self) {
        self.payload.push(tag::NULL);
        self.incr();
    }

    fn on_bool(&mut self, value: bool) {
        self.payload.push(if value { tag::TRUE } else { tag::FALSE });
        self.incr();
    }

    fn on_int(&mut self, value: i64) {
        self.payload.push(tag::INT);
        write_varint(self.payload, zigzag(value));
        self.incr();
    }

    fn on_uint(&mut self, value: u64) {
        self.payload.push(tag::UINT);
        write_varint(self.payload, value);
        self.incr();
    }

    fn on_double(&mut self, value: f64) {
        self.payload.push(tag::DOUBLE);
        self.payload.extend_from_slice(&value.to_le_bytes());
        self.incr();
    }

    fn on_time(&mut self, nanos: i64) {
        self.payload.push(tag::TIME);
        write_varint(self.payload, zigzag(nanos));
        self.incr();
    }

    fn on_string_start(&mut self, len: usize) {
        self.scratch.clear();
        self.scratch.reserve(len);
    }

    fn on_string_fragment(&mut self, fragment: &[u8]) {
        self.scratch.extend_from_slice(fragment);
    }

    fn on_string_end(&mut self) {
        self.put_string();
        self.incr();
    }

    fn on_dict_ref(&mut self, _index: usize, value: &str) {
        self.scratch.clear();
        self.scratch.extend_from_slice(value.as_bytes());
        self.put_string();
        self.incr();
    }

    fn on_object_start(&mut self) {
        self.payload.push(tag::OBJECT_START);
        self.frames.push(EncFrame { object: true, counter: 0 });
    }

    fn on_object_end(&mut self) {
        self.payload.push(tag::OBJECT_END);
        self.frames.pop();
        self.incr();
    }

    fn on_array_start(&mut self) {
        self.payload.push(tag::ARRAY_START);
        self.frames.push(EncFrame { object: false, counter: 0 });
    }

    fn on_array_end(&mut self) {
        self.payload.push(tag::ARRAY_END);
        self.frames.pop();
        self.incr();
    }
}
