//! JSON re-emission for matched records.
//!
//! `JsonWriter` is a [`ValueSink`] that serialises one record as a compact
//! JSON line while the decoder streams it — no intermediate tree. Integers
//! go through `itoa`, doubles through `ryu`, timestamps become RFC 3339
//! strings. Sinks cannot fail, so I/O errors are stashed and surfaced by
//! [`JsonWriter::finish`] after the record.

use std::io::{self, Write};

use crate::format;
use crate::sink::ValueSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bare,
    Object,
    Array,
}

struct Frame {
    kind: Kind,
    counter: usize,
}

pub struct JsonWriter<'w> {
    out: &'w mut dyn Write,
    frames: Vec<Frame>,
    err: Option<io::Error>,
}

impl<'w> JsonWriter<'w> {
    pub fn new(out: &'w mut dyn Write) -> Self {
        JsonWriter {
            out,
            frames: vec![Frame { kind: Kind::Bare, counter: 0 }],
            err: None,
        }
    }

    /// Report any I/O error swallowed during event delivery.
    pub fn finish(self) -> io::Result<()> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        if self.err.is_none() {
            if let Err(e) = self.out.write_all(bytes) {
                self.err = Some(e);
            }
        }
    }

    /// Emit the separator owed before the next key or value.
    fn separate(&mut self) {
        let sep: &[u8] = match self.frames.last() {
            Some(f) if f.kind == Kind::Array && f.counter > 0 => b",",
            Some(f) if f.kind == Kind::Object => {
                if f.counter % 2 == 1 {
                    b":"
                } else if f.counter > 0 {
                    b","
                } else {
                    b""
                }
            }
            _ => b"",
        };
        if !sep.is_empty() {
            self.write(sep);
        }
    }

    fn incr(&mut self) {
        if let Some(f) = self.frames.last_mut() {
            f.counter += 1;
        }
    }

    fn write_fmt_buf(&mut self, s: &str) {
        if self.err.is_none() {
            if let Err(e) = self.out.write_all(s.as_bytes()) {
                self.err = Some(e);
            }
        }
    }

    fn write_escaped_frag(&mut self, bytes: &[u8]) {
        if self.err.is_none() {
            if let Err(e) = write_escaped(self.out, bytes) {
                self.err = Some(e);
            }
        }
    }
}

impl ValueSink for JsonWriter<'_> {
    fn on_null(&mut self) {
        self.separate();
        self.write(b"null");
        self.incr();
    }

    fn on_bool(&mut self, value: bool) {
        self.separate();
        self.write(if value { b"true" } else { b"false" });
        self.incr();
    }

    fn on_int(&mut self, value: i64) {
        self.separate();
        let mut buf = itoa::Buffer::new();
        self.write_fmt_buf(buf.format(value));
        self.incr();
    }

    fn on_uint(&mut self, value: u64) {
        self.separate();
        let mut buf = itoa::Buffer::new();
        self.write_fmt_buf(buf.format(value));
        self.incr();
    }

    fn on_double(&mut self, value: f64) {
        self.separate();
        // JSON has no NaN or infinities.
        if value.is_nan() || value.is_infinite() {
            self.write(b"null");
        } else {
            let mut buf = ryu::Buffer::new();
            self.write_fmt_buf(buf.format(value));
        }
        self.incr();
    }

    fn on_time(&mut self, nanos: i64) {
        self.separate();
        self.write(b"\"");
        let text = format::format_time(nanos);
        self.write_fmt_buf(&text);
        self.write(b"\"");
        self.incr();
    }

    fn on_string_start(&mut self, _len: usize) {
        self.separate();
        self.write(b"\"");
    }

    fn on_string_fragment(&mut self, fragment: &[u8]) {
        self.write_escaped_frag(fragment);
    }

    fn on_string_end(&mut self) {
        self.write(b"\"");
        self.incr();
    }

    fn on_dict_ref(&mut self, _index: usize, value: &str) {
        self.separate();
        self.write(b"\"");
        self.write_escaped_frag(value.as_bytes());
        self.write(b"\"");
        self.incr();
    }

    fn on_object_start(&mut self) {
        self.separate();
        self.write(b"{");
        self.frames.push(Frame { kind: Kind::Object, counter: 0 });
    }

    fn on_object_end(&mut self) {
        self.write(b"}");
        self.frames.pop();
        self.incr();
    }

    fn on_array_start(&mut self) {
        self.separate();
        self.write(b"[");
        self.frames.push(Frame { kind: Kind::Array, counter: 0 });
    }

    fn on_array_end(&mut self) {
        self.write(b"]");
        self.frames.pop();
        self.incr();
    }
}

/// JSON-escape a fragment (no surrounding quotes). Escaping is per byte, so
/// fragment boundaries never split an escape.
fn write_escaped(w: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let escape: Option<&[u8]> = match b {
            b'"' => Some(b"\\\""),
            b'\\' => Some(b"\\\\"),
            b'\n' => Some(b"\\n"),
            b'\r' => Some(b"\\r"),
            b'\t' => Some(b"\\t"),
            b'\x08' => Some(b"\\b"),
            b'\x0c' => Some(b"\\f"),
            0..=0x1f => None, // \u00XX, handled below
            _ => continue,
        };
        if start < i {
            w.write_all(&bytes[start..i])?;
        }
        match escape {
            Some(esc) => w.write_all(esc)?,
            None => write!(w, "\\u{:04x}", b)?,
        }
        start = i + 1;
    }
    if start < bytes.len() {
        w.write_all(&bytes[start..])?;
    }
    Ok(())
}
