//! Textual flavour: a JSON SAX lexer.
//!
//! Parses one line-delimited JSON value and pushes the same [`ValueSink`]
//! events as the binary decoder, so every consumer is flavour-agnostic.
//! String content is delivered as fragments: raw runs between escapes come
//! straight from the input slice, decoded escapes arrive as tiny fragments.

use crate::error::{ParseError, Result};
use crate::sink::ValueSink;

const MAX_DEPTH: usize = 192;

/// Parse exactly one JSON value from `line` (which must not be blank) and
/// stream it into `sink`. `base` is the absolute offset of `line[0]`, used
/// only for error positions. Trailing content other than whitespace is an
/// error.
pub fn parse_json_value<S: ValueSink>(line: &[u8], base: u64, sink: &mut S) -> Result<()> {
    let mut lexer = Lexer { bytes: line, i: 0, base, sink };
    lexer.skip_ws();
    lexer.value(0)?;
    lexer.skip_ws();
    if lexer.i < lexer.bytes.len() {
        return Err(lexer.err("trailing characters after value"));
    }
    Ok(())
}

/// True when `line` contains only JSON whitespace.
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

struct Lexer<'a, S: ValueSink> {
    bytes: &'a [u8],
    i: usize,
    base: u64,
    sink: &'a mut S,
}

impl<'a, S: ValueSink> Lexer<'a, S> {
    fn err(&self, reason: &str) -> ParseError {
        ParseError::BadJson {
            pos: self.base + self.i as u64,
            reason: reason.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(&b) = self.bytes.get(self.i) {
            if matches!(b, b' ' | b'\t' | b'\r' | b'\n') {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, b: u8, what: &str) -> Result<()> {
        if self.bytes.get(self.i) == Some(&b) {
            self.i += 1;
            Ok(())
        } else {
            Err(self.err(what))
        }
    }

    fn literal(&mut self, word: &[u8]) -> bool {
        if self.bytes[self.i..].starts_with(word) {
            self.i += word.len();
            true
        } else {
            false
        }
    }

    fn value(&mut self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(ParseError::TooDeep(self.base + self.i as u64));
        }
        match self.bytes.get(self.i).copied() {
            None => Err(self.err("unexpected end of value")),
            Some(b'n') if self.literal(b"null") => {
                self.sink.on_null();
                Ok(())
            }
            Some(b't') if self.literal(b"true") => {
                self.sink.on_bool(true);
                Ok(())
            }
            Some(b'f') if self.literal(b"false") => {
                self.sink.on_bool(false);
                Ok(())
            }
            Some(b'"') => self.string(),
            Some(b'{') => {
                self.i += 1;
                self.sink.on_object_start();
                self.skip_ws();
                if self.bytes.get(self.i) == Some(&b'}') {
                    self.i += 1;
                    self.sink.on_object_end();
                    return Ok(());
                }
                loop {
                    self.skip_ws();
                    if self.bytes.get(self.i) != Some(&b'"') {
                        return Err(self.err("expected object key"));
                    }
                    self.string()?;
                    self.skip_ws();
                    self.expect(b':', "expected ':' after key")?;
                    self.skip_ws();
                    self.value(depth + 1)?;
                    self.skip_ws();
                    match self.bytes.get(self.i).copied() {
                        Some(b',') => self.i += 1,
                        Some(b'}') => {
                            self.i += 1;
                            self.sink.on_object_end();
                            return Ok(());
                        }
                        _ => return Err(self.err("expected ',' or '}'")),
                    }
                }
            }
            Some(b'[') => {
                self.i += 1;
                self.sink.on_array_start();
                self.skip_ws();
                if self.bytes.get(self.i) == Some(&b']') {
                    self.i += 1;
                    self.sink.on_array_end();
                    return Ok(());
                }
                loop {
                    self.skip_ws();
                    self.value(depth + 1)?;
                    self.skip_ws();
                    match self.bytes.get(self.i).copied() {
                        Some(b',') => self.i += 1,
                        Some(b']') => {
                            self.i += 1;
                            self.sink.on_array_end();
                            return Ok(());
                        }
                        _ => return Err(self.err("expected ',' or ']'")),
                    }
                }
            }
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(_) => Err(self.err("unexpected character")),
        }
    }

    fn number(&mut self) -> Result<()> {
        let start = self.i;
        let mut float = false;
        while let Some(&b) = self.bytes.get(self.i) {
            match b {
                b'0'..=b'9' | b'-' | b'+' => self.i += 1,
                b'.' | b'e' | b'E' => {
                    float = true;
                    self.i += 1;
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.i])
            .map_err(|_| self.err("invalid number"))?;
        if !float {
            if let Ok(v) = text.parse::<i64>() {
                self.sink.on_int(v);
                return Ok(());
            }
            // Integral but out of i64 range: u64 for large positives.
            if let Ok(v) = text.parse::<u64>() {
                self.sink.on_uint(v);
                return Ok(());
            }
        }
        match text.parse::<f64>() {
            Ok(v) => {
                self.sink.on_double(v);
                Ok(())
            }
            Err(_) => Err(self.err("invalid number")),
        }
    }

    fn string(&mut self) -> Result<()> {
        self.expect(b'"', "expected string")?;
        self.sink.on_string_start(0);
        let mut run = self.i;
        loop {
            match self.bytes.get(self.i).copied() {
                None => return Err(self.err("unterminated string")),
                Some(b'"') => {
                    if run < self.i {
                        self.sink.on_string_fragment(&self.bytes[run..self.i]);
                    }
                    self.i += 1;
                    self.sink.on_string_end();
                    return Ok(());
                }
                Some(b'\\') => {
                    if run < self.i {
                        self.sink.on_string_fragment(&self.bytes[run..self.i]);
                    }
                    self.i += 1;
                    self.escape()?;
                    run = self.i;
                }
                Some(_) => self.i += 1,
            }
        }
    }

    fn escape(&mut self) -> Result<()> {
        let b = *self
            .bytes
            .get(self.i)
            .ok_or_else(|| self.err("unterminated escape"))?;
        self.i += 1;
        let decoded: &[u8] = match b {
            b'"' => b"\"",
            b'\\' => b"\\",
            b'/' => b"/",
            b'b' => b"\x08",
            b'f' => b"\x0c",
            b'n' => b"\n",
            b'r' => b"\r",
            b't' => b"\t",
            b'u' => {
                let mut code = self.hex4()? as u32;
                if (0xD800..0xDC00).contains(&code) {
                    // High surrogate; a low surrogate escape must follow.
                    if !self.literal(b"\\u") {
                        return Err(self.err("lone high surrogate"));
                    }
                    let low = self.hex4()? as u32;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(self.err("invalid low surrogate"));
                    }
                    code = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                } else if (0xDC00..0xE000).contains(&code) {
                    return Err(self.err("lone low surrogate"));
                }
                let ch = char::from_u32(code).ok_or_else(|| self.err("invalid codepoint"))?;
                let mut buf = [0u8; 4];
                let s = ch.encode_utf8(&mut buf);
                self.sink.on_string_fragment(s.as_bytes());
                return Ok(());
            }
            _ => return Err(self.err("unknown escape")),
        };
        self.sink.on_string_fragment(decoded);
        Ok(())
    }

    fn hex4(&mut self) -> Result<u16> {
        let chunk = self
            .bytes
            .get(self.i..self.i + 4)
            .ok_or_else(|| self.err("truncated \\u escape"))?;
        let text = std::str::from_utf8(chunk).map_err(|_| self.err("bad \\u escape"))?;
        let v = u16::from_str_radix(text, 16).map_err(|_| self.err("bad \\u escape"))?;
        self.i += 4;
        Ok(v)
    }
}
