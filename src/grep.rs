//! The search drivers: linear scan and bisect.
//!
//! Both drivers are parametric over a [`RecordFlavor`] — the three
//! capabilities that differ between the binary and JSON-lines formats — so
//! no driver code depends on which flavour is active.
//!
//! The scan driver keeps a ring of record start offsets (capacity
//! `before_context + 1`), pins the source at the ring's front so those bytes
//! stay replayable, and on a match seeks back and re-parses the buffered
//! records through the output writer: two decoder passes per emitted match,
//! which is the floor for a SAX interface that cannot replay events.
//!
//! The bisect driver narrows `[start, end)` by probing the record at the
//! midpoint with a match-or-greater copy of the pattern; once the window is
//! below [`SCAN_THRESHOLD`] it resyncs a bit before the window and hands off
//! to the scan driver with a suffix budget.

use std::collections::VecDeque;
use std::io::Write;

use crate::decode::RecordDecoder;
use crate::error::{ParseError, Result};
use crate::jsontext;
use crate::matcher::MatchSink;
use crate::output::JsonWriter;
use crate::pattern::Pattern;
use crate::source::ByteSource;

pub const SCAN_THRESHOLD: u64 = 256 * 1024;
pub const PREFIX_AMOUNT: u64 = 512 * 1024;
/// Strictly greater than `PREFIX_AMOUNT + SCAN_THRESHOLD`, so the handoff
/// scan covers the entire uncertainty window (and a bit beyond) before the
/// suffix budget can stop it.
pub const SUFFIX_AMOUNT: u64 = SCAN_THRESHOLD + PREFIX_AMOUNT + 266 * 1024;

/// The three operations a driver needs from a record format.
pub trait RecordFlavor {
    /// Position the source at a record boundary at or after `pos`.
    fn seek_sync(&mut self, src: &mut ByteSource, pos: u64) -> Result<()>;
    /// Run one record through the matcher. False at end of stream.
    fn parse_value(&mut self, src: &mut ByteSource, matcher: &mut MatchSink) -> Result<bool>;
    /// Re-emit one record. False at end of stream.
    fn output_value(&mut self, src: &mut ByteSource, out: &mut dyn Write) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Flavour adapters
// ---------------------------------------------------------------------------

/// Binary jot records; matched records are re-emitted as JSON text lines.
#[derive(Default)]
pub struct BinaryFlavor {
    decoder: RecordDecoder,
}

impl BinaryFlavor {
    pub fn new() -> Self {
        BinaryFlavor::default()
    }
}

impl RecordFlavor for BinaryFlavor {
    fn seek_sync(&mut self, src: &mut ByteSource, pos: u64) -> Result<()> {
        self.decoder.seek_sync(src, pos)
    }

    fn parse_value(&mut self, src: &mut ByteSource, matcher: &mut MatchSink) -> Result<bool> {
        matcher.initialize_for_value();
        self.decoder.parse_record(src, matcher)
    }

    fn output_value(&mut self, src: &mut ByteSource, out: &mut dyn Write) -> Result<bool> {
        let mut writer = JsonWriter::new(out);
        let got = self.decoder.parse_record(src, &mut writer)?;
        writer.finish()?;
        if got {
            out.write_all(b"\n")?;
        }
        Ok(got)
    }
}

/// JSON lines; records are echoed byte-for-byte.
#[derive(Default)]
pub struct JsonLinesFlavor {
    line: Vec<u8>,
}

impl JsonLinesFlavor {
    pub fn new() -> Self {
        JsonLinesFlavor::default()
    }

    /// Read the next non-blank line. False at end of stream.
    fn next_line(&mut self, src: &mut ByteSource) -> Result<bool> {
        loop {
            if !src.read_line(&mut self.line)? {
                return Ok(false);
            }
            if !jsontext::is_blank(&self.line) {
                return Ok(true);
            }
        }
    }
}

impl RecordFlavor for JsonLinesFlavor {
    fn seek_sync(&mut self, src: &mut ByteSource, pos: u64) -> Result<()> {
        src.seek(pos)?;
        if pos == 0 {
            return Ok(());
        }
        src.scan_to(b"\n")?;
        Ok(())
    }

    fn parse_value(&mut self, src: &mut ByteSource, matcher: &mut MatchSink) -> Result<bool> {
        if !self.next_line(src)? {
            return Ok(false);
        }
        let base = src.pos() - self.line.len() as u64;
        matcher.initialize_for_value();
        jsontext::parse_json_value(&self.line, base, matcher)?;
        Ok(true)
    }

    fn output_value(&mut self, src: &mut ByteSource, out: &mut dyn Write) -> Result<bool> {
        if !self.next_line(src)? {
            return Ok(false);
        }
        out.write_all(&self.line)?;
        if self.line.last() != Some(&b'\n') {
            out.write_all(b"\n")?;
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

/// Run the configured search over one source.
pub fn grep(
    pattern: &Pattern,
    src: &mut ByteSource,
    flavor: &mut dyn RecordFlavor,
    out: &mut dyn Write,
) -> Result<()> {
    if pattern.bisect {
        bisect(pattern, src, flavor, out)
    } else {
        scan(pattern.clone(), src, flavor, out)
    }
}

fn scan(
    mut pattern: Pattern,
    src: &mut ByteSource,
    flavor: &mut dyn RecordFlavor,
    out: &mut dyn Write,
) -> Result<()> {
    if pattern.count {
        pattern.before_context = 0;
        pattern.after_context = 0;
    }
    let num_matches = pattern.num_matches.unwrap_or(u64::MAX);
    let suffix_length = pattern.scan_suffix_amount.unwrap_or(u64::MAX);
    let capacity = pattern.before_context as usize + 1;
    let mut matcher = MatchSink::new(pattern.clone());
    let mut pos_buf: VecDeque<u64> = VecDeque::with_capacity(capacity);
    // Records still owed as after-context.
    let mut force: u32 = 0;
    let mut total: u64 = 0;
    let mut last_match_pos = src.pos();

    while src.peek()?.is_some() {
        if force == 0 {
            if total >= num_matches {
                break;
            }
            if src.pos().saturating_sub(last_match_pos) > suffix_length {
                break;
            }
        }
        if pos_buf.len() == capacity {
            pos_buf.pop_front();
        }
        let sor = src.pos();
        pos_buf.push_back(sor);
        let front = pos_buf.front().copied().unwrap_or(sor);
        src.set_pin(front);
        if !flavor.parse_value(src, &mut matcher)? {
            break;
        }
        if matcher.matched() && total < num_matches {
            last_match_pos = sor;
            total += 1;
            if pattern.count {
                continue;
            }
            // Rewind over the buffered records and re-emit them in order;
            // parsing advances the cursor, so one pass suffices. The
            // dictionary retains enough generations to cover this window.
            src.seek(front)?;
            for _ in 0..pos_buf.len() {
                flavor.output_value(src, out)?;
            }
            pos_buf.clear();
            src.clear_pin();
            force = pattern.after_context;
        } else if force > 0 {
            src.seek(sor)?;
            flavor.output_value(src, out)?;
            force -= 1;
        }
    }

    if pattern.count {
        writeln!(out, "{total}")?;
    }
    Ok(())
}

fn bisect(
    pattern: &Pattern,
    src: &mut ByteSource,
    flavor: &mut dyn RecordFlavor,
    out: &mut dyn Write,
) -> Result<()> {
    if !src.is_seekable() {
        return Err(ParseError::NotSeekable(src.name().to_string()));
    }
    debug_assert!(!pattern.match_or_greater);
    // The probe phase matches any record >= the pattern; ordinary equality
    // could not tell "before the first match" from "past the last match".
    let mut probe_pattern = pattern.clone();
    probe_pattern.match_or_greater = true;
    let mut matcher = MatchSink::new(probe_pattern);

    let mut start: u64 = 0;
    let mut end = src.end_pos()?;
    while end > start {
        if end - start <= SCAN_THRESHOLD {
            flavor.seek_sync(src, start.saturating_sub(PREFIX_AMOUNT))?;
            let mut scan_pattern = pattern.clone();
            scan_pattern.scan_suffix_amount = Some(SUFFIX_AMOUNT);
            return scan(scan_pattern, src, flavor, out);
        }
        let mid = start + (end - start) / 2;
        flavor.seek_sync(src, mid)?;
        let sor = src.pos();
        if !flavor.parse_value(src, &mut matcher)? {
            break;
        }
        if matcher.matched() {
            if sor < end {
                end = sor;
            } else {
                // Resync overshot the window: the file contains a record
                // larger than the window itself. Shrinking end normally
                // would loop forever; force the scan branch instead.
                end = start + 1;
            }
        } else {
            start = sor;
        }
    }
    Ok(())
}
