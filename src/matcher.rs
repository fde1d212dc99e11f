//! Streaming matcher: a [`ValueSink`] that decides whether one record
//! matches a [`Pattern`] without materialising the record.
//!
//! The context stack tracks where the cursor is inside the value: in an
//! object frame an even counter means the next scalar is a key, an odd one
//! means it is that key's value. `check_value` records whether values at the
//! current level are eligible to match; object frames start ineligible until
//! a key satisfies the key gate, array frames inherit from their parent.

use crate::pattern::{Atom, Pattern};
use crate::sink::ValueSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Bare,
    Object,
    Array,
}

#[derive(Debug)]
struct ContextMarker {
    context: Context,
    counter: usize,
    check_value: bool,
}

pub struct MatchSink {
    pattern: Pattern,
    context: Vec<ContextMarker>,
    scratch: Vec<u8>,
    /// Whether the string currently being assembled is worth keeping.
    building: bool,
    matched: bool,
}

impl MatchSink {
    pub fn new(pattern: Pattern) -> Self {
        MatchSink {
            pattern,
            context: Vec::with_capacity(16),
            scratch: Vec::with_capacity(1 << 16),
            building: false,
            matched: false,
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Must be called before each record.
    pub fn initialize_for_value(&mut self) {
        let check = !self.pattern.requires_key_match();
        self.context.clear();
        self.context.push(ContextMarker {
            context: Context::Bare,
            counter: 0,
            check_value: check,
        });
        self.building = false;
        self.matched = false;
    }

    fn is_key(&self) -> bool {
        match self.context.last() {
            Some(c) => c.context == Context::Object && c.counter % 2 == 0,
            None => false,
        }
    }

    fn check_value(&self) -> bool {
        self.context.last().is_some_and(|c| c.check_value)
    }

    fn incr_counter(&mut self) {
        if let Some(c) = self.context.last_mut() {
            c.counter += 1;
        }
    }

    /// A completed string (or resolved dictionary reference). In key
    /// position it decides eligibility of the following value (vacuously
    /// eligible when no key filter is configured); in value position it is a
    /// match candidate.
    fn check_str(&mut self, sv: &str) {
        if self.is_key() {
            let eligible = self.pattern.matches_key(sv);
            if let Some(c) = self.context.last_mut() {
                c.check_value = eligible;
            }
        } else if self.check_value() && self.pattern.matches_str(sv) {
            self.matched = true;
        }
    }
}

impl ValueSink for MatchSink {
    fn on_null(&mut self) {
        if self.check_value() && self.pattern.matches_atom(Atom::Null) {
            self.matched = true;
        }
        self.incr_counter();
    }

    fn on_bool(&mut self, value: bool) {
        let atom = if value { Atom::True } else { Atom::False };
        if self.check_value() && self.pattern.matches_atom(atom) {
            self.matched = true;
        }
        self.incr_counter();
    }

    fn on_int(&mut self, value: i64) {
        if self.check_value() && self.pattern.matches_int(value) {
            self.matched = true;
        }
        self.incr_counter();
    }

    fn on_uint(&mut self, value: u64) {
        if self.check_value() && self.pattern.matches_uint(value) {
            self.matched = true;
        }
        self.incr_counter();
    }

    fn on_double(&mut self, value: f64) {
        if self.check_value() && self.pattern.matches_double(value) {
            self.matched = true;
        }
        self.incr_counter();
    }

    fn on_time(&mut self, nanos: i64) {
        if self.check_value() && self.pattern.matches_time(nanos) {
            self.matched = true;
        }
        self.incr_counter();
    }

    fn on_string_start(&mut self, len: usize) {
        // Skip construction entirely when nothing could use the content.
        self.building = self.pattern.wants_strings()
            || (self.pattern.requires_key_match() && self.is_key());
        if self.building {
            self.scratch.clear();
            self.scratch.reserve(len);
        }
    }

    fn on_string_fragment(&mut self, fragment: &[u8]) {
        if self.building {
            self.scratch.extend_from_slice(fragment);
        }
    }

    fn on_string_end(&mut self) {
        if self.building {
            self.building = false;
            let scratch = std::mem::take(&mut self.scratch);
            match std::str::from_utf8(&scratch) {
                Ok(sv) => self.check_str(sv),
                Err(_) => {
                    // Not valid UTF-8: cannot equal any pattern. In key
                    // position it fails a configured key filter but still
                    // gates the value open when there is none.
                    if self.is_key() {
                        let eligible = !self.pattern.requires_key_match();
                        if let Some(c) = self.context.last_mut() {
                            c.check_value = eligible;
                        }
                    }
                }
            }
            self.scratch = scratch;
        } else if self.is_key() {
            // The key's content was irrelevant (no key filter configured,
            // or it would have been built), so it gates its value open.
            if let Some(c) = self.context.last_mut() {
                c.check_value = true;
            }
        }
        self.incr_counter();
    }

    fn on_dict_ref(&mut self, _index: usize, value: &str) {
        self.check_str(value);
        self.incr_counter();
    }

    fn on_object_start(&mut self) {
        self.context.push(ContextMarker {
            context: Context::Object,
            counter: 0,
            check_value: false,
        });
    }

    fn on_object_end(&mut self) {
        self.context.pop();
        self.incr_counter();
    }

    fn on_array_start(&mut self) {
        let inherit = self.check_value();
        self.context.push(ContextMarker {
            context: Context::Array,
            counter: 0,
            check_value: inherit,
        });
    }

    fn on_array_end(&mut self) {
        self.context.pop();
        self.incr_counter();
    }
}
