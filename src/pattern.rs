//! The grep pattern model: what it means for a value to match.
//!
//! A record matches when any value inside it (under the key gate, if one is
//! configured) satisfies one of the set value patterns. `match_or_greater`
//! relaxes equality to a lower bound for bisect probing; substring and atom
//! patterns have no order, so they never match in that mode.

use crate::format;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atom {
    Null,
    True,
    False,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrPattern {
    pub needle: String,
    pub full_match: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Pattern {
    /// Only values whose enclosing object key equals this are considered.
    pub key_pattern: Option<String>,
    pub atom_pattern: Option<Atom>,
    pub int_pattern: Option<i64>,
    pub uint_pattern: Option<u64>,
    pub double_pattern: Option<f64>,
    pub str_pattern: Option<StrPattern>,
    /// Half-open interval, nanoseconds since the Unix epoch.
    pub timestamp_pattern: Option<(i64, i64)>,

    /// Stop after this many matches.
    pub num_matches: Option<u64>,
    /// Give up after advancing this many bytes past the last match.
    pub scan_suffix_amount: Option<u64>,
    pub before_context: u32,
    pub after_context: u32,
    pub bisect: bool,
    pub count: bool,
    /// Bisect probing mode: any value >= the pattern matches. Set only by
    /// the bisect driver.
    pub match_or_greater: bool,
}

impl Pattern {
    pub fn requires_key_match(&self) -> bool {
        self.key_pattern.is_some()
    }

    pub fn matches_key(&self, key: &str) -> bool {
        match &self.key_pattern {
            None => true,
            Some(k) => k == key,
        }
    }

    pub fn matches_atom(&self, val: Atom) -> bool {
        // Atoms have no order, so they are incompatible with bisect probing.
        if self.match_or_greater {
            return false;
        }
        self.atom_pattern == Some(val)
    }

    pub fn matches_int(&self, val: i64) -> bool {
        match self.int_pattern {
            None => false,
            Some(p) if self.match_or_greater => val >= p,
            Some(p) => val == p,
        }
    }

    pub fn matches_uint(&self, val: u64) -> bool {
        match self.uint_pattern {
            None => false,
            Some(p) if self.match_or_greater => val >= p,
            Some(p) => val == p,
        }
    }

    pub fn matches_double(&self, val: f64) -> bool {
        match self.double_pattern {
            None => false,
            Some(p) if self.match_or_greater => val >= p,
            Some(p) => val.to_bits() == p.to_bits(),
        }
    }

    pub fn matches_time(&self, nanos: i64) -> bool {
        match self.timestamp_pattern {
            None => false,
            Some((start, _)) if self.match_or_greater => nanos >= start,
            Some((start, end)) => nanos >= start && nanos < end,
        }
    }

    pub fn matches_str(&self, val: &str) -> bool {
        // A string may also satisfy a timestamp pattern; the textual format
        // carries timestamps as RFC 3339 strings.
        if self.timestamp_pattern.is_some() {
            if let Some(nanos) = format::parse_time(val) {
                if self.matches_time(nanos) {
                    return true;
                }
            }
        }
        let Some(sp) = &self.str_pattern else {
            return false;
        };
        if sp.full_match {
            if self.match_or_greater {
                return val >= sp.needle.as_str();
            }
            return val == sp.needle;
        }
        // Substring has no order, so it is incompatible with bisect probing.
        if self.match_or_greater {
            return false;
        }
        val.contains(sp.needle.as_str())
    }

    /// Does the matcher need string content at all? When false, string
    /// construction is skipped entirely.
    pub fn wants_strings(&self) -> bool {
        self.str_pattern.is_some() || self.timestamp_pattern.is_some()
    }
}
