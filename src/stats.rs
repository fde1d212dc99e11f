//! `stats`: record and dictionary totals for a binary file.
//!
//! Walks record headers and skips payloads by their declared length, so it
//! never decodes values or builds dictionaries.

use std::fmt;

use crate::decode::{read_raw_record, RawRecord};
use crate::error::Result;
use crate::source::ByteSource;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub headers: u64,
    pub resets: u64,
    pub adds: u64,
    pub dict_entries: u64,
    pub dict_bytes: u64,
    pub values: u64,
    pub value_bytes: u64,
    pub total_bytes: u64,
}

pub fn collect(src: &mut ByteSource) -> Result<Stats> {
    let mut stats = Stats::default();
    while let Some(raw) = read_raw_record(src)? {
        match raw {
            RawRecord::Header { .. } => stats.headers += 1,
            RawRecord::Reset => stats.resets += 1,
            RawRecord::Add { count, bytes } => {
                stats.adds += 1;
                stats.dict_entries += count;
                stats.dict_bytes += bytes;
            }
            RawRecord::Value { len } => {
                stats.values += 1;
                stats.value_bytes += len;
            }
        }
    }
    stats.total_bytes = src.pos();
    Ok(stats)
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records:")?;
        writeln!(f, "  header        {:>12}", self.headers)?;
        writeln!(f, "  dict reset    {:>12}", self.resets)?;
        writeln!(f, "  dict add      {:>12}", self.adds)?;
        writeln!(f, "  value         {:>12}", self.values)?;
        writeln!(f, "dictionary:")?;
        writeln!(f, "  entries       {:>12}", self.dict_entries)?;
        writeln!(f, "  string bytes  {:>12}", self.dict_bytes)?;
        writeln!(f, "bytes:")?;
        writeln!(f, "  value payload {:>12}", self.value_bytes)?;
        write!(f, "  total         {:>12}", self.total_bytes)
    }
}
