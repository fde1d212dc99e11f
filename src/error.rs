//! Decode-side error type. Every variant that can point at the input carries
//! the byte offset where the problem was detected.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("truncated record at byte {0}")]
    Truncated(u64),

    #[error("unknown record marker 0x{marker:02x} at byte {pos}")]
    BadMarker { pos: u64, marker: u8 },

    #[error("unknown value tag 0x{tag:02x} at byte {pos}")]
    BadTag { pos: u64, tag: u8 },

    #[error("varint overflow at byte {0}")]
    VarintOverflow(u64),

    #[error("value payload overruns its declared length at byte {0}")]
    PayloadOverrun(u64),

    #[error("missing record terminator at byte {0}")]
    MissingTerminator(u64),

    #[error("invalid UTF-8 in dictionary string at byte {0}")]
    BadUtf8(u64),

    #[error("dictionary generation rooted at byte {0} is no longer cached")]
    DictMiss(u64),

    #[error("dictionary index {index} out of range at byte {pos}")]
    DictIndex { pos: u64, index: usize },

    #[error("cannot seek to byte {target}: '{name}' is not seekable past its retained window")]
    SeekBeforeWindow { name: String, target: u64 },

    #[error("'{0}' is not seekable")]
    NotSeekable(String),

    #[error("value nesting too deep at byte {0}")]
    TooDeep(u64),

    #[error("malformed JSON record at byte {pos}: {reason}")]
    BadJson { pos: u64, reason: String },
}

pub type Result<T> = std::result::Result<T, ParseError>;
