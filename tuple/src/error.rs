use thiserror::Error;

/// Errors produced while packing or unpacking tuples.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TupleError {
    #[error("truncated tuple: expected more bytes after offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown type tag {tag:#04x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("invalid utf-8 string in tuple: {0}")]
    InvalidUtf8(String),

    #[error("trailing bytes after unpacking {consumed} of {total}")]
    TrailingBytes { consumed: usize, total: usize },
}
