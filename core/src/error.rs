use thiserror::Error;

use crate::index_state::IndexState;

/// The single public error type returned by the record store, index
/// manager, online builder, and scrubber (spec.md §7).
#[derive(Debug, Error)]
pub enum RecordLayerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index {name} is not ready (state: {state:?})")]
    IndexNotReady { name: String, state: IndexState },

    #[error("failed to deserialize {kind}: {reason}")]
    DeserializationFailed { kind: String, reason: String },

    #[error("record type {record_type} does not implement reconstruction from index entries; {suggestion}")]
    ReconstructionNotImplemented { record_type: String, suggestion: String },

    #[error("failed to reconstruct record of type {record_type}: {reason}")]
    ReconstructionFailed { record_type: String, reason: String },

    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("inline HNSW indexing not supported: {0}; use the online builder's batch strategy instead")]
    HnswInlineIndexingNotSupported(String),

    #[error("transaction conflict")]
    TransactionConflict,

    #[error("empty group")]
    EmptyGroup,

    #[error("cancelled")]
    Cancelled,

    #[error("backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

pub type Result<T> = std::result::Result<T, RecordLayerError>;
