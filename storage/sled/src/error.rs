use recordlayer_core::RecordLayerError;

/// Wraps a `sled::Error` as a boxed backend error (spec.md §6.1 `Database`
/// is backend-agnostic — the core crate only ever sees `RecordLayerError`).
pub fn sled_error(err: sled::Error) -> RecordLayerError { RecordLayerError::Backend(Box::new(err)) }

pub fn join_error(err: tokio::task::JoinError) -> RecordLayerError { RecordLayerError::Backend(Box::new(err)) }
