//! Record access (spec.md §4.5... §3.1, component 5): the per-record-type
//! shim the core uses to get in and out of opaque record bytes. Everything
//! else in this crate treats a record as `Self::Record`, never looking at
//! its serialized form directly.

use recordlayer_tuple::{Element, Tuple};

use crate::error::{RecordLayerError, Result};

/// Per-record-type serialization, field extraction, and (optionally)
/// covering-index reconstruction.
pub trait RecordAccess: Send + Sync {
    type Record: Send + Sync + Clone;

    /// Stable name identifying this record type, used as the `<type-name>`
    /// path segment under `P/R/<type-name>/...` (spec.md §6.2).
    fn record_type(&self) -> &str;

    /// Serializes a record to its opaque on-disk byte form. Serialization
    /// format itself is an external collaborator (spec.md §1); this method
    /// is just the seam the record store calls through.
    fn serialize(&self, record: &Self::Record) -> Vec<u8>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Self::Record>;

    /// Extracts the tuple elements for a named field. Returns more than one
    /// element when the field is multi-valued (spec.md §4.3).
    fn extract_field(&self, record: &Self::Record, field: &str) -> Vec<Element>;

    /// Whether `reconstruct` is implemented for this record type. Defaults
    /// to `false` (spec.md §4.9); record types that want covering-index
    /// scans to work must opt in by overriding both this and `reconstruct`.
    fn supports_reconstruction(&self) -> bool { false }

    /// Rebuilds a full record from an index key (split into indexed-field
    /// and primary-key tuples) plus an index value tuple (the covering
    /// fields), without ever reading the record body (spec.md §4.9, §4.11).
    fn reconstruct(&self, _indexed_fields: &Tuple, _covering_fields: &Tuple, _pk_fields: &Tuple) -> Result<Self::Record> {
        Err(RecordLayerError::ReconstructionNotImplemented {
            record_type: self.record_type().to_string(),
            suggestion: "override `supports_reconstruction` and `reconstruct` on the RecordAccess impl".to_string(),
        })
    }
}
