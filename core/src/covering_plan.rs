//! Covering-index scan planner (spec.md §3.1 component 11b, §4.11): runs a
//! covering-index scan and reconstructs records from the index entry
//! alone — the record body is never read.

use std::sync::Arc;

use recordlayer_tuple::Tuple;

use crate::error::{RecordLayerError, Result};
use crate::index::CoveringMaintainer;
use crate::kv::{RangeOptions, Transaction};
use crate::record_access::RecordAccess;
use crate::schema::Index;

/// `{ index, begin_group, end_group, filter?, pk_expr }` (spec.md §4.11).
pub struct TypedCoveringIndexScanPlan<R: RecordAccess> {
    maintainer: CoveringMaintainer,
    indexed_column_count: usize,
    begin_group: Tuple,
    end_group: Tuple,
    filter: Option<Box<dyn Fn(&R::Record) -> bool + Send + Sync>>,
    record_access: Arc<R>,
}

impl<R: RecordAccess> TypedCoveringIndexScanPlan<R> {
    pub fn new(index: &Index, index_subspace: recordlayer_tuple::Subspace, record_access: Arc<R>, begin_group: Tuple, end_group: Tuple) -> Result<Self> {
        if index.covering_fields.is_none() {
            return Err(RecordLayerError::InvalidArgument(format!("index '{}' is not a covering index", index.name)));
        }
        Ok(TypedCoveringIndexScanPlan {
            maintainer: CoveringMaintainer::new(index_subspace),
            indexed_column_count: index.root_expr.column_count(),
            begin_group,
            end_group,
            filter: None,
            record_access,
        })
    }

    pub fn with_filter(mut self, filter: impl Fn(&R::Record) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Executes the scan in snapshot mode (spec.md §4.11 point 2) and
    /// reconstructs every matching record without a record-body read.
    pub async fn execute(&self, txn: &dyn Transaction) -> Result<Vec<R::Record>> {
        if !self.record_access.supports_reconstruction() {
            return Err(RecordLayerError::ReconstructionNotImplemented {
                record_type: self.record_access.record_type().to_string(),
                suggestion: "override `supports_reconstruction` and `reconstruct` on the RecordAccess impl".to_string(),
            });
        }
        let full_subspace = self.maintainer.subspace();
        let begin = full_subspace.pack(&self.begin_group);
        // `end_group` bounds the last group to include, not the first key to
        // exclude: the group's own entries (keyed by group + pk) must stay
        // in range, so the scan's upper bound is that group's range-end, not
        // its packed prefix (which would equal `begin` for a single-group
        // scan and yield an empty range).
        let end = if self.end_group.is_empty() {
            full_subspace.range_for(&self.begin_group).1
        } else {
            full_subspace.range_for(&self.end_group).1
        };
        let rows = txn.get_range(&begin, &end, RangeOptions::new().snapshot(true)).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (k, v) in rows {
            let suffix = full_subspace.unpack_suffix(&k);
            let full = recordlayer_tuple::unpack(suffix)
                .map_err(|e| RecordLayerError::DeserializationFailed { kind: "covering index key".into(), reason: e.to_string() })?;
            let indexed = full[..self.indexed_column_count].to_vec();
            let pk = full[self.indexed_column_count..].to_vec();
            let covering = recordlayer_tuple::unpack(&v)
                .map_err(|e| RecordLayerError::DeserializationFailed { kind: "covering index value".into(), reason: e.to_string() })?;
            let record = self.record_access.reconstruct(&indexed, &covering, &pk)?;
            if self.filter.as_ref().map_or(true, |f| f(&record)) {
                out.push(record);
            }
        }
        Ok(out)
    }
}
