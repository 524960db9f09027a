use async_trait::async_trait;
use recordlayer_tuple::{Subspace, Tuple};

use super::{list_diff, with_pk, IndexDiff, IndexMaintainer};
use crate::error::Result;
use crate::kv::{RangeOptions, Transaction};

/// `<idx>/<indexedKey…>/<primaryKey…> → pack(coveringFields)` (spec.md
/// §4.9): a value-like index whose value payload carries the covering
/// fields evaluated at write time, so a scan can assemble a record without
/// ever reading the record body.
pub struct CoveringMaintainer {
    subspace: Subspace,
}

impl CoveringMaintainer {
    pub fn new(subspace: Subspace) -> Self { CoveringMaintainer { subspace } }

    pub fn subspace(&self) -> &Subspace { &self.subspace }

    /// Scans `[begin_group, end_group)` in the indexed-key space, returning
    /// `(indexed tuple, primary key tuple, covering tuple)` triples — the
    /// raw material `TypedCoveringIndexScanPlan` (spec.md §4.11)
    /// reconstructs records from.
    pub async fn scan(&self, txn: &dyn Transaction, key_column_count: usize, opts: RangeOptions) -> Result<Vec<(Tuple, Tuple, Tuple)>> {
        let (begin, end) = self.subspace.range();
        let rows = txn.get_range(&begin, &end, opts).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (k, v) in rows {
            let suffix = self.subspace.unpack_suffix(&k);
            let full = recordlayer_tuple::unpack(suffix)
                .map_err(|e| crate::error::RecordLayerError::DeserializationFailed { kind: "covering index key".into(), reason: e.to_string() })?;
            let indexed = full[..key_column_count].to_vec();
            let pk = full[key_column_count..].to_vec();
            let covering = recordlayer_tuple::unpack(&v)
                .map_err(|e| crate::error::RecordLayerError::DeserializationFailed { kind: "covering index value".into(), reason: e.to_string() })?;
            out.push((indexed, pk, covering));
        }
        Ok(out)
    }
}

#[async_trait]
impl IndexMaintainer for CoveringMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> {
        let (removed, added) = list_diff(diff.old_tuples, diff.new_tuples);
        if let Some(old_pk) = diff.old_pk {
            for k in &removed {
                let key = self.subspace.pack(&with_pk(k, old_pk));
                txn.clear(&key);
            }
        }
        if let (Some(new_pk), Some(covering)) = (diff.new_pk, diff.new_covering) {
            let value = recordlayer_tuple::pack(covering);
            for k in &added {
                let key = self.subspace.pack(&with_pk(k, new_pk));
                txn.set(&key, &value);
            }
        }
        Ok(())
    }
}
