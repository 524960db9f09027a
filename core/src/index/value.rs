use async_trait::async_trait;
use recordlayer_tuple::Subspace;

use super::{list_diff, with_pk, IndexDiff, IndexMaintainer};
use crate::error::Result;
use crate::kv::{RangeOptions, Transaction};

/// `<idx>/<indexedKey…>/<primaryKey…> → empty` (spec.md §3.1, §4.4).
pub struct ValueMaintainer {
    subspace: Subspace,
}

impl ValueMaintainer {
    pub fn new(subspace: Subspace) -> Self { ValueMaintainer { subspace } }

    pub fn subspace(&self) -> &Subspace { &self.subspace }

    /// Scans `[begin_key, end_key)` in the indexed-key space, returning
    /// `(indexed tuple, primary key tuple)` pairs. Used by the record
    /// store's by-index read path.
    pub async fn scan(&self, txn: &dyn Transaction, key_column_count: usize, opts: RangeOptions) -> Result<Vec<(recordlayer_tuple::Tuple, recordlayer_tuple::Tuple)>> {
        let (begin, end) = self.subspace.range();
        let rows = txn.get_range(&begin, &end, opts).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (k, _) in rows {
            let suffix = self.subspace.unpack_suffix(&k);
            let (fields, _) = recordlayer_tuple::unpack_prefix(suffix, key_column_count).map_err(|e| {
                crate::error::RecordLayerError::DeserializationFailed { kind: "value index key".into(), reason: e.to_string() }
            })?;
            let full = recordlayer_tuple::unpack(suffix)
                .map_err(|e| crate::error::RecordLayerError::DeserializationFailed { kind: "value index key".into(), reason: e.to_string() })?;
            let pk = full[key_column_count..].to_vec();
            out.push((fields, pk));
        }
        Ok(out)
    }
}

#[async_trait]
impl IndexMaintainer for ValueMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> {
        let (removed, added) = list_diff(diff.old_tuples, diff.new_tuples);
        if let Some(old_pk) = diff.old_pk {
            for k in &removed {
                let key = self.subspace.pack(&with_pk(k, old_pk));
                txn.clear(&key);
            }
        }
        if let Some(new_pk) = diff.new_pk {
            for k in &added {
                let key = self.subspace.pack(&with_pk(k, new_pk));
                txn.set(&key, &[]);
            }
        }
        Ok(())
    }
}
