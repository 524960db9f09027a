use async_trait::async_trait;
use recordlayer_tuple::Subspace;

use super::{decode_counter, list_diff, with_pk, IndexDiff, IndexMaintainer};
use crate::error::{RecordLayerError, Result};
use crate::kv::Transaction;

/// Opaque contract for an HNSW/vector index (spec.md §4.1, §9): the graph
/// algorithm itself is out of scope, only its storage lifecycle and the
/// inline-size guard are implemented. `<idx>/E/<pk…> → pack(vector tuple)`
/// holds graph-membership entries; `<idx>/N → atomic-counter(int64)` the
/// current graph size.
pub struct VectorMaintainer {
    subspace: Subspace,
    inline_size_threshold: Option<usize>,
}

impl VectorMaintainer {
    pub fn new(subspace: Subspace, inline_size_threshold: Option<usize>) -> Self { VectorMaintainer { subspace, inline_size_threshold } }

    fn entries(&self) -> Subspace { self.subspace.child("E") }

    fn size_key(&self) -> Vec<u8> { self.subspace.child("N").prefix().to_vec() }

    pub async fn size(&self, txn: &dyn Transaction) -> Result<i64> { Ok(decode_counter(txn.get(&self.size_key()).await?)) }
}

#[async_trait]
impl IndexMaintainer for VectorMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> {
        let (removed, added) = list_diff(diff.old_tuples, diff.new_tuples);
        if let Some(old_pk) = diff.old_pk {
            for v in &removed {
                let key = self.entries().pack(&with_pk(v, old_pk));
                txn.clear(&key);
                txn.atomic_add(&self.size_key(), -1);
            }
        }
        if !added.is_empty() {
            if let Some(threshold) = self.inline_size_threshold {
                let current = decode_counter(txn.get(&self.size_key()).await?);
                if current as usize + added.len() > threshold {
                    return Err(RecordLayerError::HnswInlineIndexingNotSupported(
                        "graph size would exceed the configured inline threshold; build this index with the Online Index Builder in batch mode instead".into(),
                    ));
                }
            }
        }
        if let Some(new_pk) = diff.new_pk {
            for v in &added {
                let key = self.entries().pack(&with_pk(v, new_pk));
                let value = recordlayer_tuple::pack(v);
                txn.set(&key, &value);
                txn.atomic_add(&self.size_key(), 1);
            }
        }
        Ok(())
    }
}
