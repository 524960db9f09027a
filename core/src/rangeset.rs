//! RangeSet (spec.md §3.1 GLOSSARY, §4.12, §4.13): a persistent set of
//! completed `[begin, end)` primary-key sub-ranges, used by the online
//! builder and the two scrubber phases to resume after a partial run and to
//! make repeated runs idempotent.
//!
//! Ranges are stored as a compact set of disjoint, non-adjacent intervals:
//! every `mark_done` call merges the newly completed interval with any
//! neighbor it touches, so the set never grows unboundedly across many
//! small batches.

use recordlayer_tuple::{Element, Subspace};

use crate::error::Result;
use crate::kv::{RangeOptions, Transaction};

pub struct RangeSet {
    subspace: Subspace,
}

impl RangeSet {
    pub fn new(root: &Subspace, name: &str) -> Self { RangeSet { subspace: root.child("rangeset").child(name) } }

    async fn completed_ranges(&self, txn: &dyn Transaction) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let (begin, end) = self.subspace.range();
        let rows = txn.get_range(&begin, &end, RangeOptions::new().snapshot(true)).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (k, v) in rows {
            let suffix = self.subspace.unpack_suffix(&k);
            let tuple = recordlayer_tuple::unpack(suffix).map_err(|e| {
                crate::error::RecordLayerError::DeserializationFailed { kind: "rangeset key".into(), reason: e.to_string() }
            })?;
            let begin = tuple.first().and_then(Element::as_bytes).map(|b| b.to_vec()).unwrap_or_default();
            out.push((begin, v));
        }
        out.sort();
        Ok(out)
    }

    /// Returns the first unbuilt gap within `[global_begin, global_end)`,
    /// or `None` if the set fully covers that span (the run is complete).
    pub async fn claim_next_gap(&self, txn: &dyn Transaction, global_begin: &[u8], global_end: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let ranges = self.completed_ranges(txn).await?;
        let mut cursor = global_begin.to_vec();
        for (begin, end) in &ranges {
            if *end <= cursor {
                continue;
            }
            if *begin > cursor {
                let gap_end = (*begin).min(global_end.to_vec());
                return Ok(Some((cursor, gap_end)));
            }
            // begin <= cursor < end: covered, advance past it.
            if *end > cursor {
                cursor = end.clone();
            }
            if cursor >= global_end.to_vec() {
                return Ok(None);
            }
        }
        if cursor < global_end.to_vec() {
            Ok(Some((cursor, global_end.to_vec())))
        } else {
            Ok(None)
        }
    }

    /// Records `[begin, end)` as completed, merging with any overlapping or
    /// directly adjacent existing interval.
    pub async fn mark_done(&self, txn: &mut dyn Transaction, begin: &[u8], end: &[u8]) -> Result<()> {
        let existing = self.completed_ranges(txn).await?;
        let mut merged_begin = begin.to_vec();
        let mut merged_end = end.to_vec();
        for (b, e) in existing {
            // Overlap or touch: b <= merged_end && e >= merged_begin.
            if b <= merged_end && e >= merged_begin {
                self.subspace_clear_entry(txn, &b);
                if b < merged_begin {
                    merged_begin = b;
                }
                if e > merged_end {
                    merged_end = e;
                }
            }
        }
        let key = self.subspace.pack(&vec![Element::Bytes(merged_begin)]);
        txn.set(&key, &merged_end);
        Ok(())
    }

    fn subspace_clear_entry(&self, txn: &mut dyn Transaction, begin: &[u8]) {
        let key = self.subspace.pack(&vec![Element::Bytes(begin.to_vec())]);
        txn.clear(&key);
    }

    /// True iff the set fully covers `[global_begin, global_end)`.
    pub async fn is_complete(&self, txn: &dyn Transaction, global_begin: &[u8], global_end: &[u8]) -> Result<bool> {
        Ok(self.claim_next_gap(txn, global_begin, global_end).await?.is_none())
    }

    /// Clears every recorded range, e.g. when a builder run is started with
    /// `clear_first: true` (spec.md §4.12).
    pub fn clear_all(&self, txn: &mut dyn Transaction) {
        let (begin, end) = self.subspace.range();
        txn.clear_range(&begin, &end);
    }
}

#[cfg(all(test, feature = "test-util"))]
mod tests {
    use super::*;
    use crate::testkv::MemoryDatabase;
    use crate::kv::Database;
    use recordlayer_tuple::Subspace;

    #[tokio::test]
    async fn claim_mark_and_resume() {
        let db = MemoryDatabase::new();
        let root = Subspace::new(b"root".to_vec());
        let rs = RangeSet::new(&root, "idx");

        let global_begin = vec![0u8];
        let global_end = vec![10u8];

        let mut txn = db.begin().await.unwrap();
        let gap = rs.claim_next_gap(&*txn, &global_begin, &global_end).await.unwrap();
        assert_eq!(gap, Some((global_begin.clone(), global_end.clone())));

        rs.mark_done(&mut *txn, &[0], &[5]).await.unwrap();
        let gap = rs.claim_next_gap(&*txn, &global_begin, &global_end).await.unwrap();
        assert_eq!(gap, Some((vec![5], vec![10])));

        rs.mark_done(&mut *txn, &[5], &[10]).await.unwrap();
        assert!(rs.is_complete(&*txn, &global_begin, &global_end).await.unwrap());
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn mark_done_merges_adjacent_ranges() {
        let db = MemoryDatabase::new();
        let root = Subspace::new(b"root".to_vec());
        let rs = RangeSet::new(&root, "idx");
        let mut txn = db.begin().await.unwrap();

        rs.mark_done(&mut *txn, &[0], &[3]).await.unwrap();
        rs.mark_done(&mut *txn, &[5], &[8]).await.unwrap();
        rs.mark_done(&mut *txn, &[3], &[5]).await.unwrap();

        assert!(rs.is_complete(&*txn, &[0], &[8]).await.unwrap());
        let ranges = rs.completed_ranges(&*txn).await.unwrap();
        assert_eq!(ranges, vec![(vec![0], vec![8])]);
        txn.commit().await.unwrap();
    }
}
