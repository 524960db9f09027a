use async_trait::async_trait;
use recordlayer_tuple::{Element, Subspace, Tuple, Versionstamp};

use super::{IndexDiff, IndexMaintainer};
use crate::error::Result;
use crate::kv::{RangeOptions, Transaction};
use crate::schema::VersionRetention;

/// `<idx>/<pk…>/<vs> → pack([Timestamp(now)])` (spec.md §4.7, laid out
/// pk-major rather than version-major: both retention trimming and the
/// delete-time reverse lookup need "every version of this pk", which a
/// version-major key can't answer without a full-subspace scan, so this
/// pk-major layout serves as both the forward record and its own reverse
/// side-index). The stored value carries the write's wall-clock time,
/// needed for `KeepForDuration` trimming — the versionstamp itself only
/// orders writes, it carries no wall-clock meaning.
pub struct VersionMaintainer {
    subspace: Subspace,
    retention: VersionRetention,
}

impl VersionMaintainer {
    pub fn new(subspace: Subspace, retention: VersionRetention) -> Self { VersionMaintainer { subspace, retention } }

    fn pk_subspace(&self, pk: &Tuple) -> Subspace { self.subspace.child_tuple(pk) }

    /// Every retained version for `pk`, oldest first.
    pub async fn history(&self, txn: &dyn Transaction, pk: &Tuple) -> Result<Vec<Versionstamp>> {
        let pk_subspace = self.pk_subspace(pk);
        let (begin, end) = pk_subspace.range();
        let rows = txn.get_range(&begin, &end, RangeOptions::new()).await?;
        entries_to_versionstamps(&pk_subspace, rows)
    }

    /// The most recently written version for `pk`, if any.
    pub async fn latest(&self, txn: &dyn Transaction, pk: &Tuple) -> Result<Option<Versionstamp>> {
        let pk_subspace = self.pk_subspace(pk);
        let (begin, end) = pk_subspace.range();
        let rows = txn.get_range(&begin, &end, RangeOptions::new().reverse(true).limit(1)).await?;
        Ok(entries_to_versionstamps(&pk_subspace, rows)?.into_iter().next())
    }

    async fn trim(&self, txn: &mut dyn Transaction, pk: &Tuple) -> Result<()> {
        let pk_subspace = self.pk_subspace(pk);
        let (begin, end) = pk_subspace.range();
        let rows = txn.get_range(&begin, &end, RangeOptions::new()).await?;
        match &self.retention {
            VersionRetention::KeepAll => {}
            VersionRetention::KeepLast(n) => {
                let excess = rows.len().saturating_sub(*n);
                for (k, _) in rows.into_iter().take(excess) {
                    txn.clear(&k);
                }
            }
            VersionRetention::KeepForDuration(d) => {
                let now = now_nanos();
                for (k, v) in rows {
                    if let Ok(tuple) = recordlayer_tuple::unpack(&v) {
                        if let Some(written_at) = tuple.first().and_then(Element::as_int) {
                            if now.saturating_sub(written_at) > d.as_nanos() as i64 {
                                txn.clear(&k);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn entries_to_versionstamps(pk_subspace: &Subspace, rows: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Vec<Versionstamp>> {
    let mut out = Vec::with_capacity(rows.len());
    for (k, _) in rows {
        let suffix = pk_subspace.unpack_suffix(&k);
        let tuple = recordlayer_tuple::unpack(suffix)
            .map_err(|e| crate::error::RecordLayerError::DeserializationFailed { kind: "version index key".into(), reason: e.to_string() })?;
        if let Some(Element::Versionstamp(vs)) = tuple.first() {
            out.push(*vs);
        }
    }
    Ok(out)
}

fn now_nanos() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0)
}

#[async_trait]
impl IndexMaintainer for VersionMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> {
        // Delete: clear the most recent entry found via the reverse lookup.
        if diff.new_pk.is_none() {
            if let Some(old_pk) = diff.old_pk {
                let pk_subspace = self.pk_subspace(old_pk);
                let (begin, end) = pk_subspace.range();
                let rows = txn.get_range(&begin, &end, RangeOptions::new().reverse(true).limit(1)).await?;
                if let Some((k, _)) = rows.into_iter().next() {
                    txn.clear(&k);
                }
            }
            return Ok(());
        }
        // Write: append a new versionstamped entry under this pk's own
        // sub-prefix (matching `pk_subspace`, which every read/trim/delete
        // path scans), then trim per retention.
        if let Some(new_pk) = diff.new_pk {
            let pk_subspace = self.pk_subspace(new_pk);
            let template = pk_subspace.pack(&vec![Element::Versionstamp(Versionstamp::INCOMPLETE)]);
            let value = recordlayer_tuple::pack(&vec![Element::Int(now_nanos())]);
            txn.set_versionstamped_key(&template, &value);
            self.trim(txn, new_pk).await?;
        }
        Ok(())
    }
}
