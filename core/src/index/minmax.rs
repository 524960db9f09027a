use async_trait::async_trait;
use recordlayer_tuple::{Subspace, Tuple};

use super::{value::ValueMaintainer, IndexDiff, IndexMaintainer};
use crate::error::{RecordLayerError, Result};
use crate::kv::{RangeOptions, Transaction};

/// `<idx>/<group…>/<value>/<pk…> → empty` (spec.md §4.5). Maintenance is
/// identical to the Value maintainer (delete-old/insert-new keyed on the
/// full `(group, value, pk)` tuple); only the query surface differs, so
/// both Min and Max wrap a `ValueMaintainer` rather than re-implementing
/// the diff.
pub struct MinMaintainer {
    inner: ValueMaintainer,
    group_arity: usize,
}

impl MinMaintainer {
    pub fn new(subspace: Subspace, group_arity: usize) -> Self { MinMaintainer { inner: ValueMaintainer::new(subspace), group_arity } }

    /// The smallest value in `group`, or `EmptyGroup` if the group has no
    /// records (spec.md §4.5).
    pub async fn min(&self, txn: &dyn Transaction, group: &Tuple) -> Result<Tuple> { extreme(&self.inner, txn, group, self.group_arity, false).await }
}

pub struct MaxMaintainer {
    inner: ValueMaintainer,
    group_arity: usize,
}

impl MaxMaintainer {
    pub fn new(subspace: Subspace, group_arity: usize) -> Self { MaxMaintainer { inner: ValueMaintainer::new(subspace), group_arity } }

    /// The largest value in `group`, or `EmptyGroup` if the group has no
    /// records (spec.md §4.5).
    pub async fn max(&self, txn: &dyn Transaction, group: &Tuple) -> Result<Tuple> { extreme(&self.inner, txn, group, self.group_arity, true).await }
}

async fn extreme(inner: &ValueMaintainer, txn: &dyn Transaction, group: &Tuple, group_arity: usize, reverse: bool) -> Result<Tuple> {
    if group.len() != group_arity {
        return Err(RecordLayerError::InvalidArgument(format!("expected {group_arity} grouping field(s), got {}", group.len())));
    }
    let group_subspace = inner.subspace().child_tuple(group);
    let (begin, end) = group_subspace.range();
    let opts = RangeOptions::new().reverse(reverse).limit(1);
    let rows = txn.get_range(&begin, &end, opts).await?;
    let (key, _) = rows.into_iter().next().ok_or(RecordLayerError::EmptyGroup)?;
    let suffix = group_subspace.unpack_suffix(&key);
    recordlayer_tuple::unpack(suffix)
        .map_err(|e| RecordLayerError::DeserializationFailed { kind: "min/max index key".into(), reason: e.to_string() })
        .map(|mut t| {
            // value is the first element under the group-scoped subspace; pk follows.
            t.truncate(1);
            t
        })
}

#[async_trait]
impl IndexMaintainer for MinMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> { self.inner.update(diff, txn).await }
}

#[async_trait]
impl IndexMaintainer for MaxMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> { self.inner.update(diff, txn).await }
}
