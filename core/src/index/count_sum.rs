use async_trait::async_trait;
use recordlayer_tuple::{Element, Subspace, Tuple};

use super::{list_diff, IndexDiff, IndexMaintainer};
use crate::error::{RecordLayerError, Result};
use crate::kv::Transaction;

fn read_counter_bytes(bytes: Option<Vec<u8>>) -> i64 {
    bytes.map(|b| i64::from_le_bytes(b.as_slice().try_into().unwrap_or([0; 8]))).unwrap_or(0)
}

/// `<idx>/<groupingKey…> → atomic-counter(int64)` (spec.md §3.1, §4.4). The
/// entire `root_expr` evaluation is the grouping key — there is no separate
/// value column, unlike Sum.
pub struct CountMaintainer {
    subspace: Subspace,
}

impl CountMaintainer {
    pub fn new(subspace: Subspace) -> Self { CountMaintainer { subspace } }

    /// `root_expr.columnCount()` — the full arity a `count(group)` query
    /// must supply (spec.md §4.4: "groupingKey = extract root_expr").
    pub async fn count(&self, txn: &dyn Transaction, group: &Tuple) -> Result<i64> {
        let key = self.subspace.pack(group);
        Ok(read_counter_bytes(txn.get(&key).await?))
    }
}

#[async_trait]
impl IndexMaintainer for CountMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> {
        let (removed, added) = list_diff(diff.old_tuples, diff.new_tuples);
        for g in &removed {
            txn.atomic_add(&self.subspace.pack(g), -1);
        }
        for g in &added {
            txn.atomic_add(&self.subspace.pack(g), 1);
        }
        Ok(())
    }
}

fn split_group_value(tuple: &Tuple) -> Result<(Tuple, i64)> {
    let (group, value) = tuple.split_at(tuple.len().saturating_sub(1));
    let value = value
        .first()
        .and_then(Element::as_int)
        .ok_or_else(|| RecordLayerError::InvalidArgument("sum index's last root_expr field must be an integer".into()))?;
    Ok((group.to_vec(), value))
}

/// `<idx>/<groupingKey…> → atomic-counter(int64)` where `root_expr` is
/// `Concat(group…, value)` (spec.md §4.4).
pub struct SumMaintainer {
    subspace: Subspace,
}

impl SumMaintainer {
    pub fn new(subspace: Subspace) -> Self { SumMaintainer { subspace } }

    /// Query arity: `root_expr.columnCount() - 1` (spec.md §3.2 invariant 2).
    pub async fn sum(&self, txn: &dyn Transaction, group: &Tuple) -> Result<i64> {
        let key = self.subspace.pack(group);
        Ok(read_counter_bytes(txn.get(&key).await?))
    }
}

#[async_trait]
impl IndexMaintainer for SumMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> {
        let (removed, added) = list_diff(diff.old_tuples, diff.new_tuples);
        for t in &removed {
            let (group, value) = split_group_value(t)?;
            txn.atomic_add(&self.subspace.pack(&group), -value);
        }
        for t in &added {
            let (group, value) = split_group_value(t)?;
            txn.atomic_add(&self.subspace.pack(&group), value);
        }
        Ok(())
    }
}

/// Validates a grouping-value query's arity, producing the typed error
/// spec.md §4.4/§4.5 requires, naming expected vs. provided field counts.
pub(crate) fn validate_group_arity(expected: usize, provided: usize) -> Result<()> {
    if expected != provided {
        return Err(RecordLayerError::InvalidArgument(format!("expected {expected} grouping field(s), got {provided}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_group_value_rejects_non_integer() {
        let tuple = vec![Element::from("East"), Element::from("not-a-number")];
        assert!(split_group_value(&tuple).is_err());
    }

    #[test]
    fn split_group_value_splits_last_field() {
        let tuple = vec![Element::from("East"), Element::Int(500)];
        let (group, value) = split_group_value(&tuple).unwrap();
        assert_eq!(group, vec![Element::from("East")]);
        assert_eq!(value, 500);
    }
}
