use async_trait::async_trait;
use recordlayer_tuple::Tuple;

use super::{IndexDiff, IndexMaintainer};
use crate::error::{RecordLayerError, Result};
use crate::key_expression::KeyExpression;
use crate::kv::Transaction;
use crate::schema::Permutation;

/// Wraps a base index's maintainer, reordering the extracted column
/// sequence before delegating (spec.md §4.8). The base's storage is
/// reused as-is — only the logical column order a query sees differs —
/// so this supports reordering a composite index's column order without
/// rebuilding it.
pub struct PermutedMaintainer {
    inner: Box<dyn IndexMaintainer>,
    permutation: Permutation,
}

impl PermutedMaintainer {
    /// `root_expr` is the base index's key expression; spec.md §4.8
    /// requires it be a flat `Concat` of bare `Field`s so every column has
    /// an unambiguous position to permute.
    pub fn new(inner: Box<dyn IndexMaintainer>, permutation: Permutation, root_expr: &KeyExpression) -> Result<Self> {
        if !root_expr.is_flat_concat_of_fields() {
            return Err(RecordLayerError::InvalidArgument("permuted index's base root_expr must be a flat Concat of Field expressions".into()));
        }
        if permutation.len() != root_expr.column_count() {
            return Err(RecordLayerError::InvalidArgument(format!(
                "permutation length {} does not match base index column count {}",
                permutation.len(),
                root_expr.column_count()
            )));
        }
        Ok(PermutedMaintainer { inner, permutation })
    }

    pub fn permutation(&self) -> &Permutation { &self.permutation }

    /// Un-permutes a tuple read back from the base index's storage into
    /// the base's original column order.
    pub fn invert(&self, permuted: &Tuple) -> Tuple { self.permutation.inverse().apply(permuted) }

    fn permute_all(&self, tuples: &[Tuple]) -> Vec<Tuple> { tuples.iter().map(|t| self.permutation.apply(t)).collect() }
}

#[async_trait]
impl IndexMaintainer for PermutedMaintainer {
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()> {
        let old_permuted = self.permute_all(diff.old_tuples);
        let new_permuted = self.permute_all(diff.new_tuples);
        let permuted_diff = IndexDiff {
            old_tuples: &old_permuted,
            new_tuples: &new_permuted,
            old_pk: diff.old_pk,
            new_pk: diff.new_pk,
            old_covering: diff.old_covering,
            new_covering: diff.new_covering,
        };
        self.inner.update(&permuted_diff, txn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::value::ValueMaintainer;
    use recordlayer_tuple::{Element, Subspace};

    #[test]
    fn rejects_non_flat_root_expr() {
        let nested = KeyExpression::concat(vec![KeyExpression::concat(vec![KeyExpression::field("a")]), KeyExpression::field("b")]);
        let perm = Permutation::new(vec![1, 0]).unwrap();
        let inner: Box<dyn IndexMaintainer> = Box::new(ValueMaintainer::new(Subspace::new(b"test".to_vec())));
        assert!(PermutedMaintainer::new(inner, perm, &nested).is_err());
    }

    #[test]
    fn permutes_tuple_order() {
        let flat = KeyExpression::concat(vec![KeyExpression::field("a"), KeyExpression::field("b"), KeyExpression::field("c")]);
        let perm = Permutation::new(vec![2, 0, 1]).unwrap();
        let inner: Box<dyn IndexMaintainer> = Box::new(ValueMaintainer::new(Subspace::new(b"test".to_vec())));
        let maintainer = PermutedMaintainer::new(inner, perm, &flat).unwrap();
        let tuple = vec![Element::from("A"), Element::from("B"), Element::from("C")];
        let permuted = maintainer.permutation().apply(&tuple);
        assert_eq!(permuted, vec![Element::from("C"), Element::from("A"), Element::from("B")]);
        assert_eq!(maintainer.invert(&permuted), tuple);
    }
}
