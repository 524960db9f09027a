//! Index Manager (spec.md §3.1 component 7): evaluates each applicable
//! index's `root_expr`/`covering_fields` against a typed record via
//! `RecordAccess`, then dispatches the resulting tuple diff to the right
//! `IndexMaintainer`. This is the only place that bridges typed records
//! and the maintainers' plain-tuple world.

use std::collections::HashMap;
use std::sync::Arc;

use recordlayer_tuple::{Subspace, Tuple};

use crate::error::{RecordLayerError, Result};
use crate::index::{
    CountMaintainer, CoveringMaintainer, IndexDiff, IndexMaintainer, MaxMaintainer, MinMaintainer, PermutedMaintainer, RankMaintainer, SumMaintainer, ValueMaintainer,
    VectorMaintainer, VersionMaintainer,
};
use crate::index_state::{IndexState, IndexStateManager};
use crate::key_expression::KeyExpression;
use crate::kv::Transaction;
use crate::record_access::RecordAccess;
use crate::schema::{Index, IndexType, Schema};

/// Builds the concrete maintainer for `index`. `Permuted` recurses onto its
/// base index, using the *base's* subspace so the permuted view shares the
/// base's physical storage rather than duplicating it (spec.md §4.8).
pub fn build_maintainer(index: &Index, schema: &Schema, subspace_root: &Subspace) -> Result<Box<dyn IndexMaintainer>> {
    match &index.index_type {
        IndexType::Value => Ok(Box::new(ValueMaintainer::new(subspace_root.child(index.name.as_str())))),
        IndexType::Count => Ok(Box::new(CountMaintainer::new(subspace_root.child(index.name.as_str())))),
        IndexType::Sum => Ok(Box::new(SumMaintainer::new(subspace_root.child(index.name.as_str())))),
        IndexType::Min => Ok(Box::new(MinMaintainer::new(subspace_root.child(index.name.as_str()), group_arity(index)))),
        IndexType::Max => Ok(Box::new(MaxMaintainer::new(subspace_root.child(index.name.as_str()), group_arity(index)))),
        IndexType::Rank => Ok(Box::new(RankMaintainer::new(subspace_root.child(index.name.as_str()), group_arity(index)))),
        IndexType::Version(retention) => Ok(Box::new(VersionMaintainer::new(subspace_root.child(index.name.as_str()), retention.clone()))),
        IndexType::Vector => Ok(Box::new(VectorMaintainer::new(subspace_root.child(index.name.as_str()), index.options.hnsw_inline_size_threshold))),
        IndexType::CoveringValue => Ok(Box::new(CoveringMaintainer::new(subspace_root.child(index.name.as_str())))),
        IndexType::Permuted { base_index, permutation } => {
            let base = schema.require_index(base_index)?;
            let base_maintainer = build_maintainer(base, schema, subspace_root)?;
            Ok(Box::new(PermutedMaintainer::new(base_maintainer, permutation.clone(), &base.root_expr)?))
        }
    }
}

/// `root_expr.columnCount() - 1` — Sum/Min/Max/Rank's `root_expr` is
/// `Concat(group…, value)`, so the last column is the value and the rest
/// is the grouping key (spec.md §3.2 invariant 2).
fn group_arity(index: &Index) -> usize { index.root_expr.column_count().saturating_sub(1) }

pub struct IndexManager<R: RecordAccess> {
    schema: Schema,
    index_subspace: Subspace,
    state_manager: IndexStateManager,
    record_access: Arc<R>,
    maintainers: HashMap<String, Box<dyn IndexMaintainer>>,
}

impl<R: RecordAccess> IndexManager<R> {
    pub fn new(schema: Schema, root: &Subspace, record_access: Arc<R>) -> Result<Self> {
        let index_subspace = root.child("I");
        let state_manager = IndexStateManager::new(root);
        let mut maintainers = HashMap::new();
        for index in schema.all_indexes() {
            maintainers.insert(index.name.clone(), build_maintainer(index, &schema, &index_subspace)?);
        }
        Ok(IndexManager { schema, index_subspace, state_manager, record_access, maintainers })
    }

    pub fn schema(&self) -> &Schema { &self.schema }

    pub fn state_manager(&self) -> &IndexStateManager { &self.state_manager }

    pub fn subspace_for(&self, index_name: &str) -> Subspace { self.index_subspace.child(index_name) }

    pub fn maintainer(&self, index_name: &str) -> Result<&dyn IndexMaintainer> {
        self.maintainers.get(index_name).map(|b| b.as_ref()).ok_or_else(|| RecordLayerError::IndexNotFound(index_name.to_string()))
    }

    fn evaluate(&self, expr: &KeyExpression, record: &R::Record) -> Vec<Tuple> {
        let extract = |field: &str| self.record_access.extract_field(record, field);
        expr.evaluate(&extract)
    }

    /// Covering fields are assumed single-valued: each contributes the
    /// first tuple its expression evaluates to (spec.md §4.9 doesn't
    /// address multi-valued covering fields, so fan-out is not supported
    /// here).
    fn covering_tuple(&self, covering_fields: &[KeyExpression], record: &R::Record) -> Tuple {
        let mut out = Vec::new();
        for expr in covering_fields {
            if let Some(first) = self.evaluate(expr, record).into_iter().next() {
                out.extend(first);
            }
        }
        out
    }

    /// Maintains every index applicable to `record_type` for a single
    /// record write/delete. `old`/`new` mirror the record store's
    /// before/after state; a `None` on either side means insert or delete
    /// respectively (spec.md §4.10).
    pub async fn on_write(
        &self,
        txn: &mut dyn Transaction,
        record_type: &str,
        old: Option<&R::Record>,
        new: Option<&R::Record>,
        old_pk: Option<&Tuple>,
        new_pk: Option<&Tuple>,
    ) -> Result<()> {
        for index in self.schema.indexes_for(record_type) {
            let state = self.state_manager.get(&*txn, &index.name).await?;
            if state == IndexState::Disabled {
                continue;
            }
            let old_tuples = old.map(|r| self.evaluate(&index.root_expr, r)).unwrap_or_default();
            let new_tuples = new.map(|r| self.evaluate(&index.root_expr, r)).unwrap_or_default();
            let old_covering = match (&index.covering_fields, old) {
                (Some(cf), Some(r)) => Some(self.covering_tuple(cf, r)),
                _ => None,
            };
            let new_covering = match (&index.covering_fields, new) {
                (Some(cf), Some(r)) => Some(self.covering_tuple(cf, r)),
                _ => None,
            };
            let diff = IndexDiff {
                old_tuples: &old_tuples,
                new_tuples: &new_tuples,
                old_pk,
                new_pk,
                old_covering: old_covering.as_ref(),
                new_covering: new_covering.as_ref(),
            };
            self.maintainer(&index.name)?.update(&diff, txn).await?;
        }
        Ok(())
    }
}
