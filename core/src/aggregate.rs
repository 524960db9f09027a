//! Aggregate Query API (spec.md §3.1 component 13, §4.15): the typed,
//! validating facade over the grouping maintainers' raw read methods.
//! Nothing here mutates an index — that is entirely the `IndexManager`'s
//! job on the write path.

use std::sync::Arc;

use recordlayer_tuple::{Element, Subspace, Tuple};

use crate::error::{RecordLayerError, Result};
use crate::index::{CountMaintainer, MaxMaintainer, MinMaintainer, RankMaintainer, SumMaintainer};
use crate::index_state::{IndexState, IndexStateManager};
use crate::key_expression::KeyExpression;
use crate::kv::Transaction;
use crate::record_access::RecordAccess;
use crate::schema::{Index, IndexType, Schema};

fn validate_arity(expected: usize, provided: usize) -> Result<()> {
    if expected != provided {
        return Err(RecordLayerError::InvalidArgument(format!("expected {expected} grouping field(s), got {provided}")));
    }
    Ok(())
}

fn as_i64(tuple: &Tuple, kind: &str) -> Result<i64> {
    tuple
        .first()
        .and_then(Element::as_int)
        .ok_or_else(|| RecordLayerError::DeserializationFailed { kind: kind.to_string(), reason: "expected a single integer element".into() })
}

/// `root_expr.columnCount() - 1` — Sum/Min/Max/Rank's `root_expr` is
/// `Concat(group…, value)` (spec.md §3.2 invariant 2).
fn group_arity(index: &Index) -> usize { index.root_expr.column_count().saturating_sub(1) }

/// Evaluates `.min`/`.max`/`.count`/`.sum` against a grouping index, plus a
/// `rank`/`rankQuery` surface over Range-Tree indexes (spec.md §4.15).
pub struct AggregateQuery<R: RecordAccess> {
    schema: Schema,
    index_subspace: Subspace,
    state_manager: IndexStateManager,
    record_access: Arc<R>,
    pk_expr: KeyExpression,
}

impl<R: RecordAccess> AggregateQuery<R> {
    pub fn new(root: &Subspace, schema: Schema, record_access: Arc<R>, pk_expr: KeyExpression) -> Self {
        let index_subspace = root.child("I");
        let state_manager = IndexStateManager::new(root);
        AggregateQuery { index_subspace, state_manager, schema, record_access, pk_expr }
    }

    async fn resolve_readable(&self, txn: &dyn Transaction, index_name: &str, expected: IndexTypeKind) -> Result<&Index> {
        let index = self.schema.require_index(index_name)?;
        if !expected.matches(&index.index_type) {
            return Err(RecordLayerError::InvalidArgument(format!("index '{index_name}' is not a {expected} index")));
        }
        let state = self.state_manager.get(txn, index_name).await?;
        if state != IndexState::Readable {
            return Err(RecordLayerError::IndexNotReady { name: index_name.to_string(), state });
        }
        Ok(index)
    }

    /// `evaluateAggregate(.count(indexName), groupBy)` (spec.md §4.15).
    pub async fn count(&self, txn: &dyn Transaction, index_name: &str, group: &Tuple) -> Result<i64> {
        let index = self.resolve_readable(txn, index_name, IndexTypeKind::Count).await?;
        validate_arity(index.root_expr.column_count(), group.len())?;
        CountMaintainer::new(self.index_subspace.child(index.name.as_str())).count(txn, group).await
    }

    /// `evaluateAggregate(.sum(indexName), groupBy)` (spec.md §4.15).
    pub async fn sum(&self, txn: &dyn Transaction, index_name: &str, group: &Tuple) -> Result<i64> {
        let index = self.resolve_readable(txn, index_name, IndexTypeKind::Sum).await?;
        validate_arity(group_arity(index), group.len())?;
        SumMaintainer::new(self.index_subspace.child(index.name.as_str())).sum(txn, group).await
    }

    /// `evaluateAggregate(.min(indexName), groupBy)` (spec.md §4.15).
    pub async fn min(&self, txn: &dyn Transaction, index_name: &str, group: &Tuple) -> Result<i64> {
        let index = self.resolve_readable(txn, index_name, IndexTypeKind::Min).await?;
        validate_arity(group_arity(index), group.len())?;
        let tuple = MinMaintainer::new(self.index_subspace.child(index.name.as_str()), group_arity(index)).min(txn, group).await?;
        as_i64(&tuple, "min index value")
    }

    /// `evaluateAggregate(.max(indexName), groupBy)` (spec.md §4.15).
    pub async fn max(&self, txn: &dyn Transaction, index_name: &str, group: &Tuple) -> Result<i64> {
        let index = self.resolve_readable(txn, index_name, IndexTypeKind::Max).await?;
        validate_arity(group_arity(index), group.len())?;
        let tuple = MaxMaintainer::new(self.index_subspace.child(index.name.as_str()), group_arity(index)).max(txn, group).await?;
        as_i64(&tuple, "max index value")
    }

    /// Resolves and validates a rank index, then returns a `RankQuery`
    /// bound to it (spec.md §6.3 `rankQuery(name).{...}`).
    pub async fn rank_query(&self, txn: &dyn Transaction, index_name: &str) -> Result<RankQuery> {
        let index = self.resolve_readable(txn, index_name, IndexTypeKind::Rank).await?;
        Ok(RankQuery { maintainer: RankMaintainer::new(self.index_subspace.child(index.name.as_str()), group_arity(index)) })
    }

    /// `rank(score, in: path, for: record, indexName?)`: auto-detects the
    /// rank index by the *last* field of its root expression when
    /// `index_name` is omitted (spec.md §4.15), then extracts the record's
    /// group/score/pk and delegates to `RankMaintainer::rank`.
    pub async fn rank(&self, txn: &dyn Transaction, score_field: &str, record: &R::Record, index_name: Option<&str>) -> Result<u64> {
        let index = self.resolve_rank_index(score_field, index_name)?;
        let state = self.state_manager.get(txn, &index.name).await?;
        if state != IndexState::Readable {
            return Err(RecordLayerError::IndexNotReady { name: index.name.clone(), state });
        }

        let extract = |field: &str| self.record_access.extract_field(record, field);
        let mut tuples = index.root_expr.evaluate(&extract);
        if tuples.len() != 1 {
            return Err(RecordLayerError::InvalidArgument(format!(
                "rank index '{}' root expression must yield exactly one tuple per record, got {}",
                index.name,
                tuples.len()
            )));
        }
        let full = tuples.remove(0);
        let arity = group_arity(index);
        let score = full[arity..]
            .first()
            .and_then(Element::as_int)
            .ok_or_else(|| RecordLayerError::InvalidArgument(format!("rank index '{}' last field must be an integer score", index.name)))?;
        let group = full[..arity].to_vec();

        let mut pk_tuples = self.pk_expr.evaluate(&extract);
        if pk_tuples.len() != 1 {
            return Err(RecordLayerError::InvalidArgument("primary key expression must yield exactly one tuple".into()));
        }
        let pk = pk_tuples.remove(0);

        RankMaintainer::new(self.index_subspace.child(index.name.as_str()), arity).rank(txn, &group, score, &pk).await
    }

    fn resolve_rank_index(&self, score_field: &str, index_name: Option<&str>) -> Result<&Index> {
        if let Some(name) = index_name {
            let index = self.schema.require_index(name)?;
            if !matches!(index.index_type, IndexType::Rank) {
                return Err(RecordLayerError::InvalidArgument(format!("index '{name}' is not a rank index")));
            }
            return Ok(index);
        }
        let mut matches = self
            .schema
            .all_indexes()
            .filter(|i| matches!(i.index_type, IndexType::Rank) && i.root_expr.field_names().last() == Some(&score_field));
        let first = matches.next().ok_or_else(|| RecordLayerError::InvalidArgument(format!("no rank index found ranking field '{score_field}'")))?;
        if matches.next().is_some() {
            return Err(RecordLayerError::InvalidArgument(format!("multiple rank indexes rank field '{score_field}'; pass indexName explicitly")));
        }
        Ok(first)
    }
}

/// A rank index resolved and state-checked by `AggregateQuery::rank_query`,
/// exposing the read-only query surface directly (spec.md §6.3).
pub struct RankQuery {
    maintainer: RankMaintainer,
}

impl RankQuery {
    pub async fn count(&self, txn: &dyn Transaction, group: &Tuple) -> Result<i64> { self.maintainer.count(txn, group).await }

    pub async fn count_score_range(&self, txn: &dyn Transaction, group: &Tuple, min: i64, max: i64) -> Result<i64> {
        self.maintainer.count_score_range(txn, group, min, max).await
    }

    pub async fn top(&self, txn: &dyn Transaction, group: &Tuple, limit: usize) -> Result<Vec<(i64, Tuple)>> { self.maintainer.top(txn, group, limit).await }

    pub async fn by_rank(&self, txn: &dyn Transaction, group: &Tuple, start: u64, limit: usize) -> Result<Vec<(i64, Tuple)>> {
        self.maintainer.by_rank(txn, group, start, limit).await
    }

    pub async fn range(&self, txn: &dyn Transaction, group: &Tuple, min: i64, max: i64) -> Result<Vec<(i64, Tuple)>> { self.maintainer.range(txn, group, min, max).await }

    pub async fn score_at_rank(&self, txn: &dyn Transaction, group: &Tuple, rank: u64) -> Result<i64> { self.maintainer.score_at_rank(txn, group, rank).await }
}

#[derive(Debug, Clone, Copy)]
enum IndexTypeKind {
    Count,
    Sum,
    Min,
    Max,
    Rank,
}

impl IndexTypeKind {
    fn matches(self, ty: &IndexType) -> bool {
        matches!(
            (self, ty),
            (IndexTypeKind::Count, IndexType::Count)
                | (IndexTypeKind::Sum, IndexType::Sum)
                | (IndexTypeKind::Min, IndexType::Min)
                | (IndexTypeKind::Max, IndexType::Max)
                | (IndexTypeKind::Rank, IndexType::Rank)
        )
    }
}

impl std::fmt::Display for IndexTypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexTypeKind::Count => "count",
            IndexTypeKind::Sum => "sum",
            IndexTypeKind::Min => "min",
            IndexTypeKind::Max => "max",
            IndexTypeKind::Rank => "rank",
        };
        f.write_str(s)
    }
}

#[cfg(all(test, feature = "test-util"))]
mod tests {
    use super::*;
    use crate::index_manager::IndexManager;
    use crate::schema::RecordType;
    use crate::testkv::MemoryDatabase;
    use crate::kv::Database;

    #[derive(Clone)]
    struct Sale {
        id: i64,
        region: String,
        amount: i64,
    }

    struct SaleAccess;
    impl RecordAccess for SaleAccess {
        type Record = Sale;
        fn record_type(&self) -> &str { "sale" }
        fn serialize(&self, record: &Sale) -> Vec<u8> { format!("{}|{}|{}", record.id, record.region, record.amount).into_bytes() }
        fn deserialize(&self, bytes: &[u8]) -> Result<Sale> {
            let s = String::from_utf8_lossy(bytes);
            let mut parts = s.splitn(3, '|');
            Ok(Sale {
                id: parts.next().unwrap().parse().unwrap(),
                region: parts.next().unwrap().to_string(),
                amount: parts.next().unwrap().parse().unwrap(),
            })
        }
        fn extract_field(&self, record: &Sale, field: &str) -> Vec<Element> {
            match field {
                "id" => vec![Element::Int(record.id)],
                "region" => vec![Element::from(record.region.as_str())],
                "amount" => vec![Element::Int(record.amount)],
                _ => vec![],
            }
        }
    }

    fn schema() -> Schema {
        Schema::new()
            .with_record_type(RecordType::new("sale", KeyExpression::field("id")))
            .with_index(Index::sum(
                "sale_amount_by_region",
                KeyExpression::concat([KeyExpression::field("region"), KeyExpression::field("amount")]),
                vec!["sale".into()],
            ))
    }

    #[tokio::test]
    async fn sum_rejects_when_index_not_readable() {
        let db = MemoryDatabase::new();
        let root = Subspace::new(b"root".to_vec());
        let schema = schema();
        let query = AggregateQuery::new(&root, schema, Arc::new(SaleAccess), KeyExpression::field("id"));
        let txn = db.begin().await.unwrap();
        let group = vec![Element::from("East")];
        let result = query.sum(&*txn, "sale_amount_by_region", &group).await;
        assert!(matches!(result, Err(RecordLayerError::IndexNotReady { .. })));
    }

    #[tokio::test]
    async fn sum_reflects_maintained_writes_once_readable() {
        let db = MemoryDatabase::new();
        let root = Subspace::new(b"root".to_vec());
        let schema = schema();
        let record_access = Arc::new(SaleAccess);
        let manager = IndexManager::new(schema.clone(), &root, record_access.clone()).unwrap();

        {
            let mut txn = db.begin().await.unwrap();
            manager.state_manager().set(&mut *txn, "sale_amount_by_region", IndexState::Readable);
            let sale = Sale { id: 1, region: "East".into(), amount: 500 };
            let pk = vec![Element::Int(1)];
            manager.on_write(&mut *txn, "sale", None, Some(&sale), None, Some(&pk)).await.unwrap();
            txn.commit().await.unwrap();
        }

        let query = AggregateQuery::new(&root, schema, record_access, KeyExpression::field("id"));
        let txn = db.begin().await.unwrap();
        let total = query.sum(&*txn, "sale_amount_by_region", &vec![Element::from("East")]).await.unwrap();
        assert_eq!(total, 500);
    }
}
