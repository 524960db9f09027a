//! Schema (spec.md §3.1 component 4): the set of record types and indexes
//! the record store knows about.

use std::collections::HashMap;

use crate::error::{RecordLayerError, Result};
use crate::key_expression::KeyExpression;

/// How long a version-index entry is retained once superseded (spec.md
/// §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRetention {
    KeepAll,
    KeepLast(usize),
    KeepForDuration(std::time::Duration),
}

/// A validated reordering of `0..n` column positions (spec.md §4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    order: Vec<usize>,
}

impl Permutation {
    /// Validates that `order` is a permutation of `0..order.len()`: no
    /// duplicates, no gaps, non-empty.
    pub fn new(order: Vec<usize>) -> Result<Self> {
        if order.is_empty() {
            return Err(RecordLayerError::InvalidArgument("permutation must not be empty".into()));
        }
        let n = order.len();
        let mut seen = vec![false; n];
        for &idx in &order {
            if idx >= n {
                return Err(RecordLayerError::InvalidArgument(format!("permutation index {idx} out of range for length {n}")));
            }
            if seen[idx] {
                return Err(RecordLayerError::InvalidArgument(format!("permutation index {idx} duplicated")));
            }
            seen[idx] = true;
        }
        Ok(Permutation { order })
    }

    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Applies the permutation: `apply(fields)[i] = fields[order[i]]`.
    pub fn apply<T: Clone>(&self, fields: &[T]) -> Vec<T> { self.order.iter().map(|&i| fields[i].clone()).collect() }

    /// The inverse permutation, used to read a permuted index back out.
    pub fn inverse(&self) -> Permutation {
        let mut inv = vec![0usize; self.order.len()];
        for (i, &o) in self.order.iter().enumerate() {
            inv[o] = i;
        }
        Permutation { order: inv }
    }
}

/// The kind of maintainer an `Index` uses (spec.md §3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexType {
    Value,
    Count,
    Sum,
    Min,
    Max,
    Rank,
    Version(VersionRetention),
    Vector,
    Permuted { base_index: String, permutation: Permutation },
    CoveringValue,
}

impl IndexType {
    pub fn name(&self) -> &'static str {
        match self {
            IndexType::Value => "value",
            IndexType::Count => "count",
            IndexType::Sum => "sum",
            IndexType::Min => "min",
            IndexType::Max => "max",
            IndexType::Rank => "rank",
            IndexType::Version(_) => "version",
            IndexType::Vector => "vector",
            IndexType::Permuted { .. } => "permuted",
            IndexType::CoveringValue => "covering-value",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Threshold above which inline HNSW maintenance must refuse rather
    /// than silently drop records (spec.md §4.12 point 7, §9).
    pub hnsw_inline_size_threshold: Option<usize>,
}

/// A secondary index descriptor (spec.md §3.1). Two indexes are equal iff
/// their names are equal — the name is the identity.
#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub index_type: IndexType,
    pub root_expr: KeyExpression,
    pub covering_fields: Option<Vec<KeyExpression>>,
    pub record_types: Vec<String>,
    pub options: IndexOptions,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool { self.name == other.name }
}
impl Eq for Index {}

impl Index {
    pub fn value(name: impl Into<String>, root_expr: KeyExpression, record_types: Vec<String>) -> Self {
        Index { name: name.into(), index_type: IndexType::Value, root_expr, covering_fields: None, record_types, options: IndexOptions::default() }
    }

    pub fn count(name: impl Into<String>, root_expr: KeyExpression, record_types: Vec<String>) -> Self {
        Index { name: name.into(), index_type: IndexType::Count, root_expr, covering_fields: None, record_types, options: IndexOptions::default() }
    }

    pub fn sum(name: impl Into<String>, root_expr: KeyExpression, record_types: Vec<String>) -> Self {
        Index { name: name.into(), index_type: IndexType::Sum, root_expr, covering_fields: None, record_types, options: IndexOptions::default() }
    }

    pub fn min(name: impl Into<String>, root_expr: KeyExpression, record_types: Vec<String>) -> Self {
        Index { name: name.into(), index_type: IndexType::Min, root_expr, covering_fields: None, record_types, options: IndexOptions::default() }
    }

    pub fn max(name: impl Into<String>, root_expr: KeyExpression, record_types: Vec<String>) -> Self {
        Index { name: name.into(), index_type: IndexType::Max, root_expr, covering_fields: None, record_types, options: IndexOptions::default() }
    }

    pub fn rank(name: impl Into<String>, root_expr: KeyExpression, record_types: Vec<String>) -> Self {
        Index { name: name.into(), index_type: IndexType::Rank, root_expr, covering_fields: None, record_types, options: IndexOptions::default() }
    }

    pub fn version(name: impl Into<String>, root_expr: KeyExpression, retention: VersionRetention, record_types: Vec<String>) -> Self {
        Index {
            name: name.into(),
            index_type: IndexType::Version(retention),
            root_expr,
            covering_fields: None,
            record_types,
            options: IndexOptions::default(),
        }
    }

    pub fn vector(name: impl Into<String>, root_expr: KeyExpression, record_types: Vec<String>, inline_threshold: usize) -> Self {
        Index {
            name: name.into(),
            index_type: IndexType::Vector,
            root_expr,
            covering_fields: None,
            record_types,
            options: IndexOptions { hnsw_inline_size_threshold: Some(inline_threshold) },
        }
    }

    pub fn permuted(name: impl Into<String>, base_index: impl Into<String>, permutation: Permutation, root_expr: KeyExpression, record_types: Vec<String>) -> Self {
        Index {
            name: name.into(),
            index_type: IndexType::Permuted { base_index: base_index.into(), permutation },
            root_expr,
            covering_fields: None,
            record_types,
            options: IndexOptions::default(),
        }
    }

    pub fn covering(name: impl Into<String>, on: KeyExpression, covering: Vec<KeyExpression>, record_types: Vec<String>) -> Self {
        Index {
            name: name.into(),
            index_type: IndexType::CoveringValue,
            root_expr: on,
            covering_fields: Some(covering),
            record_types,
            options: IndexOptions::default(),
        }
    }

    pub fn applies_to(&self, record_type: &str) -> bool { self.record_types.iter().any(|t| t == record_type) }

    /// True iff `indexed_fields ∪ covering_fields ∪ primary_key_fields` is a
    /// superset of `fields` (spec.md §3.2 invariant 6, §4.9).
    pub fn covers(&self, fields: &[&str], pk_expr: &KeyExpression) -> bool {
        let Some(covering) = &self.covering_fields else { return false };
        let mut available: Vec<&str> = self.root_expr.field_names();
        for c in covering {
            available.extend(c.field_names());
        }
        available.extend(pk_expr.field_names());
        fields.iter().all(|f| available.contains(f))
    }
}

/// A record type known to the schema: a name plus the expression that
/// derives its primary key.
#[derive(Debug, Clone)]
pub struct RecordType {
    pub name: String,
    pub primary_key: KeyExpression,
}

impl RecordType {
    pub fn new(name: impl Into<String>, primary_key: KeyExpression) -> Self { RecordType { name: name.into(), primary_key } }
}

/// The set of record types and indexes the record store operates over.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    record_types: HashMap<String, RecordType>,
    indexes: HashMap<String, Index>,
}

impl Schema {
    pub fn new() -> Self { Self::default() }

    pub fn with_record_type(mut self, rt: RecordType) -> Self {
        self.record_types.insert(rt.name.clone(), rt);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    pub fn record_type(&self, name: &str) -> Option<&RecordType> { self.record_types.get(name) }

    pub fn index(&self, name: &str) -> Option<&Index> { self.indexes.get(name) }

    pub fn require_index(&self, name: &str) -> Result<&Index> {
        self.indexes.get(name).ok_or_else(|| RecordLayerError::IndexNotFound(name.to_string()))
    }

    pub fn indexes_for(&self, record_type: &str) -> impl Iterator<Item = &Index> {
        self.indexes.values().filter(move |i| i.applies_to(record_type))
    }

    pub fn all_indexes(&self) -> impl Iterator<Item = &Index> { self.indexes.values() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutation_rejects_duplicates_and_gaps() {
        assert!(Permutation::new(vec![0, 0]).is_err());
        assert!(Permutation::new(vec![0, 2]).is_err());
        assert!(Permutation::new(vec![]).is_err());
        assert!(Permutation::new(vec![1, 0]).is_ok());
    }

    #[test]
    fn permutation_apply_and_inverse_roundtrip() {
        let perm = Permutation::new(vec![2, 0, 1]).unwrap();
        let fields = vec!["a", "b", "c"];
        let permuted = perm.apply(&fields);
        assert_eq!(permuted, vec!["c", "a", "b"]);
        let restored = perm.inverse().apply(&permuted);
        assert_eq!(restored, fields);
    }

    #[test]
    fn index_equality_is_name_identity() {
        let a = Index::value("idx", KeyExpression::field("x"), vec!["T".into()]);
        let mut b = a.clone();
        b.root_expr = KeyExpression::field("y");
        assert_eq!(a, b);
    }
}
