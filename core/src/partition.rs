//! Partition Manager (spec.md §3.1 component 12, §4.14): derives a
//! per-tenant, per-collection subspace and lazily builds + caches the
//! `RecordStore` backing it, so concurrent access to distinct tenants never
//! serializes on a single lock.

use std::sync::Arc;

use dashmap::DashMap;
use recordlayer_tuple::Subspace;

use crate::error::Result;
use crate::key_expression::KeyExpression;
use crate::kv::{Database, Transaction};
use crate::record_access::RecordAccess;
use crate::record_store::RecordStore;
use crate::schema::Schema;

/// Routes `(tenant_id, collection)` to `<root>/accounts/<tenant_id>/<collection>`
/// (spec.md §6.2) and caches the `RecordStore` built on top of it. One
/// `PartitionManager` serves one record type — construct one per type, the
/// same way `RecordStore` itself is per-type.
pub struct PartitionManager<R: RecordAccess> {
    db: Arc<dyn Database>,
    root: Subspace,
    schema: Schema,
    record_access: Arc<R>,
    pk_expr: KeyExpression,
    cache: DashMap<(String, String), Arc<RecordStore<R>>>,
}

impl<R: RecordAccess> PartitionManager<R> {
    pub fn new(db: Arc<dyn Database>, root: Subspace, schema: Schema, record_access: Arc<R>, pk_expr: KeyExpression) -> Self {
        PartitionManager { db, root, schema, record_access, pk_expr, cache: DashMap::new() }
    }

    fn account_subspace(&self, tenant_id: &str) -> Subspace { self.root.child("accounts").child(tenant_id) }

    /// Returns the cached `RecordStore` for `(tenant_id, collection)`,
    /// constructing and caching it on first access. Two concurrent callers
    /// racing on the same key may each build a store; the second insert
    /// wins and the first is simply dropped (spec.md §5: "value construction
    /// may race — benign after equality check").
    pub fn record_store(&self, tenant_id: &str, collection: &str) -> Result<Arc<RecordStore<R>>> {
        let cache_key = (tenant_id.to_string(), collection.to_string());
        if let Some(existing) = self.cache.get(&cache_key) {
            return Ok(existing.clone());
        }
        let subspace = self.account_subspace(tenant_id).child(collection);
        let store = Arc::new(RecordStore::new(self.db.clone(), &subspace, self.schema.clone(), self.record_access.clone(), self.pk_expr.clone())?);
        self.cache.entry(cache_key).or_insert_with(|| store.clone());
        Ok(store)
    }

    /// Clears `<root>/accounts/<tenant_id>` entirely and evicts every cached
    /// store for that tenant, across all collections (spec.md §4.14).
    pub async fn delete_account(&self, tenant_id: &str) -> Result<()> {
        let (begin, end) = self.account_subspace(tenant_id).range();
        let mut txn = self.db.begin().await?;
        txn.clear_range(&begin, &end);
        txn.commit().await?;
        self.cache.retain(|(t, _), _| t != tenant_id);
        Ok(())
    }

    pub fn clear_cache(&self) { self.cache.clear(); }

    pub fn cache_size(&self) -> usize { self.cache.len() }
}
