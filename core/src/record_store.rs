//! Record Store (spec.md §3.1 component 11, §4.10): the typed CRUD surface
//! that drives the Index Manager on every write.

use std::sync::Arc;

use recordlayer_tuple::{Subspace, Tuple};

use crate::error::{RecordLayerError, Result};
use crate::index_manager::IndexManager;
use crate::key_expression::KeyExpression;
use crate::kv::{Database, Transaction};
use crate::record_access::RecordAccess;
use crate::schema::Schema;

/// A typed record store for one record type, layered on `<R>/<type>/<pk>`
/// (spec.md §6.2) and wired to an `IndexManager` that maintains every
/// index applicable to this type on each write.
pub struct RecordStore<R: RecordAccess> {
    db: Arc<dyn Database>,
    records_subspace: Subspace,
    record_access: Arc<R>,
    pk_expr: KeyExpression,
    index_manager: IndexManager<R>,
}

impl<R: RecordAccess> RecordStore<R> {
    pub fn new(db: Arc<dyn Database>, root: &Subspace, schema: Schema, record_access: Arc<R>, pk_expr: KeyExpression) -> Result<Self> {
        let records_subspace = root.child("R").child(record_access.record_type());
        let index_manager = IndexManager::new(schema, root, record_access.clone())?;
        Ok(RecordStore { db, records_subspace, record_access, pk_expr, index_manager })
    }

    pub fn index_manager(&self) -> &IndexManager<R> { &self.index_manager }

    fn extract_pk(&self, record: &R::Record) -> Result<Tuple> {
        let extract = |field: &str| self.record_access.extract_field(record, field);
        let mut candidates = self.pk_expr.evaluate(&extract);
        if candidates.len() != 1 {
            return Err(RecordLayerError::InvalidArgument(format!(
                "primary key expression must yield exactly one tuple, got {}",
                candidates.len()
            )));
        }
        Ok(candidates.remove(0))
    }

    fn key_for(&self, pk: &Tuple) -> Vec<u8> { self.records_subspace.pack(pk) }

    /// Inserts or replaces `record`, maintaining every applicable index
    /// (spec.md §4.10 `save`).
    pub async fn save(&self, record: &R::Record) -> Result<()> {
        let pk = self.extract_pk(record)?;
        let key = self.key_for(&pk);
        let mut txn = self.db.begin().await?;
        let old_bytes = txn.get(&key).await?;
        let old = old_bytes.as_deref().map(|b| self.record_access.deserialize(b)).transpose()?;
        txn.set(&key, &self.record_access.serialize(record));
        self.index_manager.on_write(&mut *txn, self.record_access.record_type(), old.as_ref(), Some(record), old.as_ref().map(|_| &pk), Some(&pk)).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Removes the record at `pk`, maintaining every applicable index.
    /// Idempotent: deleting an absent key is a no-op (spec.md §4.10
    /// `delete`).
    pub async fn delete(&self, pk: &Tuple) -> Result<()> {
        let key = self.key_for(pk);
        let mut txn = self.db.begin().await?;
        let old_bytes = txn.get(&key).await?;
        let Some(old_bytes) = old_bytes else {
            txn.commit().await?;
            return Ok(());
        };
        let old = self.record_access.deserialize(&old_bytes)?;
        txn.clear(&key);
        self.index_manager.on_write(&mut *txn, self.record_access.record_type(), Some(&old), None, Some(pk), None).await?;
        txn.commit().await?;
        Ok(())
    }

    /// A single KV read + deserialize (spec.md §4.10 `fetch`).
    pub async fn fetch(&self, pk: &Tuple) -> Result<Option<R::Record>> {
        let txn = self.db.begin().await?;
        let key = self.key_for(pk);
        let bytes = txn.get(&key).await?;
        txn.cancel().await;
        bytes.as_deref().map(|b| self.record_access.deserialize(b)).transpose()
    }

    /// A full-subspace scan of this record type's primary-key space,
    /// yielding `(pk, record)` pairs in key order.
    pub async fn scan(&self) -> Result<Vec<(Tuple, R::Record)>> {
        let txn = self.db.begin().await?;
        let (begin, end) = self.records_subspace.range();
        let rows = txn.get_range(&begin, &end, crate::kv::RangeOptions::new()).await?;
        txn.cancel().await;
        let mut out = Vec::with_capacity(rows.len());
        for (k, v) in rows {
            let suffix = self.records_subspace.unpack_suffix(&k);
            let pk = recordlayer_tuple::unpack(suffix)
                .map_err(|e| RecordLayerError::DeserializationFailed { kind: "record primary key".into(), reason: e.to_string() })?;
            out.push((pk, self.record_access.deserialize(&v)?));
        }
        Ok(out)
    }

    pub fn subspace(&self) -> &Subspace { &self.records_subspace }

    pub fn pk_expr(&self) -> &KeyExpression { &self.pk_expr }
}
