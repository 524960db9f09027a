//! Online Index Builder (spec.md §3.1 component 9, §4.12): backfills a
//! disabled/write-only index in batches, transitioning it through
//! write-only to readable as coverage completes.

use std::sync::Arc;
use std::time::Duration;

use recordlayer_tuple::{Subspace, Tuple};
use tracing::{debug, info, warn};

use crate::error::{RecordLayerError, Result};
use crate::index::{IndexDiff, IndexMaintainer};
use crate::index_manager::build_maintainer;
use crate::index_state::{IndexState, IndexStateManager};
use crate::kv::{Database, RangeOptions, Transaction};
use crate::rangeset::RangeSet;
use crate::record_access::RecordAccess;
use crate::schema::{Index, Schema};

/// `{ batch_size, throttle_ms, clear_first }` (spec.md §4.12).
#[derive(Debug, Clone, Copy)]
pub struct BuilderConfiguration {
    pub batch_size: usize,
    pub throttle_ms: u64,
    pub clear_first: bool,
}

impl BuilderConfiguration {
    pub fn new(batch_size: usize, throttle_ms: u64, clear_first: bool) -> Self { BuilderConfiguration { batch_size, throttle_ms, clear_first } }

    /// A reasonable default for interactive backfills: modest batches, no
    /// throttle, resume rather than restart.
    pub fn default_preset() -> Self { BuilderConfiguration { batch_size: 1000, throttle_ms: 0, clear_first: false } }

    /// Smaller batches and a throttle, for building alongside live traffic
    /// without starving foreground transactions.
    pub fn gentle_preset() -> Self { BuilderConfiguration { batch_size: 200, throttle_ms: 50, clear_first: false } }
}

/// Backfills one index for one record type's primary-key space.
pub struct OnlineIndexBuilder<R: RecordAccess> {
    db: Arc<dyn Database>,
    records_subspace: Subspace,
    record_access: Arc<R>,
    index: Index,
    index_storage_subspace: Subspace,
    maintainer: Box<dyn IndexMaintainer>,
    state_manager: IndexStateManager,
    range_set: RangeSet,
    config: BuilderConfiguration,
}

impl<R: RecordAccess> OnlineIndexBuilder<R> {
    pub fn new(
        db: Arc<dyn Database>,
        root: &Subspace,
        schema: &Schema,
        index_name: &str,
        records_subspace: Subspace,
        record_access: Arc<R>,
        config: BuilderConfiguration,
    ) -> Result<Self> {
        let index = schema.require_index(index_name)?.clone();
        let index_subspace = root.child("I");
        let index_storage_subspace = index_subspace.child(index.name.as_str());
        let maintainer = build_maintainer(&index, schema, &index_subspace)?;
        let state_manager = IndexStateManager::new(root);
        let range_set = RangeSet::new(root, &format!("builder/{index_name}"));
        Ok(OnlineIndexBuilder { db, records_subspace, record_access, index, index_storage_subspace, maintainer, state_manager, range_set, config })
    }

    /// Runs the full backfill protocol to completion (spec.md §4.12
    /// steps 1-5). Cancellation is checked between batches via
    /// `cancelled`; a batch that fails mid-transaction rolls back and is
    /// retried unchanged on the next call. Re-running against an already
    /// readable index is a no-op (spec.md §8.2 scenario S5).
    pub async fn run(&self, mut cancelled: impl FnMut() -> bool) -> Result<()> {
        {
            let txn = self.db.begin().await?;
            let state = self.state_manager.get(&*txn, &self.index.name).await?;
            txn.cancel().await;
            if state == IndexState::Readable {
                info!(index = %self.index.name, "index is already readable, nothing to build");
                return Ok(());
            }
        }

        if self.config.clear_first {
            info!(index = %self.index.name, "clearing index storage before backfill");
            let mut txn = self.db.begin().await?;
            let (begin, end) = self.index_storage_subspace.range();
            txn.clear_range(&begin, &end);
            self.range_set.clear_all(&mut *txn);
            txn.commit().await?;
        }

        {
            let mut txn = self.db.begin().await?;
            self.state_manager.set(&mut *txn, &self.index.name, IndexState::WriteOnly);
            txn.commit().await?;
            debug!(index = %self.index.name, "transitioned to write-only");
        }

        let (global_begin, global_end) = self.records_subspace.range();
        loop {
            if cancelled() {
                warn!(index = %self.index.name, "backfill cancelled");
                return Ok(());
            }
            let mut txn = self.db.begin().await?;
            let gap = self.range_set.claim_next_gap(&*txn, &global_begin, &global_end).await?;
            let Some((batch_begin, batch_end)) = gap else {
                txn.cancel().await;
                break;
            };
            let rows = txn
                .get_range(&batch_begin, &batch_end, RangeOptions::new().limit(self.config.batch_size))
                .await?;
            let reached_end = rows.len() < self.config.batch_size;
            let mut last_key = batch_end.clone();
            for (k, v) in &rows {
                let suffix = self.records_subspace.unpack_suffix(k);
                let pk = recordlayer_tuple::unpack(suffix)
                    .map_err(|e| RecordLayerError::DeserializationFailed { kind: "record primary key".into(), reason: e.to_string() })?;
                let record = self.record_access.deserialize(v)?;
                let extract = |field: &str| self.record_access.extract_field(&record, field);
                let new_tuples = self.index.root_expr.evaluate(&extract);
                let new_covering = self.index.covering_fields.as_ref().map(|fields| {
                    let mut out = Tuple::new();
                    for f in fields {
                        if let Some(first) = f.evaluate(&extract).into_iter().next() {
                            out.extend(first);
                        }
                    }
                    out
                });
                let diff = IndexDiff {
                    old_tuples: &[],
                    new_tuples: &new_tuples,
                    old_pk: None,
                    new_pk: Some(&pk),
                    old_covering: None,
                    new_covering: new_covering.as_ref(),
                };
                self.maintainer.update(&diff, &mut *txn).await?;
                last_key = k.clone();
            }
            let built_to = if reached_end { batch_end.clone() } else { next_key(&last_key) };
            self.range_set.mark_done(&mut *txn, &batch_begin, &built_to).await?;
            txn.commit().await?;
            debug!(index = %self.index.name, scanned = rows.len(), "built batch");

            if self.config.throttle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.throttle_ms)).await;
            }
        }

        {
            let mut txn = self.db.begin().await?;
            self.state_manager.set(&mut *txn, &self.index.name, IndexState::Readable);
            txn.commit().await?;
        }
        info!(index = %self.index.name, "backfill complete, index is readable");
        Ok(())
    }
}

/// The smallest key strictly greater than `key`, used to advance past the
/// last scanned row within a batch that didn't reach the range's end.
fn next_key(key: &[u8]) -> Vec<u8> {
    let mut out = key.to_vec();
    out.push(0x00);
    out
}
