//! Online Scrubber (spec.md §3.1 component 10, §4.13): a two-phase
//! integrity sweep over a readable, `value`-shaped index. Phase 1 walks the
//! index looking for entries whose record is gone (dangling); phase 2 walks
//! the records looking for expected index entries that never got written
//! (missing). Each phase tracks its own `RangeSet` so a scrub can resume
//! after a partial run without re-scanning completed ground.

use std::sync::Arc;
use std::time::{Duration, Instant};

use recordlayer_tuple::{Subspace, Tuple};
use tracing::{info, warn};

use crate::error::{RecordLayerError, Result};
use crate::index::ValueMaintainer;
use crate::index_state::{IndexState, IndexStateManager};
use crate::kv::{Database, RangeOptions, Transaction};
use crate::rangeset::RangeSet;
use crate::record_access::RecordAccess;
use crate::schema::{Index, Schema};

/// `{ entries_scan_limit, max_txn_bytes, txn_timeout_ms, read_your_writes,
/// allow_repair, supported_types, log_warnings_limit,
/// enable_progress_logging, progress_log_interval_s, max_retries,
/// retry_delay_ms }` (spec.md §6.4).
#[derive(Debug, Clone)]
pub struct ScrubberConfiguration {
    pub entries_scan_limit: usize,
    pub max_txn_bytes: usize,
    pub txn_timeout_ms: u64,
    pub read_your_writes: bool,
    pub allow_repair: bool,
    pub supported_types: Vec<&'static str>,
    pub log_warnings_limit: usize,
    pub enable_progress_logging: bool,
    pub progress_log_interval_s: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl ScrubberConfiguration {
    fn base(entries_scan_limit: usize, txn_timeout_ms: u64, allow_repair: bool) -> Self {
        ScrubberConfiguration {
            entries_scan_limit,
            max_txn_bytes: 10 * 1024 * 1024,
            txn_timeout_ms,
            read_your_writes: true,
            allow_repair,
            supported_types: vec!["value"],
            log_warnings_limit: 100,
            enable_progress_logging: true,
            progress_log_interval_s: 30,
            max_retries: 3,
            retry_delay_ms: 200,
        }
    }

    pub fn conservative_preset() -> Self { Self::base(100, 2000, false) }
    pub fn default_preset() -> Self { Self::base(1000, 4000, false) }
    pub fn aggressive_preset() -> Self { Self::base(10_000, 4000, true) }
}

/// `{ entriesScanned, recordsScanned, danglingDetected, danglingRepaired,
/// missingDetected, missingRepaired }` (spec.md §4.13).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrubReport {
    pub entries_scanned: u64,
    pub records_scanned: u64,
    pub dangling_detected: u64,
    pub dangling_repaired: u64,
    pub missing_detected: u64,
    pub missing_repaired: u64,
}

/// Scrubs one `value`-type (or otherwise `config.supported_types`-listed)
/// index for a single record type.
pub struct OnlineIndexScrubber<R: RecordAccess> {
    db: Arc<dyn Database>,
    records_subspace: Subspace,
    record_access: Arc<R>,
    index: Index,
    maintainer: ValueMaintainer,
    index_key_column_count: usize,
    state_manager: IndexStateManager,
    phase1_ranges: RangeSet,
    phase2_ranges: RangeSet,
    config: ScrubberConfiguration,
}

impl<R: RecordAccess> OnlineIndexScrubber<R> {
    pub fn new(
        db: Arc<dyn Database>,
        root: &Subspace,
        schema: &Schema,
        index_name: &str,
        records_subspace: Subspace,
        record_access: Arc<R>,
        config: ScrubberConfiguration,
    ) -> Result<Self> {
        let index = schema.require_index(index_name)?.clone();
        let kind = index.index_type.name();
        if !config.supported_types.contains(&kind) {
            return Err(RecordLayerError::InvalidArgument(format!("scrubber does not support index type '{kind}' for '{index_name}'")));
        }
        let indexes_subspace = root.child("I");
        let index_subspace = indexes_subspace.child(index.name.as_str());
        let maintainer = ValueMaintainer::new(index_subspace);
        let index_key_column_count = index.root_expr.column_count();
        let state_manager = IndexStateManager::new(root);
        let phase1_ranges = RangeSet::new(root, &format!("scrub/phase1/{index_name}"));
        let phase2_ranges = RangeSet::new(root, &format!("scrub/phase2/{index_name}"));
        Ok(OnlineIndexScrubber { db, records_subspace, record_access, index, maintainer, index_key_column_count, state_manager, phase1_ranges, phase2_ranges, config })
    }

    /// Runs both phases to completion and returns the aggregated report
    /// (spec.md §4.13).
    pub async fn run(&self, mut cancelled: impl FnMut() -> bool) -> Result<ScrubReport> {
        {
            let txn = self.db.begin().await?;
            let state = self.state_manager.get(&*txn, &self.index.name).await?;
            txn.cancel().await;
            if state != IndexState::Readable {
                return Err(RecordLayerError::IndexNotReady { name: self.index.name.clone(), state });
            }
        }

        let mut report = ScrubReport::default();
        self.scrub_phase1(&mut cancelled, &mut report).await?;
        self.scrub_phase2(&mut cancelled, &mut report).await?;
        Ok(report)
    }

    /// Phase 1 — index sweep: every index entry whose primary key no longer
    /// has a record is dangling (spec.md §4.13).
    async fn scrub_phase1(&self, cancelled: &mut impl FnMut() -> bool, report: &mut ScrubReport) -> Result<()> {
        let (global_begin, global_end) = self.maintainer.subspace().range();
        let mut last_progress = Instant::now();
        loop {
            if cancelled() {
                warn!(index = %self.index.name, phase = 1, "scrub cancelled");
                return Ok(());
            }
            let gap = self.claim_gap_with_retry(&self.phase1_ranges, &global_begin, &global_end).await?;
            let Some((batch_begin, batch_end)) = gap else { break };

            let mut txn = self.db.begin().await?;
            let rows = txn
                .get_range(&batch_begin, &batch_end, RangeOptions::new().snapshot(!self.config.read_your_writes).limit(self.config.entries_scan_limit))
                .await?;
            let reached_end = rows.len() < self.config.entries_scan_limit;
            let mut last_key = batch_end.clone();
            for (k, _) in &rows {
                report.entries_scanned += 1;
                let suffix = self.maintainer.subspace().unpack_suffix(k);
                let full: Tuple = recordlayer_tuple::unpack(suffix)
                    .map_err(|e| RecordLayerError::DeserializationFailed { kind: "value index key".into(), reason: e.to_string() })?;
                let pk = full[self.index_key_column_count..].to_vec();
                let record_key = self.records_subspace.pack(&pk);
                if txn.get(&record_key).await?.is_none() {
                    report.dangling_detected += 1;
                    warn!(index = %self.index.name, ?pk, "dangling index entry");
                    if self.config.allow_repair {
                        txn.clear(k);
                        report.dangling_repaired += 1;
                    }
                }
                last_key = k.clone();
            }
            let built_to = if reached_end { batch_end.clone() } else { next_key(&last_key) };
            self.phase1_ranges.mark_done(&mut *txn, &batch_begin, &built_to).await?;
            txn.commit().await?;

            if self.config.enable_progress_logging && last_progress.elapsed() >= Duration::from_secs(self.config.progress_log_interval_s) {
                info!(index = %self.index.name, phase = 1, entries_scanned = report.entries_scanned, "scrub progress");
                last_progress = Instant::now();
            }
        }
        Ok(())
    }

    /// Phase 2 — record sweep: every index tuple a record should produce
    /// but doesn't have an entry for is missing (spec.md §4.13).
    async fn scrub_phase2(&self, cancelled: &mut impl FnMut() -> bool, report: &mut ScrubReport) -> Result<()> {
        let (global_begin, global_end) = self.records_subspace.range();
        let mut last_progress = Instant::now();
        loop {
            if cancelled() {
                warn!(index = %self.index.name, phase = 2, "scrub cancelled");
                return Ok(());
            }
            let gap = self.claim_gap_with_retry(&self.phase2_ranges, &global_begin, &global_end).await?;
            let Some((batch_begin, batch_end)) = gap else { break };

            let mut txn = self.db.begin().await?;
            let rows = txn.get_range(&batch_begin, &batch_end, RangeOptions::new().limit(self.config.entries_scan_limit)).await?;
            let reached_end = rows.len() < self.config.entries_scan_limit;
            let mut last_key = batch_end.clone();
            for (k, v) in &rows {
                report.records_scanned += 1;
                let suffix = self.records_subspace.unpack_suffix(k);
                let pk: Tuple = recordlayer_tuple::unpack(suffix)
                    .map_err(|e| RecordLayerError::DeserializationFailed { kind: "record primary key".into(), reason: e.to_string() })?;
                let record = self.record_access.deserialize(v)?;
                let extract = |field: &str| self.record_access.extract_field(&record, field);
                let expected = self.index.root_expr.evaluate(&extract);
                for tuple in &expected {
                    let mut composite = tuple.clone();
                    composite.extend(pk.iter().cloned());
                    let key = self.maintainer.subspace().pack(&composite);
                    if txn.get(&key).await?.is_none() {
                        report.missing_detected += 1;
                        warn!(index = %self.index.name, ?pk, "missing index entry");
                        if self.config.allow_repair {
                            txn.set(&key, &[]);
                            report.missing_repaired += 1;
                        }
                    }
                }
                last_key = k.clone();
            }
            let built_to = if reached_end { batch_end.clone() } else { next_key(&last_key) };
            self.phase2_ranges.mark_done(&mut *txn, &batch_begin, &built_to).await?;
            txn.commit().await?;

            if self.config.enable_progress_logging && last_progress.elapsed() >= Duration::from_secs(self.config.progress_log_interval_s) {
                info!(index = %self.index.name, phase = 2, records_scanned = report.records_scanned, "scrub progress");
                last_progress = Instant::now();
            }
        }
        Ok(())
    }

    /// Claims the next unbuilt gap, retrying on `TransactionConflict` up to
    /// `max_retries` times with a fixed linear backoff (spec.md §5, §6.4).
    async fn claim_gap_with_retry(&self, ranges: &RangeSet, global_begin: &[u8], global_end: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut attempt = 0;
        loop {
            let txn = self.db.begin().await?;
            let result = ranges.claim_next_gap(&*txn, global_begin, global_end).await;
            txn.cancel().await;
            match result {
                Ok(v) => return Ok(v),
                Err(RecordLayerError::TransactionConflict) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn next_key(key: &[u8]) -> Vec<u8> {
    let mut out = key.to_vec();
    out.push(0x00);
    out
}

#[cfg(all(test, feature = "test-util"))]
mod tests {
    use super::*;
    use crate::key_expression::KeyExpression;
    use crate::kv::Transaction;
    use crate::schema::RecordType;
    use crate::testkv::MemoryDatabase;
    use recordlayer_tuple::Element;

    #[derive(Clone)]
    struct Widget {
        id: i64,
        category: String,
    }

    struct WidgetAccess;
    impl RecordAccess for WidgetAccess {
        type Record = Widget;
        fn record_type(&self) -> &str { "widget" }
        fn serialize(&self, record: &Widget) -> Vec<u8> { format!("{}|{}", record.id, record.category).into_bytes() }
        fn deserialize(&self, bytes: &[u8]) -> Result<Widget> {
            let s = String::from_utf8_lossy(bytes);
            let (id, category) = s.split_once('|').unwrap();
            Ok(Widget { id: id.parse().unwrap(), category: category.to_string() })
        }
        fn extract_field(&self, record: &Widget, field: &str) -> Vec<Element> {
            match field {
                "id" => vec![Element::Int(record.id)],
                "category" => vec![Element::from(record.category.as_str())],
                _ => vec![],
            }
        }
    }

    fn schema() -> Schema {
        Schema::new()
            .with_record_type(RecordType::new("widget", KeyExpression::field("id")))
            .with_index(Index::value("widget_by_category", KeyExpression::field("category"), vec!["widget".into()]))
    }

    #[tokio::test]
    async fn phase1_detects_and_repairs_dangling_entry() {
        let db = Arc::new(MemoryDatabase::new());
        let root = Subspace::new(b"root".to_vec());
        let schema = schema();
        let records_subspace = root.child("R").child("widget");
        let index_subspace = root.child("I").child("widget_by_category");

        {
            let mut txn = db.begin().await.unwrap();
            let key = index_subspace.pack(&vec![Element::from("orphan"), Element::Int(999)]);
            txn.set(&key, &[]);
            let state_mgr = IndexStateManager::new(&root);
            state_mgr.set(&mut *txn, "widget_by_category", IndexState::Readable);
            txn.commit().await.unwrap();
        }

        let scrubber = OnlineIndexScrubber::new(
            db.clone(),
            &root,
            &schema,
            "widget_by_category",
            records_subspace,
            Arc::new(WidgetAccess),
            ScrubberConfiguration::aggressive_preset(),
        )
        .unwrap();

        let report = scrubber.run(|| false).await.unwrap();
        assert_eq!(report.dangling_detected, 1);
        assert_eq!(report.dangling_repaired, 1);

        let report2 = scrubber.run(|| false).await.unwrap();
        assert_eq!(report2.dangling_detected, 0);
    }

    #[tokio::test]
    async fn phase2_detects_and_repairs_missing_entry() {
        let db = Arc::new(MemoryDatabase::new());
        let root = Subspace::new(b"root".to_vec());
        let schema = schema();
        let records_subspace = root.child("R").child("widget");

        {
            let mut txn = db.begin().await.unwrap();
            let key = records_subspace.pack(&vec![Element::Int(1)]);
            txn.set(&key, b"1|gadgets");
            let state_mgr = IndexStateManager::new(&root);
            state_mgr.set(&mut *txn, "widget_by_category", IndexState::Readable);
            txn.commit().await.unwrap();
        }

        let scrubber = OnlineIndexScrubber::new(
            db.clone(),
            &root,
            &schema,
            "widget_by_category",
            records_subspace,
            Arc::new(WidgetAccess),
            ScrubberConfiguration::aggressive_preset(),
        )
        .unwrap();

        let report = scrubber.run(|| false).await.unwrap();
        assert_eq!(report.missing_detected, 1);
        assert_eq!(report.missing_repaired, 1);

        let report2 = scrubber.run(|| false).await.unwrap();
        assert_eq!(report2.missing_detected, 0);
    }

    #[test]
    fn rejects_unsupported_index_type() {
        let root = Subspace::new(b"root".to_vec());
        let schema = Schema::new()
            .with_record_type(RecordType::new("widget", KeyExpression::field("id")))
            .with_index(Index::count("widget_count", KeyExpression::field("id"), vec!["widget".into()]));
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let records_subspace = root.child("R").child("widget");
        let result = OnlineIndexScrubber::new(db, &root, &schema, "widget_count", records_subspace, Arc::new(WidgetAccess), ScrubberConfiguration::default_preset());
        assert!(result.is_err());
    }
}
