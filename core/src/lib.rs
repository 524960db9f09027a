//! Record layer core: a typed, indexed record store built atop an
//! abstract transactional ordered key-value store (`kv::Database`). See
//! `recordlayer-storage-sled` for a concrete backend.

pub mod aggregate;
pub mod builder;
pub mod covering_plan;
pub mod error;
pub mod index;
pub mod index_manager;
pub mod index_state;
pub mod key_expression;
pub mod kv;
pub mod partition;
pub mod rangeset;
pub mod record_access;
pub mod record_store;
pub mod schema;
pub mod scrubber;

#[cfg(any(test, feature = "test-util"))]
pub mod testkv;

pub use aggregate::{AggregateQuery, RankQuery};
pub use builder::{BuilderConfiguration, OnlineIndexBuilder};
pub use error::{RecordLayerError, Result};
pub use index_manager::IndexManager;
pub use index_state::{IndexState, IndexStateManager};
pub use key_expression::KeyExpression;
pub use kv::{Database, KvPair, RangeOptions, Transaction};
pub use partition::PartitionManager;
pub use rangeset::RangeSet;
pub use record_access::RecordAccess;
pub use record_store::RecordStore;
pub use schema::{Index, IndexOptions, IndexType, Permutation, RecordType, Schema, VersionRetention};
pub use scrubber::{OnlineIndexScrubber, ScrubReport, ScrubberConfiguration};
