//! A `recordlayer_core::kv::Database` implementation backed by
//! [`sled`](https://docs.rs/sled). See `recordlayer_core::testkv` for the
//! in-memory backend used by the core crate's own tests.

mod database;
mod error;
mod transaction;

pub use database::SledDatabase;
pub use error::sled_error;
