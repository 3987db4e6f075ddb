//! ParqueDB: a versioned, branchable document database with a columnar
//! storage substrate. Three layers compose into the [`repo::Repository`]
//! entry point:
//!
//! - a commit graph over immutable, content-addressed [`commit::Commit`]s,
//!   with branches and three-way [`merge`] on top ([`branch`], [`refs`],
//!   [`commit_store`]);
//! - a pluggable, conditional-write [`storage`] substrate content addresses
//!   everything go through ([`hash`]);
//! - columnar shredding of documents into typed Parquet columns, with
//!   predicate [`pushdown`] against the resulting statistics
//!   ([`schema`], [`variant`], [`parquet_codec`], [`filter`]).

pub mod branch;
pub mod commit;
pub mod commit_store;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod hash;
pub mod merge;
pub mod parquet_codec;
pub mod pushdown;
pub mod refs;
pub mod repo;
pub mod schema;
pub mod storage;
pub mod variant;

pub use error::{DbError, Result};
pub use repo::Repository;
