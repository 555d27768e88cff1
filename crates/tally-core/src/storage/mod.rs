//! Storage layer: read-only statement execution and schema metadata.

pub mod database;
pub mod error;
pub mod schema;

pub use database::{RelationalStore, RowSet, SqliteStore};
pub use error::{classify, StorageResult, StoreError};
pub use schema::{quote_ident, quote_literal, CostColumn, SchemaMetadata, TableInfo};
