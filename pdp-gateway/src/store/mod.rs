use thiserror::Error;

use crate::store::model::{FileMapping, NewRecord, Page, Record, RecordKind, RecordQuery};

pub mod memory;
pub mod model;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgMetadataStore;

type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for uploaded-file metadata.
///
/// Writes are independent appends, so one handle is shared by every request.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_file_mapping(&self, filename: &str, cid: &str) -> Result<()>;

    /// Writes `record` for `cid` together with its filename mapping.
    async fn insert_typed_record(&self, cid: &str, record: &NewRecord, filename: &str)
    -> Result<()>;

    /// All mappings, newest first; `filename` narrows to exact matches.
    async fn list_file_mappings(&self, filename: Option<&str>) -> Result<Vec<FileMapping>>;

    async fn query_records(&self, kind: RecordKind, query: &RecordQuery) -> Result<Page>;

    async fn get_record(&self, kind: RecordKind, cid: &str) -> Result<Record>;
}
