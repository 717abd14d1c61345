use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::pdp::retry::{Disposition, RetryError, RetryPolicy, with_retry};

use crate::store::model::{
    FileMapping, Filter, Genome, NewRecord, Page, Paper, Record, RecordKind, RecordQuery, Spectrum,
};
use crate::store::{MetadataStore, StoreError};

type Result<T> = std::result::Result<T, StoreError>;

/// Compose deployments often start the gateway before Postgres accepts
/// connections.
pub const CONNECT_POLICY: RetryPolicy = RetryPolicy::fixed(10, Duration::from_secs(3));

/// Opens the pool, retrying every failure under `policy`.
pub async fn connect(
    url: &str,
    max_connections: u32,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> std::result::Result<PgPool, RetryError<sqlx::Error>> {
    let pool = with_retry(
        "connect to postgres",
        policy,
        cancel,
        |attempt| {
            info!("Connecting to postgres (attempt {})", attempt);
            PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
        },
        |_| Disposition::Transient,
    )
    .await?;
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct PgMetadataStore {
    pub pool: Arc<PgPool>,
}

impl PgMetadataStore {
    pub fn new(pool: Arc<PgPool>) -> PgMetadataStore {
        PgMetadataStore { pool }
    }

    async fn fetch(&self, kind: RecordKind, qb: &mut QueryBuilder<'_, Postgres>) -> Result<Vec<Record>> {
        let pool = self.pool.as_ref();
        let records = match kind {
            RecordKind::Paper => qb
                .build_query_as::<Paper>()
                .fetch_all(pool)
                .await?
                .into_iter()
                .map(Record::Paper)
                .collect(),
            RecordKind::Genome => qb
                .build_query_as::<Genome>()
                .fetch_all(pool)
                .await?
                .into_iter()
                .map(Record::Genome)
                .collect(),
            RecordKind::Spectrum => qb
                .build_query_as::<Spectrum>()
                .fetch_all(pool)
                .await?
                .into_iter()
                .map(Record::Spectrum)
                .collect(),
            RecordKind::FileCids => qb
                .build_query_as::<FileMapping>()
                .fetch_all(pool)
                .await?
                .into_iter()
                .map(Record::FileMapping)
                .collect(),
        };
        Ok(records)
    }
}

/// Appends the WHERE clause for `query` to `qb`. Every client value is bound;
/// only whitelisted column names are pushed as SQL text.
fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, kind: RecordKind, query: &RecordQuery) {
    let mut sep = " WHERE ";

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(sep).push("(");
        for (i, column) in kind.search_columns().iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(*column).push(" ILIKE ").push_bind(pattern.clone());
        }
        qb.push(")");
        sep = " AND ";
    }

    for (filter, value) in &query.filters {
        match filter {
            Filter::Ilike(column) => {
                qb.push(sep)
                    .push(*column)
                    .push(" ILIKE ")
                    .push_bind(format!("%{value}%"));
            }
            Filter::IntEq(column) => {
                let Ok(number) = value.parse::<i32>() else {
                    continue;
                };
                qb.push(sep).push(*column).push(" = ").push_bind(number);
            }
            Filter::ArrayContains(column) => {
                qb.push(sep)
                    .push_bind(value.clone())
                    .push(" = ANY(")
                    .push(*column)
                    .push(")");
            }
        }
        sep = " AND ";
    }
}

#[async_trait::async_trait]
impl MetadataStore for PgMetadataStore {
    async fn insert_file_mapping(&self, filename: &str, cid: &str) -> Result<()> {
        sqlx::query("INSERT INTO file_cids (filename, cid) VALUES ($1, $2)")
            .bind(filename)
            .bind(cid)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn insert_typed_record(
        &self,
        cid: &str,
        record: &NewRecord,
        filename: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        match record {
            NewRecord::Paper(paper) => {
                sqlx::query(
                    "INSERT INTO paper (cid, title, journal, year, keywords) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(cid)
                .bind(&paper.title)
                .bind(&paper.journal)
                .bind(paper.year)
                .bind(&paper.keywords)
                .execute(&mut *tx)
                .await?;
            }
            NewRecord::Genome(genome) => {
                sqlx::query(
                    "INSERT INTO genome (cid, organism, assembly_version, notes) VALUES ($1, $2, $3, $4)",
                )
                .bind(cid)
                .bind(&genome.organism)
                .bind(&genome.assembly_version)
                .bind(&genome.notes)
                .execute(&mut *tx)
                .await?;
            }
            NewRecord::Spectrum(spectrum) => {
                sqlx::query(
                    "INSERT INTO spectrum (cid, compound, technique_nmr_ir_ms, metadata_json) VALUES ($1, $2, $3, $4)",
                )
                .bind(cid)
                .bind(&spectrum.compound)
                .bind(&spectrum.technique)
                .bind(spectrum.metadata.clone())
                .execute(&mut *tx)
                .await?;
            }
        }
        sqlx::query("INSERT INTO file_cids (filename, cid) VALUES ($1, $2)")
            .bind(filename)
            .bind(cid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_file_mappings(&self, filename: Option<&str>) -> Result<Vec<FileMapping>> {
        let rows = match filename {
            Some(filename) => {
                sqlx::query_as::<_, FileMapping>(
                    "SELECT id, filename, cid, uploaded_at FROM file_cids WHERE filename = $1 ORDER BY uploaded_at DESC",
                )
                .bind(filename)
                .fetch_all(self.pool.as_ref())
                .await?
            }
            None => {
                sqlx::query_as::<_, FileMapping>(
                    "SELECT id, filename, cid, uploaded_at FROM file_cids ORDER BY uploaded_at DESC",
                )
                .fetch_all(self.pool.as_ref())
                .await?
            }
        };
        Ok(rows)
    }

    async fn query_records(&self, kind: RecordKind, query: &RecordQuery) -> Result<Page> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ");
        count.push(kind.table());
        push_conditions(&mut count, kind, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(self.pool.as_ref())
            .await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT ");
        select.push(kind.columns()).push(" FROM ").push(kind.table());
        push_conditions(&mut select, kind, query);
        select
            .push(" ORDER BY ")
            .push(query.sort)
            .push(" ")
            .push(query.order.as_sql())
            .push(" LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);
        let data = self.fetch(kind, &mut select).await?;

        Ok(Page { data, total })
    }

    async fn get_record(&self, kind: RecordKind, cid: &str) -> Result<Record> {
        let mut select = QueryBuilder::<Postgres>::new("SELECT ");
        select
            .push(kind.columns())
            .push(" FROM ")
            .push(kind.table())
            .push(" WHERE cid = ")
            .push_bind(cid.to_string())
            .push(" ORDER BY ")
            .push(kind.default_sort())
            .push(" DESC LIMIT 1");
        self.fetch(kind, &mut select)
            .await?
            .pop()
            .ok_or_else(|| StoreError::NotFound(format!("{} `{}`", kind.table(), cid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    fn where_sql(kind: RecordKind, query: &RecordQuery) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM ");
        qb.push(kind.table());
        push_conditions(&mut qb, kind, query);
        qb.build().sql().to_string()
    }

    #[test]
    fn test_no_conditions() {
        let sql = where_sql(RecordKind::Genome, &RecordQuery::new(RecordKind::Genome));
        assert_eq!(sql, "SELECT 1 FROM genome");
    }

    #[test]
    fn test_search_and_filters_are_bound() {
        let mut query = RecordQuery::new(RecordKind::Paper);
        query.search = Some("quantum".to_string());
        query.filters = vec![
            (Filter::IntEq("year"), "2023".to_string()),
            (Filter::ArrayContains("keywords"), "physics".to_string()),
        ];
        let sql = where_sql(RecordKind::Paper, &query);
        assert_eq!(
            sql,
            "SELECT 1 FROM paper WHERE (title ILIKE $1 OR journal ILIKE $2) AND year = $3 AND $4 = ANY(keywords)"
        );
    }

    #[test]
    fn test_non_numeric_int_filter_is_skipped() {
        let mut query = RecordQuery::new(RecordKind::Paper);
        query.filters = vec![
            (Filter::IntEq("year"), "recent".to_string()),
            (Filter::Ilike("journal"), "nature".to_string()),
        ];
        let sql = where_sql(RecordKind::Paper, &query);
        assert_eq!(sql, "SELECT 1 FROM paper WHERE journal ILIKE $1");
    }

    #[test]
    fn test_backfill_enforces_required_columns() {
        let backfill = include_str!("../../migrations/20250102000000_backfill_nullable_columns.sql");
        // Columns decoded into non-optional fields of the row types.
        let required = [
            ("file_cids", "uploaded_at"),
            ("paper", "keywords"),
            ("paper", "created_at"),
            ("spectrum", "compound"),
            ("spectrum", "created_at"),
            ("genome", "organism"),
            ("genome", "created_at"),
        ];
        for (table, column) in required {
            let backfilled = format!("UPDATE {table} SET {column} = ");
            let enforced = format!("ALTER TABLE {table} ALTER COLUMN {column} SET NOT NULL;");
            assert!(backfill.contains(&backfilled), "{table}.{column} is not backfilled");
            assert!(backfill.contains(&enforced), "{table}.{column} is not enforced");
        }
    }
}
