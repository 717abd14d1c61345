use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::model::{
    FileMapping, Filter, NewRecord, Page, Record, RecordKind, RecordQuery, SortOrder,
};
use crate::store::{MetadataStore, StoreError};

type Result<T> = std::result::Result<T, StoreError>;

#[derive(Default)]
struct Tables {
    next_id: i32,
    mappings: Vec<FileMapping>,
    records: Vec<Record>,
}

/// Process-local store for tests and running without a database.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StoreError::Unavailable`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    pub async fn mappings(&self) -> Vec<FileMapping> {
        self.tables.read().await.mappings.clone()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.tables.read().await.records.clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl Tables {
    fn push_mapping(&mut self, filename: &str, cid: &str) {
        self.next_id += 1;
        self.mappings.push(FileMapping {
            id: self.next_id,
            filename: filename.to_string(),
            cid: cid.to_string(),
            uploaded_at: Utc::now(),
        });
    }

    fn rows(&self, kind: RecordKind) -> Vec<Record> {
        match kind {
            RecordKind::FileCids => self
                .mappings
                .iter()
                .cloned()
                .map(Record::FileMapping)
                .collect(),
            _ => self
                .records
                .iter()
                .filter(|r| kind_of(r) == kind)
                .cloned()
                .collect(),
        }
    }
}

fn kind_of(record: &Record) -> RecordKind {
    match record {
        Record::FileMapping(_) => RecordKind::FileCids,
        Record::Paper(_) => RecordKind::Paper,
        Record::Genome(_) => RecordKind::Genome,
        Record::Spectrum(_) => RecordKind::Spectrum,
    }
}

fn cid_of(record: &Record) -> &str {
    match record {
        Record::FileMapping(m) => &m.cid,
        Record::Paper(p) => &p.cid,
        Record::Genome(g) => &g.cid,
        Record::Spectrum(s) => &s.cid,
    }
}

#[derive(Debug, PartialEq, PartialOrd)]
enum Value<'a> {
    Null,
    Int(i64),
    Text(&'a str),
    Time(DateTime<Utc>),
    Array(&'a [String]),
}

/// Reads `column` the way the Postgres store names it.
fn column<'a>(record: &'a Record, column: &str) -> Value<'a> {
    fn text(value: &Option<String>) -> Value<'_> {
        value.as_deref().map_or(Value::Null, Value::Text)
    }
    match (record, column) {
        (Record::FileMapping(m), "id") => Value::Int(m.id.into()),
        (Record::FileMapping(m), "filename") => Value::Text(&m.filename),
        (Record::FileMapping(m), "cid") => Value::Text(&m.cid),
        (Record::FileMapping(m), "uploaded_at") => Value::Time(m.uploaded_at),
        (Record::Paper(p), "cid") => Value::Text(&p.cid),
        (Record::Paper(p), "title") => Value::Text(&p.title),
        (Record::Paper(p), "journal") => text(&p.journal),
        (Record::Paper(p), "year") => p.year.map_or(Value::Null, |y| Value::Int(y.into())),
        (Record::Paper(p), "keywords") => Value::Array(&p.keywords),
        (Record::Paper(p), "created_at") => Value::Time(p.created_at),
        (Record::Genome(g), "cid") => Value::Text(&g.cid),
        (Record::Genome(g), "organism") => Value::Text(&g.organism),
        (Record::Genome(g), "assembly_version") => text(&g.assembly_version),
        (Record::Genome(g), "notes") => text(&g.notes),
        (Record::Genome(g), "created_at") => Value::Time(g.created_at),
        (Record::Spectrum(s), "cid") => Value::Text(&s.cid),
        (Record::Spectrum(s), "compound") => Value::Text(&s.compound),
        (Record::Spectrum(s), "technique_nmr_ir_ms") => text(&s.technique),
        (Record::Spectrum(s), "created_at") => Value::Time(s.created_at),
        _ => Value::Null,
    }
}

fn ilike(value: Value<'_>, needle: &str) -> bool {
    match value {
        Value::Text(text) => text.to_lowercase().contains(&needle.to_lowercase()),
        _ => false,
    }
}

fn matches(record: &Record, kind: RecordKind, query: &RecordQuery) -> bool {
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let hit = kind
            .search_columns()
            .iter()
            .any(|c| ilike(column(record, c), search));
        if !hit {
            return false;
        }
    }
    query.filters.iter().all(|(filter, value)| match filter {
        Filter::Ilike(c) => ilike(column(record, c), value),
        Filter::IntEq(c) => match value.parse::<i64>() {
            Ok(n) => column(record, c) == Value::Int(n),
            Err(_) => true,
        },
        Filter::ArrayContains(c) => match column(record, c) {
            Value::Array(items) => items.iter().any(|i| i == value),
            _ => false,
        },
    })
}

fn compare(a: &Record, b: &Record, sort: &str, order: SortOrder) -> Ordering {
    let ordering = column(a, sort)
        .partial_cmp(&column(b, sort))
        .unwrap_or(Ordering::Equal);
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

#[async_trait::async_trait]
impl MetadataStore for MemoryStore {
    async fn insert_file_mapping(&self, filename: &str, cid: &str) -> Result<()> {
        self.check_writable()?;
        self.tables.write().await.push_mapping(filename, cid);
        Ok(())
    }

    async fn insert_typed_record(
        &self,
        cid: &str,
        record: &NewRecord,
        filename: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let kind = record.kind();
        if tables
            .records
            .iter()
            .any(|r| kind_of(r) == kind && cid_of(r) == cid)
        {
            return Err(StoreError::Unavailable(format!(
                "duplicate key: {} `{}` already exists",
                kind.table(),
                cid
            )));
        }
        tables.records.push(record.clone().into_record(cid, Utc::now()));
        tables.push_mapping(filename, cid);
        Ok(())
    }

    async fn list_file_mappings(&self, filename: Option<&str>) -> Result<Vec<FileMapping>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<FileMapping> = tables
            .mappings
            .iter()
            .filter(|m| filename.is_none_or(|f| m.filename == f))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.uploaded_at, b.id).cmp(&(a.uploaded_at, a.id)));
        Ok(rows)
    }

    async fn query_records(&self, kind: RecordKind, query: &RecordQuery) -> Result<Page> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .rows(kind)
            .into_iter()
            .filter(|r| matches(r, kind, query))
            .collect();
        rows.sort_by(|a, b| compare(a, b, query.sort, query.order));

        let total = rows.len() as i64;
        let data = rows
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok(Page { data, total })
    }

    async fn get_record(&self, kind: RecordKind, cid: &str) -> Result<Record> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .rows(kind)
            .into_iter()
            .filter(|r| cid_of(r) == cid)
            .collect();
        rows.sort_by(|a, b| compare(a, b, kind.default_sort(), SortOrder::Desc));
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("{} `{}`", kind.table(), cid)))
    }
}
