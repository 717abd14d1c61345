use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One filename ↔ CID row. Appended after every successful bind.
#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
pub struct FileMapping {
    pub id: i32,
    pub filename: String,
    pub cid: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
pub struct Paper {
    pub cid: String,
    pub title: String,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
pub struct Genome {
    pub cid: String,
    pub organism: String,
    pub assembly_version: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
pub struct Spectrum {
    pub cid: String,
    pub compound: String,
    #[sqlx(rename = "technique_nmr_ir_ms")]
    pub technique: Option<String>,
    #[sqlx(rename = "metadata_json")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A stored row of any kind, serialized as the row itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Record {
    FileMapping(FileMapping),
    Paper(Paper),
    Genome(Genome),
    Spectrum(Spectrum),
}

/// Domain metadata submitted with a typed upload; the CID is filled in once
/// the content is bound.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum NewRecord {
    Paper(NewPaper),
    Genome(NewGenome),
    Spectrum(NewSpectrum),
}

impl NewRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            NewRecord::Paper(_) => RecordKind::Paper,
            NewRecord::Genome(_) => RecordKind::Genome,
            NewRecord::Spectrum(_) => RecordKind::Spectrum,
        }
    }

    /// Materializes the stored row for `cid` as the store would return it.
    pub fn into_record(self, cid: &str, created_at: DateTime<Utc>) -> Record {
        let cid = cid.to_string();
        match self {
            NewRecord::Paper(p) => Record::Paper(Paper {
                cid,
                title: p.title,
                journal: p.journal,
                year: p.year,
                keywords: p.keywords,
                created_at,
            }),
            NewRecord::Genome(g) => Record::Genome(Genome {
                cid,
                organism: g.organism,
                assembly_version: g.assembly_version,
                notes: g.notes,
                created_at,
            }),
            NewRecord::Spectrum(s) => Record::Spectrum(Spectrum {
                cid,
                compound: s.compound,
                technique: s.technique,
                metadata: s.metadata,
                created_at,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewPaper {
    pub title: String,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewGenome {
    pub organism: String,
    pub assembly_version: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewSpectrum {
    pub compound: String,
    pub technique: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// The queryable tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Paper,
    Genome,
    Spectrum,
    FileCids,
}

impl RecordKind {
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Paper => "paper",
            RecordKind::Genome => "genome",
            RecordKind::Spectrum => "spectrum",
            RecordKind::FileCids => "file_cids",
        }
    }

    pub fn columns(&self) -> &'static str {
        match self {
            RecordKind::Paper => "cid, title, journal, year, keywords, created_at",
            RecordKind::Genome => "cid, organism, assembly_version, notes, created_at",
            RecordKind::Spectrum => "cid, compound, technique_nmr_ir_ms, metadata_json, created_at",
            RecordKind::FileCids => "id, filename, cid, uploaded_at",
        }
    }

    pub fn default_sort(&self) -> &'static str {
        match self {
            RecordKind::FileCids => "uploaded_at",
            _ => "created_at",
        }
    }

    /// Columns a client may sort by; anything else falls back to [`Self::default_sort`].
    pub fn sort_columns(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Paper => &["created_at", "title", "journal", "year", "cid"],
            RecordKind::Genome => &["created_at", "organism", "assembly_version", "cid"],
            RecordKind::Spectrum => &["created_at", "compound", "technique_nmr_ir_ms", "cid"],
            RecordKind::FileCids => &["uploaded_at", "filename", "cid", "id"],
        }
    }

    /// Columns matched by the free-text `search` parameter.
    pub fn search_columns(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Paper => &["title", "journal"],
            RecordKind::Genome => &["organism", "notes"],
            RecordKind::Spectrum => &["compound"],
            RecordKind::FileCids => &["filename"],
        }
    }

    /// Per-kind query parameters and the predicate each one applies.
    pub fn filters(&self) -> &'static [(&'static str, Filter)] {
        match self {
            RecordKind::Paper => &[
                ("year", Filter::IntEq("year")),
                ("journal", Filter::Ilike("journal")),
                ("keyword", Filter::ArrayContains("keywords")),
            ],
            RecordKind::Genome => &[
                ("organism", Filter::Ilike("organism")),
                ("assembly", Filter::Ilike("assembly_version")),
            ],
            RecordKind::Spectrum => &[
                ("compound", Filter::Ilike("compound")),
                ("technique", Filter::Ilike("technique_nmr_ir_ms")),
            ],
            RecordKind::FileCids => &[],
        }
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paper" => Ok(RecordKind::Paper),
            "genome" => Ok(RecordKind::Genome),
            "spectrum" => Ok(RecordKind::Spectrum),
            "file_cids" => Ok(RecordKind::FileCids),
            other => Err(format!(
                "Invalid data type `{other}`. Valid types: paper, genome, spectrum, file_cids"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Case-insensitive substring match.
    Ilike(&'static str),
    /// Exact integer match; non-numeric values are ignored.
    IntEq(&'static str),
    /// Value is one element of an array column.
    ArrayContains(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    /// Anything but an exact `ASC` sorts descending.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("ASC") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub limit: i64,
    pub offset: i64,
    /// Already validated against [`RecordKind::sort_columns`].
    pub sort: &'static str,
    pub order: SortOrder,
    pub search: Option<String>,
    /// Filters with the client-supplied value for each.
    pub filters: Vec<(Filter, String)>,
}

impl RecordQuery {
    pub const DEFAULT_LIMIT: i64 = 20;

    pub fn new(kind: RecordKind) -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
            sort: kind.default_sort(),
            order: SortOrder::Desc,
            search: None,
            filters: Vec::new(),
        }
    }

    /// Keeps `sort` only when `kind` allows it.
    pub fn sort_by(mut self, kind: RecordKind, sort: Option<&str>) -> Self {
        self.sort = sort
            .and_then(|s| kind.sort_columns().iter().copied().find(|c| *c == s))
            .unwrap_or(kind.default_sort());
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page {
    pub data: Vec<Record>,
    pub total: i64,
}
