//! Extraction of typed values from `pdptool`'s free-text output.
//!
//! The tool mixes log lines with the values we need, so every parser here
//! looks for a documented marker and ignores everything around it.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Line prefix carrying the create transaction location.
pub const LOCATION_MARKER: &str = "Location:";
/// Path segment preceding the transaction hash in the location line.
pub const CREATED_PATH_SEGMENT: &str = "/pdp/proof-sets/created/";

static CREATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)proofset created: true").unwrap());
static PROOF_SET_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)proofset id: ([^\n]*)").unwrap());

/// A root reported by `upload-file`: the content identifier, plus the
/// sub-root list the tool may append after a colon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedRoot {
    cid: String,
    subroots: Option<String>,
}

impl UploadedRoot {
    pub fn new(cid: impl Into<String>, subroots: Option<String>) -> Self {
        Self {
            cid: cid.into(),
            subroots,
        }
    }

    /// The content identifier, without any sub-root suffix.
    pub fn cid(&self) -> &str {
        &self.cid
    }

    pub fn subroots(&self) -> Option<&str> {
        self.subroots.as_deref()
    }
}

/// Renders the `--root` argument form, `cid[:subroots]`.
impl fmt::Display for UploadedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subroots {
            Some(subroots) => write!(f, "{}:{}", self.cid, subroots),
            None => f.write_str(&self.cid),
        }
    }
}

/// Result of inspecting `get-proof-set-create-status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateStatus {
    Pending,
    /// Creation confirmed; the id is `None` when the marker was missing or empty.
    Created(Option<String>),
}

/// Takes the last non-empty line; the identifier is everything before the first colon.
pub fn parse_root_cid(output: &[u8]) -> Option<UploadedRoot> {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;

    let (cid, subroots) = match line.split_once(':') {
        Some((cid, rest)) => {
            let rest = rest.trim();
            (cid.trim(), (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (line, None),
    };
    if cid.is_empty() {
        return None;
    }
    Some(UploadedRoot::new(cid, subroots))
}

pub fn parse_tx_hash(output: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(output);
    let hash = text
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(LOCATION_MARKER))
        .find_map(|line| {
            line.find(CREATED_PATH_SEGMENT)
                .map(|idx| line[idx + CREATED_PATH_SEGMENT.len()..].trim().to_string())
        })?;
    (!hash.is_empty()).then_some(hash)
}

pub fn parse_proof_set_id(output: &[u8]) -> CreateStatus {
    let text = String::from_utf8_lossy(output);
    if !CREATED_RE.is_match(&text) {
        return CreateStatus::Pending;
    }
    let id = PROOF_SET_ID_RE
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty());
    CreateStatus::Created(id)
}
