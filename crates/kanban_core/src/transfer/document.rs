//! Versioned export document format.
//!
//! # Invariants
//! - The header is decoded and checked before any entity is read, so a
//!   document from another major version never reaches the store.
//! - Collections are sorted by id and history keeps insertion order; two
//!   exports of the same state differ only in `exported_at`.

use crate::error::{KanbanError, KanbanResult};
use crate::model::board::{Board, Column};
use crate::model::comment::Comment;
use crate::model::entity::Tombstone;
use crate::model::history::HistoryEntry;
use crate::model::review::WeeklyReview;
use crate::model::story::Story;
use crate::model::task::{RehomeLink, Task};
use crate::store::allocator::SequenceCounter;
use serde::{Deserialize, Serialize};

/// `MAJOR.MINOR` schema version written by this build.
pub const SUPPORTED_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub schema_version: String,
    pub exported_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub header: DocumentHeader,
    #[serde(default)]
    pub boards: Vec<Board>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub stories: Vec<Story>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub tombstones: Vec<Tombstone>,
    #[serde(default)]
    pub rehome_links: Vec<RehomeLink>,
    #[serde(default)]
    pub sequences: Vec<SequenceCounter>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Absent in documents from builds without stored reviews.
    #[serde(default)]
    pub weekly_reviews: Vec<WeeklyReview>,
}

#[derive(Deserialize)]
struct HeaderOnly {
    header: DocumentHeader,
}

impl ExportDocument {
    /// Pretty-printed JSON bytes.
    pub fn to_bytes(&self) -> KanbanResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|err| KanbanError::InvalidDocument(format!("cannot encode document: {err}")))
    }

    /// Decodes a document, rejecting other major versions before the
    /// entity collections are parsed.
    pub fn from_bytes(bytes: &[u8]) -> KanbanResult<Self> {
        let header: HeaderOnly = serde_json::from_slice(bytes)
            .map_err(|err| KanbanError::InvalidDocument(format!("unreadable header: {err}")))?;
        check_schema_version(&header.header.schema_version)?;
        serde_json::from_slice(bytes)
            .map_err(|err| KanbanError::InvalidDocument(format!("unreadable document: {err}")))
    }
}

/// Accepts any version sharing the supported major component.
pub fn check_schema_version(found: &str) -> KanbanResult<()> {
    let (found_major, _) = parse_version(found).ok_or_else(|| {
        KanbanError::InvalidDocument(format!("schema version `{found}` is not MAJOR.MINOR"))
    })?;
    let (supported_major, _) = parse_version(SUPPORTED_SCHEMA_VERSION).ok_or_else(|| {
        KanbanError::InvalidDocument("supported schema version is malformed".to_string())
    })?;
    if found_major != supported_major {
        return Err(KanbanError::SchemaVersionMismatch {
            found: found.to_string(),
            supported: SUPPORTED_SCHEMA_VERSION.to_string(),
        });
    }
    Ok(())
}

fn parse_version(value: &str) -> Option<(u32, u32)> {
    let (major, minor) = value.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
