//! Domain types shared by the search engine, the streaming emitter and the
//! service front.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// External document identifier, stored next to the searchable text.
pub type DocId = i64;

/// Field name -> highlighted snippet for one document.
pub type FieldHighlights = HashMap<String, String>;

/// Document id -> per-field highlights.
pub type Highlights = HashMap<DocId, FieldHighlights>;

/// A dataset description as it is fed to the index builder.
///
/// Absent fields are empty strings; the builder skips them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDocument {
    pub id: DocId,
    pub name: String,
    pub description: String,
    pub keywords: String,
    pub creator_name: String,
    pub publisher_name: String,
    #[serde(rename = "alternateName")]
    pub alternate_name: String,
}

/// Caller-supplied restriction on which documents may be returned.
///
/// An empty set places no restriction on the result.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: HashSet<DocId>,
}

impl AllowList {
    pub fn new<I: IntoIterator<Item = DocId>>(ids: I) -> Self {
        Self { ids: ids.into_iter().collect() }
    }

    pub fn unrestricted() -> Self { Self::default() }

    pub fn is_active(&self) -> bool { !self.ids.is_empty() }

    /// Whether `id` may appear in results.
    pub fn admits(&self, id: DocId) -> bool {
        !self.is_active() || self.ids.contains(&id)
    }

    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }
}

/// One ranked hit. Higher scores are better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredHit {
    pub doc_id: DocId,
    pub score: f32,
}

/// A search call as it arrives over the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub doc_ids: Vec<DocId>,
    #[serde(default)]
    pub enable_highlighting: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }

    pub fn with_doc_ids<I: IntoIterator<Item = DocId>>(mut self, ids: I) -> Self {
        self.doc_ids = ids.into_iter().collect();
        self
    }

    pub fn with_highlighting(mut self, enabled: bool) -> Self {
        self.enable_highlighting = enabled;
        self
    }

    pub fn allow_list(&self) -> AllowList { AllowList::new(self.doc_ids.iter().copied()) }
}

/// The fully ranked answer to one query.
///
/// `doc_ids` and `scores` are index-aligned and ordered by non-increasing
/// score. `total_hits` counts every document that passed the allow-list and
/// scored, before truncation and before the minimum-score cutoff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub doc_ids: Vec<DocId>,
    pub scores: Vec<f32>,
    pub highlights: Highlights,
    #[serde(default)]
    pub total_hits: usize,
}

impl SearchResult {
    pub fn empty() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.doc_ids.len() }

    pub fn is_empty(&self) -> bool { self.doc_ids.is_empty() }

    /// Appends a hit, keeping the id and score lists aligned.
    pub fn push(&mut self, hit: ScoredHit, highlights: Option<FieldHighlights>) {
        self.doc_ids.push(hit.doc_id);
        self.scores.push(hit.score);
        if let Some(fields) = highlights.filter(|f| !f.is_empty()) {
            self.highlights.insert(hit.doc_id, fields);
        }
    }
}

/// One bounded slice of a [`SearchResult`] sent on the streaming endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseChunk {
    pub doc_ids: Vec<DocId>,
    pub scores: Vec<f32>,
    pub highlights: Highlights,
    pub is_last_chunk: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecreateIndexResponse {
    pub success: bool,
    pub message: String,
}

impl RecreateIndexResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}
