use std::path::Path;

use crate::types::{DatasetDocument, SearchRequest, SearchResult};

/// Builds an on-disk index from raw dataset descriptions.
///
/// `index_dir` is created by the builder; callers remove any previous
/// contents beforehand. Returns the number of indexed documents.
pub trait IndexBuilder: Send + Sync {
    fn build(&self, index_dir: &Path, data_dir: &Path) -> anyhow::Result<usize>;
}

/// Writes already-extracted documents into an index.
pub trait TextIndexer: Send + Sync {
    fn index(&self, docs: &[DatasetDocument]) -> anyhow::Result<usize>;
}

/// A read-only engine answering ranked queries.
///
/// Implementations never fail a search: syntax and I/O errors are logged
/// and turned into [`SearchResult::empty`].
pub trait SearchEngine: Send + Sync {
    fn search(&self, request: &SearchRequest, min_score: f32, max_results: usize) -> SearchResult;
}
