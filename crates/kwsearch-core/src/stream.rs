//! Splits a finished [`SearchResult`] into ordered, bounded chunks.
//!
//! The whole result is materialized before the first chunk is produced.
//! A result without hits yields no chunks at all.

use crate::types::{Highlights, ResponseChunk, SearchResult};

/// Iterator over the chunks of one result, in hit order.
#[derive(Debug)]
pub struct ResultChunks {
    result: SearchResult,
    chunk_size: usize,
    next_start: usize,
}

impl ResultChunks {
    /// `chunk_size` of zero is treated as one.
    pub fn new(result: SearchResult, chunk_size: usize) -> Self {
        Self { result, chunk_size: chunk_size.max(1), next_start: 0 }
    }

    /// Number of chunks the result splits into: `ceil(hits / chunk_size)`.
    pub fn chunk_count(&self) -> usize {
        self.result.len().div_ceil(self.chunk_size)
    }
}

impl Iterator for ResultChunks {
    type Item = ResponseChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.result.len();
        if self.next_start >= total {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.chunk_size).min(total);
        self.next_start = end;

        let doc_ids = self.result.doc_ids[start..end].to_vec();
        let scores = self.result.scores[start..end].to_vec();
        let mut highlights = Highlights::new();
        for id in &doc_ids {
            if let Some(fields) = self.result.highlights.remove(id) {
                highlights.insert(*id, fields);
            }
        }
        Some(ResponseChunk { doc_ids, scores, highlights, is_last_chunk: end == total })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.result.len().saturating_sub(self.next_start).div_ceil(self.chunk_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ResultChunks {}

/// Convenience wrapper around [`ResultChunks::new`].
pub fn into_chunks(result: SearchResult, chunk_size: usize) -> ResultChunks {
    ResultChunks::new(result, chunk_size)
}

/// Reassembles chunks into the result they were cut from (without `total_hits`).
pub fn concat_chunks<I: IntoIterator<Item = ResponseChunk>>(chunks: I) -> SearchResult {
    let mut result = SearchResult::empty();
    for chunk in chunks {
        result.doc_ids.extend(chunk.doc_ids);
        result.scores.extend(chunk.scores);
        result.highlights.extend(chunk.highlights);
    }
    result
}
