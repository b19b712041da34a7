//! kwsearch-text search side.
//!
//! Opens a finished index read-only and answers ranked queries: parse,
//! compile, collect per segment, merge, threshold and highlight.
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tantivy::schema::{Field, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, Searcher, TantivyDocument};
use tracing::{error, info};

use kwsearch_core::traits::SearchEngine;
use kwsearch_core::types::{FieldHighlights, SearchRequest, SearchResult};

use crate::assemble::assemble;
use crate::collector::{FilteredTopDocs, RankedDoc};
use crate::compile::QueryCompiler;
use crate::highlight::Highlighter;
use crate::query::{parse, QueryError};
use crate::tantivy_utils::{register_tokenizer, SEARCH_FIELDS};

#[derive(Debug, Error)]
pub enum SearchError {
	#[error("query parsing error: {0}")]
	Query(#[from] QueryError),
	#[error("index error: {0}")]
	Index(#[from] tantivy::TantivyError),
}

pub struct TantivySearchEngine {
	reader: IndexReader,
	compiler: QueryCompiler,
	text_fields: Vec<(&'static str, Field)>,
}

impl TantivySearchEngine {
	/// Opens the index in `index_dir`. Segments are searched in parallel on
	/// tantivy's default executor.
	pub fn open(index_dir: &Path) -> Result<Self, anyhow::Error> {
		let mut index = Index::open_in_dir(index_dir)?;
		index.set_default_multithread_executor()?;
		register_tokenizer(&index);
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let schema = index.schema();
		let compiler = QueryCompiler::new(&schema)?;
		let text_fields = SEARCH_FIELDS
			.iter()
			.map(|&(name, _)| schema.get_field(name).map(|field| (name, field)))
			.collect::<Result<Vec<_>, _>>()?;
		let engine = Self { reader, compiler, text_fields };
		info!("Opened index {} with {} documents in {} segments", index_dir.display(), engine.num_docs(), engine.num_segments());
		Ok(engine)
	}

	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }

	pub fn num_segments(&self) -> usize { self.reader.searcher().segment_readers().len() }

	/// Like [`SearchEngine::search`] but reports failures instead of
	/// answering with an empty result.
	pub fn try_search(&self, request: &SearchRequest, min_score: f32, max_results: usize) -> Result<SearchResult, SearchError> {
		let Some(expr) = parse(&request.query)? else { return Ok(SearchResult::empty()) };
		let Some(compiled) = self.compiler.compile(&expr)? else { return Ok(SearchResult::empty()) };
		let allow = Arc::new(request.allow_list());
		info!("Input query {}. Executing query {:?}. Filter size: {}", request.query, compiled.query, allow.len());

		let searcher = self.reader.searcher();
		let merged = searcher.search(compiled.query.as_ref(), &FilteredTopDocs::new(max_results, allow))?;
		info!("Found {} hits", merged.total_hits);

		let highlighter = request.enable_highlighting.then(|| Highlighter::new(compiled.terms));
		let result = assemble(merged, min_score, |ranked| match &highlighter {
			Some(h) => self.highlight_doc(&searcher, h, ranked).map(Some),
			None => Ok(None),
		})?;
		info!("Returning {} results over min score {}", result.len(), min_score);
		Ok(result)
	}

	fn highlight_doc(&self, searcher: &Searcher, highlighter: &Highlighter, ranked: &RankedDoc) -> tantivy::Result<FieldHighlights> {
		let doc: TantivyDocument = searcher.doc(ranked.address)?;
		let texts: Vec<(&str, String)> = self
			.text_fields
			.iter()
			.map(|&(name, field)| (name, doc.get_first(field).and_then(|v| v.as_str()).unwrap_or("").to_string()))
			.collect();
		Ok(highlighter.highlight_fields(texts.iter().map(|(name, text)| (*name, text.as_str()))))
	}
}

impl SearchEngine for TantivySearchEngine {
	fn search(&self, request: &SearchRequest, min_score: f32, max_results: usize) -> SearchResult {
		if request.query.trim().is_empty() {
			return SearchResult::empty();
		}
		match self.try_search(request, min_score, max_results) {
			Ok(result) => result,
			Err(SearchError::Query(e)) => {
				error!("Query parsing error for '{}': {}", request.query, e);
				SearchResult::empty()
			}
			Err(SearchError::Index(e)) => {
				error!("Query IO error for '{}': {}", request.query, e);
				SearchResult::empty()
			}
		}
	}
}
