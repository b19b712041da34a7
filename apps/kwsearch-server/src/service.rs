//! Search service: owns the open index and answers the three operations.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use kwsearch_core::config::Settings;
use kwsearch_core::stream::{into_chunks, ResultChunks};
use kwsearch_core::traits::{IndexBuilder, SearchEngine};
use kwsearch_core::types::{RecreateIndexResponse, SearchRequest, SearchResult};
use kwsearch_text::TantivySearchEngine;

pub struct SearchService {
	settings: Settings,
	builder: Arc<dyn IndexBuilder>,
	/// `None` while the index is being rebuilt or after a failed rebuild.
	engine: RwLock<Option<Arc<dyn SearchEngine>>>,
	rebuild: Mutex<()>,
}

impl SearchService {
	/// Opens the index under the collection directory, building it first
	/// when it does not exist yet.
	pub fn start(settings: Settings, builder: Arc<dyn IndexBuilder>) -> Result<Self> {
		settings.validate()?;
		let index_path = settings.index_path();
		if !index_path.join("meta.json").is_file() {
			info!("No index at {}, building from {}", index_path.display(), settings.croissant_path().display());
			if index_path.exists() {
				std::fs::remove_dir_all(&index_path).with_context(|| format!("removing {}", index_path.display()))?;
			}
			let count = builder.build(&index_path, &settings.croissant_path()).context("Index creation failed")?;
			info!("Built index with {} documents", count);
		}
		let engine: Arc<dyn SearchEngine> = Arc::new(TantivySearchEngine::open(&index_path)?);
		Ok(Self {
			settings,
			builder,
			engine: RwLock::new(Some(engine)),
			rebuild: Mutex::new(()),
		})
	}

	pub fn settings(&self) -> &Settings { &self.settings }

	pub fn is_ready(&self) -> bool { self.current().is_some() }

	fn current(&self) -> Option<Arc<dyn SearchEngine>> {
		self.engine.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	fn replace(&self, engine: Option<Arc<dyn SearchEngine>>) {
		*self.engine.write().unwrap_or_else(PoisonError::into_inner) = engine;
	}

	pub fn evaluate(&self, request: &SearchRequest) -> SearchResult {
		let Some(engine) = self.current() else {
			warn!("No index loaded, returning an empty result for '{}'", request.query);
			return SearchResult::empty();
		};
		engine.search(request, self.settings.min_score, self.settings.max_results)
	}

	/// Runs the same search as [`Self::evaluate`] and cuts the finished
	/// result into chunks of the configured size.
	pub fn evaluate_stream(&self, request: &SearchRequest) -> ResultChunks {
		let result = self.evaluate(request);
		info!("Streaming {} results in chunks of {}", result.len(), self.settings.chunk_size);
		into_chunks(result, self.settings.chunk_size)
	}

	/// Drops the current index, rebuilds it from the croissant directory and
	/// reopens it. Concurrent rebuilds run one after the other.
	pub fn recreate_index(&self) -> RecreateIndexResponse {
		let _guard = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
		match self.rebuild_index() {
			Ok(count) => {
				info!("Index recreated with {} documents", count);
				RecreateIndexResponse::ok("Index successfully recreated")
			}
			Err(e) => {
				error!("Failed to recreate index: {:#}", e);
				RecreateIndexResponse::failed(format!("Failed to recreate index: {e:#}"))
			}
		}
	}

	fn rebuild_index(&self) -> Result<usize> {
		// Searches already running keep their own handle until they finish.
		self.replace(None);
		let index_path = self.settings.index_path();
		if index_path.exists() {
			std::fs::remove_dir_all(&index_path).with_context(|| format!("removing {}", index_path.display()))?;
		}
		let count = self.builder.build(&index_path, &self.settings.croissant_path())?;
		let engine: Arc<dyn SearchEngine> = Arc::new(TantivySearchEngine::open(&index_path)?);
		self.replace(Some(engine));
		Ok(count)
	}
}
