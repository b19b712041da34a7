use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tantivy::schema::Field;
use tantivy::{Index, TantivyDocument};

use kwsearch_core::traits::{IndexBuilder, TextIndexer};
use kwsearch_core::types::{DatasetDocument, DocId};

use crate::tantivy_utils::{build_schema, register_tokenizer, ID_FIELD, SEARCH_FIELDS};

const WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// Creates a fresh index directory and writes dataset documents into it.
///
/// Every call to [`TextIndexer::index`] commits once on a single indexing
/// thread, so each non-empty call adds one segment.
pub struct TantivyIndexer {
	index: Index,
	id_field: Field,
	text_fields: Vec<Field>,
}

impl TantivyIndexer {
	pub fn new(index_dir: PathBuf) -> Result<Self, anyhow::Error> {
		let schema = build_schema();
		if index_dir.exists() { std::fs::remove_dir_all(&index_dir)?; }
		std::fs::create_dir_all(&index_dir)?;
		let index = Index::create_in_dir(&index_dir, schema.clone())?;
		register_tokenizer(&index);
		let id_field = schema.get_field(ID_FIELD)?;
		let text_fields = SEARCH_FIELDS.iter().map(|(name, _)| schema.get_field(name)).collect::<Result<Vec<_>, _>>()?;
		Ok(Self { index, id_field, text_fields })
	}

	/// Indexes every `*.json` croissant file below `data_dir`, in path order.
	pub fn index_croissant_dir(&self, data_dir: &Path) -> Result<usize, anyhow::Error> {
		if !data_dir.is_dir() {
			anyhow::bail!("croissant directory {} does not exist", data_dir.display());
		}
		let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_dir)
			.into_iter()
			.filter_map(|e| e.ok())
			.filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "json"))
			.map(|e| e.into_path())
			.collect();
		files.sort();

		let mut docs = Vec::with_capacity(files.len());
		for (record_number, path) in files.iter().enumerate() {
			match read_croissant(path, record_number as DocId) {
				Ok(doc) => docs.push(doc),
				Err(e) => tracing::warn!("Skipping {}: {:#}", path.display(), e),
			}
		}
		tracing::info!("Read {} of {} croissant files from {}", docs.len(), files.len(), data_dir.display());
		self.index(&docs)
	}

	fn to_tantivy(&self, doc: &DatasetDocument) -> TantivyDocument {
		let mut tantivy_doc = TantivyDocument::default();
		tantivy_doc.add_i64(self.id_field, doc.id);
		let values = [&doc.name, &doc.description, &doc.keywords, &doc.creator_name, &doc.publisher_name, &doc.alternate_name];
		for (field, value) in self.text_fields.iter().zip(values) {
			if !value.is_empty() { tantivy_doc.add_text(*field, value); }
		}
		tantivy_doc
	}
}

impl TextIndexer for TantivyIndexer {
	fn index(&self, docs: &[DatasetDocument]) -> anyhow::Result<usize> {
		let mut index_writer = self.index.writer_with_num_threads(1, WRITER_MEMORY_BUDGET)?;
		for doc in docs {
			index_writer.add_document(self.to_tantivy(doc))?;
		}
		index_writer.commit()?;
		Ok(docs.len())
	}
}

/// Builds the search index from a croissant directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct CroissantIndexer;

impl IndexBuilder for CroissantIndexer {
	fn build(&self, index_dir: &Path, data_dir: &Path) -> anyhow::Result<usize> {
		let indexer = TantivyIndexer::new(index_dir.to_path_buf())?;
		let count = indexer.index_croissant_dir(data_dir)?;
		tracing::info!("Indexed {} documents into {}", count, index_dir.display());
		Ok(count)
	}
}

pub fn read_croissant(path: &Path, record_number: DocId) -> Result<DatasetDocument> {
	let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
	let value: Value = serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
	Ok(parse_croissant(&value, record_number))
}

/// Extracts the searchable fields from a croissant JSON-LD document.
///
/// A top-level `jsonld` wrapper is unwrapped. The document's own `id` wins
/// over `record_number`.
pub fn parse_croissant(value: &Value, record_number: DocId) -> DatasetDocument {
	let value = value.get("jsonld").unwrap_or(value);
	let id = value.get("id").and_then(Value::as_i64).unwrap_or(record_number);
	DatasetDocument {
		id,
		name: text_of(value.get("name")),
		description: text_of(value.get("description")),
		keywords: text_of(value.get("keywords")),
		creator_name: names_of(value.get("creator")),
		publisher_name: names_of(value.get("publisher")),
		alternate_name: text_of(value.get("alternateName")),
	}
}

fn text_of(value: Option<&Value>) -> String {
	match value {
		Some(Value::String(s)) => s.trim().to_string(),
		Some(Value::Number(n)) => n.to_string(),
		Some(Value::Array(items)) => join_non_empty(items.iter().map(|v| text_of(Some(v)))),
		_ => String::new(),
	}
}

fn names_of(value: Option<&Value>) -> String {
	match value {
		Some(Value::Object(map)) => text_of(map.get("name")),
		Some(Value::Array(items)) => join_non_empty(items.iter().map(|v| names_of(Some(v)))),
		Some(Value::String(s)) => s.trim().to_string(),
		_ => String::new(),
	}
}

fn join_non_empty<I: Iterator<Item = String>>(parts: I) -> String {
	parts.filter(|p| !p.is_empty()).collect::<Vec<_>>().join(", ")
}
