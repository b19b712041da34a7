use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
use tantivy::Index;

/// Name of the analyzer used for every searchable field.
pub const TOKENIZER_NAME: &str = "kwsearch_text";

/// Stored numeric field holding the external document id.
pub const ID_FIELD: &str = "id";

/// Searchable fields and their boost weights.
pub const SEARCH_FIELDS: [(&str, f32); 6] = [
	("name", 5.0),
	("description", 2.0),
	("keywords", 4.0),
	("creator_name", 1.6),
	("publisher_name", 1.6),
	("alternateName", 3.0),
];

/// Boost applied on top of the per-field weights.
pub const QUERY_BOOST: f32 = 5.0;

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_i64_field(ID_FIELD, INDEXED | STORED | FAST);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	for (name, _) in SEARCH_FIELDS {
		schema_builder.add_text_field(name, text_options.clone());
	}
	schema_builder.build()
}

/// Simple tokenization plus lowercasing. Stop words are kept so that queries
/// such as "the office" still match on every term.
pub fn build_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.build()
}

pub fn register_tokenizer(index: &Index) {
	index.tokenizers().register(TOKENIZER_NAME, build_analyzer());
}
