//! Query-term highlighting over stored field text.
//!
//! Text is cut into fragments of roughly [`FRAGMENT_SIZE`] bytes on token
//! boundaries. A fragment scores one point per distinct query term it
//! contains. Non-scoring fragments are dropped, neighbouring scoring
//! fragments are merged, and the survivors are joined best first. Phrase
//! tokens are marked only where the whole phrase occurs.

use thiserror::Error;
use tantivy::tokenizer::{TextAnalyzer, TokenStream};

use kwsearch_core::types::FieldHighlights;

use crate::compile::QueryTerms;
use crate::tantivy_utils::build_analyzer;

pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";
pub const FRAGMENT_SEPARATOR: &str = " ... ";
pub const FRAGMENT_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HighlightError {
	#[error("token offsets {from}..{to} do not fit field text of {len} bytes")]
	InvalidOffsets { from: usize, to: usize, len: usize },
}

#[derive(Debug)]
struct Token {
	from: usize,
	to: usize,
	text: String,
	term: Option<String>,
}

#[derive(Debug)]
struct Fragment {
	start: usize,
	end: usize,
	/// Index range into the token list.
	tokens: std::ops::Range<usize>,
	score: usize,
}

pub struct Highlighter {
	analyzer: TextAnalyzer,
	terms: QueryTerms,
	fragment_size: usize,
}

impl Highlighter {
	pub fn new(terms: QueryTerms) -> Self {
		Self::with_analyzer(terms, build_analyzer(), FRAGMENT_SIZE)
	}

	pub(crate) fn with_analyzer(terms: QueryTerms, analyzer: TextAnalyzer, fragment_size: usize) -> Self {
		Self { analyzer, terms, fragment_size: fragment_size.max(1) }
	}

	/// Highlights every non-empty field. A field that fails is skipped and
	/// logged; the others are still returned.
	pub fn highlight_fields<'a, I>(&self, fields: I) -> FieldHighlights
	where
		I: IntoIterator<Item = (&'a str, &'a str)>,
	{
		let mut highlights = FieldHighlights::new();
		for (name, text) in fields {
			if text.is_empty() {
				continue;
			}
			match self.highlight(text) {
				Ok(marked) if !marked.is_empty() => { highlights.insert(name.to_string(), marked); }
				Ok(_) => {}
				Err(e) => tracing::warn!("Failed to highlight field {}: {}", name, e),
			}
		}
		highlights
	}

	/// Returns an empty string when no query term occurs in `text`.
	pub fn highlight(&self, text: &str) -> Result<String, HighlightError> {
		if self.terms.is_empty() {
			return Ok(String::new());
		}
		let tokens = self.tokens(text)?;
		if tokens.iter().all(|t| t.term.is_none()) {
			return Ok(String::new());
		}
		let mut fragments = merge_contiguous(&tokens, self.fragments(text, &tokens));
		fragments.sort_by(|a, b| b.score.cmp(&a.score).then(a.start.cmp(&b.start)));
		let rendered: Vec<String> = fragments.iter().map(|f| render(text, &tokens, f)).collect();
		Ok(rendered.join(FRAGMENT_SEPARATOR))
	}

	fn tokens(&self, text: &str) -> Result<Vec<Token>, HighlightError> {
		let mut analyzer = self.analyzer.clone();
		let mut stream = analyzer.token_stream(text);
		let mut tokens = Vec::new();
		while stream.advance() {
			let token = stream.token();
			let (from, to) = (token.offset_from, token.offset_to);
			if from > to || to > text.len() || !text.is_char_boundary(from) || !text.is_char_boundary(to) {
				return Err(HighlightError::InvalidOffsets { from, to, len: text.len() });
			}
			tokens.push(Token { from, to, text: token.text.clone(), term: self.terms.matching(&token.text) });
		}
		self.mark_phrases(&mut tokens);
		Ok(tokens)
	}

	fn mark_phrases(&self, tokens: &mut [Token]) {
		for phrase in &self.terms.phrases {
			if phrase.is_empty() || phrase.len() > tokens.len() {
				continue;
			}
			for start in 0..=tokens.len() - phrase.len() {
				let window = &mut tokens[start..start + phrase.len()];
				if window.iter().zip(phrase).all(|(token, word)| &token.text == word) {
					for token in window {
						token.term = Some(token.text.clone());
					}
				}
			}
		}
	}

	/// Contiguous fragments covering the whole text.
	fn fragments(&self, text: &str, tokens: &[Token]) -> Vec<Fragment> {
		let mut fragments = Vec::new();
		let mut current = Fragment { start: 0, end: text.len(), tokens: 0..0, score: 0 };
		for (i, token) in tokens.iter().enumerate() {
			if token.to > current.start + self.fragment_size && current.tokens.start < i {
				current.end = token.from;
				current.tokens.end = i;
				let next = Fragment { start: token.from, end: text.len(), tokens: i..i, score: 0 };
				fragments.push(std::mem::replace(&mut current, next));
			}
		}
		current.tokens.end = tokens.len();
		fragments.push(current);
		for fragment in &mut fragments {
			fragment.score = distinct_terms(tokens, fragment.tokens.clone());
		}
		fragments
	}
}

fn distinct_terms(tokens: &[Token], range: std::ops::Range<usize>) -> usize {
	let mut distinct: Vec<&str> = tokens[range].iter().filter_map(|t| t.term.as_deref()).collect();
	distinct.sort_unstable();
	distinct.dedup();
	distinct.len()
}

/// Drops non-scoring fragments and joins neighbours; a merged fragment is
/// rescored over its whole span.
fn merge_contiguous(tokens: &[Token], fragments: Vec<Fragment>) -> Vec<Fragment> {
	let mut merged: Vec<Fragment> = Vec::new();
	for fragment in fragments.into_iter().filter(|f| f.score > 0) {
		match merged.last_mut() {
			Some(last) if last.end == fragment.start => {
				last.end = fragment.end;
				last.tokens.end = fragment.tokens.end;
				last.score = distinct_terms(tokens, last.tokens.clone());
			}
			_ => merged.push(fragment),
		}
	}
	merged
}

fn render(text: &str, tokens: &[Token], fragment: &Fragment) -> String {
	let mut out = String::with_capacity(fragment.end - fragment.start + 32);
	let mut cursor = fragment.start;
	for token in &tokens[fragment.tokens.clone()] {
		if token.term.is_none() {
			continue;
		}
		out.push_str(&text[cursor..token.from]);
		out.push_str(MARK_OPEN);
		out.push_str(&text[token.from..token.to]);
		out.push_str(MARK_CLOSE);
		cursor = token.to;
	}
	out.push_str(&text[cursor..fragment.end]);
	out.trim().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::compile::WildcardPattern;

	fn terms(exact: &[&str], wildcards: &[&str]) -> QueryTerms {
		QueryTerms {
			exact: exact.iter().map(|s| s.to_string()).collect(),
			wildcards: wildcards.iter().map(|s| WildcardPattern::new(s)).collect(),
			phrases: Default::default(),
		}
	}

	#[test]
	fn marks_every_occurrence_in_a_short_field() {
		let highlighter = Highlighter::new(terms(&["machine", "learning"], &[]));
		let out = highlighter.highlight("Machine Learning for machine translation").expect("highlight");
		assert_eq!(out, "<mark>Machine</mark> <mark>Learning</mark> for <mark>machine</mark> translation");
	}

	#[test]
	fn no_match_gives_empty_string() {
		let highlighter = Highlighter::new(terms(&["weather"], &[]));
		assert_eq!(highlighter.highlight("Stock prices").expect("highlight"), "");
	}

	#[test]
	fn wildcard_terms_are_marked() {
		let highlighter = Highlighter::new(terms(&[], &["*vision"]));
		let out = highlighter.highlight("Computer vision and supervision").expect("highlight");
		assert_eq!(out, "Computer <mark>vision</mark> and <mark>supervision</mark>");
	}

	#[test]
	fn distant_matches_become_separate_fragments_best_first() {
		let highlighter = Highlighter::with_analyzer(terms(&["alpha", "beta"], &[]), build_analyzer(), 20);
		let text = "alpha one two three four five six seven eight nine alpha beta end";
		let out = highlighter.highlight(text).expect("highlight");
		let parts: Vec<&str> = out.split(FRAGMENT_SEPARATOR).collect();
		assert_eq!(parts.len(), 2, "got {out}");
		assert!(parts[0].contains("<mark>alpha</mark> <mark>beta</mark>"));
		assert!(parts[1].starts_with("<mark>alpha</mark> one"));
	}

	#[test]
	fn non_matching_and_empty_fields_are_left_out() {
		let highlighter = Highlighter::new(terms(&["kaggle"], &[]));
		let out = highlighter.highlight_fields([("name", "Kaggle survey"), ("description", ""), ("keywords", "csv")]);
		assert_eq!(out.len(), 1);
		assert_eq!(out["name"], "<mark>Kaggle</mark> survey");
	}

	#[test]
	fn phrase_tokens_are_marked_only_in_sequence() {
		let mut phrase = terms(&[], &[]);
		phrase.phrases.insert(vec!["machine".to_string(), "learning".to_string()]);
		let highlighter = Highlighter::new(phrase);
		let out = highlighter.highlight("A machine shop and machine learning").expect("highlight");
		assert_eq!(out, "A machine shop and <mark>machine</mark> <mark>learning</mark>");
		assert_eq!(highlighter.highlight("learning machine").expect("highlight"), "");
	}

	/// Emits one token spanning the whole text, overrunning it when the text
	/// mentions "broken".
	#[derive(Clone)]
	struct WholeTextTokenizer;

	struct WholeTextStream {
		token: tantivy::tokenizer::Token,
		emitted: bool,
	}

	impl TokenStream for WholeTextStream {
		fn advance(&mut self) -> bool {
			if self.emitted {
				return false;
			}
			self.emitted = true;
			true
		}

		fn token(&self) -> &tantivy::tokenizer::Token { &self.token }

		fn token_mut(&mut self) -> &mut tantivy::tokenizer::Token { &mut self.token }
	}

	impl tantivy::tokenizer::Tokenizer for WholeTextTokenizer {
		type TokenStream<'a> = WholeTextStream;

		fn token_stream<'a>(&'a mut self, text: &'a str) -> WholeTextStream {
			let overrun = usize::from(text.contains("broken"));
			let token = tantivy::tokenizer::Token {
				offset_from: 0,
				offset_to: text.len() + overrun,
				text: text.to_lowercase(),
				..Default::default()
			};
			WholeTextStream { token, emitted: false }
		}
	}

	#[test]
	fn field_with_bad_offsets_is_skipped_others_kept() {
		let highlighter = Highlighter::with_analyzer(terms(&["kaggle"], &[]), TextAnalyzer::from(WholeTextTokenizer), FRAGMENT_SIZE);
		assert_eq!(
			highlighter.highlight("broken kaggle"),
			Err(HighlightError::InvalidOffsets { from: 0, to: 14, len: 13 })
		);
		let out = highlighter.highlight_fields([("name", "Kaggle"), ("description", "broken kaggle")]);
		assert_eq!(out.len(), 1);
		assert_eq!(out["name"], "<mark>Kaggle</mark>");
	}
}
