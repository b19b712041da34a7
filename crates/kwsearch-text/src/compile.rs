//! Compiles a [`QueryExpr`] into a boosted multi-field Tantivy query.
//!
//! Every term is searched in all boosted fields at once (a disjunction of
//! per-field clauses), terms are combined conjunctively, and the whole
//! query is boosted by [`QUERY_BOOST`].

use std::collections::BTreeSet;

use tantivy::query::{BooleanQuery, BoostQuery, EmptyQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema};
use tantivy::tokenizer::{TextAnalyzer, TokenStream};
use tantivy::Term;

use crate::query::{is_wildcard, QueryError, QueryExpr};
use crate::tantivy_utils::{build_analyzer, QUERY_BOOST, SEARCH_FIELDS};

/// A `*` / `?` glob, matched against whole analyzed tokens. A backslash
/// makes the next character literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WildcardPattern {
	pattern: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Glob {
	Any,
	One,
	Char(char),
}

impl WildcardPattern {
	pub fn new(raw: &str) -> Self {
		Self { pattern: raw.to_lowercase() }
	}

	pub fn as_str(&self) -> &str { &self.pattern }

	fn globs(&self) -> Vec<Glob> {
		let mut globs = Vec::with_capacity(self.pattern.len());
		let mut chars = self.pattern.chars();
		while let Some(c) = chars.next() {
			globs.push(match c {
				'*' => Glob::Any,
				'?' => Glob::One,
				'\\' => Glob::Char(chars.next().unwrap_or('\\')),
				other => Glob::Char(other),
			});
		}
		globs
	}

	/// Anchored regex understood by the term dictionary automaton.
	pub fn to_regex(&self) -> String {
		let mut regex = String::with_capacity(self.pattern.len() * 2);
		for glob in self.globs() {
			match glob {
				Glob::Any => regex.push_str(".*"),
				Glob::One => regex.push('.'),
				Glob::Char(c @ ('\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$')) => {
					regex.push('\\');
					regex.push(c);
				}
				Glob::Char(c) => regex.push(c),
			}
		}
		regex
	}

	pub fn matches(&self, token: &str) -> bool {
		let pattern = self.globs();
		let text: Vec<char> = token.chars().collect();
		let (mut p, mut t) = (0, 0);
		let mut backtrack: Option<(usize, usize)> = None;
		while t < text.len() {
			if p < pattern.len() && (pattern[p] == Glob::One || pattern[p] == Glob::Char(text[t])) {
				p += 1;
				t += 1;
			} else if p < pattern.len() && pattern[p] == Glob::Any {
				backtrack = Some((p, t));
				p += 1;
			} else if let Some((star, matched)) = backtrack {
				p = star + 1;
				t = matched + 1;
				backtrack = Some((star, matched + 1));
			} else {
				return false;
			}
		}
		pattern[p..].iter().all(|&g| g == Glob::Any)
	}
}

/// Positive terms of a query, used to mark matches when highlighting.
///
/// Multi-token terms and quoted phrases land in `phrases` and only mark
/// text where all their tokens occur in sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTerms {
	pub exact: BTreeSet<String>,
	pub wildcards: BTreeSet<WildcardPattern>,
	pub phrases: BTreeSet<Vec<String>>,
}

impl QueryTerms {
	pub fn is_empty(&self) -> bool { self.exact.is_empty() && self.wildcards.is_empty() && self.phrases.is_empty() }

	/// The query term a token matches, if any.
	pub fn matching(&self, token: &str) -> Option<String> {
		if self.exact.contains(token) {
			return Some(token.to_string());
		}
		self.wildcards.iter().find(|w| w.matches(token)).map(|w| format!("~{}", w.as_str()))
	}
}

pub struct CompiledQuery {
	pub query: Box<dyn Query>,
	pub terms: QueryTerms,
}

impl std::fmt::Debug for CompiledQuery {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CompiledQuery").field("query", &self.query).field("terms", &self.terms).finish()
	}
}

pub struct QueryCompiler {
	fields: Vec<(&'static str, Field, f32)>,
	analyzer: TextAnalyzer,
}

impl QueryCompiler {
	pub fn new(schema: &Schema) -> tantivy::Result<Self> {
		let fields = SEARCH_FIELDS
			.iter()
			.map(|&(name, boost)| schema.get_field(name).map(|field| (name, field, boost)))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self { fields, analyzer: build_analyzer() })
	}

	/// Returns `Ok(None)` when nothing searchable is left after analysis.
	pub fn compile(&self, expr: &QueryExpr) -> Result<Option<CompiledQuery>, QueryError> {
		let targets: Vec<usize> = (0..self.fields.len()).collect();
		let Some(inner) = self.compile_expr(expr, &targets)? else { return Ok(None) };
		let mut terms = QueryTerms::default();
		self.collect_terms(expr, &mut terms);
		Ok(Some(CompiledQuery { query: Box::new(BoostQuery::new(inner, QUERY_BOOST)), terms }))
	}

	fn compile_expr(&self, expr: &QueryExpr, targets: &[usize]) -> Result<Option<Box<dyn Query>>, QueryError> {
		match expr {
			QueryExpr::Term(text) if is_wildcard(text) => self.compile_wildcard(text, targets).map(Some),
			QueryExpr::Term(text) | QueryExpr::Phrase(text) => Ok(self.compile_text(text, targets)),
			QueryExpr::Field { name, expr } => {
				let index = self
					.fields
					.iter()
					.position(|(field_name, _, _)| field_name == name)
					.ok_or_else(|| QueryError::UnknownField(name.clone()))?;
				self.compile_expr(expr, &[index])
			}
			QueryExpr::Group(inner) => self.compile_expr(inner, targets),
			QueryExpr::And(exprs) => self.compile_bool(exprs, Occur::Must, targets),
			QueryExpr::Or(exprs) => self.compile_bool(exprs, Occur::Should, targets),
			QueryExpr::Not(_) => self.compile_bool(std::slice::from_ref(expr), Occur::Must, targets),
		}
	}

	/// Negated children become `MustNot`. A clause list with only negated
	/// members matches no document.
	fn compile_bool(&self, exprs: &[QueryExpr], occur: Occur, targets: &[usize]) -> Result<Option<Box<dyn Query>>, QueryError> {
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
		let mut positives = 0;
		for expr in exprs {
			match expr {
				QueryExpr::Not(inner) => {
					if let Some(q) = self.compile_expr(inner, targets)? {
						clauses.push((Occur::MustNot, q));
					}
				}
				other => {
					if let Some(q) = self.compile_expr(other, targets)? {
						clauses.push((occur, q));
						positives += 1;
					}
				}
			}
		}
		if clauses.is_empty() {
			return Ok(None);
		}
		if positives == 0 {
			return Ok(Some(Box::new(EmptyQuery)));
		}
		if clauses.len() == 1 {
			return Ok(clauses.pop().map(|(_, q)| q));
		}
		Ok(Some(Box::new(BooleanQuery::new(clauses))))
	}

	fn compile_text(&self, text: &str, targets: &[usize]) -> Option<Box<dyn Query>> {
		let tokens = self.tokenize(text);
		if tokens.is_empty() {
			return None;
		}
		Some(self.per_field(targets, |field| {
			if tokens.len() == 1 {
				Box::new(TermQuery::new(Term::from_field_text(field, &tokens[0]), IndexRecordOption::WithFreqs))
			} else {
				let terms = tokens.iter().map(|t| Term::from_field_text(field, t)).collect();
				Box::new(PhraseQuery::new(terms))
			}
		}))
	}

	fn compile_wildcard(&self, text: &str, targets: &[usize]) -> Result<Box<dyn Query>, QueryError> {
		let regex = WildcardPattern::new(text).to_regex();
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(targets.len());
		for &i in targets {
			let (_, field, boost) = self.fields[i];
			let query = RegexQuery::from_pattern(&regex, field)
				.map_err(|e| QueryError::InvalidWildcard { term: text.to_string(), reason: e.to_string() })?;
			clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(query), boost))));
		}
		Ok(Box::new(BooleanQuery::new(clauses)))
	}

	fn per_field<F>(&self, targets: &[usize], build: F) -> Box<dyn Query>
	where
		F: Fn(Field) -> Box<dyn Query>,
	{
		let clauses: Vec<(Occur, Box<dyn Query>)> = targets
			.iter()
			.map(|&i| {
				let (_, field, boost) = self.fields[i];
				let boosted: Box<dyn Query> = Box::new(BoostQuery::new(build(field), boost));
				(Occur::Should, boosted)
			})
			.collect();
		Box::new(BooleanQuery::new(clauses))
	}

	fn collect_terms(&self, expr: &QueryExpr, terms: &mut QueryTerms) {
		match expr {
			QueryExpr::Term(text) if is_wildcard(text) => { terms.wildcards.insert(WildcardPattern::new(text)); }
			QueryExpr::Term(text) | QueryExpr::Phrase(text) => {
				let mut tokens = self.tokenize(text);
				if tokens.len() > 1 {
					terms.phrases.insert(tokens);
				} else {
					terms.exact.extend(tokens.pop());
				}
			}
			QueryExpr::Field { expr, .. } | QueryExpr::Group(expr) => self.collect_terms(expr, terms),
			QueryExpr::And(exprs) | QueryExpr::Or(exprs) => {
				for e in exprs { self.collect_terms(e, terms); }
			}
			QueryExpr::Not(_) => {}
		}
	}

	fn tokenize(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		let mut stream = analyzer.token_stream(text);
		let mut tokens = Vec::new();
		while stream.advance() {
			tokens.push(stream.token().text.clone());
		}
		tokens
	}
}
