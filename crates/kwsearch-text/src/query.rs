//! Query text -> [`QueryExpr`].
//!
//! Supported syntax: bare terms, `"quoted phrases"`, `field:term`,
//! `field:(grouped terms)`, `AND` / `OR` / `NOT`, `+` / `-` prefixes,
//! parentheses and `*` / `?` wildcards anywhere in a term. Adjacent clauses
//! are combined with AND; `OR` binds looser than AND. A backslash makes the
//! next character literal; an escaped `*` or `?` keeps its backslash in the
//! term so later stages can tell it from a wildcard.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
	#[error("unterminated phrase starting at byte {0}")]
	UnterminatedPhrase(usize),
	#[error("unbalanced parenthesis")]
	UnbalancedParenthesis,
	#[error("operator '{0}' is missing an operand")]
	DanglingOperator(String),
	#[error("empty group")]
	EmptyGroup,
	#[error("unknown field '{0}'")]
	UnknownField(String),
	#[error("invalid wildcard term '{term}': {reason}")]
	InvalidWildcard { term: String, reason: String },
}

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
	/// A single term; may contain `*` / `?`, escaped or not.
	Term(String),
	/// Quoted text, matched as a phrase after analysis.
	Phrase(String),
	/// Must not match.
	Not(Box<Self>),
	And(Vec<Self>),
	Or(Vec<Self>),
	/// Restricts the inner expression to one field.
	Field { name: String, expr: Box<Self> },
	/// A parenthesized expression; never merged into its parent.
	Group(Box<Self>),
}

impl QueryExpr {
	pub fn and(exprs: Vec<Self>) -> Self {
		Self::flatten(exprs, true)
	}

	pub fn or(exprs: Vec<Self>) -> Self {
		Self::flatten(exprs, false)
	}

	fn flatten(exprs: Vec<Self>, conjunction: bool) -> Self {
		let mut flat: Vec<Self> = exprs
			.into_iter()
			.flat_map(|e| match e {
				Self::And(inner) if conjunction => inner,
				Self::Or(inner) if !conjunction => inner,
				other => vec![other],
			})
			.collect();
		if flat.len() == 1 {
			return flat.remove(0);
		}
		if conjunction { Self::And(flat) } else { Self::Or(flat) }
	}
}

/// True when `term` has an unescaped `*` or `?`.
pub fn is_wildcard(term: &str) -> bool {
	let mut chars = term.chars();
	while let Some(c) = chars.next() {
		match c {
			'\\' => { chars.next(); }
			'*' | '?' => return true,
			_ => {}
		}
	}
	false
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
	Word(String),
	Phrase(String),
	Field(String),
	LParen,
	RParen,
	Plus,
	Minus,
	And,
	Or,
	Not,
}

fn is_boundary(c: char) -> bool {
	c.is_whitespace() || matches!(c, '(' | ')' | '"' | ':')
}

fn lex(input: &str) -> Result<Vec<Token>, QueryError> {
	let mut tokens = Vec::new();
	let mut chars = input.char_indices().peekable();
	while let Some(&(pos, c)) = chars.peek() {
		match c {
			c if c.is_whitespace() => { chars.next(); }
			'(' => { chars.next(); tokens.push(Token::LParen); }
			')' => { chars.next(); tokens.push(Token::RParen); }
			'+' => { chars.next(); tokens.push(Token::Plus); }
			'-' => { chars.next(); tokens.push(Token::Minus); }
			'"' => {
				chars.next();
				let mut text = String::new();
				let mut closed = false;
				while let Some((_, c)) = chars.next() {
					match c {
						'"' => { closed = true; break; }
						'\\' => { if let Some((_, escaped)) = chars.next() { text.push(escaped); } }
						other => text.push(other),
					}
				}
				if !closed {
					return Err(QueryError::UnterminatedPhrase(pos));
				}
				tokens.push(Token::Phrase(text));
			}
			':' => return Err(QueryError::DanglingOperator(":".to_string())),
			_ => {
				let mut word = String::new();
				let mut escaped_any = false;
				while let Some(&(_, c)) = chars.peek() {
					if c == '\\' {
						chars.next();
						if let Some((_, escaped)) = chars.next() {
							// Wildcard characters keep their escape so they stay literal.
							if matches!(escaped, '*' | '?' | '\\') { word.push('\\'); }
							word.push(escaped);
							escaped_any = true;
						}
						continue;
					}
					if is_boundary(c) { break; }
					word.push(c);
					chars.next();
				}
				if matches!(chars.peek(), Some(&(_, ':'))) {
					chars.next();
					tokens.push(Token::Field(word));
					continue;
				}
				let token = match word.as_str() {
					"AND" | "&&" if !escaped_any => Token::And,
					"OR" | "||" if !escaped_any => Token::Or,
					"NOT" | "!" if !escaped_any => Token::Not,
					_ => Token::Word(word),
				};
				tokens.push(token);
			}
		}
	}
	Ok(tokens)
}

struct Parser {
	tokens: Vec<Token>,
	pos: usize,
}

impl Parser {
	fn peek(&self) -> Option<&Token> { self.tokens.get(self.pos) }

	fn bump(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.pos).cloned();
		self.pos += 1;
		token
	}

	fn or_expr(&mut self) -> Result<QueryExpr, QueryError> {
		let mut branches = vec![self.and_expr()?];
		while self.peek() == Some(&Token::Or) {
			self.bump();
			if matches!(self.peek(), None | Some(Token::RParen | Token::Or | Token::And)) {
				return Err(QueryError::DanglingOperator("OR".to_string()));
			}
			branches.push(self.and_expr()?);
		}
		Ok(QueryExpr::or(branches))
	}

	fn and_expr(&mut self) -> Result<QueryExpr, QueryError> {
		let mut clauses = vec![self.unary()?];
		loop {
			match self.peek() {
				None | Some(Token::RParen | Token::Or) => break,
				Some(Token::And) => {
					self.bump();
					if matches!(self.peek(), None | Some(Token::RParen | Token::Or | Token::And)) {
						return Err(QueryError::DanglingOperator("AND".to_string()));
					}
				}
				Some(_) => {}
			}
			clauses.push(self.unary()?);
		}
		Ok(QueryExpr::and(clauses))
	}

	fn unary(&mut self) -> Result<QueryExpr, QueryError> {
		match self.peek() {
			Some(Token::Not | Token::Minus) => {
				let op = if self.bump() == Some(Token::Not) { "NOT" } else { "-" };
				self.operand(op).map(|e| QueryExpr::Not(Box::new(e)))
			}
			Some(Token::Plus) => {
				self.bump();
				self.operand("+")
			}
			_ => self.primary(),
		}
	}

	fn operand(&mut self, op: &str) -> Result<QueryExpr, QueryError> {
		if matches!(self.peek(), None | Some(Token::RParen | Token::Or | Token::And)) {
			return Err(QueryError::DanglingOperator(op.to_string()));
		}
		self.unary()
	}

	fn primary(&mut self) -> Result<QueryExpr, QueryError> {
		match self.bump() {
			Some(Token::Word(w)) => Ok(QueryExpr::Term(w)),
			Some(Token::Phrase(p)) => Ok(QueryExpr::Phrase(p)),
			Some(Token::LParen) => {
				if self.peek() == Some(&Token::RParen) {
					return Err(QueryError::EmptyGroup);
				}
				let inner = self.or_expr()?;
				match self.bump() {
					Some(Token::RParen) => Ok(QueryExpr::Group(Box::new(inner))),
					_ => Err(QueryError::UnbalancedParenthesis),
				}
			}
			Some(Token::Field(name)) => {
				match self.peek() {
					Some(Token::Word(_) | Token::Phrase(_) | Token::LParen) => {}
					_ => return Err(QueryError::DanglingOperator(format!("{name}:"))),
				}
				let expr = self.primary()?;
				Ok(QueryExpr::Field { name, expr: Box::new(expr) })
			}
			Some(Token::RParen) => Err(QueryError::UnbalancedParenthesis),
			Some(Token::And) => Err(QueryError::DanglingOperator("AND".to_string())),
			Some(Token::Or) => Err(QueryError::DanglingOperator("OR".to_string())),
			Some(other) => Err(QueryError::DanglingOperator(format!("{other:?}"))),
			None => Err(QueryError::DanglingOperator("end of query".to_string())),
		}
	}
}

/// Parses query text. Blank input yields `Ok(None)`.
pub fn parse(input: &str) -> Result<Option<QueryExpr>, QueryError> {
	let tokens = lex(input)?;
	if tokens.is_empty() {
		return Ok(None);
	}
	let mut parser = Parser { tokens, pos: 0 };
	let expr = parser.or_expr()?;
	if parser.pos < parser.tokens.len() {
		return Err(QueryError::UnbalancedParenthesis);
	}
	Ok(Some(expr))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn term(s: &str) -> QueryExpr { QueryExpr::Term(s.to_string()) }

	fn parsed(s: &str) -> QueryExpr {
		parse(s).expect("parse").expect("non-empty")
	}

	#[test]
	fn adjacent_terms_are_conjunctive() {
		assert_eq!(parsed("machine learning"), QueryExpr::And(vec![term("machine"), term("learning")]));
		assert_eq!(parsed("machine AND learning"), parsed("machine learning"));
	}

	#[test]
	fn or_binds_looser_than_and() {
		assert_eq!(
			parsed("a b OR c"),
			QueryExpr::Or(vec![QueryExpr::And(vec![term("a"), term("b")]), term("c")])
		);
	}

	#[test]
	fn prefixes_and_not() {
		assert_eq!(
			parsed("+weather -forecast NOT rain"),
			QueryExpr::And(vec![
				term("weather"),
				QueryExpr::Not(Box::new(term("forecast"))),
				QueryExpr::Not(Box::new(term("rain"))),
			])
		);
	}

	#[test]
	fn hyphen_inside_word_is_not_an_operator() {
		assert_eq!(parsed("covid-19"), term("covid-19"));
	}

	#[test]
	fn fields_phrases_and_groups() {
		assert_eq!(
			parsed("name:\"air quality\" keywords:(sensor OR iot)"),
			QueryExpr::And(vec![
				QueryExpr::Field { name: "name".into(), expr: Box::new(QueryExpr::Phrase("air quality".into())) },
				QueryExpr::Field {
					name: "keywords".into(),
					expr: Box::new(QueryExpr::Group(Box::new(QueryExpr::Or(vec![term("sensor"), term("iot")])))),
				},
			])
		);
	}

	#[test]
	fn groups_are_kept_apart_from_their_parent() {
		assert_eq!(
			parsed("machine (-weather)"),
			QueryExpr::And(vec![
				term("machine"),
				QueryExpr::Group(Box::new(QueryExpr::Not(Box::new(term("weather"))))),
			])
		);
	}

	#[test]
	fn leading_wildcards_stay_terms() {
		assert_eq!(parsed("*learning"), term("*learning"));
		assert!(is_wildcard("*learning"));
		assert!(is_wildcard("te?t"));
		assert!(!is_wildcard("test"));
	}

	#[test]
	fn escapes_make_characters_literal() {
		assert_eq!(parsed(r"a\:b"), term("a:b"));
		assert_eq!(parsed(r"\AND"), term("AND"));
	}

	#[test]
	fn escaped_wildcards_are_literal() {
		assert_eq!(parsed(r"machin\*"), term(r"machin\*"));
		assert!(!is_wildcard(r"machin\*"));
		assert!(!is_wildcard(r"what\?"));
		assert!(is_wildcard(r"a\*b*"));
	}

	#[test]
	fn blank_input_is_not_an_error() {
		assert_eq!(parse("   "), Ok(None));
	}

	#[test]
	fn syntax_errors() {
		assert!(matches!(parse("\"open phrase"), Err(QueryError::UnterminatedPhrase(0))));
		assert_eq!(parse("(a b"), Err(QueryError::UnbalancedParenthesis));
		assert_eq!(parse("a b)"), Err(QueryError::UnbalancedParenthesis));
		assert_eq!(parse("a AND"), Err(QueryError::DanglingOperator("AND".into())));
		assert_eq!(parse("OR b"), Err(QueryError::DanglingOperator("OR".into())));
		assert_eq!(parse("-"), Err(QueryError::DanglingOperator("-".into())));
		assert_eq!(parse("name:"), Err(QueryError::DanglingOperator("name:".into())));
		assert_eq!(parse("()"), Err(QueryError::EmptyGroup));
	}
}
