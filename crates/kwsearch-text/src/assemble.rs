//! Turns merged hits into the caller-facing [`SearchResult`].

use kwsearch_core::types::{FieldHighlights, SearchResult};

use crate::collector::{MergedHits, RankedDoc};

/// Drops hits scoring below `min_score`, keeps the merge order, and asks
/// `highlight` for snippets of the survivors only.
///
/// `total_hits` is carried over from the merge, so it still counts hits
/// that fell under the threshold or past the result cap.
pub fn assemble<F, E>(merged: MergedHits, min_score: f32, mut highlight: F) -> Result<SearchResult, E>
where
	F: FnMut(&RankedDoc) -> Result<Option<FieldHighlights>, E>,
{
	let mut result = SearchResult { total_hits: merged.total_hits, ..SearchResult::default() };
	for ranked in merged.hits.iter().filter(|d| d.score >= min_score) {
		let highlights = highlight(ranked)?;
		result.push(ranked.hit(), highlights);
	}
	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::convert::Infallible;
	use tantivy::DocAddress;

	fn merged(scores: &[(i64, f32)], total_hits: usize) -> MergedHits {
		let hits = scores
			.iter()
			.enumerate()
			.map(|(i, &(external_id, score))| RankedDoc { external_id, score, address: DocAddress::new(0, i as u32) })
			.collect();
		MergedHits { hits, total_hits }
	}

	#[test]
	fn keeps_merge_order() {
		let result = assemble(merged(&[(1, 8.5), (2, 3.2)], 2), 1.0, |_| Ok::<_, Infallible>(None)).expect("assemble");
		assert_eq!(result.doc_ids, vec![1, 2]);
		assert_eq!(result.scores, vec![8.5, 3.2]);
		assert!(result.highlights.is_empty());
	}

	#[test]
	fn threshold_drops_low_scores_but_not_the_total() {
		let result = assemble(merged(&[(1, 8.5), (2, 3.2)], 2), 5.0, |_| Ok::<_, Infallible>(None)).expect("assemble");
		assert_eq!(result.doc_ids, vec![1]);
		assert_eq!(result.total_hits, 2);
	}

	#[test]
	fn score_equal_to_threshold_is_kept() {
		let result = assemble(merged(&[(1, 5.0)], 1), 5.0, |_| Ok::<_, Infallible>(None)).expect("assemble");
		assert_eq!(result.doc_ids, vec![1]);
	}

	#[test]
	fn only_survivors_are_highlighted() {
		let mut asked = Vec::new();
		let result = assemble(merged(&[(1, 9.0), (2, 0.5), (3, 4.0)], 3), 1.0, |d| {
			asked.push(d.external_id);
			let fields = FieldHighlights::from([("name".to_string(), format!("hit {}", d.external_id))]);
			Ok::<_, Infallible>((d.external_id != 3).then_some(fields))
		})
		.expect("assemble");
		assert_eq!(asked, vec![1, 3]);
		assert_eq!(result.doc_ids, vec![1, 3]);
		assert_eq!(result.highlights.len(), 1);
		assert!(result.highlights.contains_key(&1));
	}
}
