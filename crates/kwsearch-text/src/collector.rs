//! Allow-list aware top-K collection.
//!
//! [`FilteredTopDocs`] runs once per segment (tantivy fans segments out over
//! its search executor). Each segment keeps a bounded heap of its best hits
//! that pass the [`AllowList`], and counts every such hit. Once all
//! segments are done, [`merge_partitions`] combines them into one ranked,
//! truncated list.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tantivy::collector::{Collector, SegmentCollector};
use tantivy::columnar::Column;
use tantivy::{DocAddress, DocId, Score, SegmentOrdinal, SegmentReader};

use kwsearch_core::types::{AllowList, DocId as ExternalId, ScoredHit};

use crate::tantivy_utils::ID_FIELD;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedDoc {
	pub external_id: ExternalId,
	pub score: Score,
	pub address: DocAddress,
}

impl RankedDoc {
	pub fn hit(&self) -> ScoredHit {
		ScoredHit { doc_id: self.external_id, score: self.score }
	}
}

/// Higher score first; equal scores fall back to index order so that
/// repeated queries return identical lists.
pub fn rank_cmp(a: &RankedDoc, b: &RankedDoc) -> Ordering {
	b.score.total_cmp(&a.score).then_with(|| a.address.cmp(&b.address))
}

/// Max-heap on rank order: the top is the worst hit kept so far.
#[derive(Debug)]
struct Worst(RankedDoc);

impl PartialEq for Worst {
	fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Worst {}

impl PartialOrd for Worst {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Worst {
	fn cmp(&self, other: &Self) -> Ordering { rank_cmp(&self.0, &other.0) }
}

/// Keeps at most `limit` best-ranked documents.
#[derive(Debug)]
pub struct TopK {
	limit: usize,
	heap: BinaryHeap<Worst>,
}

impl TopK {
	pub fn new(limit: usize) -> Self {
		Self { limit, heap: BinaryHeap::with_capacity(limit.min(4096) + 1) }
	}

	pub fn push(&mut self, doc: RankedDoc) {
		if self.heap.len() < self.limit {
			self.heap.push(Worst(doc));
		} else if let Some(mut worst) = self.heap.peek_mut() {
			if rank_cmp(&doc, &worst.0) == Ordering::Less {
				*worst = Worst(doc);
			}
		}
	}

	/// Best first.
	pub fn into_sorted_vec(self) -> Vec<RankedDoc> {
		self.heap.into_sorted_vec().into_iter().map(|w| w.0).collect()
	}
}

/// What one segment contributes to a query.
#[derive(Debug, Clone, Default)]
pub struct PartitionHits {
	pub hits: Vec<RankedDoc>,
	pub total_hits: usize,
}

/// Ranked, truncated hits of all segments.
#[derive(Debug, Clone, Default)]
pub struct MergedHits {
	pub hits: Vec<RankedDoc>,
	pub total_hits: usize,
}

/// Concatenates every partition, sorts by rank and keeps `limit` hits.
/// `total_hits` sums the partitions' counts, not the kept hits.
pub fn merge_partitions(partitions: Vec<PartitionHits>, limit: usize) -> MergedHits {
	let total_hits = partitions.iter().map(|p| p.total_hits).sum();
	let mut hits: Vec<RankedDoc> = partitions.into_iter().flat_map(|p| p.hits).collect();
	hits.sort_by(rank_cmp);
	hits.truncate(limit);
	MergedHits { hits, total_hits }
}

pub struct FilteredTopDocs {
	limit: usize,
	allow: Arc<AllowList>,
}

impl FilteredTopDocs {
	pub fn new(limit: usize, allow: Arc<AllowList>) -> Self {
		Self { limit, allow }
	}
}

impl Collector for FilteredTopDocs {
	type Fruit = MergedHits;
	type Child = FilteredSegmentCollector;

	fn for_segment(&self, segment_local_id: SegmentOrdinal, reader: &SegmentReader) -> tantivy::Result<Self::Child> {
		let ids = reader.fast_fields().i64(ID_FIELD)?;
		Ok(FilteredSegmentCollector {
			segment_ord: segment_local_id,
			ids,
			allow: Arc::clone(&self.allow),
			top: TopK::new(self.limit),
			total_hits: 0,
		})
	}

	fn requires_scoring(&self) -> bool { true }

	fn merge_fruits(&self, segment_fruits: Vec<PartitionHits>) -> tantivy::Result<MergedHits> {
		Ok(merge_partitions(segment_fruits, self.limit))
	}
}

pub struct FilteredSegmentCollector {
	segment_ord: SegmentOrdinal,
	ids: Column<i64>,
	allow: Arc<AllowList>,
	top: TopK,
	total_hits: usize,
}

impl SegmentCollector for FilteredSegmentCollector {
	type Fruit = PartitionHits;

	fn collect(&mut self, doc: DocId, score: Score) {
		// Documents without an id can't be reported and are dropped.
		let Some(external_id) = self.ids.first(doc) else { return };
		if !self.allow.admits(external_id) {
			return;
		}
		self.total_hits += 1;
		self.top.push(RankedDoc { external_id, score, address: DocAddress::new(self.segment_ord, doc) });
	}

	fn harvest(self) -> PartitionHits {
		PartitionHits { hits: self.top.into_sorted_vec(), total_hits: self.total_hits }
	}
}
