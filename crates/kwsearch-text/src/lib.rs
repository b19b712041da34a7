//! kwsearch-text
//!
//! Tantivy-based dataset indexing and ranked keyword search.
pub mod tantivy_utils;
pub mod index;
pub mod query;
pub mod compile;
pub mod collector;
pub mod highlight;
pub mod assemble;
pub mod search;

pub use index::{CroissantIndexer, TantivyIndexer};
pub use search::{SearchError, TantivySearchEngine};
