//! kwsearch-server
//!
//! Keyword search service over a tantivy index, served over HTTP.
pub mod routes;
pub mod service;

pub use routes::create_router;
pub use service::SearchService;
