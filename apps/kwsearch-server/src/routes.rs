//! HTTP transport for [`SearchService`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinError;

use kwsearch_core::types::{RecreateIndexResponse, SearchRequest, SearchResult};

use crate::service::SearchService;

pub const NDJSON: &str = "application/x-ndjson";

/// A search or rebuild task that died before answering.
#[derive(Debug)]
pub struct ApiError(String);

impl From<JoinError> for ApiError {
	fn from(e: JoinError) -> Self { Self(e.to_string()) }
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		tracing::error!("Request failed: {}", self.0);
		(StatusCode::INTERNAL_SERVER_ERROR, self.0).into_response()
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
	pub status: &'static str,
	pub index_loaded: bool,
}

pub fn create_router(service: Arc<SearchService>) -> Router {
	Router::new()
		.route("/evaluate", post(evaluate))
		.route("/evaluate_stream", post(evaluate_stream))
		.route("/recreate_index", post(recreate_index))
		.route("/health", get(health))
		.with_state(service)
}

pub async fn evaluate(State(service): State<Arc<SearchService>>, Json(request): Json<SearchRequest>) -> Result<Json<SearchResult>, ApiError> {
	let result = tokio::task::spawn_blocking(move || service.evaluate(&request)).await?;
	Ok(Json(result))
}

/// One JSON chunk per line; the last line has `isLastChunk: true`.
pub async fn evaluate_stream(State(service): State<Arc<SearchService>>, Json(request): Json<SearchRequest>) -> Result<Response, ApiError> {
	let chunks = tokio::task::spawn_blocking(move || service.evaluate_stream(&request)).await?;
	let lines = futures::stream::iter(chunks).map(|chunk| {
		let mut line = serde_json::to_vec(&chunk)?;
		line.push(b'\n');
		Ok::<_, serde_json::Error>(line)
	});
	Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

pub async fn recreate_index(State(service): State<Arc<SearchService>>) -> Result<Json<RecreateIndexResponse>, ApiError> {
	let response = tokio::task::spawn_blocking(move || service.recreate_index()).await?;
	Ok(Json(response))
}

pub async fn health(State(service): State<Arc<SearchService>>) -> Json<HealthResponse> {
	Json(HealthResponse { status: "ok", index_loaded: service.is_ready() })
}
