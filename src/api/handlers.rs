use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::debug;

use super::{
    dto::{AskRequest, AskResponse, HealthResponse},
    error::ApiError,
    state::AppState,
};

pub const NO_QUERY_MESSAGE: &str = "No query provided";

/// POST /ask - Answer a question about the document
///
/// Bodies that are not a JSON object with a non-empty string `query` are
/// rejected before any model work happens.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let query = match payload {
        Ok(Json(req)) => req.query,
        Err(rejection) => {
            debug!(%rejection, "rejected /ask body");
            None
        }
    };
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return Err(ApiError::BadRequest(NO_QUERY_MESSAGE.into()));
    };

    let result = state.generator.answer_or_fallback(&query).await;

    Ok(Json(AskResponse {
        query,
        answer: result.answer,
        grounded: result.grounded,
        relevance: result.relevance,
        chat_history: result.history,
    }))
}

/// GET /health - Health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
