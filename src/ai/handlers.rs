use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub fn ai_routes() -> Router<AppState> {
    Router::new().route("/ai/chat", get(chat))
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub user_query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
}

#[instrument(skip(state, query))]
pub async fn chat(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> AppResult<Json<ChatAnswer>> {
    if query.user_query.trim().is_empty() {
        return Err(AppError::Validation("user_query is required".into()));
    }
    let answer = state
        .llm
        .complete(&query.user_query)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    Ok(Json(ChatAnswer { answer }))
}
