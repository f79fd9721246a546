use crate::error::Result;
use crate::models::route::{FeedbackRequest, FeedbackResponse};
use crate::AppState;
use axum::{extract::State, Json};
use std::sync::Arc;

/// POST /route/feedback
/// Storage is fire-and-forget; only invalid input fails.
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Json(feedback): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>> {
    let response = state.pipeline.record_feedback(&feedback)?;
    Ok(Json(response))
}
