pub mod feedback;
pub mod generate;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/route/generate", post(generate::generate_route))
        .route("/route/feedback", post(feedback::submit_feedback))
        .route("/health", get(health::health_check))
        .with_state(state)
}
