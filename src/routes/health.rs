use crate::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// GET /health - liveness plus the backends in use
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut status = json!({
        "status": "ok",
        "checks": {}
    });

    match &state.cache {
        Some(cache) => {
            let backend = cache.backend();
            if backend.health_check().await {
                status["checks"]["cache"] = json!(backend.backend_name());
            } else {
                status["checks"]["cache"] =
                    json!({"error": format!("{} unreachable", backend.backend_name())});
            }
        }
        None => {
            status["checks"]["cache"] = json!("disabled");
        }
    }

    status["checks"]["analytics"] = json!(state.analytics.name());

    Json(status)
}
