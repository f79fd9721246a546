use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Directions API error: {0}")]
    DirectionsApi(String),

    #[error("Places API error: {0}")]
    PlacesApi(String),

    #[error("Ranker error: {0}")]
    RankerApi(String),

    #[error("Text generation error: {0}")]
    TextGeneration(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No viable route: {0}")]
    NoViableRoute(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

// Convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal database error")
            }
            AppError::DirectionsApi(ref e) => {
                tracing::error!("Directions API error: {}", e);
                (StatusCode::BAD_GATEWAY, "Routing service error")
            }
            AppError::PlacesApi(ref e) => {
                tracing::error!("Places API error: {}", e);
                (StatusCode::BAD_GATEWAY, "Places service error")
            }
            AppError::RankerApi(ref e) => {
                tracing::error!("Ranker error: {}", e);
                (StatusCode::BAD_GATEWAY, "Ranking service error")
            }
            AppError::TextGeneration(ref e) => {
                tracing::error!("Text generation error: {}", e);
                (StatusCode::BAD_GATEWAY, "Text generation service error")
            }
            AppError::Cache(ref e) => {
                tracing::warn!("Cache error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error")
            }
            AppError::Validation(ref e) => (StatusCode::UNPROCESSABLE_ENTITY, e.as_str()),
            AppError::NoViableRoute(ref e) => {
                tracing::error!("No viable route: {}", e);
                (StatusCode::UNPROCESSABLE_ENTITY, e.as_str())
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": status.canonical_reason().unwrap_or("Unknown error"),
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_unprocessable() {
        let response = AppError::Validation("end_location is required".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn client_errors_carry_their_message() {
        let response =
            AppError::Validation("rating must be between 1 and 5".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Unprocessable Entity");
        assert_eq!(json["message"], "rating must be between 1 and 5");
    }

    #[test]
    fn upstream_errors_map_to_bad_gateway() {
        let response = AppError::RankerApi("timeout".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
