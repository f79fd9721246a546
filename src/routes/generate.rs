use crate::error::{AppError, Result};
use crate::models::{GenerateRouteRequest, GenerateRouteResponse};
use crate::AppState;
use axum::{extract::State, Json};
use std::sync::Arc;

/// POST /route/generate
pub async fn generate_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRouteRequest>,
) -> Result<Json<GenerateRouteResponse>> {
    request.validate().map_err(AppError::Validation)?;

    tracing::info!(
        request_id = %request.request_id,
        theme = request.theme.as_str(),
        distance_km = request.distance_km,
        round_trip = request.round_trip,
        debug = request.debug,
        "Route request: ({:.5}, {:.5}), {:.1}km",
        request.start_location.lat,
        request.start_location.lng,
        request.distance_km
    );

    let response = match &state.cache {
        Some(cache) => {
            cache
                .get_or_compute(&request, || state.pipeline.run(&request))
                .await?
        }
        None => state.pipeline.run(&request).await?,
    };

    Ok(Json(response))
}
