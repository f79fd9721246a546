use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use walkroute::cache::{GenerateCache, MemoryCacheService};
use walkroute::AppState;

mod common;

use common::{test_config, Fakes};

fn setup_test_app(with_cache: bool) -> axum::Router {
    let fakes = Fakes::healthy();
    let state = Arc::new(AppState {
        pipeline: fakes.pipeline(test_config()),
        cache: with_cache
            .then(|| GenerateCache::new(Arc::new(MemoryCacheService::new(60, 16)), 60)),
        analytics: fakes.sink.clone(),
    });

    walkroute::routes::create_router(state)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let app = setup_test_app(true);

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checks"]["cache"], "memory");
    assert_eq!(json["checks"]["analytics"], "recording");
}

#[tokio::test]
async fn test_health_reports_disabled_cache() {
    let app = setup_test_app(false);
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let json = body_json(app.oneshot(request).await.unwrap()).await;
    assert_eq!(json["checks"]["cache"], "disabled");
}

#[tokio::test]
async fn test_generate_route_endpoint() {
    let app = setup_test_app(true);

    let request = post_json(
        "/route/generate",
        json!({
            "request_id": "api-1",
            "theme": "nature",
            "distance_km": 2.0,
            "start_location": {"lat": 35.0, "lng": 139.0},
            "round_trip": true,
            "debug": true
        }),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["request_id"], "api-1");
    assert!(!json["route"]["polyline"].as_str().unwrap().is_empty());
    assert!(json["route"]["duration_min"].is_u64());
    assert_eq!(json["meta"]["tools_used"][0], "maps_routes");
    assert!(json["meta"]["tools_used"]
        .as_array()
        .unwrap()
        .contains(&json!("vertex_llm")));
    assert!(json["meta"].get("fallback_reason").is_none());
    assert_eq!(json["meta"]["plan"][0], "validate_request");
    assert_eq!(json["meta"]["debug"]["routes_api_status"], "ok");
    assert!(json["meta"]["debug"]["latency_ms"]["generate_candidates"].is_u64());
    assert_eq!(json["route"]["spots"][0]["type"], "park");
}

#[tokio::test]
async fn test_generate_without_debug_omits_plan() {
    let app = setup_test_app(true);
    let request = post_json(
        "/route/generate",
        json!({
            "theme": "think",
            "distance_km": 2.0,
            "start_location": {"lat": 35.0, "lng": 139.0}
        }),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["meta"].get("plan").is_none());
    assert!(json["meta"].get("debug").is_none());
    assert!(!json["request_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_one_way_without_end_is_unprocessable() {
    let app = setup_test_app(true);
    let request = post_json(
        "/route/generate",
        json!({
            "theme": "exercise",
            "distance_km": 3.0,
            "start_location": {"lat": 35.0, "lng": 139.0},
            "round_trip": false
        }),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("end_location"));
}

#[tokio::test]
async fn test_unknown_theme_is_rejected() {
    let app = setup_test_app(true);
    let request = post_json(
        "/route/generate",
        json!({
            "theme": "shopping",
            "distance_km": 3.0,
            "start_location": {"lat": 35.0, "lng": 139.0}
        }),
    );

    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_feedback_endpoint() {
    let app = setup_test_app(false);

    let accepted = app
        .clone()
        .oneshot(post_json(
            "/route/feedback",
            json!({"request_id": "api-1", "route_id": "route-1", "rating": 5}),
        ))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    let json = body_json(accepted).await;
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["route_id"], "route-1");

    let rejected = app
        .oneshot(post_json(
            "/route/feedback",
            json!({"request_id": "api-1", "route_id": "route-1", "rating": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
