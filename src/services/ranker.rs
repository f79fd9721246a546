use crate::error::{AppError, Result};
use crate::models::features::FeatureVector;
use crate::models::RouteScore;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct RankRoute {
    pub route_id: String,
    pub features: FeatureVector,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankRequest {
    pub request_id: String,
    pub routes: Vec<RankRoute>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RankResponse {
    #[serde(default)]
    pub scores: Vec<RouteScore>,
    #[serde(default)]
    pub failed_route_ids: Vec<String>,
}

#[async_trait]
pub trait Ranker: Send + Sync {
    async fn rank(&self, request: &RankRequest) -> Result<RankResponse>;
}

/// JSON-over-HTTP client for the route ranking service.
#[derive(Clone)]
pub struct HttpRankerClient {
    client: Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpRankerClient {
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Self {
        HttpRankerClient {
            client: Client::new(),
            url,
            token,
            timeout,
        }
    }
}

#[async_trait]
impl Ranker for HttpRankerClient {
    async fn rank(&self, request: &RankRequest) -> Result<RankResponse> {
        let mut builder = self
            .client
            .post(&self.url)
            .json(request)
            .timeout(self.timeout);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::RankerApi("Request timed out".to_string())
            } else {
                AppError::RankerApi(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            // Payload rejected as a whole: report every route as failed
            tracing::warn!(
                request_id = %request.request_id,
                "Ranker rejected payload with {} routes",
                request.routes.len()
            );
            return Ok(RankResponse {
                scores: Vec::new(),
                failed_route_ids: request.routes.iter().map(|r| r.route_id.clone()).collect(),
            });
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::RankerApi(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::RankerApi(format!("Failed to parse response: {}", e)))
    }
}
