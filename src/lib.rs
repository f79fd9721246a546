// Library exports for testing and reusability

pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use error::{AppError, Result};

use cache::GenerateCache;
use db::AnalyticsSink;
use services::route_pipeline::RoutePipeline;
use std::sync::Arc;

// App state for sharing across the application
pub struct AppState {
    pub pipeline: RoutePipeline,
    /// `None` when response caching is disabled.
    pub cache: Option<GenerateCache>,
    pub analytics: Arc<dyn AnalyticsSink>,
}
