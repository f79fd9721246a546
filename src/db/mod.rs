use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

mod analytics_queries;
pub mod analytics_sink;

pub use analytics_sink::{
    spawn_insert, AnalyticsRow, AnalyticsSink, AnalyticsTable, LogAnalyticsSink, PgAnalyticsSink,
};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}
