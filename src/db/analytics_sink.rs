use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsTable {
    RouteRequest,
    RouteCandidate,
    RouteProposal,
    RouteFeedback,
}

impl AnalyticsTable {
    pub const ALL: [AnalyticsTable; 4] = [
        AnalyticsTable::RouteRequest,
        AnalyticsTable::RouteCandidate,
        AnalyticsTable::RouteProposal,
        AnalyticsTable::RouteFeedback,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            AnalyticsTable::RouteRequest => "route_request",
            AnalyticsTable::RouteCandidate => "route_candidate",
            AnalyticsTable::RouteProposal => "route_proposal",
            AnalyticsTable::RouteFeedback => "route_feedback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsRow {
    pub request_id: String,
    pub payload: serde_json::Value,
}

impl AnalyticsRow {
    pub fn from_record<T: Serialize>(request_id: &str, record: &T) -> Result<Self> {
        let payload = serde_json::to_value(record)
            .map_err(|e| AppError::Internal(format!("Failed to serialize analytics row: {}", e)))?;
        Ok(AnalyticsRow {
            request_id: request_id.to_string(),
            payload,
        })
    }
}

/// Best-effort destination for analytics rows.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn insert_rows(&self, table: AnalyticsTable, rows: Vec<AnalyticsRow>) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Fire-and-forget insert. Failures are logged and never reach the caller.
pub fn spawn_insert(sink: Arc<dyn AnalyticsSink>, table: AnalyticsTable, rows: Vec<AnalyticsRow>) {
    if rows.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let count = rows.len();
        if let Err(e) = sink.insert_rows(table, rows).await {
            tracing::warn!(
                table = table.table_name(),
                "Analytics insert of {} rows failed: {}",
                count,
                e
            );
        }
    });
}

pub struct PgAnalyticsSink {
    pool: sqlx::PgPool,
}

impl PgAnalyticsSink {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        Ok(super::analytics_queries::ensure_schema(&self.pool).await?)
    }

}

#[async_trait]
impl AnalyticsSink for PgAnalyticsSink {
    async fn insert_rows(&self, table: AnalyticsTable, rows: Vec<AnalyticsRow>) -> Result<()> {
        let inserted = super::analytics_queries::insert_rows(&self.pool, table, &rows).await?;
        tracing::debug!(table = table.table_name(), "Inserted {} analytics rows", inserted);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Sink used when no database is configured: rows only go to the trace log.
pub struct LogAnalyticsSink;

#[async_trait]
impl AnalyticsSink for LogAnalyticsSink {
    async fn insert_rows(&self, table: AnalyticsTable, rows: Vec<AnalyticsRow>) -> Result<()> {
        for row in &rows {
            tracing::debug!(
                table = table.table_name(),
                request_id = %row.request_id,
                payload = %row.payload,
                "analytics row"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
