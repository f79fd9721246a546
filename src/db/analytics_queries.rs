use super::analytics_sink::{AnalyticsRow, AnalyticsTable};
use sqlx::types::Json;
use sqlx::PgPool;
use time::OffsetDateTime;

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for table in AnalyticsTable::ALL {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                event_ts TIMESTAMPTZ NOT NULL,
                request_id TEXT NOT NULL,
                payload JSONB NOT NULL
            )",
            table.table_name()
        );
        sqlx::query(&sql).execute(pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {0}_request_id_idx ON {0} (request_id)",
            table.table_name()
        );
        sqlx::query(&index).execute(pool).await?;
    }
    Ok(())
}

pub async fn insert_rows(
    pool: &PgPool,
    table: AnalyticsTable,
    rows: &[AnalyticsRow],
) -> Result<u64, sqlx::Error> {
    // Table names come from a closed enum, never from input
    let sql = format!(
        "INSERT INTO {} (event_ts, request_id, payload) VALUES ($1, $2, $3)",
        table.table_name()
    );

    let now = OffsetDateTime::now_utc();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for row in rows {
        let result = sqlx::query(&sql)
            .bind(now)
            .bind(&row.request_id)
            .bind(Json(&row.payload))
            .execute(&mut *tx)
            .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}
