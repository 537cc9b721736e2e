//! SQLite implementation of the segment store.
//!
//! Decimals are stored as TEXT to avoid float drift, timestamps as RFC 3339
//! TEXT, the point payload as a JSON column. Schema is created on open.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use super::{SegmentStore, StoreError};
use crate::types::{AnalysisSegment, Candle, SchemaType, Stream, TrendDirection};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database and ensures the schema.
    pub async fn new(db_url: &str) -> Result<Self, StoreError> {
        info!("Opening segment database at {}", db_url);

        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS points (
                symbol TEXT NOT NULL,
                ts TEXT NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                PRIMARY KEY (symbol, ts)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS streams (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                first_ts TEXT NOT NULL,
                last_ts TEXT NOT NULL,
                point_count INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS segments (
                id TEXT PRIMARY KEY,
                stream_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                trading_date TEXT NOT NULL,
                segment_start TEXT NOT NULL,
                segment_end TEXT NOT NULL,
                point_count INTEGER NOT NULL,
                original_point_count INTEGER NOT NULL,
                points_in_region INTEGER NOT NULL,
                min_price TEXT NOT NULL,
                max_price TEXT NOT NULL,
                average_price TEXT NOT NULL,
                x0 TEXT NOT NULL,
                trend TEXT NOT NULL,
                points_data TEXT NOT NULL,
                schema_type TEXT NOT NULL,
                pattern_point TEXT,
                is_result_correct TEXT,
                result_interval TEXT,
                result TEXT,
                invalid INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_segments_symbol_start
                ON segments(symbol, segment_start)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_segments_stream ON segments(stream_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn write_segment(&self, seg: &AnalysisSegment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO segments (
                id, stream_id, symbol, trading_date, segment_start, segment_end,
                point_count, original_point_count, points_in_region,
                min_price, max_price, average_price, x0, trend, points_data,
                schema_type, pattern_point, is_result_correct, result_interval,
                result, invalid
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&seg.id)
        .bind(&seg.stream_id)
        .bind(&seg.symbol)
        .bind(seg.trading_date.to_string())
        .bind(seg.segment_start.to_rfc3339())
        .bind(seg.segment_end.to_rfc3339())
        .bind(seg.point_count as i64)
        .bind(seg.original_point_count as i64)
        .bind(seg.points_in_region as i64)
        .bind(seg.min_price.to_string())
        .bind(seg.max_price.to_string())
        .bind(seg.average_price.to_string())
        .bind(seg.x0.to_string())
        .bind(seg.trend.as_str())
        .bind(serde_json::to_string(&seg.points_data)?)
        .bind(seg.schema_type.as_str())
        .bind(seg.pattern_point.map(|p| p.to_rfc3339()))
        .bind(seg.is_result_correct.as_deref())
        .bind(seg.result_interval.as_deref())
        .bind(seg.result.as_deref())
        .bind(seg.invalid as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn segment_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnalysisSegment, StoreError> {
    let trend = TrendDirection::parse(row.get("trend"))
        .ok_or_else(|| StoreError::Corrupt("unknown trend value".to_string()))?;
    let schema_type = SchemaType::parse(row.get("schema_type"))
        .ok_or_else(|| StoreError::Corrupt("unknown schema type".to_string()))?;
    let pattern_point = row
        .get::<Option<String>, _>("pattern_point")
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
        .transpose()?;

    Ok(AnalysisSegment {
        id: row.get("id"),
        stream_id: row.get("stream_id"),
        symbol: row.get("symbol"),
        trading_date: NaiveDate::from_str(row.get("trading_date"))
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        segment_start: DateTime::parse_from_rfc3339(row.get("segment_start"))?
            .with_timezone(&Utc),
        segment_end: DateTime::parse_from_rfc3339(row.get("segment_end"))?.with_timezone(&Utc),
        point_count: row.get::<i64, _>("point_count") as usize,
        original_point_count: row.get::<i64, _>("original_point_count") as usize,
        points_in_region: row.get::<i64, _>("points_in_region") as usize,
        min_price: Decimal::from_str(row.get("min_price"))?,
        max_price: Decimal::from_str(row.get("max_price"))?,
        average_price: Decimal::from_str(row.get("average_price"))?,
        x0: Decimal::from_str(row.get("x0"))?,
        trend,
        points_data: serde_json::from_str(row.get("points_data"))?,
        schema_type,
        pattern_point,
        is_result_correct: row.get("is_result_correct"),
        result_interval: row.get("result_interval"),
        result: row.get("result"),
        invalid: row.get::<i64, _>("invalid") != 0,
    })
}

#[async_trait]
impl SegmentStore for SqliteStore {
    async fn insert_points(&self, symbol: &str, points: &[Candle]) -> Result<(), StoreError> {
        for p in points {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO points (symbol, ts, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(symbol)
            .bind(p.ts.to_rfc3339())
            .bind(p.open.to_string())
            .bind(p.high.to_string())
            .bind(p.low.to_string())
            .bind(p.close.to_string())
            .bind(p.volume.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn insert_stream(&self, stream: &Stream) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO streams (id, symbol, ingested_at, first_ts, last_ts, point_count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stream.id)
        .bind(&stream.symbol)
        .bind(stream.ingested_at.to_rfc3339())
        .bind(stream.first_ts.to_rfc3339())
        .bind(stream.last_ts.to_rfc3339())
        .bind(stream.point_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_segments(&self, segments: &[AnalysisSegment]) -> Result<(), StoreError> {
        for seg in segments {
            self.write_segment(seg).await?;
        }
        Ok(())
    }

    async fn update_segment(&self, segment: &AnalysisSegment) -> Result<(), StoreError> {
        self.write_segment(segment).await
    }

    async fn delete_segment(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM segments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_segment(&self, id: &str) -> Result<Option<AnalysisSegment>, StoreError> {
        let row = sqlx::query("SELECT * FROM segments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(segment_from_row).transpose()
    }

    async fn segments_for_symbol(&self, symbol: &str) -> Result<Vec<AnalysisSegment>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM segments WHERE symbol = ? ORDER BY segment_start",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(segment_from_row).collect()
    }

    async fn segments_for_stream(
        &self,
        symbol: &str,
        stream_id: &str,
    ) -> Result<Vec<AnalysisSegment>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM segments WHERE symbol = ? AND stream_id = ? ORDER BY segment_start",
        )
        .bind(symbol)
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(segment_from_row).collect()
    }
}
