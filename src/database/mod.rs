//! Persistence port for the engine.
//!
//! Every component takes a `SegmentStore` handle instead of reaching for a
//! process-wide database object; the SQLite implementation backs the CLI and
//! the in-memory one backs tests. The engine treats either as a black box:
//! reads return a consistent snapshot, segment writes are all-or-nothing.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{AnalysisSegment, Candle, Stream};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(e: chrono::ParseError) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

impl From<rust_decimal::Error> for StoreError {
    fn from(e: rust_decimal::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Persists raw points; re-inserting an existing (symbol, ts) is a no-op.
    async fn insert_points(&self, symbol: &str, points: &[Candle]) -> Result<(), StoreError>;

    async fn insert_stream(&self, stream: &Stream) -> Result<(), StoreError>;

    async fn insert_segments(&self, segments: &[AnalysisSegment]) -> Result<(), StoreError>;

    async fn update_segment(&self, segment: &AnalysisSegment) -> Result<(), StoreError>;

    async fn delete_segment(&self, id: &str) -> Result<(), StoreError>;

    async fn get_segment(&self, id: &str) -> Result<Option<AnalysisSegment>, StoreError>;

    /// All segments for a symbol, ordered by segment start.
    async fn segments_for_symbol(&self, symbol: &str) -> Result<Vec<AnalysisSegment>, StoreError>;

    /// Segments for a symbol restricted to one ingestion stream, ordered by
    /// segment start.
    async fn segments_for_stream(
        &self,
        symbol: &str,
        stream_id: &str,
    ) -> Result<Vec<AnalysisSegment>, StoreError>;
}
