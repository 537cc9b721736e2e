//! In-memory store used by unit tests and dry runs.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{SegmentStore, StoreError};
use crate::types::{AnalysisSegment, Candle, Stream};

#[derive(Default)]
struct Inner {
    points: HashMap<String, BTreeMap<DateTime<Utc>, Candle>>,
    streams: HashMap<String, Stream>,
    segments: HashMap<String, AnalysisSegment>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn point_count(&self, symbol: &str) -> usize {
        self.inner
            .read()
            .await
            .points
            .get(symbol)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub async fn stream_count(&self) -> usize {
        self.inner.read().await.streams.len()
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn insert_points(&self, symbol: &str, points: &[Candle]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let by_ts = inner.points.entry(symbol.to_string()).or_default();
        for p in points {
            by_ts.entry(p.ts).or_insert_with(|| p.clone());
        }
        Ok(())
    }

    async fn insert_stream(&self, stream: &Stream) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .streams
            .insert(stream.id.clone(), stream.clone());
        Ok(())
    }

    async fn insert_segments(&self, segments: &[AnalysisSegment]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for seg in segments {
            inner.segments.insert(seg.id.clone(), seg.clone());
        }
        Ok(())
    }

    async fn update_segment(&self, segment: &AnalysisSegment) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .segments
            .insert(segment.id.clone(), segment.clone());
        Ok(())
    }

    async fn delete_segment(&self, id: &str) -> Result<(), StoreError> {
        self.inner.write().await.segments.remove(id);
        Ok(())
    }

    async fn get_segment(&self, id: &str) -> Result<Option<AnalysisSegment>, StoreError> {
        Ok(self.inner.read().await.segments.get(id).cloned())
    }

    async fn segments_for_symbol(&self, symbol: &str) -> Result<Vec<AnalysisSegment>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<AnalysisSegment> = inner
            .segments
            .values()
            .filter(|s| s.symbol == symbol)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.segment_start);
        Ok(out)
    }

    async fn segments_for_stream(
        &self,
        symbol: &str,
        stream_id: &str,
    ) -> Result<Vec<AnalysisSegment>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<AnalysisSegment> = inner
            .segments
            .values()
            .filter(|s| s.symbol == symbol && s.stream_id == stream_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.segment_start);
        Ok(out)
    }
}
