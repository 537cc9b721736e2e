use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine tunables. Loaded from a TOML file when present, otherwise the
/// defaults below apply; any subset of keys may be given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database URL.
    pub database_url: String,
    /// Fixed window length, in minute bars, for session slicing.
    pub segment_window: usize,
    /// Windows (and truncated remnants) below this point count are dropped.
    pub min_segment_points: usize,
    /// Hard cap on segments emitted per trading day.
    pub max_segments_per_day: usize,
    /// Correctness-value threshold for the stricter success statistic.
    pub high_intensity_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://segscore.db".to_string(),
            segment_window: 120,
            min_segment_points: 6,
            max_segments_per_day: 6,
            high_intensity_threshold: 0.6,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.segment_window == 0 {
            errors.push("segment_window must be > 0".to_string());
        }
        if self.min_segment_points == 0 {
            errors.push("min_segment_points must be > 0".to_string());
        }
        if self.min_segment_points > self.segment_window {
            errors.push("min_segment_points must be <= segment_window".to_string());
        }
        if self.max_segments_per_day == 0 {
            errors.push("max_segments_per_day must be > 0".to_string());
        }
        if self.high_intensity_threshold <= 0.0 || self.high_intensity_threshold > 1.0 {
            errors.push("high_intensity_threshold must be between 0 and 1".to_string());
        }
        if self.database_url.is_empty() {
            errors.push("database_url must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Loads the config file, falling back to defaults when it is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .validate()
            .map_err(|errors| anyhow::anyhow!("invalid config: {}", errors.join(", ")))?;
        Ok(config)
    }
}
