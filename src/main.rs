mod config;
mod continuity;
mod database;
mod engine;
mod feedback;
mod reconcile;
mod scoring;
mod segmenter;
mod types;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::EngineConfig;
use database::SqliteStore;
use engine::{ClassifyRequest, Engine, PatternPointUpdate};
use types::{Candle, RawSeries, SchemaType};

#[derive(Parser)]
#[command(name = "segscore")]
#[command(version = "0.1.0")]
#[command(about = "Segment extraction and prediction-scoring engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "segscore.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and ingest a minute-resolution series file
    Ingest {
        /// Instrument symbol
        #[arg(short, long)]
        symbol: String,
        /// JSON file holding an array of OHLCV bars
        #[arg(short, long)]
        file: String,
    },
    /// List persisted segments for a symbol
    Segments {
        #[arg(short, long)]
        symbol: String,
    },
    /// Set a segment's schema type and/or pattern point
    Classify {
        /// Segment id
        #[arg(long)]
        segment: String,
        /// Schema type: r, v or unclassified
        #[arg(long)]
        schema: Option<String>,
        /// Pattern point timestamp (RFC 3339), must lie inside the segment
        #[arg(long)]
        pattern_point: Option<String>,
        /// Clear the pattern point
        #[arg(long)]
        clear_pattern_point: bool,
    },
    /// Append one feedback trial to a segment
    Feedback {
        #[arg(long)]
        segment: String,
        /// Correctness value (non-zero means correct)
        #[arg(long)]
        correct: f64,
        /// Trial interval in minutes
        #[arg(long)]
        interval: f64,
        /// Signed result magnitude
        #[arg(long)]
        result: f64,
    },
    /// Score a symbol's segments into a prediction trajectory
    Trajectory {
        #[arg(short, long)]
        symbol: String,
        /// Restrict to one ingestion stream
        #[arg(long)]
        stream: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = EngineConfig::load(&cli.config)?;
    if let Ok(url) = std::env::var("SEGSCORE_DATABASE_URL") {
        config.database_url = url;
    }

    let store = Arc::new(SqliteStore::new(&config.database_url).await?);
    let engine = Engine::new(store, config);

    match cli.command {
        Commands::Ingest { symbol, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading series file {}", file))?;
            let candles: Vec<Candle> =
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", file))?;
            if let Some(bad) = candles.iter().find(|c| !c.is_sane()) {
                return Err(anyhow!("insane bar at {} in {}", bad.ts, file));
            }
            let outcome = engine.ingest(RawSeries::new(symbol, candles)).await?;
            match outcome.stream_id {
                Some(stream_id) => {
                    info!(
                        "Ingested {} points into {} segments (stream {}); {} segments shrunk, {} deleted",
                        outcome.points_persisted,
                        outcome.segments_created.len(),
                        stream_id,
                        outcome.segments_updated,
                        outcome.segments_deleted,
                    );
                }
                None => info!("Nothing new to ingest"),
            }
        }
        Commands::Segments { symbol } => {
            let segments = engine.segments(&symbol).await?;
            println!("{} segments for {}", segments.len(), symbol);
            for seg in segments {
                println!(
                    "  {}  {}  {} -> {}  n={}  avg={}  {}  schema={}{}{}",
                    seg.id,
                    seg.trading_date,
                    seg.segment_start.format("%H:%M"),
                    seg.segment_end.format("%H:%M"),
                    seg.point_count,
                    seg.average_price,
                    seg.trend.as_str(),
                    seg.schema_type.as_str(),
                    if seg.has_feedback() { "  feedback" } else { "" },
                    if seg.invalid { "  INVALID" } else { "" },
                );
            }
        }
        Commands::Classify { segment, schema, pattern_point, clear_pattern_point } => {
            let schema_type = schema
                .map(|s| {
                    SchemaType::parse(&s).ok_or_else(|| anyhow!("unknown schema type: {}", s))
                })
                .transpose()?;
            let pattern_point = if clear_pattern_point {
                Some(PatternPointUpdate::Clear)
            } else {
                pattern_point
                    .map(|raw| {
                        DateTime::parse_from_rfc3339(&raw)
                            .map(|t| PatternPointUpdate::Set(t.with_timezone(&Utc)))
                            .map_err(|e| anyhow!("invalid pattern point {}: {}", raw, e))
                    })
                    .transpose()?
            };
            engine
                .classify(&segment, ClassifyRequest { schema_type, pattern_point })
                .await?;
            info!("Segment {} updated", segment);
        }
        Commands::Feedback { segment, correct, interval, result } => {
            engine
                .record_feedback(&segment, correct, interval, result)
                .await?;
            info!("Feedback trial recorded for {}", segment);
        }
        Commands::Trajectory { symbol, stream } => {
            let trajectory = engine.score_trajectory(&symbol, stream.as_deref()).await?;
            trajectory.print_summary();
        }
    }

    Ok(())
}
