pub mod candle;
pub mod segment;
pub mod trajectory;

pub use candle::{Candle, RawSeries};
pub use segment::{AnalysisSegment, SchemaType, Stream, TrendDirection};
pub use trajectory::{PointColor, Trajectory, TrajectoryPoint};
