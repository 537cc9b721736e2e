use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rendering color of a scored point.
///
/// Black marks an incorrect trial. Purple marks a correct trial inside a
/// high-intensity segment; red is an ordinary correct trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointColor {
    Black,
    Red,
    Purple,
}

/// One vertex of the scored trajectory. Values live in chart space, so they
/// are plain floats rather than price decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
    pub color: PointColor,
    /// First point of a segment's first trial or last point of its last
    /// trial. Rendering emphasis only, never used for scoring.
    pub is_extremity: bool,
    pub segment_id: String,
}

/// Output of the trajectory scorer: the folded point sequence plus the two
/// aggregate success rates (percentages).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
    pub segments_scored: usize,
    pub success_rate: f64,
    pub high_intensity_success_rate: f64,
}

impl Trajectory {
    /// Pretty print to console.
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("                 PREDICTION TRAJECTORY");
        println!("{}", "=".repeat(60));
        println!("Segments scored:        {}", self.segments_scored);
        println!("Success rate:           {:.1}%", self.success_rate);
        println!("High-intensity rate:    {:.1}%", self.high_intensity_success_rate);
        println!("{}", "-".repeat(60));
        for p in &self.points {
            println!(
                "  {}  {:>10.4}  {:<6} {}{}",
                p.time.format("%Y-%m-%d %H:%M"),
                p.value,
                format!("{:?}", p.color),
                &p.segment_id[..8.min(p.segment_id.len())],
                if p.is_extremity { "  *" } else { "" },
            );
        }
        println!("{}", "=".repeat(60));
    }
}
