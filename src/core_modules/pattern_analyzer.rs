// THEORY:
// The `PatternAnalyzer` looks at a closed session's detections as a whole and
// summarises them along three axes:
//
// 1.  **Spatial clustering**: the mean pairwise distance ("spread") between
//     drops, their centroid, and a coarse cluster-count estimate
//     `max(1, 10 - spread / 100)`. The estimate is a density heuristic, not a
//     clustering algorithm, and does not promise to find the true number of
//     clusters. Its exact numbers are part of the result contract, so it is
//     kept as is.
// 2.  **Temporal rhythm**: inter-arrival intervals and a regularity score
//     `max(0, 100 - 100 * std(intervals))`; perfectly even arrivals score 100.
// 3.  **Complexity**: `min(100, 20 * density + 0.5 * radius_spread)` where
//     density is drops per second of session.
//
// Every function is pure and accepts streams of any size; the empty and
// single-drop cases return defined neutral values rather than errors.

use crate::core_modules::detection::Detection;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How many intervals `RhythmAnalysis::intervals` keeps for inspection.
const MAX_REPORTED_INTERVALS: usize = 20;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterAnalysis {
    pub clusters: u32,
    /// Mean pairwise distance between detections, in pixels.
    pub spread: f64,
    /// Mean position of all detections. `None` for an empty stream.
    pub centroid: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RhythmAnalysis {
    pub rhythm_score: f64,
    pub mean_interval: f64,
    pub std_interval: f64,
    /// The first inter-arrival intervals, in seconds.
    pub intervals: Vec<f64>,
}

/// Density label for a set of detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    Empty,
    Isolated,
    Sparse,
    Scattered,
    Clustered,
    Dense,
    Storm,
}

impl PatternType {
    pub fn classify(count: usize) -> Self {
        match count {
            0 => Self::Empty,
            1..=2 => Self::Isolated,
            3..=9 => Self::Sparse,
            10..=24 => Self::Scattered,
            25..=49 => Self::Clustered,
            50..=99 => Self::Dense,
            _ => Self::Storm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub clusters: ClusterAnalysis,
    pub rhythm: RhythmAnalysis,
    pub complexity: f64,
    pub pattern_type: PatternType,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            clusters: ClusterAnalysis::default(),
            rhythm: RhythmAnalysis::default(),
            complexity: 0.0,
            pattern_type: PatternType::Empty,
        }
    }
}

/// Runs every analysis over one closed stream.
pub fn analyze(stream: &[Detection], duration_seconds: i64) -> AnalysisResult {
    AnalysisResult {
        clusters: analyze_clusters(stream),
        rhythm: analyze_rhythm(stream),
        complexity: analyze_complexity(stream, duration_seconds),
        pattern_type: PatternType::classify(stream.len()),
    }
}

pub fn analyze_clusters(stream: &[Detection]) -> ClusterAnalysis {
    if stream.is_empty() {
        return ClusterAnalysis::default();
    }

    let count = stream.len() as f64;
    let centroid = (
        stream.iter().map(|d| d.x).sum::<f64>() / count,
        stream.iter().map(|d| d.y).sum::<f64>() / count,
    );

    // Upper triangle only: each pair once, no self-distances.
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in stream.iter().enumerate() {
        for b in &stream[i + 1..] {
            total += a.distance_to(b);
            pairs += 1;
        }
    }
    let spread = if pairs == 0 { 0.0 } else { total / pairs as f64 };

    ClusterAnalysis {
        clusters: (10.0 - spread / 100.0).max(1.0) as u32,
        spread,
        centroid: Some(centroid),
    }
}

pub fn analyze_rhythm(stream: &[Detection]) -> RhythmAnalysis {
    if stream.len() < 2 {
        return RhythmAnalysis::default();
    }

    let mut times: Vec<f64> = stream.iter().map(|d| d.timestamp).collect();
    times.sort_by(f64::total_cmp);
    let intervals: Vec<f64> = times.windows(2).map(|pair| pair[1] - pair[0]).collect();

    let (mean_interval, std_interval) = mean_and_std(&intervals);
    let rhythm_score = (100.0 - std_interval * 100.0).max(0.0);

    RhythmAnalysis {
        rhythm_score,
        mean_interval,
        std_interval,
        intervals: intervals.into_iter().take(MAX_REPORTED_INTERVALS).collect(),
    }
}

pub fn analyze_complexity(stream: &[Detection], duration_seconds: i64) -> f64 {
    if stream.is_empty() {
        return 0.0;
    }

    let density = stream.len() as f64 / duration_seconds.max(1) as f64;
    let (min_radius, max_radius) = stream
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), d| {
            (low.min(d.radius), high.max(d.radius))
        });
    let spread = max_radius - min_radius;

    (density * 20.0 + spread * 0.5).min(100.0)
}

/// Population mean and standard deviation; `(0, 0)` for an empty slice.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    (mean, variance.sqrt())
}
