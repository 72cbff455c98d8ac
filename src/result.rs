//! The record a finished session hands to the outside world.

use crate::core_modules::difficulty::{DifficultyLevel, Strategy};
use crate::core_modules::participant::ParticipantStats;
use crate::core_modules::pattern_analyzer::{ClusterAnalysis, PatternType, RhythmAnalysis};
use crate::core_modules::privacy;
use crate::core_modules::scoring::{RankingEntry, SessionStatus};
use crate::core_modules::stream_correlator::StreamTotals;
use crate::error::RainstreamResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub metadata: Metadata,
    pub players: Vec<ParticipantStats>,
    pub agent: AgentReport,
    pub analysis: AnalysisBlock,
    pub ranking: Vec<RankingEntry>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub session_id: String,
    /// When the session was created.
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: i64,
    pub fps: f64,
    pub frames_processed: u64,
    pub total_patterns: u64,
    pub avg_detections_per_frame: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    pub stats: ParticipantStats,
    pub difficulty: DifficultyLevel,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBlock {
    pub pattern_complexity: f64,
    pub cluster_analysis: ClusterAnalysis,
    pub rhythm_analysis: RhythmAnalysis,
    pub pattern_type: PatternType,
    pub total_detections: u64,
    /// Drops attributed to each human, in registration order.
    pub partition_detections: Vec<u64>,
    pub streams: StreamTotals,
}

impl SessionResult {
    pub fn is_empty(&self) -> bool {
        self.status == SessionStatus::NoPatternsDetected
    }

    pub fn to_json_value(&self) -> RainstreamResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> RainstreamResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether the serialized record is free of forbidden fields.
    pub fn passes_privacy_check(&self) -> RainstreamResult<bool> {
        Ok(privacy::validate_no_pii(&self.to_json_value()?))
    }
}
