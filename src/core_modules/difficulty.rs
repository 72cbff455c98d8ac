// THEORY:
// Difficulty is resolved exactly once, when a session is built. The tag from
// the configuration becomes a `DifficultyLevel`, and the level becomes a fully
// parameterised `DifficultyProfile`. The agent then holds the profile and
// never branches on the tag again.
//
// Harder levels are strictly better on every axis: higher accuracy, lower
// reaction latency, and a longer prediction range.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

/// Target selection policy of the synthetic competitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Strategy {
    /// Uniformly random visible drop.
    Random,
    /// Largest visible drop.
    Cluster,
    /// Earliest visible drop.
    Predictive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    pub level: DifficultyLevel,
    pub strategy: Strategy,
    /// Probability that a decision is a hit, in [0, 1].
    pub accuracy: f64,
    pub reaction_latency_ms: u32,
    /// How many frames ahead the agent is allowed to look.
    pub prediction_range: u32,
}

impl DifficultyProfile {
    pub fn for_level(level: DifficultyLevel) -> Self {
        let (strategy, accuracy, reaction_latency_ms, prediction_range) = match level {
            DifficultyLevel::Easy => (Strategy::Random, 0.45, 350, 30),
            DifficultyLevel::Medium => (Strategy::Cluster, 0.75, 180, 60),
            DifficultyLevel::Hard => (Strategy::Predictive, 0.95, 80, 120),
        };
        Self {
            level,
            strategy,
            accuracy,
            reaction_latency_ms,
            prediction_range,
        }
    }

    pub fn reaction_latency_secs(&self) -> f64 {
        self.reaction_latency_ms as f64 / 1000.0
    }
}

impl From<DifficultyLevel> for DifficultyProfile {
    fn from(level: DifficultyLevel) -> Self {
        Self::for_level(level)
    }
}
