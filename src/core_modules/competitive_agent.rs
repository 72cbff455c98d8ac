// THEORY:
// The `CompetitiveAgent` is the synthetic opponent. Its behaviour is fully
// described by a `DifficultyProfile` that is fixed when the agent is built:
//
// 1.  **Visibility**: a decision only considers drops whose timestamp is at
//     or before the window bound. Anything later has not happened yet.
// 2.  **Targeting**: the profile's strategy picks one visible drop.
//     - `Random` picks uniformly.
//     - `Cluster` picks the largest radius (first one on ties).
//     - `Predictive` picks the earliest, i.e. the lowest index.
// 3.  **Outcome**: independent of the target, a Bernoulli trial with the
//     profile's accuracy decides hit or miss, and the agent's stats follow
//     the shared scoring rule.
//
// The agent owns its random generator. Seeding it makes a whole session's
// decisions reproducible.

use crate::core_modules::detection::Detection;
use crate::core_modules::difficulty::{DifficultyProfile, Strategy};
use crate::core_modules::participant::ParticipantStats;
use serde::{Deserialize, Serialize};

pub const AGENT_NAME: &str = "AI Opponent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Hit,
    Miss,
}

/// The result of one decision window that had at least one visible drop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Index of the chosen drop in the visible slice offered to `decide`.
    pub target: usize,
    pub outcome: Outcome,
    pub window_bound: f64,
}

pub struct CompetitiveAgent {
    profile: DifficultyProfile,
    stats: ParticipantStats,
    rng: fastrand::Rng,
    decisions: u64,
}

impl CompetitiveAgent {
    pub fn new(profile: DifficultyProfile, rng: fastrand::Rng) -> Self {
        Self {
            profile,
            stats: ParticipantStats::new(AGENT_NAME),
            rng,
            decisions: 0,
        }
    }

    pub fn with_seed(profile: DifficultyProfile, seed: u64) -> Self {
        Self::new(profile, fastrand::Rng::with_seed(seed))
    }

    pub fn profile(&self) -> &DifficultyProfile {
        &self.profile
    }

    pub fn stats(&self) -> &ParticipantStats {
        &self.stats
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    /// Makes one decision over the drops visible at `window_bound`.
    /// Returns `None` without touching the stats when nothing is visible.
    pub fn decide(&mut self, visible: &[Detection], window_bound: f64) -> Option<Decision> {
        let candidates: Vec<usize> = visible
            .iter()
            .enumerate()
            .filter(|(_, drop)| drop.timestamp <= window_bound)
            .map(|(index, _)| index)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let target = self.select_target(visible, &candidates);
        let hit = self.rng.f64() < self.profile.accuracy;
        self.stats.record_trial(hit);
        self.stats
            .reaction_times
            .push(self.profile.reaction_latency_secs());
        self.decisions += 1;

        let outcome = if hit { Outcome::Hit } else { Outcome::Miss };
        tracing::trace!(target, ?outcome, window_bound, "agent decision");
        Some(Decision {
            target,
            outcome,
            window_bound,
        })
    }

    fn select_target(&mut self, visible: &[Detection], candidates: &[usize]) -> usize {
        match self.profile.strategy {
            Strategy::Random => candidates[self.rng.usize(..candidates.len())],
            Strategy::Cluster => {
                let mut best = candidates[0];
                for &index in &candidates[1..] {
                    if visible[index].radius > visible[best].radius {
                        best = index;
                    }
                }
                best
            }
            Strategy::Predictive => candidates[0],
        }
    }

    /// Computes the agent's accuracy and hands back its final stats.
    pub fn finalize(mut self) -> ParticipantStats {
        self.stats.finalize();
        self.stats
    }
}
