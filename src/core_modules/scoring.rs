// THEORY:
// The `ScoringAggregator` closes a session. It stands in for real per-player
// hit detection with a deliberately simple model:
//
// 1.  **Partition**: the frame is cut into vertical bands by the configured
//     boundaries, and every drop belongs to the human who owns its band.
// 2.  **Trials**: each drop is one Bernoulli trial for its owner, using that
//     human's fixed hit probability and the shared scoring rule.
// 3.  **Ranking**: participants are stably sorted by score and ranked 1..N,
//     so ties keep registration order. The agent registers at the configured
//     slot among the humans, after the first human by default.
//
// A session without a single drop is not an error. It ends in the distinct
// `NoPatternsDetected` state with zeroed stats.

use crate::config::{HumanConfig, PartitionConfig};
use crate::core_modules::detection::Detection;
use crate::core_modules::participant::ParticipantStats;
use crate::core_modules::pattern_analyzer::{self, AnalysisResult};
use serde::{Deserialize, Serialize};

/// Spreads seed slots apart so neighbouring participants get unrelated streams.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Independent generator for the participant in `slot`, derived from the session seed.
pub fn participant_rng(seed: Option<u64>, slot: u64) -> fastrand::Rng {
    match seed {
        Some(seed) => fastrand::Rng::with_seed(seed.wrapping_add(slot.wrapping_mul(SEED_STRIDE))),
        None => fastrand::Rng::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Completed,
    NoPatternsDetected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: u32,
    pub participant_name: String,
    pub score: u64,
}

/// Everything `aggregate` derives from a closed stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Scoreboard {
    pub players: Vec<ParticipantStats>,
    pub agent: ParticipantStats,
    pub ranking: Vec<RankingEntry>,
    pub analysis: AnalysisResult,
    /// Drops attributed to each human, in registration order.
    pub partition_detections: Vec<u64>,
    pub status: SessionStatus,
}

struct HumanParticipant {
    hit_probability: f64,
    stats: ParticipantStats,
    rng: fastrand::Rng,
}

pub struct ScoringAggregator {
    partition: PartitionConfig,
    humans: Vec<HumanParticipant>,
}

impl ScoringAggregator {
    /// Humans take seed slots `1..=n`; slot 0 belongs to the agent.
    pub fn new(partition: &PartitionConfig, seed: Option<u64>) -> Self {
        let humans = partition
            .humans
            .iter()
            .zip(1u64..)
            .map(|(HumanConfig { name, hit_probability }, slot)| HumanParticipant {
                hit_probability: *hit_probability,
                stats: ParticipantStats::new(name.clone()),
                rng: participant_rng(seed, slot),
            })
            .collect();
        Self {
            partition: partition.clone(),
            humans,
        }
    }

    /// Runs one trial per drop for the human who owns its band.
    /// Returns the number of drops attributed to each human.
    pub fn score_humans(&mut self, detections: &[Detection]) -> Vec<u64> {
        let mut attributed = vec![0u64; self.humans.len()];
        for drop in detections {
            let band = self.partition.band_of(drop.x);
            let Some(human) = self.humans.get_mut(band) else {
                continue;
            };
            let hit = human.rng.f64() < human.hit_probability;
            human.stats.record_trial(hit);
            attributed[band] += 1;
        }
        attributed
    }

    pub fn aggregate(
        mut self,
        detections: &[Detection],
        mut agent: ParticipantStats,
        duration_seconds: i64,
    ) -> Scoreboard {
        let partition_detections = self.score_humans(detections);

        let mut players: Vec<ParticipantStats> =
            self.humans.into_iter().map(|human| human.stats).collect();
        for player in &mut players {
            player.finalize();
        }
        agent.finalize();

        let mut registered: Vec<&ParticipantStats> = players.iter().collect();
        registered.insert(self.partition.agent_slot.min(players.len()), &agent);
        let ranking = build_ranking(registered);
        let status = if detections.is_empty() {
            SessionStatus::NoPatternsDetected
        } else {
            SessionStatus::Completed
        };

        Scoreboard {
            analysis: pattern_analyzer::analyze(detections, duration_seconds),
            players,
            agent,
            ranking,
            partition_detections,
            status,
        }
    }
}

/// Sorts by score, highest first. Equal scores keep registration order.
pub fn build_ranking<'a>(
    participants: impl IntoIterator<Item = &'a ParticipantStats>,
) -> Vec<RankingEntry> {
    let mut ordered: Vec<&ParticipantStats> = participants.into_iter().collect();
    ordered.sort_by(|a, b| b.score.cmp(&a.score));
    ordered
        .into_iter()
        .zip(1u32..)
        .map(|(stats, rank)| RankingEntry {
            rank,
            participant_name: stats.name.clone(),
            score: stats.score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::drop_at;
    use proptest::prelude::*;

    fn partition(probabilities: [f64; 2]) -> PartitionConfig {
        PartitionConfig {
            boundaries: vec![512.0],
            humans: vec![
                HumanConfig {
                    name: "Player 1".to_string(),
                    hit_probability: probabilities[0],
                },
                HumanConfig {
                    name: "Player 2".to_string(),
                    hit_probability: probabilities[1],
                },
            ],
            agent_slot: 1,
        }
    }

    #[test]
    fn drops_split_on_the_boundary() {
        let mut aggregator = ScoringAggregator::new(&partition([1.0, 1.0]), Some(1));
        let drops = [
            drop_at(100.0, 50.0, 5.0, 0, 0.0),
            drop_at(511.9, 50.0, 5.0, 0, 0.0),
            drop_at(512.0, 50.0, 5.0, 0, 0.0),
        ];
        assert_eq!(aggregator.score_humans(&drops), vec![2, 1]);
    }

    #[test]
    fn certain_outcomes_score_deterministically() {
        let aggregator = ScoringAggregator::new(&partition([1.0, 0.0]), None);
        let drops: Vec<Detection> = (0..3)
            .map(|i| drop_at(100.0, 50.0, 5.0, i, i as f64))
            .chain(std::iter::once(drop_at(900.0, 50.0, 5.0, 3, 3.0)))
            .collect();
        let board = aggregator.aggregate(&drops, ParticipantStats::new("AI Opponent"), 10);

        assert_eq!(board.status, SessionStatus::Completed);
        assert_eq!(board.players[0].score, 60);
        assert_eq!(board.players[0].accuracy, 100.0);
        assert_eq!(board.players[1].misses, 1);
        assert_eq!(board.players[1].accuracy, 0.0);
        assert_eq!(board.partition_detections, vec![3, 1]);
        assert_eq!(board.ranking[0].participant_name, "Player 1");
        assert_eq!(board.analysis.pattern_type.to_string(), "SPARSE");
    }

    #[test]
    fn empty_stream_ties_everyone_in_registration_order() {
        let aggregator = ScoringAggregator::new(&partition([0.85, 0.80]), Some(3));
        let board = aggregator.aggregate(&[], ParticipantStats::new("AI Opponent"), 30);

        assert_eq!(board.status, SessionStatus::NoPatternsDetected);
        let names: Vec<&str> = board
            .ranking
            .iter()
            .map(|entry| entry.participant_name.as_str())
            .collect();
        assert_eq!(names, ["Player 1", "AI Opponent", "Player 2"]);
        assert!(board.ranking.iter().all(|entry| entry.score == 0));
        assert_eq!(board.analysis.complexity, 0.0);
    }

    #[test]
    fn agent_ties_break_on_its_registration_slot() {
        // One certain hit each, so all three tie on 15.
        let drops = [
            drop_at(100.0, 50.0, 5.0, 0, 0.0),
            drop_at(900.0, 50.0, 5.0, 0, 0.0),
        ];
        let mut agent = ParticipantStats::new("AI Opponent");
        agent.record_trial(true);

        let board = ScoringAggregator::new(&partition([1.0, 1.0]), Some(5))
            .aggregate(&drops, agent.clone(), 10);
        let names: Vec<&str> = board.ranking.iter().map(|e| e.participant_name.as_str()).collect();
        assert_eq!(names, ["Player 1", "AI Opponent", "Player 2"]);

        let mut last = partition([1.0, 1.0]);
        last.agent_slot = 2;
        let board = ScoringAggregator::new(&last, Some(5)).aggregate(&drops, agent, 10);
        let names: Vec<&str> = board.ranking.iter().map(|e| e.participant_name.as_str()).collect();
        assert_eq!(names, ["Player 1", "Player 2", "AI Opponent"]);
    }

    #[test]
    fn participant_rngs_are_reproducible_and_distinct() {
        let draw = |slot| participant_rng(Some(11), slot).u64(..);
        assert_eq!(draw(1), draw(1));
        assert_ne!(draw(0), draw(1));
    }

    proptest! {
        #[test]
        fn ranking_is_sorted_and_contiguous(scores in proptest::collection::vec(0u64..500, 0..12)) {
            let participants: Vec<ParticipantStats> = scores
                .iter()
                .enumerate()
                .map(|(i, &score)| {
                    let mut stats = ParticipantStats::new(format!("p{i}"));
                    stats.score = score;
                    stats
                })
                .collect();
            let ranking = build_ranking(&participants);

            prop_assert_eq!(ranking.len(), participants.len());
            for (expected_rank, entry) in (1u32..).zip(&ranking) {
                prop_assert_eq!(entry.rank, expected_rank);
            }
            for pair in ranking.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    // Stable: lower registration index first.
                    let index = |name: &str| name[1..].parse::<usize>().unwrap();
                    prop_assert!(index(&pair[0].participant_name) < index(&pair[1].participant_name));
                }
            }
        }
    }
}
