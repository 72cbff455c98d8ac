// THEORY:
// `ParticipantStats` is the running scoreboard of one competitor, human or
// agent. It is mutated one trial at a time and finalized exactly once at the
// end of the session. Every participant shares the same update rule:
//
// - hit:  hits += 1, combo += 1, score += 10 + 5 * combo (post-increment combo)
// - miss: misses += 1, combo = 0
//
// `combo_max` follows the running maximum after every trial, and `accuracy`
// is derived only at finalization.

use serde::{Deserialize, Serialize};

pub const BASE_HIT_POINTS: u64 = 10;
pub const COMBO_HIT_POINTS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStats {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    /// Consecutive hits since the last miss.
    pub combo: u64,
    pub combo_max: u64,
    pub score: u64,
    /// Percentage of trials that were hits, rounded to two decimals.
    /// Stays 0 until `finalize` runs.
    pub accuracy: f64,
    /// Seconds between a drop becoming visible and the reaction to it.
    pub reaction_times: Vec<f64>,
    pub pattern_bonus: u64,
}

impl ParticipantStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: 0,
            misses: 0,
            combo: 0,
            combo_max: 0,
            score: 0,
            accuracy: 0.0,
            reaction_times: Vec::new(),
            pattern_bonus: 0,
        }
    }

    pub fn record_trial(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
            self.combo += 1;
            self.score += BASE_HIT_POINTS + COMBO_HIT_POINTS * self.combo;
        } else {
            self.misses += 1;
            self.combo = 0;
        }
        self.combo_max = self.combo_max.max(self.combo);
    }

    pub fn trials(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn finalize(&mut self) {
        self.accuracy = accuracy_percent(self.hits, self.trials());
    }
}

/// `round(100 * hits / trials, 2)`, or 0 when there were no trials.
pub fn accuracy_percent(hits: u64, trials: u64) -> f64 {
    if trials == 0 {
        return 0.0;
    }
    (hits as f64 / trials as f64 * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hits_build_combo_and_score() {
        let mut stats = ParticipantStats::new("Player 1");
        stats.record_trial(true);
        stats.record_trial(true);
        stats.record_trial(true);
        // 15 + 20 + 25
        assert_eq!(stats.score, 60);
        assert_eq!(stats.combo, 3);
        assert_eq!(stats.combo_max, 3);
    }

    #[test]
    fn miss_resets_combo_but_keeps_max() {
        let mut stats = ParticipantStats::new("Player 2");
        for hit in [true, true, false, true] {
            stats.record_trial(hit);
        }
        assert_eq!(stats.combo, 1);
        assert_eq!(stats.combo_max, 2);
        assert_eq!(stats.score, 15 + 20 + 15);
        assert_eq!((stats.hits, stats.misses), (3, 1));
    }

    #[test]
    fn finalize_without_trials_is_zero() {
        let mut stats = ParticipantStats::new("idle");
        stats.finalize();
        assert_eq!(stats.accuracy, 0.0);
    }

    #[test]
    fn accuracy_rounds_to_two_decimals() {
        assert_eq!(accuracy_percent(1, 3), 33.33);
        assert_eq!(accuracy_percent(2, 3), 66.67);
        assert_eq!(accuracy_percent(3, 3), 100.0);
    }

    proptest! {
        #[test]
        fn trial_accounting_holds(outcomes in proptest::collection::vec(any::<bool>(), 0..200)) {
            let mut stats = ParticipantStats::new("prop");
            for &hit in &outcomes {
                stats.record_trial(hit);
            }
            stats.finalize();

            let hits = outcomes.iter().filter(|&&hit| hit).count() as u64;
            prop_assert_eq!(stats.trials(), outcomes.len() as u64);
            prop_assert_eq!(stats.hits, hits);
            prop_assert_eq!(stats.accuracy, accuracy_percent(hits, outcomes.len() as u64));
            prop_assert!(stats.combo <= stats.combo_max);
            prop_assert!((0.0..=100.0).contains(&stats.accuracy));
        }
    }
}
