//! Session configuration.
//!
//! Every tunable of the engine lives here so that a session can be described
//! by a single JSON document. Nothing is coerced: `validate` rejects a bad
//! value instead of clamping it.

use crate::core_modules::difficulty::DifficultyLevel;
use crate::error::{RainstreamError, RainstreamResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Top-level configuration for one competitive session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session length in seconds. Frames past `duration_seconds * fps` are ignored.
    pub duration_seconds: i64,
    /// Frame rate of the incoming video, used to timestamp detections.
    pub fps: f64,
    /// Difficulty tag of the synthetic competitor: "easy", "medium" or "hard".
    pub difficulty: String,
    /// Seed for every Bernoulli trial in the session. `None` draws from entropy.
    pub seed: Option<u64>,
    /// Length of one agent decision window. Defaults to the profile's reaction latency.
    pub agent_window_secs: Option<f64>,
    pub partition: PartitionConfig,
    pub detector: DetectorConfig,
    pub correlator: CorrelatorConfig,
    pub logging: LoggingConfig,
}

/// How detections are split between the human participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Vertical split points on the x axis, strictly ascending.
    /// `n` boundaries produce `n + 1` bands, left to right.
    pub boundaries: Vec<f64>,
    /// One participant per band, in registration order.
    pub humans: Vec<HumanConfig>,
    /// Registration position of the agent among the humans; 1 puts it after the first human.
    pub agent_slot: usize,
}

/// A human participant and the fixed probability that they catch a drop in their band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanConfig {
    pub name: String,
    pub hit_probability: f64,
}

/// How a frame is turned into a binary detection mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MaskMode {
    /// Keep pixels whose HSV coordinates fall inside all three bands.
    ColorBand {
        /// Hue band in degrees, `[0, 360)`.
        hue_range_deg: (f32, f32),
        /// HSV saturation band, `[0, 1]`.
        saturation_range: (f32, f32),
        /// HSV value band, `[0, 1]`.
        value_range: (f32, f32),
        color_tag: String,
    },
    /// Gaussian-blurred luminance binarized at a fixed threshold.
    Bright {
        blur_sigma: f32,
        /// Pixels strictly brighter than this survive.
        threshold: u8,
        color_tag: String,
    },
}

/// Tunables for `BlobDetector`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub mask: MaskMode,
    /// Side of the elliptical structuring element used for close/open.
    pub kernel_size: u32,
    pub min_area: f64,
    pub max_area: f64,
    pub min_radius: f64,
    pub max_radius: f64,
}

/// Tunables for `StreamCorrelator` and stream grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Furthest a drop may travel between consecutive frames and still be matched.
    pub max_movement: f64,
    /// Same-frame neighbourhood radius for stream grouping and classification.
    pub proximity_radius: f64,
    /// Stream groups whose centres are closer than this are duplicates.
    pub dedup_radius: f64,
    /// Used for velocity when two frames carry the same timestamp.
    pub frame_interval_secs: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "rainstream_vision=debug,warn").
    pub level: String,
    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 30,
            fps: 30.0,
            difficulty: "medium".to_string(),
            seed: None,
            agent_window_secs: None,
            partition: PartitionConfig::default(),
            detector: DetectorConfig::default(),
            correlator: CorrelatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            boundaries: vec![512.0],
            humans: vec![
                HumanConfig {
                    name: "Player 1".to_string(),
                    hit_probability: 0.85,
                },
                HumanConfig {
                    name: "Player 2".to_string(),
                    hit_probability: 0.80,
                },
            ],
            agent_slot: 1,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::color_band()
    }
}

impl DetectorConfig {
    /// Blue raindrop preset.
    pub fn color_band() -> Self {
        Self {
            mask: MaskMode::ColorBand {
                hue_range_deg: (180.0, 260.0),
                saturation_range: (100.0 / 255.0, 1.0),
                value_range: (100.0 / 255.0, 1.0),
                color_tag: "blue".to_string(),
            },
            kernel_size: 5,
            min_area: 50.0,
            max_area: 5000.0,
            min_radius: 3.0,
            max_radius: 80.0,
        }
    }

    /// Bright droplet on a windshield preset.
    pub fn bright() -> Self {
        Self {
            mask: MaskMode::Bright {
                blur_sigma: 2.6,
                threshold: 200,
                color_tag: "bright".to_string(),
            },
            kernel_size: 5,
            min_area: 20.0,
            max_area: 5000.0,
            min_radius: 2.0,
            max_radius: 80.0,
        }
    }

    pub fn validate(&self) -> RainstreamResult<()> {
        if self.kernel_size == 0 {
            return Err(RainstreamError::config("kernel_size must be at least 1"));
        }
        check_band("area", (self.min_area, self.max_area))?;
        check_band("radius", (self.min_radius, self.max_radius))?;
        if self.min_area < 0.0 || self.min_radius < 0.0 {
            return Err(RainstreamError::config("area and radius bounds must be non-negative"));
        }
        match &self.mask {
            MaskMode::ColorBand {
                hue_range_deg,
                saturation_range,
                value_range,
                ..
            } => {
                check_band("hue", widen(*hue_range_deg))?;
                check_band("saturation", widen(*saturation_range))?;
                check_band("value", widen(*value_range))?;
            }
            MaskMode::Bright { blur_sigma, .. } => {
                if !(*blur_sigma >= 0.0) {
                    return Err(RainstreamError::config("blur_sigma must be non-negative"));
                }
            }
        }
        Ok(())
    }
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            max_movement: 100.0,
            proximity_radius: 50.0,
            dedup_radius: 30.0,
            frame_interval_secs: 1.0 / 30.0,
        }
    }
}

impl CorrelatorConfig {
    pub fn validate(&self) -> RainstreamResult<()> {
        for (name, value) in [
            ("max_movement", self.max_movement),
            ("proximity_radius", self.proximity_radius),
            ("dedup_radius", self.dedup_radius),
            ("frame_interval_secs", self.frame_interval_secs),
        ] {
            if !(value > 0.0) {
                return Err(RainstreamError::config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl PartitionConfig {
    pub fn validate(&self) -> RainstreamResult<()> {
        if self.humans.len() != self.boundaries.len() + 1 {
            return Err(RainstreamError::config(format!(
                "{} boundaries need {} human participants, got {}",
                self.boundaries.len(),
                self.boundaries.len() + 1,
                self.humans.len()
            )));
        }
        if self.boundaries.windows(2).any(|pair| !(pair[0] < pair[1])) {
            return Err(RainstreamError::config(
                "partition boundaries must be strictly ascending",
            ));
        }
        if self.agent_slot > self.humans.len() {
            return Err(RainstreamError::config(format!(
                "agent slot {} is past the {} human participants",
                self.agent_slot,
                self.humans.len()
            )));
        }
        for human in &self.humans {
            if !(0.0..=1.0).contains(&human.hit_probability) {
                return Err(RainstreamError::config(format!(
                    "hit probability of {} must lie in [0, 1], got {}",
                    human.name, human.hit_probability
                )));
            }
        }
        Ok(())
    }

    /// Index of the band a point with this x coordinate belongs to.
    /// A point exactly on a boundary belongs to the band on its right.
    pub fn band_of(&self, x: f64) -> usize {
        self.boundaries.partition_point(|&boundary| boundary <= x)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> RainstreamResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> RainstreamResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Checks every field and returns the parsed difficulty level.
    pub fn validate(&self) -> RainstreamResult<DifficultyLevel> {
        if self.duration_seconds <= 0 {
            return Err(RainstreamError::config(format!(
                "duration_seconds must be positive, got {}",
                self.duration_seconds
            )));
        }
        if !(self.fps > 0.0) || !self.fps.is_finite() {
            return Err(RainstreamError::config(format!(
                "fps must be positive, got {}",
                self.fps
            )));
        }
        if let Some(window) = self.agent_window_secs {
            if !(window > 0.0) {
                return Err(RainstreamError::config(format!(
                    "agent_window_secs must be positive, got {window}"
                )));
            }
        }
        let level = DifficultyLevel::from_str(&self.difficulty).map_err(|_| {
            RainstreamError::InvalidDifficulty {
                tag: self.difficulty.clone(),
            }
        })?;
        self.partition.validate()?;
        self.detector.validate()?;
        self.correlator.validate()?;
        Ok(level)
    }

    /// Number of frames the session accepts before its duration expires.
    pub fn max_frames(&self) -> u64 {
        (self.duration_seconds as f64 * self.fps) as u64
    }
}

fn widen((low, high): (f32, f32)) -> (f64, f64) {
    (low as f64, high as f64)
}

fn check_band(name: &str, (low, high): (f64, f64)) -> RainstreamResult<()> {
    if !(low <= high) {
        return Err(RainstreamError::config(format!(
            "{name} band is inverted: [{low}, {high}]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let level = SessionConfig::default().validate().expect("defaults validate");
        assert_eq!(level, DifficultyLevel::Medium);
    }

    #[test]
    fn rejects_non_positive_duration() {
        let mut config = SessionConfig::default();
        config.duration_seconds = 0;
        assert!(matches!(config.validate(), Err(RainstreamError::Config { .. })));
        config.duration_seconds = -5;
        assert!(matches!(config.validate(), Err(RainstreamError::Config { .. })));
    }

    #[test]
    fn rejects_unknown_difficulty() {
        let mut config = SessionConfig::default();
        config.difficulty = "nightmare".to_string();
        match config.validate() {
            Err(RainstreamError::InvalidDifficulty { tag }) => assert_eq!(tag, "nightmare"),
            other => panic!("expected InvalidDifficulty, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut config = SessionConfig::default();
        config.detector.min_area = 6000.0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.detector.min_radius = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_partition() {
        let mut config = SessionConfig::default();
        config.partition.boundaries = vec![300.0, 600.0];
        assert!(config.validate().is_err());

        config.partition.boundaries = vec![600.0, 300.0];
        config.partition.humans.push(HumanConfig {
            name: "Player 3".to_string(),
            hit_probability: 0.5,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn agent_slot_must_fall_within_the_roster() {
        let mut config = SessionConfig::default();
        assert_eq!(config.partition.agent_slot, 1);

        config.partition.agent_slot = 2;
        assert!(config.validate().is_ok());

        config.partition.agent_slot = 3;
        assert!(matches!(
            config.validate(),
            Err(RainstreamError::Config { .. })
        ));
    }

    #[test]
    fn band_of_splits_on_midline() {
        let partition = PartitionConfig::default();
        assert_eq!(partition.band_of(0.0), 0);
        assert_eq!(partition.band_of(511.9), 0);
        assert_eq!(partition.band_of(512.0), 1);
        assert_eq!(partition.band_of(1000.0), 1);
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{ "duration_seconds": 10, "difficulty": "HARD", "seed": 7,
                 "detector": { "mask": { "mode": "bright", "blur_sigma": 1.0,
                                         "threshold": 180, "color_tag": "bright" } } }"#,
        )
        .expect("valid json config");
        assert_eq!(config.duration_seconds, 10);
        assert_eq!(config.fps, 30.0);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_frames(), 300);
        assert!(matches!(config.detector.mask, MaskMode::Bright { threshold: 180, .. }));
    }
}
