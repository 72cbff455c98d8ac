// THEORY:
// The `pipeline` module is the top-level API of the engine. A `Session` wraps
// the whole stack behind three calls:
//
// 1.  `process_frame` runs the per-frame path: blob detection, an append to
//     the session's `DetectionStream`, and correlation against the previous
//     frame. Frames are handled strictly one after another.
// 2.  `ingest_detections` is the same path for detections produced elsewhere,
//     e.g. by the `ParallelDetector`.
// 3.  `finish` closes the session. The agent replays the stream in decision
//     windows, the humans get their trials, the stream is analysed, and
//     everything is folded into one `SessionResult`.
//
// The duration is the only lifecycle control. Once `duration_seconds * fps`
// frames have been seen, further frames are ignored rather than rejected.

use crate::config::SessionConfig;
use crate::core_modules::blob_detector::blob_detector::BlobDetector;
use crate::core_modules::competitive_agent::CompetitiveAgent;
use crate::core_modules::detection::{Detection, DetectionId, DetectionStream};
use crate::core_modules::difficulty::DifficultyProfile;
use crate::core_modules::scoring::{ScoringAggregator, SessionStatus, participant_rng};
use crate::core_modules::stream_correlator::{CorrelationReport, StreamCorrelator};
use crate::error::{RainstreamError, RainstreamResult};
use crate::result::{AgentReport, AnalysisBlock, Metadata, SessionResult};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use std::ops::Range;

/// Seed slot of the agent; humans use `1..=n`.
const AGENT_SEED_SLOT: u64 = 0;

/// What one accepted frame contributed to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Where this frame's detections live in `Session::stream`.
    pub detection_ids: Range<DetectionId>,
    pub correlation: CorrelationReport,
}

impl FrameReport {
    pub fn detection_count(&self) -> usize {
        self.detection_ids.len()
    }
}

/// One competitive session over a single clip.
pub struct Session {
    config: SessionConfig,
    profile: DifficultyProfile,
    detector: BlobDetector,
    correlator: StreamCorrelator,
    agent: CompetitiveAgent,
    aggregator: ScoringAggregator,
    stream: DetectionStream,
    max_frames: u64,
    next_frame_index: u64,
    frames_processed: u64,
    expired: bool,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(config: SessionConfig) -> RainstreamResult<Self> {
        let level = config.validate()?;
        let profile = DifficultyProfile::for_level(level);
        let detector = BlobDetector::new(config.detector.clone())?;
        let correlator = StreamCorrelator::new(config.correlator.clone());
        let agent = CompetitiveAgent::new(
            profile.clone(),
            participant_rng(config.seed, AGENT_SEED_SLOT),
        );
        let aggregator = ScoringAggregator::new(&config.partition, config.seed);
        let started_at = Utc::now();

        tracing::info!(
            difficulty = %level,
            strategy = %profile.strategy,
            duration_seconds = config.duration_seconds,
            fps = config.fps,
            humans = config.partition.humans.len(),
            seeded = config.seed.is_some(),
            "session started"
        );

        Ok(Self {
            max_frames: config.max_frames(),
            config,
            profile,
            detector,
            correlator,
            agent,
            aggregator,
            stream: DetectionStream::new(),
            next_frame_index: 0,
            frames_processed: 0,
            expired: false,
            started_at,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn profile(&self) -> &DifficultyProfile {
        &self.profile
    }

    pub fn stream(&self) -> &DetectionStream {
        &self.stream
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Index the next call to `process_frame` will assign.
    pub fn next_frame_index(&self) -> u64 {
        self.next_frame_index
    }

    pub fn is_expired(&self) -> bool {
        self.next_frame_index >= self.max_frames
    }

    /// Detects, stores and correlates one frame. `None` once the duration has expired.
    pub fn process_frame(&mut self, frame: &RgbaImage) -> RainstreamResult<Option<FrameReport>> {
        let frame_index = self.next_frame_index;
        if frame_index >= self.max_frames {
            self.note_expiry(frame_index);
            return Ok(None);
        }
        let detections = self.detector.detect(frame, frame_index, self.config.fps)?;
        self.ingest_detections(frame_index, detections)
    }

    /// Stores and correlates detections produced outside the session.
    pub fn ingest_detections(
        &mut self,
        frame_index: u64,
        detections: Vec<Detection>,
    ) -> RainstreamResult<Option<FrameReport>> {
        if frame_index >= self.max_frames {
            self.note_expiry(frame_index);
            return Ok(None);
        }
        // Each frame is correlated exactly once, so a frame cannot be extended after the fact.
        if self.frames_processed > 0 && frame_index < self.next_frame_index {
            return Err(RainstreamError::FrameOrder {
                frame_index,
                last_frame_index: self.next_frame_index - 1,
            });
        }

        let detection_ids = self.stream.push_frame(frame_index, detections)?;
        let correlation = self
            .correlator
            .advance(&self.stream.as_slice()[detection_ids.clone()]);
        self.frames_processed += 1;
        self.next_frame_index = frame_index + 1;

        tracing::debug!(
            frame_index,
            detections = detection_ids.len(),
            transitions = correlation.transitions.len(),
            established = correlation.established.len(),
            "frame processed"
        );

        Ok(Some(FrameReport {
            frame_index,
            detection_ids,
            correlation,
        }))
    }

    fn note_expiry(&mut self, frame_index: u64) {
        if !self.expired {
            self.expired = true;
            tracing::info!(
                frame_index,
                max_frames = self.max_frames,
                "session duration reached, ignoring further frames"
            );
        }
    }

    /// Length of one agent decision window, in seconds.
    fn agent_window(&self) -> f64 {
        self.config
            .agent_window_secs
            .unwrap_or_else(|| self.profile.reaction_latency_secs())
    }

    /// Offers the agent, window by window, the drops that arrived since the previous bound.
    fn run_agent(&mut self) {
        let window = self.agent_window();
        let duration = self.config.duration_seconds as f64;
        let detections = self.stream.as_slice();

        let mut start = 0;
        let mut step = 1u64;
        loop {
            let bound = (step as f64 * window).min(duration);
            let end = start + detections[start..].partition_point(|d| d.timestamp <= bound);
            if end > start {
                self.agent.decide(&detections[start..end], bound);
            }
            start = end;
            if bound >= duration {
                break;
            }
            step += 1;
        }
    }

    /// Closes the session and builds its result record.
    pub fn finish(mut self) -> RainstreamResult<SessionResult> {
        self.run_agent();

        let Session {
            config,
            profile,
            correlator,
            agent,
            aggregator,
            stream,
            frames_processed,
            started_at,
            ..
        } = self;

        let board = aggregator.aggregate(stream.as_slice(), agent.finalize(), config.duration_seconds);
        let total_patterns = stream.len() as u64;
        let avg_detections_per_frame = if frames_processed == 0 {
            0.0
        } else {
            total_patterns as f64 / frames_processed as f64
        };

        match board.status {
            SessionStatus::NoPatternsDetected => {
                tracing::warn!(frames_processed, "session ended without a single detection")
            }
            SessionStatus::Completed => tracing::info!(
                frames_processed,
                total_patterns,
                complexity = board.analysis.complexity,
                agent_score = board.agent.score,
                "session finished"
            ),
        }

        Ok(SessionResult {
            metadata: Metadata {
                session_id: started_at.format("%Y%m%d_%H%M%S").to_string(),
                timestamp: started_at,
                duration_seconds: config.duration_seconds,
                fps: config.fps,
                frames_processed,
                total_patterns,
                avg_detections_per_frame,
            },
            players: board.players,
            agent: AgentReport {
                stats: board.agent,
                difficulty: profile.level,
                strategy: profile.strategy,
            },
            analysis: AnalysisBlock {
                pattern_complexity: board.analysis.complexity,
                cluster_analysis: board.analysis.clusters,
                rhythm_analysis: board.analysis.rhythm,
                pattern_type: board.analysis.pattern_type,
                total_detections: total_patterns,
                partition_detections: board.partition_detections,
                streams: correlator.totals().clone(),
            },
            ranking: board.ranking,
            status: board.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::drop_at;
    use image::Rgba;

    fn short_config() -> SessionConfig {
        SessionConfig {
            duration_seconds: 1,
            fps: 10.0,
            seed: Some(17),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SessionConfig {
            difficulty: "impossible".to_string(),
            ..SessionConfig::default()
        };
        assert!(matches!(
            Session::new(config),
            Err(RainstreamError::InvalidDifficulty { .. })
        ));
    }

    #[test]
    fn frames_past_duration_are_ignored() {
        let mut session = Session::new(short_config()).unwrap();
        let frame = RgbaImage::from_pixel(64, 48, Rgba([0, 0, 0, 255]));
        for _ in 0..10 {
            assert!(session.process_frame(&frame).unwrap().is_some());
        }
        assert!(session.is_expired());
        assert!(session.process_frame(&frame).unwrap().is_none());
        assert_eq!(session.frames_processed(), 10);
    }

    #[test]
    fn ingested_frames_must_stay_ordered() {
        let mut session = Session::new(short_config()).unwrap();
        session
            .ingest_detections(4, vec![drop_at(10.0, 10.0, 5.0, 4, 0.4)])
            .unwrap();
        let err = session.ingest_detections(2, vec![]).unwrap_err();
        assert!(matches!(err, RainstreamError::FrameOrder { .. }));
    }

    #[test]
    fn repeated_frame_is_rejected_without_touching_the_session() {
        let mut session = Session::new(short_config()).unwrap();
        session
            .ingest_detections(0, vec![drop_at(100.0, 50.0, 5.0, 0, 0.0)])
            .unwrap();
        let err = session
            .ingest_detections(
                0,
                vec![drop_at(900.0, 50.0, 5.0, 0, 0.0), drop_at(110.0, 50.0, 5.0, 0, 0.0)],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RainstreamError::FrameOrder {
                frame_index: 0,
                last_frame_index: 0
            }
        ));
        assert_eq!(session.frames_processed(), 1);
        assert_eq!(session.stream().len(), 1);

        let result = session.finish().unwrap();
        assert_eq!(result.analysis.streams.frames_correlated, 1);
        assert_eq!(result.analysis.streams.transitions, 0);
        assert_eq!(result.metadata.avg_detections_per_frame, 1.0);
    }

    #[test]
    fn agent_sees_every_drop_once() {
        let mut config = short_config();
        config.agent_window_secs = Some(0.25);
        let mut session = Session::new(config).unwrap();
        for frame_index in 0..10u64 {
            let t = frame_index as f64 / 10.0;
            session
                .ingest_detections(frame_index, vec![drop_at(100.0, 100.0, 6.0, frame_index, t)])
                .unwrap();
        }
        let result = session.finish().unwrap();
        // Windows (.., 0.25], (0.25, 0.5], (0.5, 0.75], (0.75, 1.0] all hold drops.
        assert_eq!(result.agent.stats.hits + result.agent.stats.misses, 4);
        assert_eq!(result.metadata.total_patterns, 10);
        assert_eq!(result.analysis.partition_detections, vec![10, 0]);
        assert_eq!(result.status, SessionStatus::Completed);
    }

    #[test]
    fn empty_session_reports_no_patterns() {
        let session = Session::new(short_config()).unwrap();
        let result = session.finish().unwrap();
        assert!(result.is_empty());
        assert_eq!(result.metadata.avg_detections_per_frame, 0.0);
        assert_eq!(result.agent.stats.trials(), 0);
    }
}
