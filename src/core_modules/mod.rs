pub mod blob_detector;
pub mod competitive_agent;
pub mod detection;
pub mod difficulty;
pub mod mask;
pub mod participant;
pub mod pattern_analyzer;
pub mod pixel;
pub mod privacy;
pub mod scoring;
pub mod stream_correlator;
