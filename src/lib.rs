// THEORY:
// This file is the entry point of the `rainstream_vision` library crate. It
// exposes the `Session` pipeline and its result record as the high-level
// interface, the `ParallelDetector` for concurrent detection, and the
// configuration, error and logging layers they share.
//
// The algorithmic layers live in `core_modules`, bottom-up:
// pixel -> mask -> blob_detector -> detection stream -> pattern_analyzer /
// stream_correlator -> competitive_agent / scoring.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod logging;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod result;

pub use config::SessionConfig;
pub use core_modules::detection::{Detection, DetectionStream};
pub use error::{RainstreamError, RainstreamResult};
pub use parallel_pipeline::ParallelDetector;
pub use pipeline::{FrameReport, Session};
pub use result::SessionResult;
