// THEORY:
// Blob detection on one frame never looks at another frame, so a batch of
// frames can be detected concurrently. Everything after detection (the stream
// append, correlation and scoring) stays strictly sequential inside `Session`.
//
// The layout is a small worker pool:
// 1.  A dispatcher hands `DetectionTask`s to the workers round-robin.
// 2.  Each worker owns a shared `BlobDetector` and runs detection on the
//     blocking pool, replying over a `oneshot` channel.
// 3.  `ParallelDetector` collects replies in whatever order they finish,
//     parks early ones in `pending_frames`, and releases them strictly by
//     `next_expected_frame`. Output is therefore identical to running the
//     sequential detector frame by frame.

use crate::config::DetectorConfig;
use crate::core_modules::blob_detector::blob_detector::{BlobDetector, validate_fps};
use crate::core_modules::detection::Detection;
use crate::error::{RainstreamError, RainstreamResult};
use crate::pipeline::{FrameReport, Session};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub struct FrameBuffer {
    pub frame: RgbaImage,
    pub frame_id: u64,
}

/// Detections of one frame, tagged with the frame they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFrame {
    pub frame_id: u64,
    pub detections: Vec<Detection>,
}

pub struct DetectionTask {
    pub frame_buffer: FrameBuffer,
    pub result_sender: oneshot::Sender<RainstreamResult<DetectedFrame>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<DetectionTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers. Must be called inside a tokio runtime.
    pub fn new(detector: BlobDetector, fps: f64, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let detector = Arc::new(detector);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<DetectionTask>();
        let mut workers = Vec::with_capacity(worker_count + 1);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<DetectionTask>())
            .unzip();

        // Dispatcher
        workers.push(tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).is_err() {
                    tracing::warn!(worker_idx, "detection worker is gone, dropping task");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        }));

        for mut worker_receiver in worker_receivers {
            let detector = Arc::clone(&detector);
            workers.push(tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let detector = Arc::clone(&detector);
                    let FrameBuffer { frame, frame_id } = task.frame_buffer;
                    let detected = tokio::task::spawn_blocking(move || {
                        detector
                            .detect(&frame, frame_id, fps)
                            .map(|detections| DetectedFrame {
                                frame_id,
                                detections,
                            })
                    })
                    .await;

                    match detected {
                        // A closed receiver means the batch was abandoned.
                        Ok(detected) => {
                            let _ = task.result_sender.send(detected);
                        }
                        Err(error) => {
                            tracing::error!(frame_id, %error, "detection task failed");
                        }
                    }
                }
            }));
        }

        Self {
            task_sender,
            workers,
        }
    }

    pub async fn detect(&self, frame_buffer: FrameBuffer) -> RainstreamResult<DetectedFrame> {
        let frame_id = frame_buffer.frame_id;
        let (result_sender, result_receiver) = oneshot::channel();

        self.task_sender
            .send(DetectionTask {
                frame_buffer,
                result_sender,
            })
            .map_err(|_| {
                RainstreamError::worker_pool(format!("failed to send frame {frame_id} to worker pool"))
            })?;

        result_receiver.await.map_err(|_| {
            RainstreamError::worker_pool(format!("no detection result for frame {frame_id}"))
        })?
    }

    /// Closes the task queue and waits for every worker to drain.
    pub async fn shutdown(self) -> RainstreamResult<()> {
        drop(self.task_sender);
        for worker in self.workers {
            worker
                .await
                .map_err(|error| RainstreamError::worker_pool(error.to_string()))?;
        }
        Ok(())
    }
}

/// Detects batches of frames concurrently and hands them back in frame order.
pub struct ParallelDetector {
    worker_pool: WorkerPool,
    frame_counter: u64,
    next_expected_frame: u64,
    pending_frames: HashMap<u64, Vec<Detection>>,
}

impl ParallelDetector {
    /// One worker per logical CPU.
    pub fn new(config: DetectorConfig, fps: f64) -> RainstreamResult<Self> {
        Self::with_workers(config, fps, num_cpus::get())
    }

    pub fn with_workers(config: DetectorConfig, fps: f64, worker_count: usize) -> RainstreamResult<Self> {
        validate_fps(fps)?;
        let detector = BlobDetector::new(config)?;
        tracing::debug!(worker_count, "starting detection workers");
        Ok(Self {
            worker_pool: WorkerPool::new(detector, fps, worker_count),
            frame_counter: 0,
            next_expected_frame: 0,
            pending_frames: HashMap::new(),
        })
    }

    /// Frame id the next submitted frame will receive.
    pub fn next_frame_id(&self) -> u64 {
        self.frame_counter
    }

    /// Detects `frames` and returns them in frame order. On error the whole batch is
    /// discarded, and its frame ids stay consumed.
    pub async fn detect_batch(&mut self, frames: Vec<RgbaImage>) -> RainstreamResult<Vec<DetectedFrame>> {
        let mut in_flight: FuturesUnordered<_> = frames
            .into_iter()
            .map(|frame| {
                let frame_id = self.frame_counter;
                self.frame_counter += 1;
                self.worker_pool.detect(FrameBuffer { frame, frame_id })
            })
            .collect();

        let mut ordered = Vec::with_capacity(in_flight.len());
        while let Some(result) = in_flight.next().await {
            let detected = match result {
                Ok(detected) => detected,
                Err(error) => {
                    // The rest of the batch is abandoned; the next batch starts clean.
                    tracing::warn!(
                        %error,
                        skipped_to = self.frame_counter,
                        "detection batch failed"
                    );
                    self.pending_frames.clear();
                    self.next_expected_frame = self.frame_counter;
                    return Err(error);
                }
            };
            self.pending_frames
                .insert(detected.frame_id, detected.detections);

            while let Some(detections) = self.pending_frames.remove(&self.next_expected_frame) {
                ordered.push(DetectedFrame {
                    frame_id: self.next_expected_frame,
                    detections,
                });
                self.next_expected_frame += 1;
            }
        }
        Ok(ordered)
    }

    /// Detects a batch and feeds it, in order, into `session`.
    /// Frames past the session's duration are dropped.
    pub async fn process_batch(
        &mut self,
        session: &mut Session,
        frames: Vec<RgbaImage>,
    ) -> RainstreamResult<Vec<FrameReport>> {
        let mut reports = Vec::new();
        for detected in self.detect_batch(frames).await? {
            if let Some(report) = session.ingest_detections(detected.frame_id, detected.detections)? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    pub async fn shutdown(self) -> RainstreamResult<()> {
        self.worker_pool.shutdown().await
    }
}
