use image::{Rgba, RgbaImage};
use rainstream_vision::config::DetectorConfig;
use rainstream_vision::core_modules::blob_detector::blob_detector::BlobDetector;
use rainstream_vision::{ParallelDetector, Session, SessionConfig};

const BLUE: Rgba<u8> = Rgba([30, 70, 235, 255]);
const BACKDROP: Rgba<u8> = Rgba([12, 12, 20, 255]);
const FPS: f64 = 10.0;

/// Frame `i` holds `i % 4` drops, so every frame has a distinct signature.
fn clip(frame_count: u64) -> Vec<RgbaImage> {
    (0..frame_count)
        .map(|i| {
            let mut frame = RgbaImage::from_pixel(320, 120, BACKDROP);
            for k in 0..(i % 4) {
                let cx = 40.0 + k as f64 * 70.0;
                let cy = 30.0 + (i % 5) as f64 * 12.0;
                for (x, y, pixel) in frame.enumerate_pixels_mut() {
                    if (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2) <= 81.0 {
                        *pixel = BLUE;
                    }
                }
            }
            frame
        })
        .collect()
}

#[tokio::test]
async fn batch_matches_sequential_detection() {
    let frames = clip(12);
    let sequential = BlobDetector::new(DetectorConfig::default()).unwrap();
    let expected: Vec<_> = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| sequential.detect(frame, i as u64, FPS).unwrap())
        .collect();

    let mut parallel = ParallelDetector::with_workers(DetectorConfig::default(), FPS, 4).unwrap();
    let detected = parallel.detect_batch(frames).await.unwrap();
    parallel.shutdown().await.unwrap();

    assert_eq!(detected.len(), expected.len());
    for (i, (got, want)) in detected.iter().zip(&expected).enumerate() {
        assert_eq!(got.frame_id, i as u64);
        assert_eq!(&got.detections, want);
        assert_eq!(got.detections.len() as u64, i as u64 % 4);
    }
}

#[tokio::test]
async fn consecutive_batches_continue_frame_ids() {
    let mut parallel = ParallelDetector::with_workers(DetectorConfig::default(), FPS, 3).unwrap();
    let first = parallel.detect_batch(clip(5)).await.unwrap();
    let second = parallel.detect_batch(clip(4)).await.unwrap();
    parallel.shutdown().await.unwrap();

    let ids: Vec<u64> = first.iter().chain(&second).map(|frame| frame.frame_id).collect();
    assert_eq!(ids, (0..9).collect::<Vec<_>>());
    assert_eq!(second[1].detections[0].frame_index, 6);
}

#[tokio::test]
async fn failed_batch_leaves_no_stale_frames() {
    let mut parallel = ParallelDetector::with_workers(DetectorConfig::default(), FPS, 3).unwrap();
    let mut frames = clip(4);
    frames[2] = RgbaImage::new(0, 0);
    assert!(parallel.detect_batch(frames).await.is_err());
    assert_eq!(parallel.next_frame_id(), 4);

    let next = parallel.detect_batch(clip(3)).await.unwrap();
    parallel.shutdown().await.unwrap();

    let ids: Vec<u64> = next.iter().map(|frame| frame.frame_id).collect();
    assert_eq!(ids, [4, 5, 6]);
    assert_eq!(next[1].detections.len(), 1);
    assert_eq!(next[1].detections[0].frame_index, 5);
}

#[tokio::test]
async fn unusable_fps_fails_construction() {
    assert!(ParallelDetector::with_workers(DetectorConfig::default(), 0.0, 2).is_err());
    assert!(ParallelDetector::with_workers(DetectorConfig::default(), f64::NAN, 2).is_err());
}

#[tokio::test]
async fn batch_feeds_session_in_order() {
    let config = SessionConfig {
        duration_seconds: 1,
        fps: FPS,
        seed: Some(8),
        ..SessionConfig::default()
    };
    let mut parallel = ParallelDetector::with_workers(config.detector.clone(), FPS, 2).unwrap();
    let mut session = Session::new(config).unwrap();

    // Two frames beyond the one second duration are dropped.
    let reports = parallel.process_batch(&mut session, clip(12)).await.unwrap();
    parallel.shutdown().await.unwrap();

    assert_eq!(reports.len(), 10);
    assert!(reports.windows(2).all(|pair| pair[0].frame_index < pair[1].frame_index));
    assert_eq!(session.frames_processed(), 10);

    let expected_drops: u64 = (0..10u64).map(|i| i % 4).sum();
    let result = session.finish().unwrap();
    assert_eq!(result.metadata.total_patterns, expected_drops);
}
