// Example runner for the `rainstream_vision` library.
//
// It renders a short synthetic clip of blue drops falling over a dark
// background, detects it on the worker pool, runs one session and prints the
// result record as JSON.

use image::{Rgba, RgbaImage};
use rainstream_vision::config::{HumanConfig, PartitionConfig};
use rainstream_vision::logging::init_logging;
use rainstream_vision::{ParallelDetector, RainstreamResult, Session, SessionConfig};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;
const DROP_COUNT: usize = 12;
const BACKGROUND: Rgba<u8> = Rgba([14, 16, 24, 255]);
const DROP_COLOR: Rgba<u8> = Rgba([40, 90, 230, 255]);

struct FallingDrop {
    x: f64,
    y: f64,
    radius: f64,
    /// Pixels per second.
    speed: f64,
}

fn spawn_drops(rng: &mut fastrand::Rng) -> Vec<FallingDrop> {
    (0..DROP_COUNT)
        .map(|_| FallingDrop {
            x: 20.0 + rng.f64() * (WIDTH as f64 - 40.0),
            y: rng.f64() * HEIGHT as f64 * 0.5,
            radius: 5.0 + rng.f64() * 10.0,
            speed: 40.0 + rng.f64() * 80.0,
        })
        .collect()
}

fn render_frame(drops: &[FallingDrop], t: f64) -> RgbaImage {
    let mut frame = RgbaImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    for drop in drops {
        let cy = (drop.y + drop.speed * t) % HEIGHT as f64;
        let r = drop.radius;
        let (x0, x1) = ((drop.x - r).floor().max(0.0) as u32, (drop.x + r).ceil() as u32);
        let (y0, y1) = ((cy - r).floor().max(0.0) as u32, (cy + r).ceil() as u32);
        for y in y0..=y1.min(HEIGHT - 1) {
            for x in x0..=x1.min(WIDTH - 1) {
                if (x as f64 - drop.x).powi(2) + (y as f64 - cy).powi(2) <= r * r {
                    frame.put_pixel(x, y, DROP_COLOR);
                }
            }
        }
    }
    frame
}

#[tokio::main]
async fn main() -> RainstreamResult<()> {
    let config = SessionConfig {
        duration_seconds: 3,
        fps: 10.0,
        difficulty: "hard".to_string(),
        seed: Some(2024),
        partition: PartitionConfig {
            boundaries: vec![WIDTH as f64 / 2.0],
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
            ..PartitionConfig::default()
        },
        ..SessionConfig::default()
    };
    init_logging(&config.logging)?;

    let mut rng = fastrand::Rng::with_seed(7);
    let drops = spawn_drops(&mut rng);
    let frames: Vec<RgbaImage> = (0..config.max_frames())
        .map(|frame_index| render_frame(&drops, frame_index as f64 / config.fps))
        .collect();

    let mut detector = ParallelDetector::new(config.detector.clone(), config.fps)?;
    let mut session = Session::new(config)?;
    let reports = detector.process_batch(&mut session, frames).await?;
    detector.shutdown().await?;

    let established: usize = reports
        .iter()
        .map(|report| report.correlation.established.len())
        .sum();
    tracing::info!(frames = reports.len(), established, "clip processed");

    let result = session.finish()?;
    println!("{}", result.to_json_pretty()?);
    Ok(())
}
