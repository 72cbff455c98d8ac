// THEORY:
// The `BlobDetector` is the engine of the spatial layer. It turns one frame into
// a list of `Detection`s using a classic threshold-and-contour recipe:
//
// 1.  **Masking**: the configured `MaskMode` decides how pixels become
//     foreground. The mode is fixed at construction; the detector never
//     switches strategy based on frame content.
// 2.  **Morphology**: close, then open, with an elliptical structuring element.
// 3.  **External Outlines**: holes inside a blob are filled before labeling, so
//     each blob is measured by its outer outline only.
// 4.  **Shape Filtering**: a region survives only if its enclosed area lies in
//     `[min_area, max_area]` AND its minimal enclosing circle radius lies in
//     `[min_radius, max_radius]`. The two bounds reject different failure
//     modes: area catches thin streaks with a large circle, radius catches
//     compact specks or merged sheets that happen to have a plausible area.
// 5.  **Measurement**: confidence is the circularity ratio
//     `area / (π·radius²)`. A round drop scores close to 1; a smear scores low.
//
// The detector is stateless between frames. A frame with no surviving blobs
// yields an empty list, which is a normal result. A frame without pixels or a
// non-positive frame rate is an error, since neither has a meaningful clock.

use crate::config::{DetectorConfig, MaskMode};
use crate::core_modules::detection::Detection;
use crate::core_modules::mask::{self, Offset, Region};
use crate::error::{RainstreamError, RainstreamResult};
use image::{GrayImage, RgbaImage};

pub mod blob_detector {
    use super::*; // Make the imports of the parent module available.

    /// Circle described by a centre and a radius, in pixel coordinates.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Circle {
        pub x: f64,
        pub y: f64,
        pub radius: f64,
    }

    impl Circle {
        fn contains(&self, (px, py): (f64, f64)) -> bool {
            let dist = ((px - self.x).powi(2) + (py - self.y).powi(2)).sqrt();
            dist <= self.radius + 1e-7
        }
    }

    /// Converts frames into raindrop detections according to a `DetectorConfig`.
    #[derive(Debug, Clone)]
    pub struct BlobDetector {
        config: DetectorConfig,
        kernel: Vec<Offset>,
    }

    impl BlobDetector {
        pub fn new(config: DetectorConfig) -> RainstreamResult<Self> {
            config.validate()?;
            let kernel = mask::elliptical_kernel(config.kernel_size);
            Ok(Self { config, kernel })
        }

        pub fn config(&self) -> &DetectorConfig {
            &self.config
        }

        /// Detects every qualifying blob of one frame.
        pub fn detect(
            &self,
            frame: &RgbaImage,
            frame_index: u64,
            fps: f64,
        ) -> RainstreamResult<Vec<Detection>> {
            let timestamp = frame_timestamp(frame_index, fps)?;
            if frame.width() == 0 || frame.height() == 0 {
                return Err(RainstreamError::config(format!(
                    "frame {frame_index} is empty ({}x{})",
                    frame.width(),
                    frame.height()
                )));
            }

            let raw_mask = self.build_mask(frame);
            let cleaned = mask::open(&mask::close(&raw_mask, &self.kernel), &self.kernel);
            let regions = mask::label_regions(&mask::fill_holes(&cleaned));
            let candidates = regions.len();

            let detections: Vec<Detection> = regions
                .iter()
                .filter_map(|region| self.measure(region, frame_index, timestamp))
                .collect();

            tracing::debug!(
                frame_index,
                candidates,
                kept = detections.len(),
                "blob detection"
            );
            Ok(detections)
        }

        /// Same as `detect`, for a flat RGBA byte buffer as handed over by a decoder.
        pub fn detect_raw(
            &self,
            frame_buffer: &[u8],
            width: u32,
            height: u32,
            frame_index: u64,
            fps: f64,
        ) -> RainstreamResult<Vec<Detection>> {
            let expected = width as usize * height as usize * 4;
            if frame_buffer.len() != expected {
                return Err(RainstreamError::config(format!(
                    "frame buffer holds {} bytes, {}x{} RGBA needs {}",
                    frame_buffer.len(),
                    width,
                    height,
                    expected
                )));
            }
            let frame = RgbaImage::from_raw(width, height, frame_buffer.to_vec()).ok_or_else(
                || RainstreamError::config("frame buffer does not match its dimensions"),
            )?;
            self.detect(&frame, frame_index, fps)
        }

        fn build_mask(&self, frame: &RgbaImage) -> GrayImage {
            match &self.config.mask {
                MaskMode::ColorBand {
                    hue_range_deg,
                    saturation_range,
                    value_range,
                    ..
                } => mask::color_band_mask(frame, *hue_range_deg, *saturation_range, *value_range),
                MaskMode::Bright {
                    blur_sigma,
                    threshold,
                    ..
                } => mask::bright_mask(frame, *blur_sigma, *threshold),
            }
        }

        fn color_tag(&self) -> &str {
            match &self.config.mask {
                MaskMode::ColorBand { color_tag, .. } | MaskMode::Bright { color_tag, .. } => {
                    color_tag
                }
            }
        }

        /// Applies the area and radius bands and builds the detection.
        fn measure(&self, region: &Region, frame_index: u64, timestamp: f64) -> Option<Detection> {
            let area = region.area();
            if area < self.config.min_area || area > self.config.max_area {
                return None;
            }

            let points: Vec<(f64, f64)> = region
                .boundary
                .iter()
                .map(|&(x, y)| (x as f64, y as f64))
                .collect();
            let circle = minimal_enclosing_circle(&points)?;
            // Boundary points are pixel centres; the blob extends half a pixel further.
            let radius = circle.radius + 0.5;
            if radius < self.config.min_radius || radius > self.config.max_radius {
                return None;
            }

            let confidence = (area / (std::f64::consts::PI * radius * radius)).min(1.0);
            Some(Detection {
                x: circle.x,
                y: circle.y,
                radius,
                frame_index,
                timestamp,
                confidence,
                color_tag: self.color_tag().to_string(),
            })
        }
    }

    /// Seconds from the start of the clip to `frame_index`.
    pub fn frame_timestamp(frame_index: u64, fps: f64) -> RainstreamResult<f64> {
        validate_fps(fps)?;
        Ok(frame_index as f64 / fps)
    }

    pub fn validate_fps(fps: f64) -> RainstreamResult<()> {
        if fps.is_finite() && fps > 0.0 {
            Ok(())
        } else {
            Err(RainstreamError::config(format!(
                "fps must be positive and finite, got {fps}"
            )))
        }
    }

    /// Smallest circle containing every point (incremental Welzl).
    /// Returns `None` for an empty point set.
    pub fn minimal_enclosing_circle(points: &[(f64, f64)]) -> Option<Circle> {
        let first = *points.first()?;
        let mut shuffled = points.to_vec();
        // Seeded so the same region always takes the same path.
        fastrand::Rng::with_seed(points.len() as u64).shuffle(&mut shuffled);

        let mut circle = Circle {
            x: first.0,
            y: first.1,
            radius: 0.0,
        };
        for i in 0..shuffled.len() {
            if circle.contains(shuffled[i]) {
                continue;
            }
            circle = Circle {
                x: shuffled[i].0,
                y: shuffled[i].1,
                radius: 0.0,
            };
            for j in 0..i {
                if circle.contains(shuffled[j]) {
                    continue;
                }
                circle = circle_from_two(shuffled[i], shuffled[j]);
                for k in 0..j {
                    if !circle.contains(shuffled[k]) {
                        circle = circle_from_three(shuffled[i], shuffled[j], shuffled[k]);
                    }
                }
            }
        }
        Some(circle)
    }

    fn circle_from_two(a: (f64, f64), b: (f64, f64)) -> Circle {
        let x = (a.0 + b.0) / 2.0;
        let y = (a.1 + b.1) / 2.0;
        let radius = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt() / 2.0;
        Circle { x, y, radius }
    }

    fn circle_from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Circle {
        let (bx, by) = (b.0 - a.0, b.1 - a.1);
        let (cx, cy) = (c.0 - a.0, c.1 - a.1);
        let d = 2.0 * (bx * cy - by * cx);
        if d.abs() < 1e-12 {
            // Collinear: the widest pair spans the others.
            return [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)]
                .into_iter()
                .fold(circle_from_two(a, b), |widest, candidate| {
                    if candidate.radius > widest.radius {
                        candidate
                    } else {
                        widest
                    }
                });
        }
        let b_sq = bx * bx + by * by;
        let c_sq = cx * cx + cy * cy;
        let ux = (cy * b_sq - by * c_sq) / d;
        let uy = (bx * c_sq - cx * b_sq) / d;
        Circle {
            x: ux + a.0,
            y: uy + a.1,
            radius: (ux * ux + uy * uy).sqrt(),
        }
    }
}
