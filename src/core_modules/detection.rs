// THEORY:
// `Detection` is the output of the spatial layer: one qualifying blob in one
// frame, reduced to a position, a radius and a circularity confidence. Like
// `Pixel`, it is a "dumb" immutable data container.
//
// `DetectionStream` is the session's memory. It is an append-only arena: each
// frame's detections are stored contiguously in arrival order, and a small
// frame index maps a frame number to its slice. Nothing is ever edited in
// place, so analysis passes can borrow slices freely while the session keeps
// appending.

use crate::error::{RainstreamError, RainstreamResult};
use serde::{Deserialize, Serialize};

/// A single raindrop candidate found in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Centre of the minimal enclosing circle, in pixels.
    pub x: f64,
    pub y: f64,
    /// Radius of the minimal enclosing circle, in pixels.
    pub radius: f64,
    pub frame_index: u64,
    /// Seconds since the start of the session (`frame_index / fps`).
    pub timestamp: f64,
    /// Circularity: enclosed area over the enclosing circle's area, in (0, 1].
    pub confidence: f64,
    pub color_tag: String,
}

impl Detection {
    pub fn distance_to(&self, other: &Detection) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Position of a detection inside a `DetectionStream`.
pub type DetectionId = usize;

/// Location of one frame's detections inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameSpan {
    frame_index: u64,
    start: usize,
    len: usize,
}

/// Append-only, temporally ordered sequence of detections for one session.
#[derive(Debug, Clone, Default)]
pub struct DetectionStream {
    detections: Vec<Detection>,
    frames: Vec<FrameSpan>,
}

impl DetectionStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one frame's detections. Frames may be empty, but they must
    /// arrive in non-decreasing frame order; a repeated frame index extends
    /// that frame's slice.
    pub fn push_frame(
        &mut self,
        frame_index: u64,
        detections: Vec<Detection>,
    ) -> RainstreamResult<std::ops::Range<DetectionId>> {
        let start = self.detections.len();
        match self.frames.last_mut() {
            Some(last) if frame_index < last.frame_index => {
                return Err(RainstreamError::FrameOrder {
                    frame_index,
                    last_frame_index: last.frame_index,
                });
            }
            Some(last) if frame_index == last.frame_index => {
                last.len += detections.len();
            }
            _ => self.frames.push(FrameSpan {
                frame_index,
                start,
                len: detections.len(),
            }),
        }
        self.detections.extend(detections);
        Ok(start..self.detections.len())
    }

    /// The detections of one frame, in discovery order. Unknown frames are empty.
    pub fn frame(&self, frame_index: u64) -> &[Detection] {
        match self
            .frames
            .binary_search_by_key(&frame_index, |span| span.frame_index)
        {
            Ok(position) => {
                let span = self.frames[position];
                &self.detections[span.start..span.start + span.len]
            }
            Err(_) => &[],
        }
    }

    pub fn get(&self, id: DetectionId) -> Option<&Detection> {
        self.detections.get(id)
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Number of frames appended so far, including frames without detections.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Detection count of every appended frame, in frame order.
    pub fn per_frame_counts(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.frames.iter().map(|span| (span.frame_index, span.len))
    }
}

impl<'a> IntoIterator for &'a DetectionStream {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
pub(crate) fn drop_at(x: f64, y: f64, radius: f64, frame_index: u64, timestamp: f64) -> Detection {
    Detection {
        x,
        y,
        radius,
        frame_index,
        timestamp,
        confidence: 1.0,
        color_tag: "blue".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_sliced_by_index() {
        let mut stream = DetectionStream::new();
        stream
            .push_frame(0, vec![drop_at(1.0, 1.0, 5.0, 0, 0.0)])
            .unwrap();
        stream.push_frame(1, vec![]).unwrap();
        let ids = stream
            .push_frame(
                2,
                vec![drop_at(2.0, 2.0, 5.0, 2, 0.1), drop_at(3.0, 3.0, 5.0, 2, 0.1)],
            )
            .unwrap();

        assert_eq!(ids, 1..3);
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.frame_count(), 3);
        assert_eq!(stream.frame(2).len(), 2);
        assert!(stream.frame(1).is_empty());
        assert!(stream.frame(9).is_empty());
        assert_eq!(stream.get(2).map(|d| d.x), Some(3.0));
    }

    #[test]
    fn rejects_out_of_order_frames() {
        let mut stream = DetectionStream::new();
        stream.push_frame(5, vec![]).unwrap();
        let err = stream.push_frame(4, vec![]).unwrap_err();
        assert!(matches!(
            err,
            RainstreamError::FrameOrder {
                frame_index: 4,
                last_frame_index: 5
            }
        ));
    }

    #[test]
    fn repeated_frame_extends_slice() {
        let mut stream = DetectionStream::new();
        stream.push_frame(3, vec![drop_at(0.0, 0.0, 4.0, 3, 0.1)]).unwrap();
        stream.push_frame(3, vec![drop_at(9.0, 0.0, 4.0, 3, 0.1)]).unwrap();
        assert_eq!(stream.frame(3).len(), 2);
        assert_eq!(stream.per_frame_counts().collect::<Vec<_>>(), vec![(3, 2)]);
    }
}
