// THEORY:
// The `StreamCorrelator` gives the detection layer a short memory. It looks at
// exactly two frames at a time, the current one and the one before it, and
// answers two questions:
//
// 1.  **Where did each drop come from?** Every current drop is matched to the
//     nearest previous drop within `max_movement`. A match becomes a
//     `Transition` carrying the displacement and a velocity in pixels per
//     second. Several current drops may claim the same previous drop; a
//     splash is allowed to fan out.
// 2.  **Is this drop part of a stream?** Drops are counted against their
//     same-frame neighbours inside `proximity_radius`:
//     - 4 or more drops together: `Established`.
//     - 2 or 3 drops together: `Forming`.
//     - alone, but carried over from the previous frame: `Forming`.
//     - alone and new: `Isolated`.
//
// `identify_streams` shares the proximity radius and turns dense
// neighbourhoods into deduplicated `StreamGroup`s.
//
// The first frame of a session has nothing to correlate against. It still
// gets its spatial classification, with an empty transition set.

use crate::config::CorrelatorConfig;
use crate::core_modules::detection::Detection;
use serde::{Deserialize, Serialize};

const ESTABLISHED_GROUP_SIZE: usize = 4;
const FORMING_GROUP_SIZE: usize = 2;
/// A stream needs at least this many neighbours around its anchor drop.
const MIN_STREAM_MEMBERS: usize = 2;
/// Member count at which a stream group's confidence saturates.
const FULL_CONFIDENCE_MEMBERS: f64 = 10.0;

/// A dense same-frame neighbourhood of drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamGroup {
    /// Mean position of the members.
    pub center: (f64, f64),
    /// Indices into the analysed frame. The anchor drop is not a member.
    pub members: Vec<usize>,
    pub confidence: f64,
    /// Population standard deviation of the members' pooled x and y coordinates.
    pub radius_spread: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Isolated,
    Forming,
    Established,
}

/// A current drop matched to the previous frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Index into the previous frame.
    pub from: usize,
    /// Index into the current frame.
    pub to: usize,
    pub frame_index: u64,
    pub movement_pixels: f64,
    /// Pixels per second.
    pub velocity: f64,
}

/// Per-drop classification of one frame plus its transitions.
/// Every list holds indices into the current frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub isolated: Vec<usize>,
    pub forming: Vec<usize>,
    pub established: Vec<usize>,
    pub transitions: Vec<Transition>,
}

impl CorrelationReport {
    pub fn state_of(&self, index: usize) -> Option<StreamState> {
        if self.isolated.contains(&index) {
            Some(StreamState::Isolated)
        } else if self.forming.contains(&index) {
            Some(StreamState::Forming)
        } else if self.established.contains(&index) {
            Some(StreamState::Established)
        } else {
            None
        }
    }
}

/// Running totals over every frame a `StreamCorrelator` has seen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamTotals {
    pub frames_correlated: u64,
    pub transitions: u64,
    pub isolated: u64,
    pub forming: u64,
    pub established: u64,
    /// Sum of deduplicated stream groups over all frames.
    pub stream_groups: u64,
    /// Largest number of stream groups seen in a single frame.
    pub peak_stream_groups: u64,
    pub mean_velocity: f64,
    pub max_velocity: f64,
}

/// Indices of the drops in `frame` closer than `radius` to `frame[anchor]`.
fn neighbours(frame: &[Detection], anchor: usize, radius: f64) -> Vec<usize> {
    let origin = &frame[anchor];
    frame
        .iter()
        .enumerate()
        .filter(|&(index, other)| index != anchor && origin.distance_to(other) < radius)
        .map(|(index, _)| index)
        .collect()
}

pub fn identify_streams(frame: &[Detection], config: &CorrelatorConfig) -> Vec<StreamGroup> {
    let mut groups: Vec<StreamGroup> = Vec::new();

    for anchor in 0..frame.len() {
        let members = neighbours(frame, anchor, config.proximity_radius);
        if members.len() < MIN_STREAM_MEMBERS {
            continue;
        }

        let count = members.len() as f64;
        let center = (
            members.iter().map(|&i| frame[i].x).sum::<f64>() / count,
            members.iter().map(|&i| frame[i].y).sum::<f64>() / count,
        );

        let duplicate = groups.iter().any(|kept| {
            let dx = kept.center.0 - center.0;
            let dy = kept.center.1 - center.1;
            (dx * dx + dy * dy).sqrt() < config.dedup_radius
        });
        if duplicate {
            continue;
        }

        let pooled: Vec<f64> = members
            .iter()
            .flat_map(|&i| [frame[i].x, frame[i].y])
            .collect();

        groups.push(StreamGroup {
            center,
            confidence: (count / FULL_CONFIDENCE_MEMBERS).min(1.0),
            radius_spread: population_std(&pooled),
            members,
        });
    }

    groups
}

pub fn correlate(
    current: &[Detection],
    previous: &[Detection],
    config: &CorrelatorConfig,
) -> CorrelationReport {
    let mut report = CorrelationReport::default();

    for (index, drop) in current.iter().enumerate() {
        // --- 1. Temporal match ---
        let best = previous
            .iter()
            .enumerate()
            .map(|(prev_index, prev)| (prev_index, drop.distance_to(prev)))
            .filter(|&(_, distance)| distance <= config.max_movement)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((from, movement_pixels)) = best {
            let elapsed = drop.timestamp - previous[from].timestamp;
            let interval = if elapsed > 0.0 {
                elapsed
            } else {
                config.frame_interval_secs
            };
            report.transitions.push(Transition {
                from,
                to: index,
                frame_index: drop.frame_index,
                movement_pixels,
                velocity: movement_pixels / interval,
            });
        }

        // --- 2. Spatial classification ---
        let group_size = neighbours(current, index, config.proximity_radius).len() + 1;
        let state = if group_size >= ESTABLISHED_GROUP_SIZE {
            StreamState::Established
        } else if group_size >= FORMING_GROUP_SIZE || best.is_some() {
            StreamState::Forming
        } else {
            StreamState::Isolated
        };

        match state {
            StreamState::Isolated => report.isolated.push(index),
            StreamState::Forming => report.forming.push(index),
            StreamState::Established => report.established.push(index),
        }
    }

    report
}

/// Correlates each frame against the one before it and keeps running totals.
#[derive(Debug, Clone)]
pub struct StreamCorrelator {
    config: CorrelatorConfig,
    previous: Vec<Detection>,
    totals: StreamTotals,
}

impl StreamCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            config,
            previous: Vec::new(),
            totals: StreamTotals::default(),
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Correlates `current` against the last frame and makes it the new last frame.
    pub fn advance(&mut self, current: &[Detection]) -> CorrelationReport {
        let report = correlate(current, &self.previous, &self.config);
        let groups = identify_streams(current, &self.config).len() as u64;

        let totals = &mut self.totals;
        totals.frames_correlated += 1;
        totals.isolated += report.isolated.len() as u64;
        totals.forming += report.forming.len() as u64;
        totals.established += report.established.len() as u64;
        totals.stream_groups += groups;
        totals.peak_stream_groups = totals.peak_stream_groups.max(groups);
        for transition in &report.transitions {
            totals.transitions += 1;
            totals.mean_velocity +=
                (transition.velocity - totals.mean_velocity) / totals.transitions as f64;
            totals.max_velocity = totals.max_velocity.max(transition.velocity);
        }

        self.previous = current.to_vec();
        report
    }

    pub fn totals(&self) -> &StreamTotals {
        &self.totals
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count).sqrt()
}
