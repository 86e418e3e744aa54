//! Hand-tracking capability boundary.
//!
//! The landmark model itself is an external collaborator: an implementation
//! takes one RGB frame and returns zero or more 21-point hand landmark sets
//! (MediaPipe hand-landmark index convention). The pipeline owns nothing of
//! the model beyond its construction parameters.
//!
//! Two built-in implementations exist: `StubTracker`, which synthesizes a
//! deterministic wave/fist cycle so the full pipeline runs without a model,
//! and `ScriptedTracker`, which replays a fixed per-frame script in tests.

use anyhow::Result;

use crate::frame::Frame;

/// MediaPipe hand landmark indices.
#[allow(dead_code)]
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

/// A single normalized hand landmark.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    /// X coordinate in [0, 1], normalized to frame width.
    pub x: f32,
    /// Y coordinate in [0, 1], normalized to frame height.
    pub y: f32,
    /// Depth relative to the wrist.
    pub z: f32,
}

/// The 21 landmarks describing one detected hand's pose.
///
/// Produced by a `HandTracker`, consumed once by the classifier, never
/// mutated.
#[derive(Clone, Debug)]
pub struct HandLandmarkSet {
    pub points: [Landmark; 21],
    /// Detection confidence in [0, 1].
    pub confidence: f32,
}

/// Construction parameters for a tracker implementation.
#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig {
    pub max_hands: usize,
    pub min_detection_confidence: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_hands: 1,
            min_detection_confidence: 0.7,
        }
    }
}

/// Hand-landmark model boundary.
///
/// Implementations receive the frame read-only and must not retain it beyond
/// the call. The capture loop is the only caller; no implementation needs to
/// be re-entrant.
pub trait HandTracker: Send {
    /// Tracker identifier for logs.
    fn name(&self) -> &'static str;

    /// Detect hands in one frame, most confident first.
    fn process(&mut self, frame: &Frame) -> Result<Vec<HandLandmarkSet>>;
}

/// Build a landmark set with the given per-digit extension pattern
/// (thumb, index, middle, ring, pinky).
///
/// Coordinates follow the mirrored live-view convention: an extended thumb
/// tip sits at a smaller x than its IP joint, and an extended finger tip at
/// a smaller y than its PIP joint.
pub fn synthetic_hand(extended: [bool; 5]) -> HandLandmarkSet {
    let mut points = [Landmark {
        x: 0.5,
        y: 0.5,
        z: 0.0,
    }; 21];

    points[landmark::THUMB_IP].x = 0.45;
    points[landmark::THUMB_TIP].x = if extended[0] { 0.35 } else { 0.55 };

    let fingers = [
        (landmark::INDEX_TIP, landmark::INDEX_PIP),
        (landmark::MIDDLE_TIP, landmark::MIDDLE_PIP),
        (landmark::RING_TIP, landmark::RING_PIP),
        (landmark::PINKY_TIP, landmark::PINKY_PIP),
    ];
    for (digit, (tip, pip)) in fingers.iter().enumerate() {
        points[*pip].y = 0.5;
        points[*tip].y = if extended[digit + 1] { 0.3 } else { 0.7 };
    }

    HandLandmarkSet {
        points,
        confidence: 0.9,
    }
}

/// Deterministic tracker that cycles no-hand / open-palm / fist.
///
/// Stands in for the real landmark model so the daemon and the stub sources
/// exercise the whole pipeline end to end.
pub struct StubTracker {
    config: TrackerConfig,
    frame_count: u64,
}

const STUB_PHASE_FRAMES: u64 = 10;

impl StubTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }
}

impl HandTracker for StubTracker {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn process(&mut self, _frame: &Frame) -> Result<Vec<HandLandmarkSet>> {
        let phase = (self.frame_count / STUB_PHASE_FRAMES) % 3;
        self.frame_count += 1;

        let hand = match phase {
            0 => return Ok(Vec::new()),
            1 => synthetic_hand([true; 5]),
            _ => synthetic_hand([false; 5]),
        };
        if hand.confidence < self.config.min_detection_confidence {
            return Ok(Vec::new());
        }
        Ok(vec![hand].into_iter().take(self.config.max_hands).collect())
    }
}

/// Replays a fixed per-frame script; returns no hands once exhausted.
pub struct ScriptedTracker {
    script: std::collections::VecDeque<Vec<HandLandmarkSet>>,
    calls: u64,
}

impl ScriptedTracker {
    pub fn new(script: Vec<Vec<HandLandmarkSet>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }

    /// Number of frames processed so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl HandTracker for ScriptedTracker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn process(&mut self, _frame: &Frame) -> Result<Vec<HandLandmarkSet>> {
        self.calls += 1;
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
