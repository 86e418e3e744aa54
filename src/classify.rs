//! Gesture classification: finger counting and temporal debounce.
//!
//! One hand's landmark set becomes a raised-finger count, the count is looked
//! up in a configurable action table, and a cooldown collapses the many
//! frames of a sustained real-world pose into at most one `GestureEvent` per
//! cooldown window. The cooldown transition itself is a pure function over an
//! explicit `CooldownState` value, so the debounce behavior is testable
//! without a running loop.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, Result};

use crate::track::{landmark, HandLandmarkSet};

/// The gesture labels a finger count can map to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureAction {
    Play,
    Pause,
    NextTrack,
    PreviousTrack,
    VolumeUp,
    VolumeDown,
    MuteToggle,
}

impl GestureAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureAction::Play => "play",
            GestureAction::Pause => "pause",
            GestureAction::NextTrack => "next",
            GestureAction::PreviousTrack => "previous",
            GestureAction::VolumeUp => "volume_up",
            GestureAction::VolumeDown => "volume_down",
            GestureAction::MuteToggle => "mute",
        }
    }
}

impl fmt::Display for GestureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GestureAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "play" => Ok(GestureAction::Play),
            "pause" => Ok(GestureAction::Pause),
            "next" => Ok(GestureAction::NextTrack),
            "previous" => Ok(GestureAction::PreviousTrack),
            "volume_up" => Ok(GestureAction::VolumeUp),
            "volume_down" => Ok(GestureAction::VolumeDown),
            "mute" => Ok(GestureAction::MuteToggle),
            other => Err(anyhow!("unknown gesture action label '{}'", other)),
        }
    }
}

/// Finger count to action table.
///
/// The table is data, not code: historical deployments disagreed on whether
/// 0 or 5 fingers means "play", so neither ordering is privileged beyond
/// being the shipped default. Unmapped counts never emit an event.
#[derive(Clone, Debug)]
pub struct GestureMap {
    entries: BTreeMap<u8, GestureAction>,
}

impl GestureMap {
    /// Build a map from configured `count -> label` entries.
    /// Counts above 5 are rejected; partial tables are allowed.
    pub fn from_labels(labels: &BTreeMap<u8, String>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (count, label) in labels {
            if *count > 5 {
                return Err(anyhow!(
                    "gesture_actions key {} out of range (finger counts are 0..=5)",
                    count
                ));
            }
            entries.insert(*count, label.parse::<GestureAction>()?);
        }
        Ok(Self { entries })
    }

    pub fn action_for(&self, finger_count: u8) -> Option<GestureAction> {
        self.entries.get(&finger_count).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for GestureMap {
    fn default() -> Self {
        let entries = BTreeMap::from([
            (0, GestureAction::Pause),
            (1, GestureAction::NextTrack),
            (2, GestureAction::PreviousTrack),
            (3, GestureAction::VolumeUp),
            (4, GestureAction::VolumeDown),
            (5, GestureAction::Play),
        ]);
        Self { entries }
    }
}

/// Direction of the thumb extension comparison.
///
/// The rule is mirror-dependent: on the mirrored live view an extended thumb
/// tip lands at a smaller x than its IP joint; on an unmirrored view the
/// comparison flips. It is explicit data so both orientations stay tested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThumbRule {
    #[default]
    TipLeftOfJoint,
    TipRightOfJoint,
}

/// Count extended digits for one hand, in [0, 5].
///
/// Thumb: tip x on the outward side of the IP joint per `rule`.
/// Other digits: tip y above (numerically smaller than) the PIP joint y.
pub fn count_raised_fingers(hand: &HandLandmarkSet, rule: ThumbRule) -> u8 {
    let p = &hand.points;
    let mut count = 0u8;

    let thumb_extended = match rule {
        ThumbRule::TipLeftOfJoint => p[landmark::THUMB_TIP].x < p[landmark::THUMB_IP].x,
        ThumbRule::TipRightOfJoint => p[landmark::THUMB_TIP].x > p[landmark::THUMB_IP].x,
    };
    if thumb_extended {
        count += 1;
    }

    const FINGERS: [(usize, usize); 4] = [
        (landmark::INDEX_TIP, landmark::INDEX_PIP),
        (landmark::MIDDLE_TIP, landmark::MIDDLE_PIP),
        (landmark::RING_TIP, landmark::RING_PIP),
        (landmark::PINKY_TIP, landmark::PINKY_PIP),
    ];
    for (tip, pip) in FINGERS {
        if p[tip].y < p[pip].y {
            count += 1;
        }
    }

    count
}

/// The sole cross-frame mutable state of the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CooldownState {
    pub last_event_at: Option<Instant>,
}

/// Pure debounce transition: emit iff the cooldown has elapsed since the
/// last emitted event (a fresh state always emits).
pub fn debounce(state: CooldownState, now: Instant, cooldown: Duration) -> (CooldownState, bool) {
    let ready = match state.last_event_at {
        None => true,
        Some(last) => now.duration_since(last) >= cooldown,
    };
    if ready {
        (
            CooldownState {
                last_event_at: Some(now),
            },
            true,
        )
    } else {
        (state, false)
    }
}

/// A debounced, discrete action trigger. Immutable once emitted; each
/// subscriber receives its own clone.
#[derive(Clone, Debug)]
pub struct GestureEvent {
    pub action: GestureAction,
    pub finger_count: u8,
    pub timestamp: SystemTime,
}

/// Result of classifying one frame that contained a hand.
#[derive(Clone, Debug)]
pub struct Observation {
    pub finger_count: u8,
    /// Mapped label for display, present even while the cooldown holds.
    pub label: Option<GestureAction>,
    /// At most one event per cooldown window.
    pub event: Option<GestureEvent>,
}

pub struct GestureClassifier {
    map: GestureMap,
    cooldown: Duration,
    thumb_rule: ThumbRule,
    state: CooldownState,
    prev_gesture: Option<GestureAction>,
}

impl GestureClassifier {
    pub fn new(map: GestureMap, cooldown: Duration, thumb_rule: ThumbRule) -> Self {
        Self {
            map,
            cooldown,
            thumb_rule,
            state: CooldownState::default(),
            prev_gesture: None,
        }
    }

    /// Classify one frame's first detected hand.
    ///
    /// Only called when a hand is present; no-hand frames never reach the
    /// mapping and never advance the cooldown state.
    pub fn observe(&mut self, hand: &HandLandmarkSet, now: Instant) -> Observation {
        let finger_count = count_raised_fingers(hand, self.thumb_rule);
        let label = self.map.action_for(finger_count);
        let Some(action) = label else {
            return Observation {
                finger_count,
                label,
                event: None,
            };
        };

        let (next, emit) = debounce(self.state, now, self.cooldown);
        if !emit {
            return Observation {
                finger_count,
                label,
                event: None,
            };
        }

        self.state = next;
        self.prev_gesture = Some(action);
        Observation {
            finger_count,
            label,
            event: Some(GestureEvent {
                action,
                finger_count,
                timestamp: SystemTime::now(),
            }),
        }
    }

    /// Last emitted gesture, for status display.
    pub fn prev_gesture(&self) -> Option<GestureAction> {
        self.prev_gesture
    }

    pub fn cooldown_state(&self) -> CooldownState {
        self.state
    }
}
