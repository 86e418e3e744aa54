//! Gesture-based media control pipeline.
//!
//! This crate turns a live or recorded video stream into discrete, debounced
//! media control events: frames are read from a camera, RTSP stream, or
//! video file, a hand-landmark model (consumed as a capability) finds a
//! hand, its raised-finger count is classified, and a cooldown collapses the
//! sustained pose into at most one gesture event per window, routed to a
//! media/volume backend.
//!
//! # Architecture
//!
//! - `source`: resilient acquisition (file / RTSP / camera) with probe
//!   reads, RTSP-to-camera fallback, index auto-detection, and file looping
//! - `track`: the hand-landmark capability boundary (21-point sets)
//! - `classify`: finger counting and the cooldown state machine
//! - `actions`: the media action routing boundary (six abstract operations)
//! - `capture`: the orchestrating loop on its dedicated worker thread
//! - `bus`: outbound event channels, the latest-wins frame slot, and the
//!   cooperative cancel token
//! - `config`: JSON file + environment configuration
//!
//! # Concurrency contract
//!
//! The capture loop is the only mutator of the video source, the tracker
//! handle, and the cooldown state. Frames and events cross the worker
//! boundary as owned copies; at most the latest processed frame is buffered
//! for the display, and older undelivered frames are dropped rather than
//! queued. Stop is cooperative and bounded by one blocking frame read.

pub mod actions;
pub mod bus;
pub mod capture;
pub mod classify;
pub mod config;
pub mod frame;
pub mod source;
pub mod track;

pub use actions::{ActionRouter, LogOnlyBackend, MediaBackend};
pub use bus::{CancelToken, EventBus, FramePublisher, FrameReceiver, PipelineEvent};
pub use capture::{CaptureHandle, CaptureLoop, LoopState};
pub use classify::{
    count_raised_fingers, CooldownState, GestureAction, GestureClassifier, GestureEvent,
    GestureMap, ThumbRule,
};
pub use config::AppConfig;
pub use frame::{Frame, ProcessedFrame};
pub use source::{
    OpenVideoSource, ReadOutcome, RtspTransport, SourceError, SourceMode, VideoSourceConfig,
};
pub use track::{
    synthetic_hand, HandLandmarkSet, HandTracker, Landmark, ScriptedTracker, StubTracker,
    TrackerConfig,
};
