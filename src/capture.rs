//! The capture loop.
//!
//! Owns the video source, tracker, classifier, and router for one run and
//! drives the read -> track -> classify -> dispatch cycle on a dedicated
//! worker thread. No other component touches the source, the tracker handle,
//! or the cooldown state while a run is live.
//!
//! Stop is cooperative: the cancel token is polled once per iteration, so
//! stop latency is bounded by a single blocking frame read. Restarting a
//! video or switching sources is a stop-then-rebuild: cancel the handle,
//! `join()` for quiescence, then spawn a fresh loop. Every run owns a fresh
//! source and tracker end to end.
//!
//! On every exit path the loop drops the source handle, emits a status line
//! for fatal causes, and reports `Finished` exactly once.

use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::actions::ActionRouter;
use crate::bus::{frame_channel, CancelToken, EventBus, FramePublisher, FrameReceiver, PipelineEvent};
use crate::classify::GestureClassifier;
use crate::frame::{draw_landmarks, Frame, ProcessedFrame};
use crate::source::{OpenVideoSource, ReadOutcome, VideoSourceConfig};
use crate::track::HandTracker;

/// Lifecycle of one capture run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Interval between periodic source health log lines.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

pub struct CaptureLoop {
    source_config: VideoSourceConfig,
    tracker: Box<dyn HandTracker>,
    classifier: GestureClassifier,
    router: ActionRouter,
    bus: EventBus,
    frames: FramePublisher,
    frame_rx: Option<FrameReceiver>,
    cancel: CancelToken,
    state: LoopState,
}

impl CaptureLoop {
    pub fn new(
        source_config: VideoSourceConfig,
        tracker: Box<dyn HandTracker>,
        classifier: GestureClassifier,
        router: ActionRouter,
    ) -> Self {
        let (frames, frame_rx) = frame_channel();
        Self {
            source_config,
            tracker,
            classifier,
            router,
            bus: EventBus::new(),
            frames,
            frame_rx: Some(frame_rx),
            cancel: CancelToken::new(),
            state: LoopState::Idle,
        }
    }

    /// Attach an event subscriber. Call before `run`/`spawn`.
    pub fn subscribe_events(&mut self) -> Receiver<PipelineEvent> {
        self.bus.subscribe()
    }

    /// Take the display-side frame receiver. Call before `run`/`spawn`.
    pub fn take_frame_receiver(&mut self) -> Option<FrameReceiver> {
        self.frame_rx.take()
    }

    /// Token that requests a cooperative stop.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run the loop to completion on the current thread.
    ///
    /// Fatal acquisition or read failures are returned after the status and
    /// `Finished` events have been emitted.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_inner();
        if let Err(err) = &result {
            self.bus
                .emit(PipelineEvent::Status(format!("capture stopped: {:#}", err)));
        }
        self.state = LoopState::Stopped;
        self.bus.emit(PipelineEvent::Finished);
        result
    }

    /// Move the loop onto a dedicated worker thread.
    pub fn spawn(mut self) -> Result<CaptureHandle> {
        let cancel = self.cancel.clone();
        let join = thread::Builder::new()
            .name("capture-loop".to_string())
            .spawn(move || self.run())
            .map_err(|err| anyhow!("failed to spawn capture worker: {}", err))?;
        Ok(CaptureHandle { cancel, join })
    }

    fn run_inner(&mut self) -> Result<()> {
        let mut source = match OpenVideoSource::open(&self.source_config) {
            Ok(source) => source,
            Err(err) => {
                log::error!("no video source available: {}", err);
                return Err(err.into());
            }
        };

        self.state = LoopState::Running;
        self.bus.emit(PipelineEvent::Status(format!(
            "processing {}",
            source.descriptor()
        )));
        log::info!("capture loop running on {}", source.descriptor());

        let mut last_health_log = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                self.state = LoopState::Stopping;
                log::info!("stop requested, releasing {}", source.descriptor());
                self.bus
                    .emit(PipelineEvent::Status("stop requested".to_string()));
                return Ok(());
            }

            let frame = match source.read() {
                Ok(ReadOutcome::Frame(frame)) => frame,
                Ok(ReadOutcome::EndOfStream) => {
                    log::info!("{}: end of stream", source.descriptor());
                    self.bus.emit(PipelineEvent::Status(
                        "video processing completed".to_string(),
                    ));
                    return Ok(());
                }
                Err(err) => {
                    log::error!("frame read failed: {}", err);
                    return Err(err.into());
                }
            };

            self.process_frame(frame);

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "source {} healthy, {} frames read",
                    source.descriptor(),
                    source.frames_read()
                );
                last_health_log = Instant::now();
            }
        }
    }

    fn process_frame(&mut self, mut frame: Frame) {
        let hands = match self.tracker.process(&frame) {
            Ok(hands) => hands,
            Err(err) => {
                log::warn!(
                    "tracker {} failed on frame {}: {:#}",
                    self.tracker.name(),
                    frame.seq,
                    err
                );
                Vec::new()
            }
        };

        let mut caption = "no hands detected".to_string();
        let mut finger_count = None;

        // Gestures come from the first detected hand only; the rest are
        // drawn for display.
        if let Some(hand) = hands.first() {
            let observation = self.classifier.observe(hand, Instant::now());
            finger_count = Some(observation.finger_count);
            caption = match observation.label {
                Some(action) => format!("{} fingers - {}", observation.finger_count, action),
                None => format!("{} fingers", observation.finger_count),
            };

            if let Some(event) = observation.event {
                log::info!("gesture recognized: {}", event.action);
                self.router.dispatch(&event);
                self.bus.emit(PipelineEvent::Gesture(event));
            }
        }
        for hand in &hands {
            draw_landmarks(&mut frame, hand);
        }

        self.frames.publish(ProcessedFrame {
            frame,
            caption,
            finger_count,
        });
    }
}

/// Handle to a spawned capture worker.
pub struct CaptureHandle {
    cancel: CancelToken,
    join: thread::JoinHandle<Result<()>>,
}

impl CaptureHandle {
    /// Request a cooperative stop. Returns immediately; the worker releases
    /// its resources within one frame read.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker to finish and return its result.
    pub fn join(self) -> Result<()> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("capture worker panicked")),
        }
    }

    /// Request a stop and wait for quiescence.
    pub fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{LogOnlyBackend, MediaBackend};
    use crate::classify::{GestureClassifier, GestureMap, ThumbRule};
    use crate::source::{SourceMode, VideoSourceConfig};
    use crate::track::{synthetic_hand, HandLandmarkSet, ScriptedTracker};
    use std::path::PathBuf;

    fn file_config(path: &str, loop_on_eof: bool) -> VideoSourceConfig {
        VideoSourceConfig {
            mode: SourceMode::File,
            file_path: Some(PathBuf::from(path)),
            loop_on_eof,
            device_template: "stub://cam{index}".to_string(),
            ..VideoSourceConfig::default()
        }
    }

    fn classifier(cooldown: Duration) -> GestureClassifier {
        GestureClassifier::new(GestureMap::default(), cooldown, ThumbRule::default())
    }

    fn router() -> ActionRouter {
        ActionRouter::new(Box::new(LogOnlyBackend::new()), 0.05)
    }

    fn drain(rx: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn finite_file_finishes_exactly_once() {
        let tracker = ScriptedTracker::new(Vec::new());
        let mut capture = CaptureLoop::new(
            file_config("stub://clip-5", false),
            Box::new(tracker),
            classifier(Duration::ZERO),
            router(),
        );
        let rx = capture.subscribe_events();

        capture.run().expect("finite file run succeeds");
        assert_eq!(capture.state(), LoopState::Stopped);

        let events = drain(&rx);
        let finished = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Finished))
            .count();
        assert_eq!(finished, 1);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Status(msg) if msg.contains("completed")
        )));
    }

    #[test]
    fn gestures_flow_through_the_loop() {
        // Frame 1: open palm (maps to play), frame 2: no hand, frame 3: fist
        // (maps to pause). Zero cooldown emits on every mapped frame.
        let script = vec![
            vec![synthetic_hand([true; 5])],
            Vec::new(),
            vec![synthetic_hand([false; 5])],
        ];
        let mut capture = CaptureLoop::new(
            file_config("stub://clip-3", false),
            Box::new(ScriptedTracker::new(script)),
            classifier(Duration::ZERO),
            router(),
        );
        let rx = capture.subscribe_events();

        capture.run().expect("run succeeds");

        let gestures: Vec<u8> = drain(&rx)
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Gesture(ev) => Some(ev.finger_count),
                _ => None,
            })
            .collect();
        assert_eq!(gestures, vec![5, 0]);
    }

    #[test]
    fn no_hand_frames_do_not_start_the_cooldown() {
        // Two no-hand frames, then a mapped pose: the event must fire on the
        // first hand frame because nothing advanced the cooldown earlier.
        let script = vec![
            Vec::new(),
            Vec::new(),
            vec![synthetic_hand([true; 5])],
        ];
        let mut capture = CaptureLoop::new(
            file_config("stub://clip-3", false),
            Box::new(ScriptedTracker::new(script)),
            classifier(Duration::from_secs(3600)),
            router(),
        );
        let rx = capture.subscribe_events();

        capture.run().expect("run succeeds");

        let gestures = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, PipelineEvent::Gesture(_)))
            .count();
        assert_eq!(gestures, 1);
    }

    #[test]
    fn looping_file_runs_until_cancelled() {
        struct CancellingTracker {
            inner: ScriptedTracker,
            cancel_after: u64,
            token: CancelToken,
        }
        impl HandTracker for CancellingTracker {
            fn name(&self) -> &'static str {
                "cancelling"
            }
            fn process(&mut self, frame: &Frame) -> Result<Vec<HandLandmarkSet>> {
                let hands = self.inner.process(frame)?;
                if self.inner.calls() >= self.cancel_after {
                    self.token.cancel();
                }
                Ok(hands)
            }
        }

        let mut capture = CaptureLoop::new(
            file_config("stub://clip-4", true),
            Box::new(ScriptedTracker::new(Vec::new())),
            classifier(Duration::ZERO),
            router(),
        );
        // Swap in a tracker that cancels the loop after 10 frames, well past
        // the 4-frame clip length, proving the source looped.
        let token = capture.cancel_token();
        capture.tracker = Box::new(CancellingTracker {
            inner: ScriptedTracker::new(Vec::new()),
            cancel_after: 10,
            token,
        });
        let rx = capture.subscribe_events();

        capture.run().expect("cancelled run succeeds");

        let events = drain(&rx);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Status(msg) if msg.contains("stop requested")
        )));
        let finished = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Finished))
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn rtsp_failure_falls_back_and_runs() {
        let config = VideoSourceConfig {
            mode: SourceMode::Rtsp,
            rtsp_url: "stub://unreachable".to_string(),
            device_template: "stub://cam{index}".to_string(),
            ..VideoSourceConfig::default()
        };
        let mut capture = CaptureLoop::new(
            config,
            Box::new(ScriptedTracker::new(Vec::new())),
            classifier(Duration::ZERO),
            router(),
        );
        let token = capture.cancel_token();
        let rx = capture.subscribe_events();
        let handle = capture.spawn().expect("spawn worker");

        // Wait for the loop to report its bound source, then stop it.
        let status = rx.recv().expect("status event");
        match status {
            PipelineEvent::Status(msg) => assert!(msg.contains("camera:")),
            other => panic!("expected status, got {:?}", other),
        }
        token.cancel();
        handle.join().expect("worker result");
    }

    #[test]
    fn no_camera_is_fatal_before_running() {
        let config = VideoSourceConfig {
            mode: SourceMode::Camera,
            device_template: "stub://unreachable{index}".to_string(),
            ..VideoSourceConfig::default()
        };
        let mut capture = CaptureLoop::new(
            config,
            Box::new(ScriptedTracker::new(Vec::new())),
            classifier(Duration::ZERO),
            router(),
        );
        let rx = capture.subscribe_events();

        let result = capture.run();
        assert!(result.is_err());
        assert_eq!(capture.state(), LoopState::Stopped);

        let events = drain(&rx);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Status(msg) if msg.contains("capture stopped")
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Finished)));
    }

    #[test]
    fn mid_run_camera_failure_stops_the_loop() {
        let config = VideoSourceConfig {
            mode: SourceMode::Camera,
            camera_index: 0,
            camera_auto_detect: false,
            device_template: "stub://flaky{index}".to_string(),
            ..VideoSourceConfig::default()
        };
        let mut capture = CaptureLoop::new(
            config,
            Box::new(ScriptedTracker::new(Vec::new())),
            classifier(Duration::ZERO),
            router(),
        );
        let rx = capture.subscribe_events();

        let result = capture.run();
        assert!(result.is_err());

        let events = drain(&rx);
        let finished = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Finished))
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn backend_failure_does_not_stop_the_loop() {
        struct Failing;
        impl MediaBackend for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn toggle_play_pause(&mut self) -> Result<()> {
                Err(anyhow!("no audio endpoint"))
            }
            fn next_track(&mut self) -> Result<()> {
                Err(anyhow!("no audio endpoint"))
            }
            fn previous_track(&mut self) -> Result<()> {
                Err(anyhow!("no audio endpoint"))
            }
            fn volume_up(&mut self, _step: f32) -> Result<()> {
                Err(anyhow!("no audio endpoint"))
            }
            fn volume_down(&mut self, _step: f32) -> Result<()> {
                Err(anyhow!("no audio endpoint"))
            }
            fn mute_toggle(&mut self) -> Result<()> {
                Err(anyhow!("no audio endpoint"))
            }
        }

        let script = vec![vec![synthetic_hand([true; 5])]];
        let mut capture = CaptureLoop::new(
            file_config("stub://clip-2", false),
            Box::new(ScriptedTracker::new(script)),
            classifier(Duration::ZERO),
            ActionRouter::new(Box::new(Failing), 0.05),
        );
        let rx = capture.subscribe_events();

        capture.run().expect("loop survives backend failure");

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Gesture(_))));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Status(msg) if msg.contains("completed")
        )));
    }

    #[test]
    fn processed_frames_reach_the_display_slot() {
        let script = vec![vec![synthetic_hand([true; 5])]];
        let mut capture = CaptureLoop::new(
            file_config("stub://clip-1", false),
            Box::new(ScriptedTracker::new(script)),
            classifier(Duration::ZERO),
            router(),
        );
        let frames = capture.take_frame_receiver().expect("frame receiver");

        capture.run().expect("run succeeds");

        let processed = frames.take().expect("a processed frame");
        assert_eq!(processed.finger_count, Some(5));
        assert!(processed.caption.contains("5 fingers"));
    }
}
