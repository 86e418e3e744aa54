//! gestured - gesture-based media control daemon.
//!
//! This daemon:
//! 1. Acquires frames from the configured source (camera, RTSP, or file)
//! 2. Runs the hand tracker and classifies raised-finger gestures
//! 3. Debounces them through the cooldown and routes media actions
//! 4. Logs the event stream as the reference headless consumer
//!
//! The capture loop runs on its own worker thread; this thread drains the
//! event channel. Ctrl-C requests a cooperative stop and the daemon waits
//! for the loop to release its source before exiting.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gesturectl::actions::{ActionRouter, LogOnlyBackend};
use gesturectl::bus::PipelineEvent;
use gesturectl::capture::CaptureLoop;
use gesturectl::classify::{GestureClassifier, ThumbRule};
use gesturectl::config::AppConfig;
use gesturectl::track::StubTracker;

#[derive(Parser, Debug)]
#[command(name = "gestured", version, about = "gesture-based media control daemon")]
struct Args {
    /// JSON config file (falls back to the GESTURED_CONFIG env var).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Process a video file instead of a live camera/RTSP source.
    #[arg(long)]
    video: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = match args.config.as_deref() {
        Some(path) => AppConfig::load_with(Some(path))?,
        None => AppConfig::load()?,
    };
    let source_config = cfg.video_source_config(args.video.as_deref())?;

    log::info!(
        "gestured v{} starting ({:?} source)",
        env!("CARGO_PKG_VERSION"),
        source_config.mode
    );

    // The built-in tracker synthesizes a deterministic wave/fist cycle; a
    // real landmark model plugs in through the HandTracker trait.
    let tracker = Box::new(StubTracker::new(cfg.tracker_config()));
    let classifier = GestureClassifier::new(
        cfg.gesture_actions.clone(),
        cfg.gesture_cooldown,
        ThumbRule::default(),
    );
    let router = ActionRouter::new(Box::new(LogOnlyBackend::new()), cfg.volume_step);

    let mut capture = CaptureLoop::new(source_config, tracker, classifier, router);
    let events = capture.subscribe_events();

    let cancel = capture.cancel_token();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping capture");
        cancel.cancel();
    })?;

    let handle = capture.spawn()?;

    for event in events {
        match event {
            PipelineEvent::Gesture(event) => {
                log::info!(
                    "gesture event: {} ({} fingers)",
                    event.action,
                    event.finger_count
                );
            }
            PipelineEvent::Status(message) => log::info!("status: {}", message),
            PipelineEvent::Finished => break,
        }
    }

    handle.join()
}
