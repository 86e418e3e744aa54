//! Event plumbing between the capture loop and its consumers.
//!
//! Three primitives cross the worker boundary, all carrying owned values:
//!
//! - `EventBus`: an explicit list of outbound channels for discrete pipeline
//!   events (gestures, status lines, the terminal finished signal).
//! - A latest-wins frame slot: at most one undelivered frame is buffered;
//!   older frames are overwritten rather than queued, so a stalled display
//!   consumer never grows memory.
//! - `CancelToken`: the cooperative stop flag, polled once per loop
//!   iteration. Stop latency is bounded by one blocking frame read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::classify::GestureEvent;
use crate::frame::ProcessedFrame;

/// Discrete events delivered to every subscriber.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    Gesture(GestureEvent),
    /// Human-readable status line.
    Status(String),
    /// Terminal signal, emitted exactly once per run.
    Finished,
}

/// Outbound event channel list owned by the capture loop.
///
/// Subscribers attach before the loop starts; disconnected receivers are
/// pruned on the next emit.
pub struct EventBus {
    subscribers: Vec<Sender<PipelineEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<PipelineEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: PipelineEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a latest-wins frame channel.
pub fn frame_channel() -> (FramePublisher, FrameReceiver) {
    let slot = Arc::new(Mutex::new(None));
    (
        FramePublisher { slot: slot.clone() },
        FrameReceiver { slot },
    )
}

/// Producer side of the frame slot. Held by the capture loop.
pub struct FramePublisher {
    slot: Arc<Mutex<Option<ProcessedFrame>>>,
}

impl FramePublisher {
    /// Replace any undelivered frame. Never blocks on the consumer.
    pub fn publish(&self, frame: ProcessedFrame) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(frame);
        }
    }
}

/// Consumer side of the frame slot. Held by the display.
pub struct FrameReceiver {
    slot: Arc<Mutex<Option<ProcessedFrame>>>,
}

impl FrameReceiver {
    /// Take the most recent undelivered frame, if any.
    pub fn take(&self) -> Option<ProcessedFrame> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Cooperative cancellation flag shared between the loop and its callers.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
