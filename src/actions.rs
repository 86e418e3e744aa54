//! Media action routing boundary.
//!
//! The pipeline does not implement OS-level media control; it defines the
//! contract. A `MediaBackend` exposes the six abstract operations, and the
//! `ActionRouter` maps gesture labels onto exactly one of them. A backend
//! failure is logged and swallowed, never allowed to stop the capture loop.

use anyhow::Result;

use crate::classify::{GestureAction, GestureEvent};

/// OS media/volume control boundary.
///
/// Implementations execute the effect (media key, mixer call) and report
/// nothing beyond success or failure.
pub trait MediaBackend: Send {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    fn toggle_play_pause(&mut self) -> Result<()>;
    fn next_track(&mut self) -> Result<()>;
    fn previous_track(&mut self) -> Result<()>;
    fn volume_up(&mut self, step: f32) -> Result<()>;
    fn volume_down(&mut self, step: f32) -> Result<()>;
    fn mute_toggle(&mut self) -> Result<()>;
}

/// Default backend: logs every operation and tracks a clamped volume level
/// without touching any audio endpoint.
pub struct LogOnlyBackend {
    volume: f32,
    muted: bool,
}

impl LogOnlyBackend {
    pub fn new() -> Self {
        Self {
            volume: 0.5,
            muted: false,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    fn set_volume(&mut self, level: f32) {
        self.volume = level.clamp(0.0, 1.0);
        log::info!("volume set to {:.0}%", self.volume * 100.0);
    }
}

impl Default for LogOnlyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBackend for LogOnlyBackend {
    fn name(&self) -> &'static str {
        "log-only"
    }

    fn toggle_play_pause(&mut self) -> Result<()> {
        log::info!("media: toggle play/pause");
        Ok(())
    }

    fn next_track(&mut self) -> Result<()> {
        log::info!("media: next track");
        Ok(())
    }

    fn previous_track(&mut self) -> Result<()> {
        log::info!("media: previous track");
        Ok(())
    }

    fn volume_up(&mut self, step: f32) -> Result<()> {
        self.set_volume(self.volume + step);
        Ok(())
    }

    fn volume_down(&mut self, step: f32) -> Result<()> {
        self.set_volume(self.volume - step);
        Ok(())
    }

    fn mute_toggle(&mut self) -> Result<()> {
        self.muted = !self.muted;
        log::info!("media: mute {}", if self.muted { "on" } else { "off" });
        Ok(())
    }
}

/// Maps a gesture event to exactly one backend operation.
pub struct ActionRouter {
    backend: Box<dyn MediaBackend>,
    volume_step: f32,
}

impl ActionRouter {
    /// `volume_step` is a fraction of full scale; the backend clamps the
    /// resulting level to [0, 1].
    pub fn new(backend: Box<dyn MediaBackend>, volume_step: f32) -> Self {
        Self {
            backend,
            volume_step,
        }
    }

    /// Invoke the backend operation for one event.
    ///
    /// Both play and pause labels route to the play/pause toggle, so either
    /// historical table ordering behaves identically at this boundary.
    pub fn dispatch(&mut self, event: &GestureEvent) {
        let result = match event.action {
            GestureAction::Play | GestureAction::Pause => self.backend.toggle_play_pause(),
            GestureAction::NextTrack => self.backend.next_track(),
            GestureAction::PreviousTrack => self.backend.previous_track(),
            GestureAction::VolumeUp => self.backend.volume_up(self.volume_step),
            GestureAction::VolumeDown => self.backend.volume_down(self.volume_step),
            GestureAction::MuteToggle => self.backend.mute_toggle(),
        };
        if let Err(err) = result {
            log::warn!(
                "media action {} failed on backend {}: {:#}",
                event.action,
                self.backend.name(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::time::SystemTime;

    fn event(action: GestureAction, finger_count: u8) -> GestureEvent {
        GestureEvent {
            action,
            finger_count,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn volume_clamps_to_full_scale() {
        let mut backend = LogOnlyBackend::new();
        for _ in 0..20 {
            backend.volume_up(0.1).unwrap();
        }
        assert_eq!(backend.volume(), 1.0);
        for _ in 0..40 {
            backend.volume_down(0.1).unwrap();
        }
        assert_eq!(backend.volume(), 0.0);
    }

    #[test]
    fn mute_toggles() {
        let mut backend = LogOnlyBackend::new();
        backend.mute_toggle().unwrap();
        assert!(backend.muted());
        backend.mute_toggle().unwrap();
        assert!(!backend.muted());
    }

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

    #[test]
    fn dispatch_swallows_backend_failures() {
        let mut router = ActionRouter::new(Box::new(Failing), 0.05);
        router.dispatch(&event(GestureAction::Play, 5));
        router.dispatch(&event(GestureAction::VolumeUp, 3));
    }

    #[test]
    fn play_and_pause_share_the_toggle() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        struct Counting {
            toggles: Arc<AtomicU32>,
        }
        impl MediaBackend for Counting {
            fn name(&self) -> &'static str {
                "counting"
            }
            fn toggle_play_pause(&mut self) -> Result<()> {
                self.toggles.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn next_track(&mut self) -> Result<()> {
                Ok(())
            }
            fn previous_track(&mut self) -> Result<()> {
                Ok(())
            }
            fn volume_up(&mut self, _step: f32) -> Result<()> {
                Ok(())
            }
            fn volume_down(&mut self, _step: f32) -> Result<()> {
                Ok(())
            }
            fn mute_toggle(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let toggles = Arc::new(AtomicU32::new(0));
        let mut router = ActionRouter::new(
            Box::new(Counting {
                toggles: toggles.clone(),
            }),
            0.05,
        );
        router.dispatch(&event(GestureAction::Play, 5));
        router.dispatch(&event(GestureAction::Pause, 0));
        assert_eq!(toggles.load(Ordering::SeqCst), 2);
    }
}
