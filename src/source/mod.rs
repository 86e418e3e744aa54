//! Video sources.
//!
//! This module provides frame acquisition from three backends:
//! - Local video files (feature: file-ffmpeg)
//! - RTSP streams (feature: rtsp-gstreamer)
//! - Cameras (feature: camera-v4l2)
//!
//! Every backend also has a `stub://` synthetic form that is always compiled,
//! so acquisition, fallback, and looping behavior run without hardware.
//!
//! Acquisition walks `Unopened -> Probing -> Bound` (or `Failed`): a source
//! is opened, one probe frame is read to confirm decodability, and file
//! sources are reset to the start before the first real read. Failure policy:
//! - A missing file path is `SourceNotFound`; an undecodable source is
//!   `SourceUnreadable`. Neither has a fallback.
//! - An RTSP failure falls back to camera acquisition.
//! - Camera acquisition probes indices 0..=9 when auto-detection is on and
//!   reports `NoCameraAvailable` if none binds.
//!
//! Live sources (camera, RTSP) are mirrored horizontally; file sources never
//! are. Frame geometry from the configuration applies to cameras only; file
//! and RTSP sources keep their native resolution.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use thiserror::Error;

use crate::frame::Frame;

pub mod camera;
pub mod file;
#[cfg(feature = "file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod rtsp;

pub use camera::CameraSource;
pub use file::FileSource;
pub use rtsp::RtspSource;

/// Which backend a source configuration selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceMode {
    Camera,
    Rtsp,
    File,
}

/// RTSP transport protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RtspTransport {
    #[default]
    Tcp,
    Udp,
}

impl RtspTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Udp => "udp",
        }
    }
}

impl fmt::Display for RtspTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RtspTransport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(RtspTransport::Tcp),
            "udp" => Ok(RtspTransport::Udp),
            other => Err(anyhow!("rtsp_transport must be tcp or udp, got '{}'", other)),
        }
    }
}

/// Source selection and policy. Immutable once a source is opened; build a
/// new value to switch sources.
#[derive(Clone, Debug)]
pub struct VideoSourceConfig {
    pub mode: SourceMode,
    pub camera_index: u32,
    pub camera_auto_detect: bool,
    /// Device node template; `{index}` is replaced by the camera index.
    pub device_template: String,
    pub rtsp_url: String,
    pub rtsp_transport: RtspTransport,
    pub file_path: Option<PathBuf>,
    /// Requested geometry, applied to camera sources only.
    pub frame_width: u32,
    pub frame_height: u32,
    /// File sources loop back to frame 0 at end of stream when set.
    pub loop_on_eof: bool,
}

impl Default for VideoSourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Camera,
            camera_index: 0,
            camera_auto_detect: true,
            device_template: "/dev/video{index}".to_string(),
            rtsp_url: String::new(),
            rtsp_transport: RtspTransport::Tcp,
            file_path: None,
            frame_width: 640,
            frame_height: 480,
            loop_on_eof: true,
        }
    }
}

/// Failure taxonomy for acquisition and reads.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Configured file path does not exist. Fatal to the attempt, no fallback.
    #[error("video file not found: {path}")]
    SourceNotFound { path: PathBuf },
    /// Source opened but produced no decodable probe frame.
    #[error("source opened but is unreadable: {what}")]
    SourceUnreadable { what: String },
    /// RTSP open or probe failure. Recovered by falling back to camera
    /// acquisition at open time.
    #[error("rtsp stream failure for {url}: {reason}")]
    StreamFailure { url: String, reason: String },
    /// No camera index in 0..=9 opened and probe-read. Fatal to the run.
    #[error("no working camera available")]
    NoCameraAvailable,
    /// A live source stopped producing frames after a successful start.
    #[error("source stopped producing frames: {reason}")]
    MidRunReadFailure { reason: String },
}

/// One successful read: either a frame or the end of a finite stream.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    EndOfStream,
}

enum Backend {
    File(FileSource),
    Rtsp(RtspSource),
    Camera(CameraSource),
}

/// Runtime handle over an open, probed backend.
///
/// Exclusively owned by the capture loop for its lifetime; the underlying
/// handle is released on drop, which the loop performs deterministically
/// before it reports finished.
pub struct OpenVideoSource {
    backend: Backend,
    mirror: bool,
    loop_on_eof: bool,
    seq: u64,
    frames_read: u64,
    descriptor: String,
}

impl OpenVideoSource {
    /// Acquire a source per the configured mode.
    pub fn open(config: &VideoSourceConfig) -> Result<Self, SourceError> {
        match config.mode {
            SourceMode::File => Self::open_file(config),
            SourceMode::Rtsp => match Self::open_rtsp(config) {
                Ok(source) => Ok(source),
                Err(err) => {
                    log::warn!("rtsp acquisition failed, falling back to camera: {}", err);
                    Self::open_camera(config)
                }
            },
            SourceMode::Camera => Self::open_camera(config),
        }
    }

    fn open_file(config: &VideoSourceConfig) -> Result<Self, SourceError> {
        let Some(path) = config.file_path.as_deref() else {
            return Err(SourceError::SourceNotFound {
                path: PathBuf::new(),
            });
        };
        let source = FileSource::open(path)?;
        let descriptor = format!("file:{}", path.display());
        log::info!("video source bound: {}", descriptor);
        Ok(Self {
            backend: Backend::File(source),
            mirror: false,
            loop_on_eof: config.loop_on_eof,
            seq: 0,
            frames_read: 0,
            descriptor,
        })
    }

    fn open_rtsp(config: &VideoSourceConfig) -> Result<Self, SourceError> {
        let source = RtspSource::open(&config.rtsp_url, config.rtsp_transport)?;
        let descriptor = format!("rtsp:{}", config.rtsp_url);
        log::info!("video source bound: {}", descriptor);
        Ok(Self {
            backend: Backend::Rtsp(source),
            mirror: true,
            loop_on_eof: false,
            seq: 0,
            frames_read: 0,
            descriptor,
        })
    }

    fn open_camera(config: &VideoSourceConfig) -> Result<Self, SourceError> {
        let (index, source) = camera::bind_camera(config)?;
        let descriptor = format!("camera:{}", index);
        log::info!("video source bound: {}", descriptor);
        Ok(Self {
            backend: Backend::Camera(source),
            mirror: true,
            loop_on_eof: false,
            seq: 0,
            frames_read: 0,
            descriptor,
        })
    }

    /// Read the next frame.
    ///
    /// File end-of-stream either rewinds to frame 0 (when looping) or is
    /// returned once as `ReadOutcome::EndOfStream`. A live source that stops
    /// producing frames is a `MidRunReadFailure`.
    pub fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        loop {
            let outcome = match &mut self.backend {
                Backend::File(source) => source.read()?,
                Backend::Rtsp(source) => source.read()?,
                Backend::Camera(source) => source.read()?,
            };
            match outcome {
                ReadOutcome::EndOfStream if self.loop_on_eof => {
                    log::info!("{}: end of stream, restarting from frame 0", self.descriptor);
                    self.reset_to_start()?;
                }
                ReadOutcome::EndOfStream => return Ok(ReadOutcome::EndOfStream),
                ReadOutcome::Frame(mut frame) => {
                    frame.seq = self.seq;
                    self.seq += 1;
                    self.frames_read += 1;
                    if self.mirror {
                        frame.mirror_horizontal();
                    }
                    return Ok(ReadOutcome::Frame(frame));
                }
            }
        }
    }

    /// Rewind a file source to its first frame. No-op for live sources.
    pub fn reset_to_start(&mut self) -> Result<(), SourceError> {
        match &mut self.backend {
            Backend::File(source) => source.reset_to_start(),
            Backend::Rtsp(_) | Backend::Camera(_) => Ok(()),
        }
    }

    /// Human-readable identity of the bound backend, e.g. `camera:2`.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// True for camera and RTSP sources.
    pub fn is_live(&self) -> bool {
        matches!(self.backend, Backend::Rtsp(_) | Backend::Camera(_))
    }
}

/// Deterministic synthetic pixel pattern shared by the stub backends.
pub(crate) fn synthetic_frame(width: u32, height: u32, frame_count: u64) -> Frame {
    let pixel_count = (width as usize) * (height as usize) * 3;
    let mut pixels = vec![0u8; pixel_count];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = ((i as u64 + frame_count) % 256) as u8;
    }
    Frame::new(pixels, width, height, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> VideoSourceConfig {
        VideoSourceConfig {
            device_template: "stub://cam{index}".to_string(),
            ..VideoSourceConfig::default()
        }
    }

    #[test]
    fn file_source_is_never_mirrored() -> Result<(), SourceError> {
        let config = VideoSourceConfig {
            mode: SourceMode::File,
            file_path: Some(PathBuf::from("stub://clip-4")),
            loop_on_eof: false,
            ..stub_config()
        };
        let source = OpenVideoSource::open(&config)?;
        assert!(!source.is_live());
        assert!(!source.mirror);
        Ok(())
    }

    #[test]
    fn file_source_without_path_is_not_found() {
        let config = VideoSourceConfig {
            mode: SourceMode::File,
            file_path: None,
            ..stub_config()
        };
        let err = OpenVideoSource::open(&config).unwrap_err();
        assert!(matches!(err, SourceError::SourceNotFound { .. }));
    }

    #[test]
    fn file_source_loops_at_end_of_stream() -> Result<(), SourceError> {
        let config = VideoSourceConfig {
            mode: SourceMode::File,
            file_path: Some(PathBuf::from("stub://clip-3")),
            loop_on_eof: true,
            ..stub_config()
        };
        let mut source = OpenVideoSource::open(&config)?;
        // A 3-frame clip keeps producing well past its length.
        for _ in 0..10 {
            match source.read()? {
                ReadOutcome::Frame(_) => {}
                ReadOutcome::EndOfStream => panic!("looping source must not end"),
            }
        }
        assert_eq!(source.frames_read(), 10);
        Ok(())
    }

    #[test]
    fn file_source_ends_once_without_looping() -> Result<(), SourceError> {
        let config = VideoSourceConfig {
            mode: SourceMode::File,
            file_path: Some(PathBuf::from("stub://clip-3")),
            loop_on_eof: false,
            ..stub_config()
        };
        let mut source = OpenVideoSource::open(&config)?;
        let mut frames = 0;
        loop {
            match source.read()? {
                ReadOutcome::Frame(_) => frames += 1,
                ReadOutcome::EndOfStream => break,
            }
        }
        assert_eq!(frames, 3);
        Ok(())
    }

    #[test]
    fn rtsp_failure_falls_back_to_camera() -> Result<(), SourceError> {
        let config = VideoSourceConfig {
            mode: SourceMode::Rtsp,
            rtsp_url: "stub://unreachable".to_string(),
            ..stub_config()
        };
        let source = OpenVideoSource::open(&config)?;
        assert!(source.descriptor().starts_with("camera:"));
        Ok(())
    }

    #[test]
    fn rtsp_and_camera_sources_are_mirrored() -> Result<(), SourceError> {
        let config = VideoSourceConfig {
            mode: SourceMode::Rtsp,
            rtsp_url: "stub://front".to_string(),
            ..stub_config()
        };
        let source = OpenVideoSource::open(&config)?;
        assert!(source.mirror);

        let config = VideoSourceConfig {
            mode: SourceMode::Camera,
            ..stub_config()
        };
        let source = OpenVideoSource::open(&config)?;
        assert!(source.mirror);
        Ok(())
    }

    #[test]
    fn frame_sequence_numbers_increase() -> Result<(), SourceError> {
        let config = VideoSourceConfig {
            mode: SourceMode::Camera,
            ..stub_config()
        };
        let mut source = OpenVideoSource::open(&config)?;
        for expected in 0..3u64 {
            match source.read()? {
                ReadOutcome::Frame(frame) => assert_eq!(frame.seq, expected),
                ReadOutcome::EndOfStream => panic!("camera never ends"),
            }
        }
        Ok(())
    }
}
