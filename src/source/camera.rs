//! Camera frame source.
//!
//! Real devices require the `camera-v4l2` feature. Binding first tries the
//! configured index; when auto-detection is enabled and that index fails,
//! indices 0..=9 are probed in order and the first device that opens and
//! reads a frame wins. The configured frame geometry is applied here and
//! only here; file and RTSP sources keep their native resolution.
//!
//! `stub://` devices select a synthetic camera: a device containing
//! `unreachable` fails its probe, and one containing `flaky` produces a few
//! frames and then stops (a mid-run read failure).

use std::time::Duration;

use super::{synthetic_frame, ReadOutcome, SourceError, VideoSourceConfig};

/// Highest camera index probed during auto-detection.
const MAX_PROBE_INDEX: u32 = 9;

/// Frames a `flaky` synthetic camera produces before dying.
const FLAKY_FRAME_BUDGET: u64 = 3;

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "camera-v4l2")]
    V4l2(V4l2Camera),
}

impl CameraSource {
    /// Open and probe one camera device at the requested geometry.
    pub fn open(device: &str, width: u32, height: u32) -> Result<Self, SourceError> {
        if device.starts_with("stub://") {
            if device.contains("unreachable") {
                return Err(SourceError::SourceUnreadable {
                    what: format!("{} produced no probe frame", device),
                });
            }
            let camera = SyntheticCamera::new(device, width, height);
            log::info!("CameraSource: opened {} (synthetic)", device);
            return Ok(Self {
                backend: CameraBackend::Synthetic(camera),
            });
        }

        #[cfg(feature = "camera-v4l2")]
        {
            let mut camera = V4l2Camera::open(device, width, height)?;
            camera.probe()?;
            log::info!("CameraSource: opened {}", device);
            Ok(Self {
                backend: CameraBackend::V4l2(camera),
            })
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            Err(SourceError::SourceUnreadable {
                what: format!("{}: camera capture requires the camera-v4l2 feature", device),
            })
        }
    }

    /// Read the next frame. Cameras never yield `EndOfStream`; a device that
    /// stops producing is a `MidRunReadFailure`.
    pub fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.read(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(camera) => camera.read(),
        }
    }
}

/// Render the device node for an index, e.g. `/dev/video{index}` -> `/dev/video2`.
pub(crate) fn device_for_index(template: &str, index: u32) -> String {
    template.replace("{index}", &index.to_string())
}

/// Probe candidate devices in order; bind the first that opens and reads.
pub fn open_first_working(
    candidates: &[String],
    width: u32,
    height: u32,
) -> Result<(usize, CameraSource), SourceError> {
    for (index, device) in candidates.iter().enumerate() {
        match CameraSource::open(device, width, height) {
            Ok(source) => {
                log::info!("camera {} detected and working ({})", index, device);
                return Ok((index, source));
            }
            Err(err) => {
                log::debug!("camera candidate {} rejected: {}", device, err);
            }
        }
    }
    Err(SourceError::NoCameraAvailable)
}

/// Bind a camera per the configuration: the configured index first, then
/// auto-detection over indices 0..=9 when enabled.
pub(crate) fn bind_camera(
    config: &VideoSourceConfig,
) -> Result<(u32, CameraSource), SourceError> {
    let device = device_for_index(&config.device_template, config.camera_index);
    match CameraSource::open(&device, config.frame_width, config.frame_height) {
        Ok(source) => return Ok((config.camera_index, source)),
        Err(err) => {
            if !config.camera_auto_detect {
                log::error!("camera {} not available: {}", config.camera_index, err);
                return Err(SourceError::NoCameraAvailable);
            }
            log::warn!(
                "camera {} not available, detecting other cameras: {}",
                config.camera_index,
                err
            );
        }
    }

    let candidates: Vec<String> = (0..=MAX_PROBE_INDEX)
        .map(|index| device_for_index(&config.device_template, index))
        .collect();
    let (index, source) =
        open_first_working(&candidates, config.frame_width, config.frame_height)?;
    Ok((index as u32, source))
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_count: u64,
    device: String,
    fail_after: Option<u64>,
}

impl SyntheticCamera {
    fn new(device: &str, width: u32, height: u32) -> Self {
        let fail_after = device.contains("flaky").then_some(FLAKY_FRAME_BUDGET);
        Self {
            width,
            height,
            frame_count: 0,
            device: device.to_string(),
            fail_after,
        }
    }

    fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        if let Some(budget) = self.fail_after {
            if self.frame_count >= budget {
                return Err(SourceError::MidRunReadFailure {
                    reason: format!("{} stopped producing frames", self.device),
                });
            }
        }
        // Pace the endless stream like a slow camera.
        std::thread::sleep(Duration::from_millis(2));
        let frame = synthetic_frame(self.width, self.height, self.frame_count);
        self.frame_count += 1;
        Ok(ReadOutcome::Frame(frame))
    }
}

// ----------------------------------------------------------------------------
// Production camera source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "camera-v4l2")]
mod v4l2_impl {
    use ouroboros::self_referencing;

    use super::{ReadOutcome, SourceError};
    use crate::frame::Frame;

    pub(super) struct V4l2Camera {
        state: V4l2State,
        active_width: u32,
        active_height: u32,
        device: String,
    }

    #[self_referencing]
    struct V4l2State {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl V4l2Camera {
        pub(super) fn open(path: &str, width: u32, height: u32) -> Result<Self, SourceError> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let unreadable = |what: String| SourceError::SourceUnreadable { what };

            let mut device = v4l::Device::with_path(path)
                .map_err(|err| unreadable(format!("open {}: {}", path, err)))?;
            let mut format = device
                .format()
                .map_err(|err| unreadable(format!("read format on {}: {}", path, err)))?;
            format.width = width;
            format.height = height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!("CameraSource: failed to set format on {}: {}", path, err);
                    device.format().map_err(|err| {
                        unreadable(format!("read format after set failure: {}", err))
                    })?
                }
            };

            let active_width = format.width;
            let active_height = format.height;

            let state = V4l2StateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                },
            }
            .try_build()
            .map_err(|err| unreadable(format!("create buffer stream on {}: {}", path, err)))?;

            log::info!(
                "CameraSource: {} negotiated {}x{}",
                path,
                active_width,
                active_height
            );

            Ok(Self {
                state,
                active_width,
                active_height,
                device: path.to_string(),
            })
        }

        /// Probe read: one trial frame, discarded (live devices cannot rewind).
        pub(super) fn probe(&mut self) -> Result<(), SourceError> {
            self.read().map(|_| ())
        }

        pub(super) fn read(&mut self) -> Result<ReadOutcome, SourceError> {
            use v4l::io::traits::CaptureStream;

            let device = self.device.clone();
            let (pixels, width, height) = {
                let (buf, _meta) = self
                    .state
                    .with_stream_mut(|stream| stream.next())
                    .map_err(|err| SourceError::MidRunReadFailure {
                        reason: format!("{}: capture failed: {}", device, err),
                    })?;
                (buf.to_vec(), self.active_width, self.active_height)
            };

            Ok(ReadOutcome::Frame(Frame::new(pixels, width, height, 0)))
        }
    }
}

#[cfg(feature = "camera-v4l2")]
use v4l2_impl::V4l2Camera;
