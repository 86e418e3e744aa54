//! RTSP frame source.
//!
//! Real streams require the `rtsp-gstreamer` feature and are decoded with a
//! minimal internal buffer (`latency=0`, one appsink buffer with drop) to
//! bound end-to-end latency. `stub://` URLs select an endless synthetic
//! stream; a URL containing `unreachable` simulates a stream that opens but
//! never delivers a probe frame.
//!
//! An RTSP failure here is non-fatal to the pipeline: acquisition falls back
//! to camera capture at the `OpenVideoSource` level.

#[cfg(feature = "rtsp-gstreamer")]
use std::time::Duration;

use super::{synthetic_frame, ReadOutcome, RtspTransport, SourceError};

const SYNTHETIC_WIDTH: u32 = 320;
const SYNTHETIC_HEIGHT: u32 = 240;

/// RTSP frame source.
pub struct RtspSource {
    backend: RtspBackend,
}

enum RtspBackend {
    Synthetic(SyntheticStream),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerRtspSource),
}

impl RtspSource {
    /// Open and probe an RTSP stream.
    pub fn open(url: &str, transport: RtspTransport) -> Result<Self, SourceError> {
        if let Some(rest) = url.strip_prefix("stub://") {
            if rest.contains("unreachable") {
                return Err(SourceError::StreamFailure {
                    url: url.to_string(),
                    reason: "stream opened but produced no probe frame".to_string(),
                });
            }
            log::info!("RtspSource: connected to {} (synthetic, {})", url, transport);
            return Ok(Self {
                backend: RtspBackend::Synthetic(SyntheticStream::new()),
            });
        }

        #[cfg(feature = "rtsp-gstreamer")]
        {
            let mut source = GstreamerRtspSource::open(url, transport)?;
            source.probe()?;
            log::info!("RtspSource: connected to {} ({})", url, transport);
            Ok(Self {
                backend: RtspBackend::Gstreamer(source),
            })
        }
        #[cfg(not(feature = "rtsp-gstreamer"))]
        {
            Err(SourceError::StreamFailure {
                url: url.to_string(),
                reason: "rtsp decoding requires the rtsp-gstreamer feature".to_string(),
            })
        }
    }

    /// Read the next frame. Live streams never yield `EndOfStream`; a stall
    /// or decoder error is a `MidRunReadFailure`.
    pub fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        match &mut self.backend {
            RtspBackend::Synthetic(stream) => stream.read(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.read(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic stream (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticStream {
    frame_count: u64,
}

impl SyntheticStream {
    fn new() -> Self {
        Self { frame_count: 0 }
    }

    fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        // Pace the endless stream like a slow camera.
        std::thread::sleep(std::time::Duration::from_millis(2));
        let frame = synthetic_frame(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, self.frame_count);
        self.frame_count += 1;
        Ok(ReadOutcome::Frame(frame))
    }
}

// ----------------------------------------------------------------------------
// Production RTSP source using GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerRtspSource {
    url: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerRtspSource {
    /// Build and start the pipeline:
    /// rtspsrc ! decodebin ! videoconvert ! appsink (RGB, one buffer, drop).
    fn open(url: &str, transport: RtspTransport) -> Result<Self, SourceError> {
        let stream_failure = |reason: String| SourceError::StreamFailure {
            url: url.to_string(),
            reason,
        };

        gstreamer::init().map_err(|err| stream_failure(format!("initialize gstreamer: {}", err)))?;

        let pipeline_description = format!(
            "rtspsrc location={} protocols={} latency=0 ! decodebin ! videoconvert ! \
             video/x-raw,format=RGB ! appsink name=appsink sync=false max-buffers=1 drop=true",
            url,
            transport.as_str()
        );
        let pipeline = gstreamer::parse_launch(&pipeline_description)
            .map_err(|err| stream_failure(format!("build pipeline: {}", err)))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| stream_failure("pipeline is not a Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| stream_failure("appsink element missing".to_string()))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| stream_failure("appsink has unexpected type".to_string()))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|err| stream_failure(format!("set pipeline to Playing: {}", err)))?;

        Ok(Self {
            url: url.to_string(),
            pipeline,
            appsink,
        })
    }

    /// Probe read: confirm the stream decodes. Live streams cannot rewind,
    /// so the probe frame is simply discarded.
    fn probe(&mut self) -> Result<(), SourceError> {
        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(5))
            .ok_or_else(|| SourceError::StreamFailure {
                url: self.url.clone(),
                reason: "stream opened but produced no probe frame".to_string(),
            })?;
        let _ = sample_to_pixels(&sample).map_err(|reason| SourceError::StreamFailure {
            url: self.url.clone(),
            reason,
        })?;
        Ok(())
    }

    fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        if let Some(reason) = self.poll_bus() {
            return Err(SourceError::MidRunReadFailure { reason });
        }

        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(2))
            .ok_or_else(|| SourceError::MidRunReadFailure {
                reason: format!("{}: stream stalled", self.url),
            })?;

        let (pixels, width, height) =
            sample_to_pixels(&sample).map_err(|reason| SourceError::MidRunReadFailure { reason })?;
        Ok(ReadOutcome::Frame(crate::frame::Frame::new(
            pixels, width, height, 0,
        )))
    }

    fn poll_bus(&mut self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(message) = bus.timed_pop(Duration::from_millis(0)) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    return Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
        None
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl Drop for GstreamerRtspSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32), String> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| "sample missing buffer".to_string())?;
    let caps = sample
        .caps()
        .ok_or_else(|| "sample missing caps".to_string())?;
    let info = gstreamer_video::VideoInfo::from_caps(caps)
        .map_err(|err| format!("parse caps as video info: {}", err))?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride(0) as usize;

    let map = buffer
        .map_readable()
        .map_err(|err| format!("map buffer: {}", err))?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .ok_or_else(|| "buffer row is out of bounds".to_string())?,
        );
    }

    Ok((pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_stream_produces_frames() -> Result<(), SourceError> {
        let mut source = RtspSource::open("stub://front", RtspTransport::Tcp)?;
        for _ in 0..3 {
            match source.read()? {
                ReadOutcome::Frame(frame) => {
                    assert_eq!(frame.width, SYNTHETIC_WIDTH);
                    assert_eq!(frame.height, SYNTHETIC_HEIGHT);
                }
                ReadOutcome::EndOfStream => panic!("live stream must not end"),
            }
        }
        Ok(())
    }

    #[test]
    fn unreachable_stream_is_a_stream_failure() {
        let err = RtspSource::open("stub://unreachable", RtspTransport::Udp).unwrap_err();
        assert!(matches!(err, SourceError::StreamFailure { .. }));
    }
}
