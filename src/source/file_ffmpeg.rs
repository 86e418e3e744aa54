//! FFmpeg-backed local file decoder.
//!
//! Decodes the best video track to tightly packed RGB24 at its native
//! resolution. End of stream is an outcome, not an error; rewinding seeks
//! back to the start and flushes the decoder.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use super::{ReadOutcome, SourceError};
use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &Path) -> Result<Self, SourceError> {
        ffmpeg::init().map_err(|err| SourceError::SourceUnreadable {
            what: format!("initialize ffmpeg: {}", err),
        })?;
        let input = ffmpeg::format::input(&path).map_err(|err| SourceError::SourceUnreadable {
            what: format!("{}: open failed: {}", path.display(), err),
        })?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| SourceError::SourceUnreadable {
                what: format!("{}: no video track", path.display()),
            })?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(|err| SourceError::SourceUnreadable {
            what: format!("load video decoder parameters: {}", err),
        })?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|err| SourceError::SourceUnreadable {
                what: format!("open video decoder: {}", err),
            })?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|err| SourceError::SourceUnreadable {
            what: format!("create scaler: {}", err),
        })?;

        log::info!(
            "FileSource: {} is {}x{}",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
        })
    }

    /// Probe read: one trial frame, then rewind.
    pub(crate) fn probe(&mut self) -> Result<(), SourceError> {
        match self.read()? {
            ReadOutcome::Frame(_) => self.reset_to_start(),
            ReadOutcome::EndOfStream => Err(SourceError::SourceUnreadable {
                what: "file opened but produced no frames".to_string(),
            }),
        }
    }

    pub(crate) fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb = ffmpeg::frame::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }

            self.decoder
                .send_packet(&packet)
                .map_err(|err| SourceError::MidRunReadFailure {
                    reason: format!("send packet to decoder: {}", err),
                })?;

            while self.decoder.receive_frame(&mut decoded).is_ok() {
                self.scaler
                    .run(&decoded, &mut rgb)
                    .map_err(|err| SourceError::MidRunReadFailure {
                        reason: format!("scale frame to RGB: {}", err),
                    })?;
                let (pixels, width, height) = frame_to_pixels(&rgb)?;
                return Ok(ReadOutcome::Frame(Frame::new(pixels, width, height, 0)));
            }
        }

        Ok(ReadOutcome::EndOfStream)
    }

    pub(crate) fn reset_to_start(&mut self) -> Result<(), SourceError> {
        self.input
            .seek(0, ..)
            .map_err(|err| SourceError::MidRunReadFailure {
                reason: format!("seek to start: {}", err),
            })?;
        self.decoder.flush();
        Ok(())
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32), SourceError> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(data.get(start..end).ok_or_else(|| {
            SourceError::MidRunReadFailure {
                reason: "decoded frame row is out of bounds".to_string(),
            }
        })?);
    }

    Ok((pixels, width, height))
}
