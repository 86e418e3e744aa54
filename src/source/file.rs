//! Local file frame source.
//!
//! Opening validates existence first (a missing path is a distinct error
//! from an open failure), probe-reads one frame to confirm the file is
//! decodable, and resets to the start. Real files require the `file-ffmpeg`
//! feature; `stub://` paths select a deterministic synthetic clip.
//!
//! Synthetic clip naming: `stub://clip-8` is an 8-frame clip (a trailing
//! `-<digits>` sets the length, default 25); any `stub://` path containing
//! `unreachable` simulates a file that opens but yields no probe frame.

use std::path::Path;

use super::{synthetic_frame, ReadOutcome, SourceError};

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticClip),
    #[cfg(feature = "file-ffmpeg")]
    Ffmpeg(super::file_ffmpeg::FfmpegFileSource),
}

impl FileSource {
    /// Open and probe a file source.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let text = path.to_string_lossy();
        if let Some(rest) = text.strip_prefix("stub://") {
            if rest.contains("unreachable") {
                return Err(SourceError::SourceUnreadable {
                    what: format!("{} produced no probe frame", text),
                });
            }
            let mut clip = SyntheticClip::new(rest);
            clip.probe()?;
            log::info!("FileSource: opened {} (synthetic, {} frames)", text, clip.total_frames);
            return Ok(Self {
                backend: FileBackend::Synthetic(clip),
            });
        }

        if !path.exists() {
            return Err(SourceError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }

        #[cfg(feature = "file-ffmpeg")]
        {
            let mut source = super::file_ffmpeg::FfmpegFileSource::open(path)?;
            source.probe()?;
            log::info!("FileSource: opened {} (ffmpeg)", path.display());
            Ok(Self {
                backend: FileBackend::Ffmpeg(source),
            })
        }
        #[cfg(not(feature = "file-ffmpeg"))]
        {
            Err(SourceError::SourceUnreadable {
                what: format!(
                    "{}: file decoding requires the file-ffmpeg feature",
                    path.display()
                ),
            })
        }
    }

    /// Read the next frame; finite streams yield `EndOfStream` at the end.
    pub fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        match &mut self.backend {
            FileBackend::Synthetic(clip) => clip.read(),
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.read(),
        }
    }

    /// Rewind to the first frame.
    pub fn reset_to_start(&mut self) -> Result<(), SourceError> {
        match &mut self.backend {
            FileBackend::Synthetic(clip) => {
                clip.position = 0;
                Ok(())
            }
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.reset_to_start(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic clip (stub://) for tests
// ----------------------------------------------------------------------------

const SYNTHETIC_CLIP_FRAMES: u64 = 25;
const SYNTHETIC_WIDTH: u32 = 320;
const SYNTHETIC_HEIGHT: u32 = 240;

struct SyntheticClip {
    total_frames: u64,
    position: u64,
}

impl SyntheticClip {
    fn new(name: &str) -> Self {
        let total_frames = name
            .rsplit_once('-')
            .and_then(|(_, digits)| digits.parse::<u64>().ok())
            .unwrap_or(SYNTHETIC_CLIP_FRAMES);
        Self {
            total_frames,
            position: 0,
        }
    }

    /// Probe read: one trial frame, then rewind.
    fn probe(&mut self) -> Result<(), SourceError> {
        match self.read()? {
            ReadOutcome::Frame(_) => {
                self.position = 0;
                Ok(())
            }
            ReadOutcome::EndOfStream => Err(SourceError::SourceUnreadable {
                what: "synthetic clip has no frames".to_string(),
            }),
        }
    }

    fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        if self.position >= self.total_frames {
            return Ok(ReadOutcome::EndOfStream);
        }
        let frame = synthetic_frame(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, self.position);
        self.position += 1;
        Ok(ReadOutcome::Frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_file_is_source_not_found() {
        let err = FileSource::open(Path::new("/nonexistent/clip.mp4")).unwrap_err();
        assert!(matches!(err, SourceError::SourceNotFound { .. }));
    }

    #[test]
    fn unreadable_stub_is_source_unreadable() {
        let err = FileSource::open(Path::new("stub://unreachable")).unwrap_err();
        assert!(matches!(err, SourceError::SourceUnreadable { .. }));
    }

    #[test]
    fn zero_frame_clip_fails_the_probe() {
        let err = FileSource::open(Path::new("stub://clip-0")).unwrap_err();
        assert!(matches!(err, SourceError::SourceUnreadable { .. }));
    }

    #[test]
    fn probe_rewinds_to_the_first_frame() -> Result<(), SourceError> {
        let mut source = FileSource::open(Path::new("stub://clip-2"))?;
        // The probe consumed a frame; both clip frames must still be read.
        let mut frames = 0;
        while let ReadOutcome::Frame(_) = source.read()? {
            frames += 1;
        }
        assert_eq!(frames, 2);
        Ok(())
    }

    #[test]
    fn reset_restarts_a_finished_clip() -> Result<(), SourceError> {
        let path = PathBuf::from("stub://clip-1");
        let mut source = FileSource::open(&path)?;
        assert!(matches!(source.read()?, ReadOutcome::Frame(_)));
        assert!(matches!(source.read()?, ReadOutcome::EndOfStream));
        source.reset_to_start()?;
        assert!(matches!(source.read()?, ReadOutcome::Frame(_)));
        Ok(())
    }

    #[test]
    fn clip_length_parses_from_the_name() -> Result<(), SourceError> {
        let mut source = FileSource::open(Path::new("stub://demo"))?;
        let mut frames = 0;
        while let ReadOutcome::Frame(_) = source.read()? {
            frames += 1;
        }
        assert_eq!(frames, SYNTHETIC_CLIP_FRAMES);
        Ok(())
    }
}
