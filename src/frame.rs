//! Frame types shared across the capture pipeline.
//!
//! A `Frame` is a tightly packed RGB24 buffer plus capture metadata. Frames
//! are read-only once handed downstream; every consumer receives its own
//! owned copy across the thread boundary, so a frame is never mutated in
//! place after publication.

use std::time::SystemTime;

use crate::track::HandLandmarkSet;

/// One captured video frame: tightly packed RGB24, `width * height * 3` bytes.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonically increasing per-source sequence number.
    pub seq: u64,
    /// Source timestamp at capture.
    pub timestamp: SystemTime,
}

impl Frame {
    /// Create a new frame. Called only by the source layer.
    pub(crate) fn new(data: Vec<u8>, width: u32, height: u32, seq: u64) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize) * 3);
        Self {
            data,
            width,
            height,
            seq,
            timestamp: SystemTime::now(),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Flip the frame horizontally in place.
    ///
    /// Applied to live sources (camera, RTSP) so displayed hand motion
    /// matches intuitive left/right. File sources are never mirrored.
    pub fn mirror_horizontal(&mut self) {
        let pixels = self.width as usize;
        let row_bytes = pixels * 3;
        for row in self.data.chunks_exact_mut(row_bytes) {
            for x in 0..pixels / 2 {
                let a = x * 3;
                let b = (pixels - 1 - x) * 3;
                for c in 0..3 {
                    row.swap(a + c, b + c);
                }
            }
        }
    }
}

/// An annotated frame published to display subscribers.
#[derive(Clone, Debug)]
pub struct ProcessedFrame {
    pub frame: Frame,
    /// Human-readable overlay line, e.g. "3 fingers - volume_up".
    pub caption: String,
    /// Finger count for this frame, `None` when no hand was detected.
    pub finger_count: Option<u8>,
}

/// Paint a small green marker at each landmark of a detected hand.
pub fn draw_landmarks(frame: &mut Frame, hand: &HandLandmarkSet) {
    const RADIUS: i64 = 2;
    for point in hand.points.iter() {
        let cx = (point.x * frame.width as f32) as i64;
        let cy = (point.y * frame.height as f32) as i64;
        for dy in -RADIUS..=RADIUS {
            for dx in -RADIUS..=RADIUS {
                let x = cx + dx;
                let y = cy + dy;
                if x < 0 || y < 0 || x >= frame.width as i64 || y >= frame.height as i64 {
                    continue;
                }
                let idx = (y as usize * frame.width as usize + x as usize) * 3;
                frame.data[idx] = 0;
                frame.data[idx + 1] = 255;
                frame.data[idx + 2] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::synthetic_hand;

    #[test]
    fn mirror_swaps_pixels_within_rows() {
        // 2x2 frame; left column red, right column blue.
        let data = vec![
            255, 0, 0, 0, 0, 255, //
            255, 0, 0, 0, 0, 255,
        ];
        let mut frame = Frame::new(data, 2, 2, 0);
        frame.mirror_horizontal();
        assert_eq!(&frame.data[0..3], &[0, 0, 255]);
        assert_eq!(&frame.data[3..6], &[255, 0, 0]);
        assert_eq!(&frame.data[6..9], &[0, 0, 255]);
    }

    #[test]
    fn mirror_twice_is_identity() {
        let data: Vec<u8> = (0..5 * 3 * 3).map(|i| (i % 256) as u8).collect();
        let mut frame = Frame::new(data.clone(), 5, 3, 0);
        frame.mirror_horizontal();
        frame.mirror_horizontal();
        assert_eq!(frame.data, data);
    }

    #[test]
    fn draw_landmarks_stays_in_bounds() {
        let mut frame = Frame::new(vec![0u8; 16 * 16 * 3], 16, 16, 0);
        // Markers near the edges must clip, not panic.
        let hand = synthetic_hand([true; 5]);
        draw_landmarks(&mut frame, &hand);
        assert!(frame.data.iter().any(|&b| b == 255));
    }
}
