//! Decode-ahead buffer.
//!
//! Holds one decode unit of interleaved PCM. The callback drains it in arbitrary
//! slices and refills it one whole unit at a time.
//!
//! Invariant: `0 <= read_cursor <= filled_frames <= capacity_frames`.

use crate::error::{DriverError, Result};

/// Output sink channel count. The harness always renders interleaved stereo.
pub const SINK_CHANNELS: usize = 2;

/// Staging buffer between a decode backend and the output callback.
#[derive(Debug)]
pub struct DecodeAheadBuffer {
    samples: Vec<i16>,
    channels: usize,
    capacity_frames: usize,
    filled_frames: usize,
    read_cursor: usize,
}

impl DecodeAheadBuffer {
    /// Allocate room for `capacity_frames` frames of `channels` interleaved samples.
    pub fn new(capacity_frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![0; capacity_frames * channels],
            channels,
            capacity_frames,
            filled_frames: 0,
            read_cursor: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn filled_frames(&self) -> usize {
        self.filled_frames
    }

    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Frames staged but not yet delivered.
    pub fn available(&self) -> usize {
        self.filled_frames - self.read_cursor
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Drop any staged frames so the next drain triggers a fresh decode.
    pub fn invalidate(&mut self) {
        self.filled_frames = 0;
        self.read_cursor = 0;
    }

    /// Copy up to `frames` staged frames into `out` as interleaved stereo.
    ///
    /// Mono sources are duplicated into both output channels. Returns frames copied.
    pub fn drain_into(&mut self, out: &mut [i16], frames: usize) -> usize {
        let frames = frames
            .min(self.available())
            .min(out.len() / SINK_CHANNELS);
        if frames == 0 {
            return 0;
        }
        let start = self.read_cursor * self.channels;
        let src = &self.samples[start..start + frames * self.channels];
        copy_to_sink(&mut out[..frames * SINK_CHANNELS], src, self.channels);
        self.read_cursor += frames;
        self.check_invariant();
        frames
    }

    /// Replace the staged unit with whatever `produce` writes.
    ///
    /// `produce` receives the whole sample area and returns the frames it wrote.
    /// On error the buffer is left empty.
    pub fn refill_with<F>(&mut self, produce: F) -> Result<usize>
    where
        F: FnOnce(&mut [i16]) -> Result<usize>,
    {
        self.invalidate();
        let frames = produce(&mut self.samples)?;
        if frames > self.capacity_frames {
            return Err(DriverError::Decode(format!(
                "decoder produced {frames} frames, buffer holds {}",
                self.capacity_frames
            )));
        }
        self.filled_frames = frames;
        self.check_invariant();
        Ok(frames)
    }

    fn check_invariant(&self) {
        debug_assert!(self.read_cursor <= self.filled_frames);
        debug_assert!(self.filled_frames <= self.capacity_frames);
    }
}

/// Copy interleaved `src` with `channels` channels into the stereo `dst`.
///
/// Mapping: mono duplicates, stereo passes through, wider layouts keep the first two.
fn copy_to_sink(dst: &mut [i16], src: &[i16], channels: usize) {
    match channels {
        2 => dst.copy_from_slice(src),
        1 => {
            for (frame, &s) in dst.chunks_exact_mut(SINK_CHANNELS).zip(src) {
                frame[0] = s;
                frame[1] = s;
            }
        }
        n => {
            for (frame, src) in dst.chunks_exact_mut(SINK_CHANNELS).zip(src.chunks_exact(n)) {
                frame[0] = src[0];
                frame[1] = src[1];
            }
        }
    }
}
