//! Callback-side session engine.
//!
//! Owns the decode stream and the decode-ahead buffer. It is the only place that
//! changes the playback position: control-path seeks and fast-review steps are
//! queued in [`SessionShared`] and applied at the top of the next callback.

use std::sync::Arc;
use std::time::Duration;

use player_types::{PlaybackEndReason, PlaybackStatus};

use crate::bitrate::InstantBitrate;
use crate::buffer::{DecodeAheadBuffer, SINK_CHANNELS};
use crate::config::EngineConfig;
use crate::drivers::{DecodeStream, StreamParams};
use crate::harness::{CallbackOutcome, FrameSource};
use crate::status::{SeekIntent, SessionShared};

/// Frame source feeding one loaded track to the harness.
pub struct SessionEngine {
    shared: Arc<SessionShared>,
    stream: Box<dyn DecodeStream>,
    buffer: DecodeAheadBuffer,
    sample_rate: f64,
    duration: f64,
    bitrate: InstantBitrate,
    silence_delay: Duration,
    done: bool,
}

impl SessionEngine {
    pub fn new(
        shared: Arc<SessionShared>,
        stream: Box<dyn DecodeStream>,
        params: &StreamParams,
        config: &EngineConfig,
    ) -> Self {
        Self {
            shared,
            stream,
            buffer: DecodeAheadBuffer::new(params.unit_frames, usize::from(params.channels)),
            sample_rate: f64::from(params.sample_rate.max(1)),
            duration: params.duration,
            bitrate: InstantBitrate::new(),
            silence_delay: Duration::from_millis(config.silence_delay_ms),
            done: false,
        }
    }

    /// Reposition to `target`; `false` means the session has ended.
    fn seek_to(&mut self, target: f64) -> bool {
        if self.duration > 0.0 && target >= self.duration {
            tracing::debug!(target, duration = self.duration, "seek past end");
            self.stop(PlaybackEndReason::Eof);
            return false;
        }
        let target = target.max(0.0);
        match self.stream.seek(target) {
            Ok(reached) => {
                self.buffer.invalidate();
                self.bitrate.reset();
                self.shared.set_play_time(reached);
                true
            }
            Err(e) => {
                tracing::warn!(target, "seek failed: {e}");
                self.stop(PlaybackEndReason::Error);
                false
            }
        }
    }

    /// Apply a queued intent; `false` means the session has ended.
    ///
    /// A session left in fast review goes back to `Playing` whichever intent
    /// replaced the pending step.
    fn apply_intent(&mut self, intent: SeekIntent) -> bool {
        let target = match intent {
            SeekIntent::Absolute(seconds) => seconds,
            SeekIntent::Review(step) => self.shared.play_time() + step,
        };
        if !self.seek_to(target) {
            return false;
        }
        let _ = self
            .shared
            .transition_if(PlaybackStatus::is_reviewing, PlaybackStatus::Playing);
        true
    }

    fn stop(&mut self, reason: PlaybackEndReason) {
        self.done = true;
        self.buffer.invalidate();
        self.shared.finish(reason);
    }

    fn refill(&mut self) -> crate::error::Result<usize> {
        let stream = &mut self.stream;
        let mut bitrate_bps = None;
        let frames = self.buffer.refill_with(|samples| {
            let unit = stream.decode_unit(samples)?;
            bitrate_bps = unit.bitrate_bps;
            Ok(unit.frames)
        })?;
        if let Some(bps) = bitrate_bps {
            self.bitrate.add(bps, frames as f64 / self.sample_rate);
            self.shared.set_ins_kbps(self.bitrate.kbps());
        }
        Ok(frames)
    }
}

impl FrameSource for SessionEngine {
    fn fill(&mut self, out: &mut [i16]) -> CallbackOutcome {
        if self.done {
            out.fill(0);
            return CallbackOutcome::Stop;
        }

        if let (_, Some(intent)) = self.shared.take_pending() {
            if !self.apply_intent(intent) {
                out.fill(0);
                return CallbackOutcome::Stop;
            }
        }

        match self.shared.status() {
            PlaybackStatus::Playing => {}
            PlaybackStatus::Stopped => {
                out.fill(0);
                return CallbackOutcome::Stop;
            }
            _ => {
                out.fill(0);
                if !self.silence_delay.is_zero() {
                    std::thread::sleep(self.silence_delay);
                }
                return CallbackOutcome::Continue;
            }
        }

        let frames = out.len() / SINK_CHANNELS;
        let mut written = 0;
        while written < frames {
            written += self
                .buffer
                .drain_into(&mut out[written * SINK_CHANNELS..], frames - written);
            if written == frames {
                break;
            }
            match self.refill() {
                Ok(0) => {
                    tracing::debug!("end of stream");
                    out[written * SINK_CHANNELS..].fill(0);
                    self.stop(PlaybackEndReason::Eof);
                    return CallbackOutcome::Stop;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("decode failed, stopping: {e}");
                    out[written * SINK_CHANNELS..].fill(0);
                    self.stop(PlaybackEndReason::Error);
                    return CallbackOutcome::Stop;
                }
            }
        }

        let now = self.shared.play_time() + written as f64 / self.sample_rate;
        self.shared.set_play_time(now);
        CallbackOutcome::Continue
    }
}
