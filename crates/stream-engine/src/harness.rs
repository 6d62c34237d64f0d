//! Real-time output harness seam.
//!
//! A harness periodically pulls interleaved stereo `i16` frames from a single
//! [`FrameSource`]. The source answers every pull with a full buffer; it signals
//! end of stream or a fatal error by returning [`CallbackOutcome::Stop`], after
//! which the harness renders silence and never calls it again.

use std::sync::{Mutex, MutexGuard};

use crate::buffer::SINK_CHANNELS;
use crate::error::Result;

/// What the harness should do after a pull.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Keep calling back.
    Continue,
    /// Stop calling back; the source is done.
    Stop,
}

/// Producer of interleaved stereo PCM for the output callback.
pub trait FrameSource: Send {
    /// Fill all of `out` (interleaved stereo) with PCM or silence.
    fn fill(&mut self, out: &mut [i16]) -> CallbackOutcome;
}

/// Pull-based output harness.
pub trait AudioHarness: Send + Sync {
    /// Start pulling from `source` at `sample_rate`, replacing any current source.
    fn start(&self, sample_rate: u32, source: Box<dyn FrameSource>) -> Result<()>;
    /// Disable further callbacks, wait for an in-flight one, and drop the source.
    fn stop(&self);
}

#[derive(Default)]
struct ManualState {
    source: Option<Box<dyn FrameSource>>,
    sample_rate: Option<u32>,
    stopped: bool,
    callbacks: u64,
}

/// Harness driven synchronously by the caller.
///
/// Used for offline rendering and tests: every [`ManualHarness::pump`] runs one
/// callback on the calling thread.
#[derive(Default)]
pub struct ManualHarness {
    state: Mutex<ManualState>,
}

impl ManualHarness {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run one callback for `frames` frames.
    ///
    /// Returns `None` when no source is attached. After a source returns
    /// [`CallbackOutcome::Stop`] the harness keeps answering with silence.
    pub fn pump(&self, frames: usize) -> Option<(Vec<i16>, CallbackOutcome)> {
        let mut st = self.lock();
        let mut out = vec![0i16; frames * SINK_CHANNELS];
        if st.stopped {
            return st.source.as_ref().map(|_| (out, CallbackOutcome::Stop));
        }
        let source = st.source.as_mut()?;
        let outcome = source.fill(&mut out);
        st.callbacks += 1;
        if outcome == CallbackOutcome::Stop {
            st.stopped = true;
        }
        Some((out, outcome))
    }

    /// Sample rate requested by the current source.
    pub fn sample_rate(&self) -> Option<u32> {
        self.lock().sample_rate
    }

    /// Whether a source is attached and still being called.
    pub fn is_running(&self) -> bool {
        let st = self.lock();
        st.source.is_some() && !st.stopped
    }

    /// Callbacks run since the current source was attached.
    pub fn callbacks(&self) -> u64 {
        self.lock().callbacks
    }
}

impl AudioHarness for ManualHarness {
    fn start(&self, sample_rate: u32, source: Box<dyn FrameSource>) -> Result<()> {
        let mut st = self.lock();
        *st = ManualState {
            source: Some(source),
            sample_rate: Some(sample_rate),
            stopped: false,
            callbacks: 0,
        };
        Ok(())
    }

    fn stop(&self) {
        let old = {
            let mut st = self.lock();
            st.sample_rate = None;
            st.stopped = false;
            st.source.take()
        };
        drop(old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown(usize);

    impl FrameSource for Countdown {
        fn fill(&mut self, out: &mut [i16]) -> CallbackOutcome {
            if self.0 == 0 {
                out.fill(0);
                return CallbackOutcome::Stop;
            }
            self.0 -= 1;
            out.fill(1);
            CallbackOutcome::Continue
        }
    }

    #[test]
    fn pump_without_source_is_none() {
        let h = ManualHarness::new();
        assert!(h.pump(16).is_none());
        assert!(!h.is_running());
    }

    #[test]
    fn stop_outcome_silences_and_stops_calling() {
        let h = ManualHarness::new();
        h.start(44_100, Box::new(Countdown(1))).unwrap();
        assert_eq!(h.sample_rate(), Some(44_100));

        let (pcm, outcome) = h.pump(4).unwrap();
        assert_eq!(outcome, CallbackOutcome::Continue);
        assert_eq!(pcm, vec![1; 8]);

        let (_, outcome) = h.pump(4).unwrap();
        assert_eq!(outcome, CallbackOutcome::Stop);
        assert!(!h.is_running());

        let (pcm, outcome) = h.pump(4).unwrap();
        assert_eq!(outcome, CallbackOutcome::Stop);
        assert_eq!(pcm, vec![0; 8]);
        assert_eq!(h.callbacks(), 2);
    }

    #[test]
    fn stop_drops_source() {
        let h = ManualHarness::new();
        h.start(8_000, Box::new(Countdown(10))).unwrap();
        h.stop();
        assert!(h.pump(4).is_none());
        assert_eq!(h.sample_rate(), None);
    }
}
