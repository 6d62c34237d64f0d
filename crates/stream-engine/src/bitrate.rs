//! Instantaneous bitrate over a short sliding window.

use std::collections::VecDeque;

const WINDOW_SECONDS: f64 = 1.0;

#[derive(Debug, Default)]
pub struct InstantBitrate {
    samples: VecDeque<(f64, f64)>,
    bits: f64,
    seconds: f64,
}

impl InstantBitrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `seconds` of audio coded at `bps` bits per second.
    pub fn add(&mut self, bps: f64, seconds: f64) {
        if !(bps.is_finite() && seconds.is_finite()) || seconds <= 0.0 || bps < 0.0 {
            return;
        }
        let bits = bps * seconds;
        self.samples.push_back((bits, seconds));
        self.bits += bits;
        self.seconds += seconds;

        while let Some(&(old_bits, old_secs)) = self.samples.front() {
            if self.samples.len() == 1 || self.seconds - old_secs < WINDOW_SECONDS {
                break;
            }
            self.samples.pop_front();
            self.bits -= old_bits;
            self.seconds -= old_secs;
        }
    }

    /// Average over the window in kbps; 0 when empty.
    pub fn kbps(&self) -> f64 {
        if self.seconds <= 0.0 {
            return 0.0;
        }
        self.bits / self.seconds / 1000.0
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.bits = 0.0;
        self.seconds = 0.0;
    }
}
