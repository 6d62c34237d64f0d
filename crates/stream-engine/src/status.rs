//! State shared between the control path and the real-time callback.
//!
//! Only the status, the pending seek intent and a few counters cross the thread
//! boundary. Decode state is owned by the callback side and never shared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use player_types::{ClockPair, PlaybackEndReason, PlaybackStatus};

use crate::power::PowerControl;

/// Position change requested by the control path, applied by the next callback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SeekIntent {
    /// Jump to an absolute time in seconds.
    Absolute(f64),
    /// Move by a signed number of seconds relative to the current play-time.
    Review(f64),
}

#[derive(Debug, Default)]
struct ControlState {
    status: PlaybackStatus,
    pending: Option<SeekIntent>,
    end_reason: Option<PlaybackEndReason>,
    play_clock: Option<ClockPair>,
    saved_clock: Option<ClockPair>,
}

/// Status and position retained across a suspend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub status: PlaybackStatus,
    pub play_time: f64,
}

/// Session state observed by both execution contexts.
pub struct SessionShared {
    control: Mutex<ControlState>,
    play_time_bits: AtomicU64,
    ins_kbps_bits: AtomicU64,
    power: Arc<dyn PowerControl>,
}

/// Audio is being rendered in these states; power-save is off while in them.
fn is_rendering(status: PlaybackStatus) -> bool {
    matches!(
        status,
        PlaybackStatus::Playing | PlaybackStatus::FastForward | PlaybackStatus::FastBackward
    )
}

impl SessionShared {
    pub fn new(power: Arc<dyn PowerControl>) -> Self {
        Self {
            control: Mutex::new(ControlState::default()),
            play_time_bits: AtomicU64::new(0f64.to_bits()),
            ins_kbps_bits: AtomicU64::new(0f64.to_bits()),
            power,
        }
    }

    /// Create a shared handle.
    pub fn shared(power: Arc<dyn PowerControl>) -> Arc<Self> {
        Arc::new(Self::new(power))
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        // A panic while holding the status lock leaves plain data behind; keep going.
        self.control.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Clock pair requested while audio renders.
    pub fn set_play_clock(&self, clock: ClockPair) {
        self.lock().play_clock = Some(clock);
    }

    pub fn status(&self) -> PlaybackStatus {
        self.lock().status
    }

    pub fn end_reason(&self) -> Option<PlaybackEndReason> {
        self.lock().end_reason
    }

    /// Move to `to`, toggling the power collaborator on rendering edges.
    pub fn transition(&self, to: PlaybackStatus) {
        let mut st = self.lock();
        self.apply(&mut st, to);
    }

    /// Move to `to` only when the current status satisfies `allowed`.
    ///
    /// Returns the status observed before the call.
    pub fn transition_if(
        &self,
        allowed: impl Fn(PlaybackStatus) -> bool,
        to: PlaybackStatus,
    ) -> Result<PlaybackStatus, PlaybackStatus> {
        let mut st = self.lock();
        let from = st.status;
        if !allowed(from) {
            return Err(from);
        }
        self.apply(&mut st, to);
        Ok(from)
    }

    fn apply(&self, st: &mut ControlState, to: PlaybackStatus) {
        let was = is_rendering(st.status);
        let now = is_rendering(to);
        st.status = to;
        if !was && now {
            st.saved_clock = Some(self.power.read_clock());
            if let Some(clock) = st.play_clock {
                self.power.set_clock(clock);
            }
            self.power.set_power_save(false);
        } else if was && !now {
            if let Some(clock) = st.saved_clock.take() {
                self.power.set_clock(clock);
            }
            self.power.set_power_save(true);
        }
    }

    /// Mark the session ready for playback and clear any previous run's leftovers.
    pub fn mark_loaded(&self) {
        let mut st = self.lock();
        st.pending = None;
        st.end_reason = None;
        self.apply(&mut st, PlaybackStatus::Loaded);
        drop(st);
        self.set_play_time(0.0);
        self.set_ins_kbps(0.0);
    }

    /// Queue a fast-review step when playing, paused or already reviewing.
    ///
    /// A step still pending is replaced by the new one. Returns `false` (and
    /// queues nothing) in any other state.
    pub fn request_review(&self, step_seconds: f64) -> bool {
        let mut st = self.lock();
        if !matches!(st.status, PlaybackStatus::Playing | PlaybackStatus::Paused)
            && !st.status.is_reviewing()
        {
            return false;
        }
        let to = if step_seconds >= 0.0 {
            PlaybackStatus::FastForward
        } else {
            PlaybackStatus::FastBackward
        };
        st.pending = Some(SeekIntent::Review(step_seconds));
        self.apply(&mut st, to);
        true
    }

    /// Queue an absolute seek for the next callback.
    pub fn request_seek(&self, seconds: f64) -> bool {
        let mut st = self.lock();
        if !st.status.is_active() {
            return false;
        }
        st.pending = Some(SeekIntent::Absolute(seconds));
        true
    }

    /// Take the pending intent together with the status it was queued under.
    ///
    /// Called once at the top of every callback invocation.
    pub fn take_pending(&self) -> (PlaybackStatus, Option<SeekIntent>) {
        let mut st = self.lock();
        (st.status, st.pending.take())
    }

    /// Drive the session to `Stopped`.
    ///
    /// Idempotent; the first recorded reason wins until the next load.
    pub fn finish(&self, reason: PlaybackEndReason) {
        let mut st = self.lock();
        st.pending = None;
        if st.end_reason.is_none() && st.status != PlaybackStatus::Unknown {
            st.end_reason = Some(reason);
        }
        self.apply(&mut st, PlaybackStatus::Stopped);
        drop(st);
        self.set_play_time(0.0);
        self.set_ins_kbps(0.0);
    }

    /// Play-time as the control path should report it.
    ///
    /// A queued absolute seek is reported as already applied.
    pub fn current_time(&self) -> f64 {
        let st = self.lock();
        if let Some(SeekIntent::Absolute(t)) = st.pending {
            return t;
        }
        drop(st);
        self.play_time()
    }

    /// Status and position to carry across a suspend.
    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status();
        SessionSnapshot {
            status,
            play_time: self.current_time(),
        }
    }

    pub fn play_time(&self) -> f64 {
        f64::from_bits(self.play_time_bits.load(Ordering::Relaxed))
    }

    pub fn set_play_time(&self, seconds: f64) {
        self.play_time_bits
            .store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn ins_kbps(&self) -> f64 {
        f64::from_bits(self.ins_kbps_bits.load(Ordering::Relaxed))
    }

    pub fn set_ins_kbps(&self, kbps: f64) {
        self.ins_kbps_bits.store(kbps.to_bits(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for SessionShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.lock();
        f.debug_struct("SessionShared")
            .field("status", &st.status)
            .field("pending", &st.pending)
            .field("end_reason", &st.end_reason)
            .field("play_time", &self.play_time())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::HostPower;

    fn shared() -> (Arc<HostPower>, SessionShared) {
        let power = Arc::new(HostPower::new(ClockPair::new(222, 111)));
        let s = SessionShared::new(power.clone());
        s.set_play_clock(ClockPair::new(49, 16));
        (power, s)
    }

    #[test]
    fn starts_unknown() {
        let (_, s) = shared();
        assert_eq!(s.status(), PlaybackStatus::Unknown);
        assert_eq!(s.current_time(), 0.0);
    }

    #[test]
    fn playing_edges_toggle_power() {
        let (power, s) = shared();
        s.mark_loaded();
        assert!(power.power_save());

        s.transition(PlaybackStatus::Playing);
        assert!(!power.power_save());
        assert_eq!(power.read_clock(), ClockPair::new(49, 16));

        s.transition(PlaybackStatus::Paused);
        assert!(power.power_save());
        assert_eq!(power.read_clock(), ClockPair::new(222, 111));
    }

    #[test]
    fn review_stays_in_rendering_power_state() {
        let (power, s) = shared();
        s.mark_loaded();
        s.transition(PlaybackStatus::Playing);
        assert!(s.request_review(10.0));
        assert_eq!(s.status(), PlaybackStatus::FastForward);
        assert!(!power.power_save());
        let (status, intent) = s.take_pending();
        assert_eq!(status, PlaybackStatus::FastForward);
        assert_eq!(intent, Some(SeekIntent::Review(10.0)));
        assert_eq!(s.take_pending().1, None);
    }

    #[test]
    fn review_requires_playing_or_paused() {
        let (_, s) = shared();
        s.mark_loaded();
        assert!(!s.request_review(5.0));
        s.transition(PlaybackStatus::Paused);
        assert!(s.request_review(-5.0));
        assert_eq!(s.status(), PlaybackStatus::FastBackward);
    }

    #[test]
    fn repeated_review_replaces_pending_step() {
        let (power, s) = shared();
        s.mark_loaded();
        s.transition(PlaybackStatus::Playing);
        assert!(s.request_review(5.0));
        assert!(s.request_review(5.0));
        assert!(s.request_review(-3.0));
        assert_eq!(s.status(), PlaybackStatus::FastBackward);
        assert!(!power.power_save());
        assert_eq!(s.take_pending().1, Some(SeekIntent::Review(-3.0)));
    }

    #[test]
    fn pending_absolute_seek_is_reported_immediately() {
        let (_, s) = shared();
        s.mark_loaded();
        s.set_play_time(3.0);
        assert!(s.request_seek(42.5));
        assert_eq!(s.current_time(), 42.5);
        let _ = s.take_pending();
        assert_eq!(s.current_time(), 3.0);
    }

    #[test]
    fn seek_rejected_without_session() {
        let (_, s) = shared();
        assert!(!s.request_seek(1.0));
    }

    #[test]
    fn finish_is_idempotent_and_keeps_first_reason() {
        let (power, s) = shared();
        s.mark_loaded();
        s.transition(PlaybackStatus::Playing);
        s.set_play_time(12.0);
        s.finish(PlaybackEndReason::Error);
        s.finish(PlaybackEndReason::Stopped);
        assert_eq!(s.status(), PlaybackStatus::Stopped);
        assert_eq!(s.end_reason(), Some(PlaybackEndReason::Error));
        assert_eq!(s.play_time(), 0.0);
        assert!(power.power_save());
    }

    #[test]
    fn transition_if_guards_state() {
        let (_, s) = shared();
        let res = s.transition_if(PlaybackStatus::is_active, PlaybackStatus::Playing);
        assert_eq!(res, Err(PlaybackStatus::Unknown));
        s.mark_loaded();
        let res = s.transition_if(PlaybackStatus::is_active, PlaybackStatus::Playing);
        assert_eq!(res, Ok(PlaybackStatus::Loaded));
    }

    #[test]
    fn snapshot_captures_status_and_time() {
        let (_, s) = shared();
        s.mark_loaded();
        s.transition(PlaybackStatus::Paused);
        s.set_play_time(7.25);
        let snap = s.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Paused);
        assert_eq!(snap.play_time, 7.25);
    }
}
