//! Format drivers.
//!
//! Every driver exposes the same operation table ([`MusicDriver`]). The shared
//! transport logic lives in [`StreamingDriver`]; a format only supplies probing
//! and an `open` that yields stream parameters plus a [`DecodeStream`].
//!
//! Paths come in pairs: the short path is what gets opened, the long path is the
//! user-facing name used for tag lookup.

pub mod aa3;
pub mod block;
mod engine;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use player_types::{ClockPair, InfoRequest, PlaybackEndReason, PlaybackStatus, TrackInfo};

use crate::config::EngineConfig;
use crate::error::{DriverError, Result};
use crate::harness::AudioHarness;
use crate::power::PowerControl;
use crate::status::{SessionShared, SessionSnapshot};
use crate::tags::{TagInfo, TagReader};

pub use engine::SessionEngine;

/// Operation table shared by all format drivers.
///
/// Only `probe`, `load` and `end` are mandatory; the rest report
/// [`DriverError::Unsupported`] unless a driver provides them.
pub trait MusicDriver: Send {
    fn name(&self) -> &'static str;

    /// Cheap, side-effect-free format check.
    fn probe(&self, path: &Path) -> bool;

    /// Open `short_path` and start a session, ending any previous one first.
    fn load(&mut self, short_path: &Path, long_path: &Path) -> Result<()>;

    fn play(&mut self) -> Result<()> {
        Err(DriverError::Unsupported("play"))
    }

    fn pause(&mut self) -> Result<()> {
        Err(DriverError::Unsupported("pause"))
    }

    fn fast_forward(&mut self, _seconds: f64) -> Result<()> {
        Err(DriverError::Unsupported("fast_forward"))
    }

    fn fast_backward(&mut self, _seconds: f64) -> Result<()> {
        Err(DriverError::Unsupported("fast_backward"))
    }

    /// Jump to an absolute position.
    fn seek(&mut self, _seconds: f64) -> Result<()> {
        Err(DriverError::Unsupported("seek"))
    }

    fn get_status(&self) -> PlaybackStatus {
        PlaybackStatus::Unknown
    }

    /// Populate the fields selected by `request`; other fields stay `None`.
    fn get_info(&self, _request: InfoRequest) -> Result<TrackInfo> {
        Err(DriverError::Unsupported("get_info"))
    }

    fn suspend(&mut self) -> Result<()> {
        Err(DriverError::Unsupported("suspend"))
    }

    fn resume(&mut self, _short_path: &Path, _long_path: &Path) -> Result<()> {
        Err(DriverError::Unsupported("resume"))
    }

    /// Tear the session down. Safe to call repeatedly.
    fn end(&mut self) -> Result<()>;

    fn set_option(&mut self, _key: &str, _values: &str) -> Result<()> {
        Err(DriverError::Unsupported("set_option"))
    }
}

/// Fixed facts about an opened stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamParams {
    pub sample_rate: u32,
    /// Channels produced by the decode stream (the sink is always stereo).
    pub channels: u16,
    /// Track length in seconds, 0 when unknown.
    pub duration: f64,
    /// Largest number of frames one decode unit can produce.
    pub unit_frames: usize,
    pub avg_kbps: f64,
    /// Clock pair requested while audio renders.
    pub clock: ClockPair,
    pub decoder_name: String,
    /// Encoder message, shown only when `show_encoder_msg` is on.
    pub encode_msg: Option<String>,
}

/// Result of decoding one unit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DecodedUnit {
    /// PCM frames written; 0 means end of stream.
    pub frames: usize,
    /// Bitrate of the compressed data behind this unit.
    pub bitrate_bps: Option<f64>,
}

/// Callback-side view of an open track.
pub trait DecodeStream: Send {
    /// Run the backend once, writing interleaved PCM into `out`.
    fn decode_unit(&mut self, out: &mut [i16]) -> Result<DecodedUnit>;

    /// Reposition to `seconds` (already within `[0, duration)`).
    ///
    /// Returns the position actually reached.
    fn seek(&mut self, seconds: f64) -> Result<f64>;
}

/// A format's answer to `open`.
pub struct OpenedTrack {
    pub params: StreamParams,
    pub stream: Box<dyn DecodeStream>,
}

/// Format-specific half of a driver.
pub trait TrackFormat: Send {
    fn name(&self) -> &'static str;

    /// Lower-case extensions this format claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Parse headers, set up the backend and position at the start of audio.
    fn open(&self, path: &Path, config: &EngineConfig) -> Result<OpenedTrack>;
}

/// Does `path` carry one of `extensions` (case-insensitive)?
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|c| c.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

struct LoadedTrack {
    short_path: PathBuf,
    params: StreamParams,
    tags: TagInfo,
}

/// Collaborators every driver talks to.
#[derive(Clone)]
pub struct DriverContext {
    pub config: EngineConfig,
    pub harness: Arc<dyn AudioHarness>,
    pub power: Arc<dyn PowerControl>,
    pub tags: Arc<dyn TagReader>,
}

/// Driver built from a [`TrackFormat`] plus the shared transport logic.
pub struct StreamingDriver<F> {
    format: F,
    ctx: DriverContext,
    shared: Arc<SessionShared>,
    session: Option<LoadedTrack>,
    suspended: Option<SessionSnapshot>,
}

impl<F: TrackFormat> StreamingDriver<F> {
    pub fn new(format: F, ctx: DriverContext) -> Self {
        let shared = SessionShared::shared(ctx.power.clone());
        Self {
            format,
            ctx,
            shared,
            session: None,
            suspended: None,
        }
    }

    /// Shared session state, for observers that outlive a single call.
    pub fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    fn require_session(&self) -> Result<&LoadedTrack> {
        self.session.as_ref().ok_or(DriverError::NoSession)
    }

    /// Open the track, optionally restore a snapshot, and attach the engine to the harness.
    fn start_session(
        &mut self,
        short_path: &Path,
        long_path: &Path,
        restore: Option<SessionSnapshot>,
    ) -> Result<()> {
        let OpenedTrack { params, mut stream } = self.format.open(short_path, &self.ctx.config)?;

        let mut start_time = 0.0;
        if let Some(snap) = restore {
            if snap.play_time > 0.0 && (params.duration <= 0.0 || snap.play_time < params.duration)
            {
                start_time = stream.seek(snap.play_time)?;
            }
        }

        let tags = self.ctx.tags.read(long_path);

        self.shared.set_play_clock(params.clock);
        self.shared.mark_loaded();
        self.shared.set_play_time(start_time);
        if let Some(snap) = restore {
            self.shared.transition(restored_status(snap.status));
        }

        let engine = SessionEngine::new(self.shared.clone(), stream, &params, &self.ctx.config);
        if let Err(e) = self.ctx.harness.start(params.sample_rate, Box::new(engine)) {
            self.shared.finish(PlaybackEndReason::Error);
            return Err(e);
        }

        tracing::info!(
            driver = self.format.name(),
            path = %short_path.display(),
            duration_s = params.duration,
            sample_rate = params.sample_rate,
            decoder = %params.decoder_name,
            start_s = start_time,
            "track loaded"
        );
        self.session = Some(LoadedTrack {
            short_path: short_path.to_path_buf(),
            params,
            tags,
        });
        Ok(())
    }
}

/// Status a resumed session comes back in.
///
/// A snapshot taken mid-review resumes as plain playback; a finished one as loaded.
fn restored_status(status: PlaybackStatus) -> PlaybackStatus {
    match status {
        PlaybackStatus::Playing | PlaybackStatus::FastForward | PlaybackStatus::FastBackward => {
            PlaybackStatus::Playing
        }
        PlaybackStatus::Paused => PlaybackStatus::Paused,
        _ => PlaybackStatus::Loaded,
    }
}

impl<F: TrackFormat> MusicDriver for StreamingDriver<F> {
    fn name(&self) -> &'static str {
        self.format.name()
    }

    fn probe(&self, path: &Path) -> bool {
        has_extension(path, self.format.extensions())
    }

    fn load(&mut self, short_path: &Path, long_path: &Path) -> Result<()> {
        if self.session.is_some() {
            self.end()?;
        }
        self.suspended = None;
        self.start_session(short_path, long_path, None)
    }

    fn play(&mut self) -> Result<()> {
        self.require_session()?;
        self.shared
            .transition_if(
                |s| matches!(s, PlaybackStatus::Loaded | PlaybackStatus::Paused | PlaybackStatus::Playing),
                PlaybackStatus::Playing,
            )
            .map(|_| ())
            .map_err(DriverError::InvalidState)
    }

    fn pause(&mut self) -> Result<()> {
        self.require_session()?;
        self.shared
            .transition_if(
                |s| s.is_active() && s != PlaybackStatus::Loaded,
                PlaybackStatus::Paused,
            )
            .map(|_| ())
            .map_err(DriverError::InvalidState)
    }

    fn fast_forward(&mut self, seconds: f64) -> Result<()> {
        self.require_session()?;
        if self.shared.request_review(seconds.abs()) {
            Ok(())
        } else {
            Err(DriverError::InvalidState(self.shared.status()))
        }
    }

    fn fast_backward(&mut self, seconds: f64) -> Result<()> {
        self.require_session()?;
        if self.shared.request_review(-seconds.abs()) {
            Ok(())
        } else {
            Err(DriverError::InvalidState(self.shared.status()))
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.require_session()?;
        if !seconds.is_finite() {
            return Err(DriverError::InvalidOption(format!("seek target {seconds}")));
        }
        if self.shared.request_seek(seconds) {
            Ok(())
        } else {
            Err(DriverError::InvalidState(self.shared.status()))
        }
    }

    fn get_status(&self) -> PlaybackStatus {
        self.shared.status()
    }

    fn get_info(&self, request: InfoRequest) -> Result<TrackInfo> {
        let track = self.require_session()?;
        let params = &track.params;
        let mut info = TrackInfo::default();

        if request.contains(InfoRequest::TITLE) {
            info.title = track.tags.title.clone();
        }
        if request.contains(InfoRequest::ALBUM) {
            info.album = track.tags.album.clone();
        }
        if request.contains(InfoRequest::ARTIST) {
            info.artist = track.tags.artist.clone();
        }
        if request.contains(InfoRequest::COMMENT) {
            info.comment = track.tags.comment.clone();
        }
        if request.contains(InfoRequest::CUR_TIME) {
            info.cur_time = Some(self.shared.current_time());
        }
        if request.contains(InfoRequest::DURATION) {
            info.duration = Some(params.duration);
        }
        if request.contains(InfoRequest::CPU_FREQ) {
            info.cpu_freq = Some(params.clock);
        }
        if request.contains(InfoRequest::SAMPLE_FREQ) {
            info.sample_freq = Some(params.sample_rate);
        }
        if request.contains(InfoRequest::CHANNELS) {
            info.channels = Some(params.channels);
        }
        if request.contains(InfoRequest::AVG_KBPS) {
            info.avg_kbps = Some(params.avg_kbps);
        }
        if request.contains(InfoRequest::INS_KBPS) {
            info.ins_kbps = Some(self.shared.ins_kbps());
        }
        if request.contains(InfoRequest::DECODER_NAME) {
            info.decoder_name = Some(params.decoder_name.clone());
        }
        if request.contains(InfoRequest::ENCODE_MSG) {
            info.encode_msg = Some(if self.ctx.config.show_encoder_msg {
                params.encode_msg.clone().unwrap_or_default()
            } else {
                String::new()
            });
        }
        Ok(info)
    }

    fn suspend(&mut self) -> Result<()> {
        self.require_session()?;
        let snapshot = self.shared.snapshot();
        tracing::debug!(status = ?snapshot.status, play_time = snapshot.play_time, "suspend");
        self.end()?;
        self.suspended = Some(snapshot);
        Ok(())
    }

    fn resume(&mut self, short_path: &Path, long_path: &Path) -> Result<()> {
        if self.session.is_some() {
            self.end()?;
        }
        let snapshot = self.suspended.take();
        match self.start_session(short_path, long_path, snapshot) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(path = %short_path.display(), "resume failed: {e}");
                self.shared.transition(PlaybackStatus::Stopped);
                Err(e)
            }
        }
    }

    fn end(&mut self) -> Result<()> {
        if let Some(track) = self.session.take() {
            self.ctx.harness.stop();
            tracing::debug!(path = %track.short_path.display(), "session ended");
        }
        self.shared.finish(PlaybackEndReason::Stopped);
        Ok(())
    }

    fn set_option(&mut self, key: &str, values: &str) -> Result<()> {
        tracing::debug!(driver = self.format.name(), key, values, "set option");
        self.ctx.config.apply_options(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_match_is_case_insensitive() {
        let exts = &["aa3", "oma"];
        assert!(has_extension(Path::new("/music/Track.AA3"), exts));
        assert!(has_extension(Path::new("song.oma"), exts));
        assert!(!has_extension(Path::new("song.mp3"), exts));
        assert!(!has_extension(Path::new("aa3"), exts));
    }

    #[test]
    fn review_snapshots_resume_as_playing() {
        assert_eq!(restored_status(PlaybackStatus::FastForward), PlaybackStatus::Playing);
        assert_eq!(restored_status(PlaybackStatus::Paused), PlaybackStatus::Paused);
        assert_eq!(restored_status(PlaybackStatus::Stopped), PlaybackStatus::Loaded);
    }
}
