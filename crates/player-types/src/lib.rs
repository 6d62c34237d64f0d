use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Playback state of a driver session.
///
/// `Unknown` means no session exists. `Stopped` is terminal until the next load.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// No session has been loaded.
    #[default]
    Unknown,
    /// Metadata parsed, output not yet rendering audio.
    Loaded,
    /// Audio is actively rendering.
    Playing,
    /// Session alive, output renders silence.
    Paused,
    /// End of stream, error, or explicit end.
    Stopped,
    /// A forward fast-review step is pending.
    FastForward,
    /// A backward fast-review step is pending.
    FastBackward,
}

impl PlaybackStatus {
    /// `true` while a session exists and has not stopped.
    pub fn is_active(self) -> bool {
        !matches!(self, PlaybackStatus::Unknown | PlaybackStatus::Stopped)
    }

    /// `true` for the transient fast-review states.
    pub fn is_reviewing(self) -> bool {
        matches!(
            self,
            PlaybackStatus::FastForward | PlaybackStatus::FastBackward
        )
    }
}

/// Reason why a session reached `Stopped`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of stream (including a review step past the end).
    Eof,
    /// Decoder or I/O error interrupted playback.
    Error,
    /// Playback was explicitly ended by a command.
    Stopped,
}

bitflags! {
    /// Fields requested from `get_info`.
    ///
    /// Only requested fields are populated in the returned [`TrackInfo`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct InfoRequest: u32 {
        const TITLE = 1 << 0;
        const ALBUM = 1 << 1;
        const ARTIST = 1 << 2;
        const COMMENT = 1 << 3;
        const CUR_TIME = 1 << 4;
        const DURATION = 1 << 5;
        const CPU_FREQ = 1 << 6;
        const SAMPLE_FREQ = 1 << 7;
        const CHANNELS = 1 << 8;
        const AVG_KBPS = 1 << 9;
        const INS_KBPS = 1 << 10;
        const DECODER_NAME = 1 << 11;
        const ENCODE_MSG = 1 << 12;
    }
}

/// CPU/bus clock pair in MHz.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClockPair {
    /// CPU clock in MHz.
    pub cpu: u32,
    /// Bus clock in MHz.
    pub bus: u32,
}

impl ClockPair {
    pub const fn new(cpu: u32, bus: u32) -> Self {
        Self { cpu, bus }
    }
}

/// Battery telemetry reported by the power collaborator.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatteryState {
    /// Charge in percent, `None` when no battery is present.
    pub percent: Option<u8>,
    /// Remaining life in minutes, when known.
    pub lifetime_min: Option<u32>,
    /// Temperature in degrees Celsius, when known.
    pub temperature_c: Option<i32>,
    /// Voltage in millivolts, when known.
    pub voltage_mv: Option<u32>,
    /// `true` when running from external power.
    pub external_power: bool,
}

/// Metadata returned by `get_info`.
///
/// Every field is optional; a field is `Some` only when its bit was requested and the
/// driver could provide it. Callers must not read unrequested fields as zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackInfo {
    /// Track title from tags.
    pub title: Option<String>,
    /// Track album from tags.
    pub album: Option<String>,
    /// Track artist from tags (falls back to album artist).
    pub artist: Option<String>,
    /// Free-form comment.
    pub comment: Option<String>,
    /// Current play-time in seconds.
    pub cur_time: Option<f64>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    /// Clock pair the driver wants while rendering.
    pub cpu_freq: Option<ClockPair>,
    /// Source sample rate in Hz.
    pub sample_freq: Option<u32>,
    /// Source channel count.
    pub channels: Option<u16>,
    /// Average bitrate in kbps.
    pub avg_kbps: Option<f64>,
    /// Instantaneous bitrate in kbps.
    pub ins_kbps: Option<f64>,
    /// Decoder label, for example `atrac3`.
    pub decoder_name: Option<String>,
    /// Encoder message (empty when disabled).
    pub encode_msg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_activity_flags() {
        assert!(!PlaybackStatus::Unknown.is_active());
        assert!(!PlaybackStatus::Stopped.is_active());
        assert!(PlaybackStatus::Paused.is_active());
        assert!(PlaybackStatus::FastBackward.is_reviewing());
        assert!(!PlaybackStatus::Playing.is_reviewing());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&PlaybackStatus::FastForward).unwrap();
        assert_eq!(json, "\"fast_forward\"");
    }

    #[test]
    fn info_request_combines_bits() {
        let req = InfoRequest::TITLE | InfoRequest::CUR_TIME;
        assert!(req.contains(InfoRequest::TITLE));
        assert!(!req.contains(InfoRequest::DURATION));
        assert_eq!(InfoRequest::all().bits().count_ones(), 13);
    }
}
