#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use player_types::{BatteryState, ClockPair};
use stream_engine::backend::{CodecParams, DecodeRequest, HardwareDecoder};
use stream_engine::drivers::aa3::{DATA_START, DecoderFactory, HEADER_LEN, HEADER_OFFSET, MAGIC};
use stream_engine::power::PowerControl;
use stream_engine::tags::{TagInfo, TagReader};
use stream_engine::{BackendError, DriverContext, EngineConfig, ManualHarness};

/// Write an `.aa3` file with `units` payload units of `align` bytes plus `extra` stray bytes.
pub fn write_aa3(dir: &Path, name: &str, type_byte: u8, size_byte: u8, units: usize, extra: usize) -> PathBuf {
    let align = if type_byte == 0x20 {
        usize::from(size_byte) * 8
    } else {
        (usize::from(size_byte) + 1) * 8
    };
    let mut bytes = vec![0u8; DATA_START as usize];
    let header = HEADER_OFFSET as usize;
    bytes[header..header + 4].copy_from_slice(&MAGIC);
    bytes[header + 0x22] = type_byte;
    bytes[header + 0x23] = size_byte;
    assert_eq!(bytes.len(), header + HEADER_LEN);
    for unit in 0..units {
        bytes.extend(std::iter::repeat_n(unit as u8, align));
    }
    bytes.extend(std::iter::repeat_n(0xAAu8, extra));
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Write a 16-bit PCM WAV file whose samples are all `value`.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize, value: i16) {
    let data_len = (frames * usize::from(channels) * 2) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * u32::from(channels) * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames * usize::from(channels) {
        out.extend_from_slice(&value.to_le_bytes());
    }
    std::fs::write(path, out).unwrap();
}

/// Calls observed by [`RecordingCoprocessor`] instances from one factory.
#[derive(Default)]
pub struct CoprocessorLog {
    pub calls: Mutex<Vec<&'static str>>,
    pub decodes: AtomicUsize,
    pub last_params: Mutex<Option<CodecParams>>,
    pub last_input: Mutex<Vec<u8>>,
}

impl CoprocessorLog {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| **c == name).count()
    }
}

/// Coprocessor fake that renders a constant level and can fail on the n-th decode.
pub struct RecordingCoprocessor {
    log: Arc<CoprocessorLog>,
    level: i16,
    fail_on_decode: Option<usize>,
}

impl HardwareDecoder for RecordingCoprocessor {
    fn check_need_mem(&mut self, params: &CodecParams) -> Result<(), BackendError> {
        self.log.calls.lock().unwrap().push("check");
        *self.log.last_params.lock().unwrap() = Some(*params);
        Ok(())
    }

    fn reserve_scratch(&mut self, _params: &CodecParams) -> Result<(), BackendError> {
        self.log.calls.lock().unwrap().push("reserve");
        Ok(())
    }

    fn release_scratch(&mut self) {
        self.log.calls.lock().unwrap().push("release");
    }

    fn init(&mut self, _params: &CodecParams) -> Result<(), BackendError> {
        self.log.calls.lock().unwrap().push("init");
        Ok(())
    }

    fn decode(&mut self, request: DecodeRequest<'_>) -> Result<usize, BackendError> {
        let n = self.log.decodes.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_decode == Some(n) {
            return Err(BackendError::Fault(-7));
        }
        *self.log.last_input.lock().unwrap() = request.input.to_vec();
        request.output.fill(self.level);
        Ok(request.output.len() / 2)
    }
}

pub fn recording_factory(log: Arc<CoprocessorLog>, level: i16, fail_on_decode: Option<usize>) -> DecoderFactory {
    Arc::new(move || {
        Box::new(RecordingCoprocessor {
            log: log.clone(),
            level,
            fail_on_decode,
        }) as Box<dyn HardwareDecoder>
    })
}

/// Power collaborator that records every request.
pub struct RecordingPower {
    pub clock: Mutex<ClockPair>,
    pub events: Mutex<Vec<String>>,
}

impl RecordingPower {
    pub fn new() -> Self {
        Self {
            clock: Mutex::new(ClockPair::new(222, 111)),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl PowerControl for RecordingPower {
    fn set_clock(&self, clock: ClockPair) {
        *self.clock.lock().unwrap() = clock;
        self.events
            .lock()
            .unwrap()
            .push(format!("clock {}/{}", clock.cpu, clock.bus));
    }

    fn read_clock(&self) -> ClockPair {
        *self.clock.lock().unwrap()
    }

    fn read_battery(&self) -> BatteryState {
        BatteryState::default()
    }

    fn set_power_save(&self, enabled: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("power_save {enabled}"));
    }
}

/// Tag reader returning a fixed title.
pub struct FixedTags(pub &'static str);

impl TagReader for FixedTags {
    fn read(&self, _path: &Path) -> TagInfo {
        TagInfo {
            title: Some(self.0.to_string()),
            artist: Some("Artist".into()),
            ..TagInfo::default()
        }
    }
}

pub struct Rig {
    pub harness: Arc<ManualHarness>,
    pub power: Arc<RecordingPower>,
    pub ctx: DriverContext,
}

pub fn rig(config: EngineConfig) -> Rig {
    let harness = Arc::new(ManualHarness::new());
    let power = Arc::new(RecordingPower::new());
    let ctx = DriverContext {
        config,
        harness: harness.clone(),
        power: power.clone(),
        tags: Arc::new(FixedTags("Song")),
    };
    Rig {
        harness,
        power,
        ctx,
    }
}

/// Pump `frames` frames and report whether any sample was non-zero.
pub fn pump_audible(harness: &ManualHarness, frames: usize) -> bool {
    let (pcm, _) = harness.pump(frames).expect("no source attached");
    pcm.iter().any(|&s| s != 0)
}
