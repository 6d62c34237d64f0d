//! ATRAC3 / ATRAC3plus (`.aa3`, `.oma`) driver.
//!
//! The container is a fixed-offset header block followed by a payload of
//! equally sized codec units. Units are decoded by the hardware coprocessor.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use player_types::ClockPair;

use crate::backend::{
    ATRAC3PLUS_PREFIX_LEN, CodecKind, CodecParams, Coprocessor, HardwareDecoder, NullCoprocessor,
};
use crate::config::EngineConfig;
use crate::drivers::{DecodeStream, DecodedUnit, OpenedTrack, StreamParams, TrackFormat};
use crate::error::{DriverError, Result};
use crate::reader::TrackReader;

/// Offset of the header block.
pub const HEADER_OFFSET: u64 = 0x0C00;
/// Length of the header block.
pub const HEADER_LEN: usize = 0x60;
/// Offset of the first codec unit.
pub const DATA_START: u64 = 0x0C60;
/// Header signature.
pub const MAGIC: [u8; 4] = [0x45, 0x41, 0x33, 0x01];

const TYPE_OFFSET: usize = 0x22;
const SIZE_OFFSET: usize = 0x23;
const TYPE_ATRAC3: u8 = 0x20;
const TYPE_ATRAC3PLUS: u8 = 0x28;

const SAMPLE_RATE: u32 = 44_100;
const CHANNELS: u16 = 2;

/// Clock pair while rendering through the buffered reader.
pub const CLOCK_BUFFERED: ClockPair = ClockPair::new(49, 16);
/// Clock pair while rendering from raw reads.
pub const CLOCK_RAW: ClockPair = ClockPair::new(33, 16);

/// Builds a fresh coprocessor handle for every session.
pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn HardwareDecoder> + Send + Sync>;

/// Parsed header facts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aa3Header {
    pub codec: CodecParams,
    /// Payload bytes after [`DATA_START`].
    pub data_size: u64,
}

impl Aa3Header {
    pub fn duration(&self) -> f64 {
        self.data_size as f64 * self.codec.samples_per_frame as f64
            / self.codec.frame_bytes as f64
            / f64::from(SAMPLE_RATE)
    }

    pub fn decoder_name(&self) -> &'static str {
        match self.codec.kind {
            CodecKind::Atrac3 { .. } => "atrac3",
            CodecKind::Atrac3Plus { .. } => "atrac3plus",
        }
    }
}

/// Parse the header block and validate the payload size against the unit size.
pub fn parse_header(block: &[u8; HEADER_LEN], file_len: u64) -> Result<Aa3Header> {
    if block[..4] != MAGIC {
        return Err(DriverError::Load("bad aa3 signature".into()));
    }
    let type_byte = block[TYPE_OFFSET];
    let size_byte = usize::from(block[SIZE_OFFSET]);

    let codec = match type_byte {
        TYPE_ATRAC3 => {
            let align = size_byte * 8;
            CodecParams {
                kind: CodecKind::Atrac3 {
                    joint_stereo: align == 0xC0,
                    bitrate_mode: if align == 0x130 { 6 } else { 4 },
                },
                frame_bytes: align,
                samples_per_frame: 1024,
            }
        }
        TYPE_ATRAC3PLUS => CodecParams {
            kind: CodecKind::Atrac3Plus {
                flags: [block[TYPE_OFFSET], block[SIZE_OFFSET]],
            },
            frame_bytes: (size_byte + 1) * 8,
            samples_per_frame: 2048,
        },
        other => {
            return Err(DriverError::Load(format!("unknown aa3 codec type {other:#04x}")));
        }
    };

    if codec.frame_bytes == 0 {
        return Err(DriverError::Load("aa3 unit size is zero".into()));
    }
    let data_size = file_len.saturating_sub(DATA_START);
    if data_size == 0 || data_size % codec.frame_bytes as u64 != 0 {
        return Err(DriverError::Load(format!(
            "payload of {data_size} bytes is not a multiple of unit size {:#x}",
            codec.frame_bytes
        )));
    }
    Ok(Aa3Header { codec, data_size })
}

/// `.aa3` / `.oma` format.
pub struct Aa3Format {
    decoders: DecoderFactory,
}

impl Aa3Format {
    pub fn new(decoders: DecoderFactory) -> Self {
        Self { decoders }
    }

    /// Format backed by [`NullCoprocessor`].
    pub fn without_coprocessor() -> Self {
        Self::new(Arc::new(|| Box::new(NullCoprocessor) as Box<dyn HardwareDecoder>))
    }
}

impl TrackFormat for Aa3Format {
    fn name(&self) -> &'static str {
        "aa3"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["aa3", "oma"]
    }

    fn open(&self, path: &Path, config: &EngineConfig) -> Result<OpenedTrack> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut block = [0u8; HEADER_LEN];
        file.seek(SeekFrom::Start(HEADER_OFFSET))?;
        file.read_exact(&mut block).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => DriverError::Load("aa3 header truncated".into()),
            _ => DriverError::Io(e),
        })?;
        let header = parse_header(&block, file_len)?;

        let coprocessor = Coprocessor::open((self.decoders)(), header.codec)?;

        file.seek(SeekFrom::Start(DATA_START))?;
        let reader = TrackReader::new(file, config.use_buffered_io, config.io_buffer_size())?;
        let clock = if reader.is_buffered() {
            CLOCK_BUFFERED
        } else {
            CLOCK_RAW
        };

        let duration = header.duration();
        let params = StreamParams {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            duration,
            unit_frames: header.codec.samples_per_frame,
            avg_kbps: header.data_size as f64 * 8.0 / duration / 1000.0,
            clock,
            decoder_name: header.decoder_name().to_string(),
            encode_msg: None,
        };
        let stream = Aa3Stream {
            input: vec![0; header.codec.input_len()],
            header,
            reader,
            coprocessor,
        };
        Ok(OpenedTrack {
            params,
            stream: Box::new(stream),
        })
    }
}

struct Aa3Stream {
    header: Aa3Header,
    reader: TrackReader,
    coprocessor: Coprocessor,
    /// Coprocessor input for one unit, prefix or duplicate included.
    input: Vec<u8>,
}

impl Aa3Stream {
    /// Read the next unit into `input`; `false` at a clean end of payload.
    fn read_unit(&mut self) -> Result<bool> {
        let align = self.header.codec.frame_bytes;
        self.input.fill(0);
        let unit = match self.header.codec.kind {
            CodecKind::Atrac3 { .. } => 0..align,
            CodecKind::Atrac3Plus { flags } => {
                self.input[..4].copy_from_slice(&[0x0F, 0xD0, flags[0], flags[1]]);
                ATRAC3PLUS_PREFIX_LEN..ATRAC3PLUS_PREFIX_LEN + align
            }
        };
        let got = self.reader.read_unit(&mut self.input[unit])?;
        if got == 0 {
            return Ok(false);
        }
        if got != align {
            return Err(DriverError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short unit read: {got} of {align} bytes"),
            )));
        }
        if let CodecKind::Atrac3 {
            joint_stereo: true, ..
        } = self.header.codec.kind
        {
            self.input.copy_within(0..align, align);
        }
        Ok(true)
    }
}

impl DecodeStream for Aa3Stream {
    fn decode_unit(&mut self, out: &mut [i16]) -> Result<DecodedUnit> {
        if !self.read_unit()? {
            return Ok(DecodedUnit::default());
        }
        let spf = self.header.codec.samples_per_frame;
        let pcm = &mut out[..spf * usize::from(CHANNELS)];
        pcm.fill(0);
        let frames = self.coprocessor.decode(&self.input, pcm)?.min(spf);
        Ok(DecodedUnit {
            frames,
            bitrate_bps: Some(
                self.header.codec.frame_bytes as f64 * 8.0 * f64::from(SAMPLE_RATE) / spf as f64,
            ),
        })
    }

    fn seek(&mut self, seconds: f64) -> Result<f64> {
        let spf = self.header.codec.samples_per_frame;
        let frame_index = (seconds * f64::from(SAMPLE_RATE) / spf as f64).floor() as u64;
        let pos = DATA_START + frame_index * self.header.codec.frame_bytes as u64;
        tracing::debug!(frame_index, pos, "aa3 seek");
        self.reader.seek(SeekFrom::Start(pos))?;
        Ok(frame_index as f64 * spf as f64 / f64::from(SAMPLE_RATE))
    }
}
