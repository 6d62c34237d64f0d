//! Decode backends.
//!
//! Two shapes of backend feed the decode-ahead buffer:
//! - a hardware coprocessor driven with an explicit descriptor per call ([`HardwareDecoder`])
//! - an in-process block decompressor object ([`BlockDecompressor`])
//!
//! Both turn compressed bytes into interleaved `i16` PCM one unit at a time.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BackendError, Result};

/// Sub-codec selected by the container header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecKind {
    /// Sub-codec A.
    Atrac3 {
        /// Input units carry one channel pair that must be duplicated.
        joint_stereo: bool,
        /// Coprocessor bitrate mode (4 or 6).
        bitrate_mode: u8,
    },
    /// Sub-codec B.
    Atrac3Plus {
        /// Codec flag bytes copied into every unit prefix.
        flags: [u8; 2],
    },
}

/// Descriptor handed to the coprocessor at setup time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecParams {
    pub kind: CodecKind,
    /// Compressed bytes per unit.
    pub frame_bytes: usize,
    /// PCM frames produced per unit.
    pub samples_per_frame: usize,
}

impl CodecParams {
    /// Bytes of input the coprocessor expects per call, prefix included.
    pub fn input_len(&self) -> usize {
        match self.kind {
            CodecKind::Atrac3 { joint_stereo, .. } => {
                if joint_stereo {
                    self.frame_bytes * 2
                } else {
                    self.frame_bytes
                }
            }
            CodecKind::Atrac3Plus { .. } => self.frame_bytes + ATRAC3PLUS_PREFIX_LEN,
        }
    }
}

/// Length of the header prepended to each ATRAC3plus unit.
pub const ATRAC3PLUS_PREFIX_LEN: usize = 8;

/// One decode call: compressed input in, interleaved stereo PCM out.
pub struct DecodeRequest<'a> {
    pub input: &'a [u8],
    pub output: &'a mut [i16],
}

/// Hardware decode coprocessor.
///
/// Setup runs in three steps (`check_need_mem`, `reserve_scratch`, `init`); every
/// successful `reserve_scratch` must be paired with `release_scratch`. Use
/// [`Coprocessor`] rather than calling these directly.
pub trait HardwareDecoder: Send {
    fn check_need_mem(&mut self, params: &CodecParams) -> std::result::Result<(), BackendError>;
    fn reserve_scratch(&mut self, params: &CodecParams) -> std::result::Result<(), BackendError>;
    fn release_scratch(&mut self);
    fn init(&mut self, params: &CodecParams) -> std::result::Result<(), BackendError>;
    /// Decode one unit; returns PCM frames written.
    fn decode(&mut self, request: DecodeRequest<'_>) -> std::result::Result<usize, BackendError>;
}

/// Initialized coprocessor session.
///
/// Releases the scratch reservation when dropped, including when setup fails partway.
pub struct Coprocessor {
    hw: Box<dyn HardwareDecoder>,
    scratch_reserved: bool,
}

impl Coprocessor {
    /// Run the setup sequence for `params`.
    pub fn open(hw: Box<dyn HardwareDecoder>, params: CodecParams) -> Result<Self> {
        let mut session = Self {
            hw,
            scratch_reserved: false,
        };
        session.hw.check_need_mem(&params)?;
        session.hw.reserve_scratch(&params)?;
        session.scratch_reserved = true;
        session.hw.init(&params)?;
        Ok(session)
    }

    pub fn decode(&mut self, input: &[u8], output: &mut [i16]) -> Result<usize> {
        Ok(self.hw.decode(DecodeRequest { input, output })?)
    }
}

impl Drop for Coprocessor {
    fn drop(&mut self) {
        if self.scratch_reserved {
            self.hw.release_scratch();
            self.scratch_reserved = false;
        }
    }
}

/// Stand-in coprocessor for hosts without one.
///
/// Accepts every descriptor and renders silence of the right length.
#[derive(Debug, Default)]
pub struct NullCoprocessor;

static NULL_COPROCESSOR_WARNED: AtomicBool = AtomicBool::new(false);

impl HardwareDecoder for NullCoprocessor {
    fn check_need_mem(&mut self, _params: &CodecParams) -> std::result::Result<(), BackendError> {
        Ok(())
    }

    fn reserve_scratch(&mut self, _params: &CodecParams) -> std::result::Result<(), BackendError> {
        Ok(())
    }

    fn release_scratch(&mut self) {}

    fn init(&mut self, params: &CodecParams) -> std::result::Result<(), BackendError> {
        if !NULL_COPROCESSOR_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!(kind = ?params.kind, "no decode coprocessor on this host; rendering silence");
        }
        Ok(())
    }

    fn decode(&mut self, request: DecodeRequest<'_>) -> std::result::Result<usize, BackendError> {
        request.output.fill(0);
        Ok(request.output.len() / 2)
    }
}

/// Stream facts reported by a block decompressor once opened.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockStreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Total blocks (PCM frames) in the stream, 0 when unknown.
    pub total_blocks: u64,
    pub bits_per_sample: u16,
    /// Compressed payload size in bytes.
    pub compressed_bytes: u64,
    /// Codec label, for example `FLAC`.
    pub codec: String,
}

/// In-process block decompressor.
pub trait BlockDecompressor: Send {
    fn info(&self) -> &BlockStreamInfo;
    /// Decode up to `max_blocks` blocks into interleaved `out`; 0 means end of stream.
    fn get_data(&mut self, out: &mut [i16], max_blocks: usize) -> Result<usize>;
    /// Position the stream at `block`.
    fn seek(&mut self, block: u64) -> Result<()>;
    /// Bitrate of the most recently decoded data, when known.
    fn current_bitrate_kbps(&self) -> Option<f64>;
}
