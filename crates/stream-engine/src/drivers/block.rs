//! Block decompressor driver.
//!
//! Formats decoded in-process by a [`BlockDecompressor`]. Each decode unit asks the
//! decompressor for up to [`BLOCKS_PER_DECODE`] blocks.

use std::path::Path;

use player_types::ClockPair;

use crate::backend::BlockDecompressor;
use crate::config::EngineConfig;
use crate::decode::SymphoniaDecompressor;
use crate::drivers::{DecodeStream, DecodedUnit, OpenedTrack, StreamParams, TrackFormat};
use crate::error::{DriverError, Result};

/// Blocks requested from the decompressor per decode unit.
pub const BLOCKS_PER_DECODE: usize = 1024;

/// Clock pair while rendering.
pub const CLOCK: ClockPair = ClockPair::new(222, 111);

/// Formats handled through Symphonia.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockFormat;

impl TrackFormat for BlockFormat {
    fn name(&self) -> &'static str {
        "block"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["flac", "wav", "mp3", "ogg", "oga", "aif", "aiff", "m4a"]
    }

    fn open(&self, path: &Path, _config: &EngineConfig) -> Result<OpenedTrack> {
        let decompressor = SymphoniaDecompressor::open(path)?;
        open_block_stream(Box::new(decompressor))
    }
}

/// Wrap an opened decompressor into a track.
pub fn open_block_stream(decompressor: Box<dyn BlockDecompressor>) -> Result<OpenedTrack> {
    let info = decompressor.info().clone();
    if info.sample_rate == 0 || info.channels == 0 {
        return Err(DriverError::Load(format!(
            "unusable stream: {} Hz, {} channels",
            info.sample_rate, info.channels
        )));
    }
    let duration = info.total_blocks as f64 / f64::from(info.sample_rate);
    let avg_kbps = if duration > 0.0 {
        info.compressed_bytes as f64 * 8.0 / duration / 1000.0
    } else {
        0.0
    };
    let raw_bytes =
        info.total_blocks * u64::from(info.channels) * u64::from(info.bits_per_sample) / 8;
    let encode_msg = (raw_bytes > 0).then(|| {
        format!(
            "{} Ratio: {:.3}",
            info.codec,
            info.compressed_bytes as f64 / raw_bytes as f64
        )
    });

    let params = StreamParams {
        sample_rate: info.sample_rate,
        channels: info.channels,
        duration,
        unit_frames: BLOCKS_PER_DECODE,
        avg_kbps,
        clock: CLOCK,
        decoder_name: info.codec.to_lowercase(),
        encode_msg,
    };
    let stream = BlockStream {
        decompressor,
        sample_rate: info.sample_rate,
        total_blocks: info.total_blocks,
    };
    Ok(OpenedTrack {
        params,
        stream: Box::new(stream),
    })
}

struct BlockStream {
    decompressor: Box<dyn BlockDecompressor>,
    sample_rate: u32,
    total_blocks: u64,
}

impl DecodeStream for BlockStream {
    fn decode_unit(&mut self, out: &mut [i16]) -> Result<DecodedUnit> {
        let frames = self.decompressor.get_data(out, BLOCKS_PER_DECODE)?;
        Ok(DecodedUnit {
            frames,
            bitrate_bps: self
                .decompressor
                .current_bitrate_kbps()
                .map(|kbps| kbps * 1000.0),
        })
    }

    fn seek(&mut self, seconds: f64) -> Result<f64> {
        let block = (seconds * f64::from(self.sample_rate)).round() as u64;
        let block = if self.total_blocks > 0 {
            block.min(self.total_blocks)
        } else {
            block
        };
        self.decompressor.seek(block)?;
        Ok(block as f64 / f64::from(self.sample_rate))
    }
}
