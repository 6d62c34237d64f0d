//! Symphonia-backed block decompressor.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - decode packets into interleaved `i16` samples on demand
//! - carry leftover frames between calls so callers can ask for any block count

use std::fs::File;
use std::io;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::backend::{BlockDecompressor, BlockStreamInfo};
use crate::error::{DriverError, Result};

/// Block decompressor over any container/codec Symphonia can probe.
pub struct SymphoniaDecompressor {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: BlockStreamInfo,
    /// Interleaved samples decoded but not yet handed out.
    pending: Vec<i16>,
    pending_pos: usize,
    /// Frames to discard after an accurate seek landed early.
    skip_frames: u64,
    sample_buf: Option<SampleBuffer<i16>>,
    sample_buf_frames: usize,
    last_bitrate_kbps: Option<f64>,
}

impl SymphoniaDecompressor {
    /// Probe and open `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let compressed_bytes = file.metadata()?.len();

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DriverError::Load(format!("probe {:?}: {e}", path)))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| DriverError::Load("no default audio track".into()))?;
        let track_id = track.id;
        let codec_params: CodecParameters = track.codec_params.clone();

        let channels = codec_params
            .channels
            .ok_or_else(|| DriverError::Load("unknown channel layout".into()))?
            .count();
        let sample_rate = codec_params
            .sample_rate
            .filter(|&r| r > 0)
            .ok_or_else(|| DriverError::Load("unknown sample rate".into()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DriverError::Load(format!("codec: {e}")))?;

        let info = BlockStreamInfo {
            sample_rate,
            channels: u16::try_from(channels)
                .map_err(|_| DriverError::Load(format!("{channels} channels")))?,
            total_blocks: codec_params.n_frames.unwrap_or(0),
            bits_per_sample: codec_params
                .bits_per_sample
                .or(codec_params.bits_per_coded_sample)
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or(16),
            compressed_bytes,
            codec: codec_name_from_params(&codec_params)
                .unwrap_or("unknown")
                .to_string(),
        };

        Ok(Self {
            format,
            decoder,
            track_id,
            info,
            pending: Vec::new(),
            pending_pos: 0,
            skip_frames: 0,
            sample_buf: None,
            sample_buf_frames: 0,
            last_bitrate_kbps: None,
        })
    }

    /// Decode the next packet of our track into `pending`.
    ///
    /// Returns `false` at end of stream. Corrupt packets are skipped.
    fn decode_next_packet(&mut self) -> Result<bool> {
        let channels = usize::from(self.info.channels);
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(DriverError::Decode(format!("read packet: {e}"))),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let packet_bytes = packet.buf().len();

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("skipping corrupt packet: {e}");
                    continue;
                }
                Err(e) => return Err(DriverError::Decode(e.to_string())),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            if self.sample_buf.is_none() || decoded.capacity() > self.sample_buf_frames {
                self.sample_buf_frames = decoded.capacity();
                self.sample_buf = Some(SampleBuffer::new(
                    self.sample_buf_frames as u64,
                    *decoded.spec(),
                ));
            }
            let Some(buf) = self.sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.extend_from_slice(buf.samples());
            self.pending_pos = 0;

            if self.skip_frames > 0 {
                let drop = self.skip_frames.min(frames as u64) as usize;
                self.pending_pos = drop * channels;
                self.skip_frames -= drop as u64;
            }

            let seconds = frames as f64 / f64::from(self.info.sample_rate);
            self.last_bitrate_kbps = Some(packet_bytes as f64 * 8.0 / seconds / 1000.0);
            return Ok(true);
        }
    }
}

impl BlockDecompressor for SymphoniaDecompressor {
    fn info(&self) -> &BlockStreamInfo {
        &self.info
    }

    fn get_data(&mut self, out: &mut [i16], max_blocks: usize) -> Result<usize> {
        let channels = usize::from(self.info.channels);
        let want = max_blocks.min(out.len() / channels);
        let mut written = 0;
        while written < want {
            let pending_frames = (self.pending.len() - self.pending_pos) / channels;
            if pending_frames > 0 {
                let n = pending_frames.min(want - written);
                let src = &self.pending[self.pending_pos..self.pending_pos + n * channels];
                out[written * channels..(written + n) * channels].copy_from_slice(src);
                self.pending_pos += n * channels;
                written += n;
                continue;
            }
            if !self.decode_next_packet()? {
                break;
            }
        }
        Ok(written)
    }

    fn seek(&mut self, block: u64) -> Result<()> {
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: block,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| DriverError::Decode(format!("seek to block {block}: {e}")))?;
        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.last_bitrate_kbps = None;
        Ok(())
    }

    fn current_bitrate_kbps(&self) -> Option<f64> {
        self.last_bitrate_kbps
    }
}

/// Best-effort codec label.
fn codec_name_from_params(params: &CodecParameters) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
pub(crate) mod test_wav {
    //! Minimal 16-bit PCM WAV writer for tests.

    use std::path::Path;

    /// Sample value written at `frame` on `channel`.
    pub fn sample_at(frame: usize, channel: usize) -> i16 {
        ((frame % 1000) as i16) * 2 + channel as i16
    }

    pub fn write(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let data_len = (frames * usize::from(channels) * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * u32::from(channels) * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for frame in 0..frames {
            for ch in 0..usize::from(channels) {
                out.extend_from_slice(&sample_at(frame, ch).to_le_bytes());
            }
        }
        std::fs::write(path, out).unwrap();
    }
}
