//! CPAL output harness.
//!
//! `cpal::Stream` is not `Send` on every host, so the stream lives on a dedicated
//! output thread and is controlled over a command channel. The real-time callback:
//! - pulls interleaved stereo `i16` from the attached [`FrameSource`]
//! - maps stereo onto the device channel count
//! - converts to the device sample format
//! - renders silence forever once the source returns [`CallbackOutcome::Stop`]

use std::sync::Mutex;
use std::thread::JoinHandle;

use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::buffer::SINK_CHANNELS;
use crate::error::{DriverError, Result};
use crate::harness::{AudioHarness, CallbackOutcome, FrameSource};

/// Largest fixed callback size requested from the device.
pub const MAX_CALLBACK_FRAMES: u32 = 4096;

enum OutputCmd {
    Start {
        sample_rate: u32,
        source: Box<dyn FrameSource>,
        reply: Sender<Result<()>>,
    },
    Stop {
        reply: Sender<()>,
    },
}

struct OutputThread {
    tx: Sender<OutputCmd>,
    handle: JoinHandle<()>,
}

/// Output harness backed by the host audio device.
pub struct CpalHarness {
    device: Option<String>,
    thread: Mutex<Option<OutputThread>>,
}

impl CpalHarness {
    /// Use the output device whose name contains `device` (case-insensitive), or the default.
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            thread: Mutex::new(None),
        }
    }

    fn sender(&self) -> Result<Sender<OutputCmd>> {
        let mut guard = self.thread.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(t) = guard.as_ref() {
            if !t.handle.is_finished() {
                return Ok(t.tx.clone());
            }
        }
        let (tx, rx) = unbounded();
        let needle = self.device.clone();
        let handle = std::thread::Builder::new()
            .name("pocketplay-output".into())
            .spawn(move || output_thread(needle, rx))
            .map_err(|e| DriverError::Output(format!("spawn output thread: {e}")))?;
        *guard = Some(OutputThread {
            tx: tx.clone(),
            handle,
        });
        Ok(tx)
    }
}

impl AudioHarness for CpalHarness {
    fn start(&self, sample_rate: u32, source: Box<dyn FrameSource>) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.sender()?
            .send(OutputCmd::Start {
                sample_rate,
                source,
                reply,
            })
            .map_err(|_| DriverError::Output("output thread exited".into()))?;
        rx.recv()
            .map_err(|_| DriverError::Output("output thread exited".into()))?
    }

    fn stop(&self) {
        let guard = self.thread.lock().unwrap_or_else(|p| p.into_inner());
        let Some(t) = guard.as_ref() else {
            return;
        };
        let (reply, rx) = bounded(1);
        if t.tx.send(OutputCmd::Stop { reply }).is_ok() {
            let _ = rx.recv();
        }
    }
}

impl Drop for CpalHarness {
    fn drop(&mut self) {
        let taken = self
            .thread
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(t) = taken {
            drop(t.tx);
            let _ = t.handle.join();
        }
    }
}

fn output_thread(needle: Option<String>, rx: Receiver<OutputCmd>) {
    let host = cpal::default_host();
    let mut stream: Option<cpal::Stream> = None;
    for cmd in rx {
        match cmd {
            OutputCmd::Start {
                sample_rate,
                source,
                reply,
            } => {
                // Dropping the old stream stops its callback before the new one starts.
                stream = None;
                let res = open_stream(&host, needle.as_deref(), sample_rate, source);
                let res = match res {
                    Ok(s) => {
                        stream = Some(s);
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!("output start failed: {e:#}");
                        Err(DriverError::Output(format!("{e:#}")))
                    }
                };
                let _ = reply.send(res);
            }
            OutputCmd::Stop { reply } => {
                stream = None;
                let _ = reply.send(());
            }
        }
    }
    drop(stream);
    tracing::debug!("output thread exiting");
}

fn open_stream(
    host: &cpal::Host,
    needle: Option<&str>,
    sample_rate: u32,
    source: Box<dyn FrameSource>,
) -> anyhow::Result<cpal::Stream> {
    let device = pick_device(host, needle)?;
    let supported = pick_stream_config(&device, sample_rate)?;
    let mut config = supported.config();
    if let Some(size) = callback_buffer_size(&supported) {
        config.buffer_size = size;
    }
    tracing::info!(
        device = %device.description().map(|d| d.name().to_string()).unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        format = ?supported.sample_format(),
        "output stream"
    );
    let stream = build_output_stream(&device, &config, supported.sample_format(), source)?;
    stream.play().context("start output stream")?;
    Ok(stream)
}

/// Build a CPAL output stream that pulls from `source`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    source: Box<dyn FrameSource>,
) -> anyhow::Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, source),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, source),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, source),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, source),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut source: Box<dyn FrameSource>,
) -> anyhow::Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels_out = usize::from(config.channels);
    let mut scratch: Vec<i16> = Vec::new();
    let mut stopped = false;

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if stopped || channels_out == 0 {
                data.fill(T::EQUILIBRIUM);
                return;
            }
            let frames = data.len() / channels_out;
            scratch.resize(frames * SINK_CHANNELS, 0);
            if source.fill(&mut scratch) == CallbackOutcome::Stop {
                stopped = true;
            }
            for (dst, src) in data
                .chunks_exact_mut(channels_out)
                .zip(scratch.chunks_exact(SINK_CHANNELS))
            {
                map_stereo_frame(dst, src);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Write one stereo frame into a device frame of any width.
///
/// Mono devices get the average; extra channels are silent.
fn map_stereo_frame<T>(dst: &mut [T], src: &[i16])
where
    T: cpal::Sample + cpal::FromSample<i16>,
{
    match dst.len() {
        1 => {
            let mixed = ((i32::from(src[0]) + i32::from(src[1])) / 2) as i16;
            dst[0] = T::from_sample(mixed);
        }
        _ => {
            for (ch, out) in dst.iter_mut().enumerate() {
                *out = match ch {
                    0 | 1 => T::from_sample(src[ch]),
                    _ => T::EQUILIBRIUM,
                };
            }
        }
    }
}

/// Output device whose name contains `needle` (case-insensitive), or the host default.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> anyhow::Result<cpal::Device> {
    let Some(needle) = needle.map(str::trim).filter(|n| !n.is_empty()) else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    };
    host.output_devices()
        .context("No output devices")?
        .find(|d| {
            d.description()
                .map(|desc| device_name_matches(&desc.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No output device matched: {needle}"))
}

/// Stream config running at exactly `sample_rate`, in the most native sample format available.
pub fn pick_stream_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> anyhow::Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    let offered: Vec<(u32, u32, cpal::SampleFormat)> = ranges
        .iter()
        .map(|r| (r.min_sample_rate(), r.max_sample_rate(), r.sample_format()))
        .collect();
    match best_range_for_rate(&offered, sample_rate) {
        Some(idx) => Ok(ranges[idx].clone().with_sample_rate(sample_rate)),
        None => Err(anyhow!(
            "device does not support {sample_rate} Hz (offers {})",
            offered
                .iter()
                .map(|(min, max, _)| format!("{min}-{max}"))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

/// Index of the `(min_rate, max_rate, format)` range covering `sample_rate` with the best format.
fn best_range_for_rate(offered: &[(u32, u32, cpal::SampleFormat)], sample_rate: u32) -> Option<usize> {
    offered
        .iter()
        .enumerate()
        .filter(|(_, (min, max, _))| (*min..=*max).contains(&sample_rate))
        .min_by_key(|(_, (_, _, format))| sample_format_rank(*format))
        .map(|(idx, _)| idx)
}

/// Callback size, capped at [`MAX_CALLBACK_FRAMES`] when the device allows it.
pub fn callback_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            MAX_CALLBACK_FRAMES.min(*max).max(*min),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Names of the host's output devices.
pub fn list_output_devices(host: &cpal::Host) -> anyhow::Result<Vec<String>> {
    let devices = host.output_devices().context("No output devices")?;
    let mut out = Vec::new();
    for d in devices {
        out.push(d.description()?.name().to_string());
    }
    Ok(out)
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn device_name_matches(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    use cpal::SampleFormat;

    #[test]
    fn device_name_match_ignores_case() {
        assert!(device_name_matches("USB DAC", "dac"));
        assert!(device_name_matches("usb dac", "USB"));
        assert!(!device_name_matches("USB DAC", "speaker"));
    }

    #[test]
    fn range_must_cover_requested_rate() {
        let offered = [(48_000, 96_000, SampleFormat::I16), (8_000, 32_000, SampleFormat::F32)];
        assert_eq!(best_range_for_rate(&offered, 44_100), None);
        assert_eq!(best_range_for_rate(&offered, 22_050), Some(1));
    }

    #[test]
    fn native_format_wins_among_covering_ranges() {
        let offered = [
            (8_000, 96_000, SampleFormat::F32),
            (44_100, 44_100, SampleFormat::I16),
            (8_000, 192_000, SampleFormat::U16),
        ];
        assert_eq!(best_range_for_rate(&offered, 44_100), Some(1));
        assert_eq!(best_range_for_rate(&offered, 48_000), Some(0));
    }

    #[test]
    fn stereo_frame_maps_to_device_layouts() {
        let mut mono = [0i16; 1];
        map_stereo_frame(&mut mono, &[100, 200]);
        assert_eq!(mono, [150]);

        let mut quad = [9i16; 4];
        map_stereo_frame(&mut quad, &[100, -100]);
        assert_eq!(quad, [100, -100, 0, 0]);

        let mut float = [0f32; 2];
        map_stereo_frame(&mut float, &[i16::MAX, 0]);
        assert!(float[0] > 0.99);
        assert_eq!(float[1], 0.0);
    }
}
