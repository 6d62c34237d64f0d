//! Player runtime.
//!
//! Wires the driver registry to an output harness and runs the subcommands.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::RecvTimeoutError;
use player_types::{InfoRequest, PlaybackStatus, TrackInfo};
use stream_engine::buffer::SINK_CHANNELS;
use stream_engine::output::{CpalHarness, list_output_devices};
use stream_engine::power::HostPower;
use stream_engine::tags::LoftyTagReader;
use stream_engine::{
    AudioHarness, CallbackOutcome, DriverContext, DriverRegistry, EngineConfig, ManualHarness,
    MusicDriver,
};

use crate::config::PlayerConfig;
use crate::control::{self, Control};

const STATUS_POLL: Duration = Duration::from_millis(200);
const RENDER_CHUNK_FRAMES: usize = 1024;

fn driver_context(engine: EngineConfig, harness: Arc<dyn AudioHarness>) -> DriverContext {
    DriverContext {
        config: engine,
        harness,
        power: Arc::new(HostPower::default()),
        tags: Arc::new(LoftyTagReader),
    }
}

/// Registry whose sessions are pulled by hand instead of by a device.
fn offline_registry(config: &PlayerConfig) -> (DriverRegistry, Arc<ManualHarness>) {
    let harness = Arc::new(ManualHarness::new());
    let ctx = driver_context(config.engine.clone(), harness.clone());
    (DriverRegistry::with_defaults(ctx, None), harness)
}

fn active(registry: &mut DriverRegistry) -> Result<&mut dyn MusicDriver> {
    registry
        .active_mut()
        .ok_or_else(|| anyhow!("no track loaded"))
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for name in list_output_devices(&host)? {
        println!("{name}");
    }
    Ok(())
}

/// Print the driver that would handle `path`.
pub fn probe(config: &PlayerConfig, path: &Path) -> Result<()> {
    let (registry, _) = offline_registry(config);
    match registry.probe(path) {
        Some(name) => println!("{}: {name}", path.display()),
        None => println!("{}: no driver", path.display()),
    }
    Ok(())
}

/// Load `path`, print every metadata field and end the session.
pub fn info(config: &PlayerConfig, path: &Path) -> Result<()> {
    let (mut registry, _) = offline_registry(config);
    let driver = registry
        .load(path, path)
        .with_context(|| format!("load {}", path.display()))?;
    let info = driver.get_info(InfoRequest::all())?;
    println!("driver: {}", driver.name());
    for line in format_info(&info) {
        println!("{line}");
    }
    registry.end_all();
    Ok(())
}

/// Play `path` on the output device, taking transport commands from stdin.
pub fn play(config: &PlayerConfig, path: &Path, seek: Option<f64>, paused: bool) -> Result<()> {
    let harness = Arc::new(CpalHarness::new(config.device.clone()));
    let ctx = driver_context(config.engine.clone(), harness);
    let mut registry = DriverRegistry::with_defaults(ctx, None);

    let driver = registry
        .load(path, path)
        .with_context(|| format!("load {}", path.display()))?;
    tracing::info!(driver = driver.name(), path = %path.display(), "loaded");
    if let Some(at) = seek {
        driver.seek(at)?;
    }
    if !paused {
        driver.play()?;
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    {
        let tx = tx.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            let _ = tx.send(Control::Quit);
        }) {
            tracing::warn!("ctrl-c handler not installed: {e}");
        }
    }
    control::spawn_stdin_reader(tx).context("spawn stdin reader")?;
    eprintln!("{}", control::HELP);

    let step = f64::from(config.engine.review_step_seconds);
    loop {
        match rx.recv_timeout(STATUS_POLL) {
            Ok(Control::Quit) => {
                tracing::info!("quit");
                break;
            }
            Ok(cmd) => {
                let driver = active(&mut registry)?;
                if let Err(e) = apply(driver, cmd, path, step) {
                    tracing::warn!("{cmd:?} failed: {e:#}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(STATUS_POLL),
        }

        if active(&mut registry)?.get_status() == PlaybackStatus::Stopped {
            tracing::info!("playback finished");
            break;
        }
    }

    registry.end_all();
    Ok(())
}

fn apply(driver: &mut dyn MusicDriver, cmd: Control, path: &Path, step: f64) -> Result<()> {
    match cmd {
        Control::TogglePause => match driver.get_status() {
            PlaybackStatus::Playing | PlaybackStatus::FastForward | PlaybackStatus::FastBackward => {
                driver.pause()?
            }
            _ => driver.play()?,
        },
        Control::Forward(secs) => driver.fast_forward(secs.unwrap_or(step))?,
        Control::Backward(secs) => driver.fast_backward(secs.unwrap_or(step))?,
        Control::Seek(at) => driver.seek(at)?,
        Control::SuspendResume => {
            driver.suspend()?;
            driver.resume(path, path)?;
        }
        Control::Info => {
            for line in format_info(&driver.get_info(InfoRequest::all())?) {
                println!("{line}");
            }
        }
        Control::Quit => {}
    }
    Ok(())
}

/// Play `path` through a [`ManualHarness`] and write interleaved stereo s16le to `out`.
///
/// Returns the number of frames written.
pub fn render(config: &PlayerConfig, path: &Path, out: &Path, seconds: Option<f64>) -> Result<u64> {
    let (mut registry, harness) = offline_registry(config);
    let driver = registry
        .load(path, path)
        .with_context(|| format!("load {}", path.display()))?;
    driver.play()?;
    let sample_rate = harness
        .sample_rate()
        .ok_or_else(|| anyhow!("output never started"))?;
    let limit = seconds.map(|s| (s.max(0.0) * f64::from(sample_rate)).round() as u64);

    let file = File::create(out).with_context(|| format!("create {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0u64;
    loop {
        let want = match limit {
            Some(limit) => (limit - written).min(RENDER_CHUNK_FRAMES as u64) as usize,
            None => RENDER_CHUNK_FRAMES,
        };
        if want == 0 {
            break;
        }
        let Some((pcm, outcome)) = harness.pump(want) else {
            break;
        };
        for sample in &pcm {
            writer.write_all(&sample.to_le_bytes())?;
        }
        written += (pcm.len() / SINK_CHANNELS) as u64;
        if outcome == CallbackOutcome::Stop {
            break;
        }
    }
    writer.flush()?;
    registry.end_all();

    tracing::info!(
        frames = written,
        seconds = written as f64 / f64::from(sample_rate),
        out = %out.display(),
        "render finished"
    );
    Ok(written)
}

/// Human-readable lines for the populated fields of `info`.
pub fn format_info(info: &TrackInfo) -> Vec<String> {
    let mut lines = Vec::new();
    let mut text = |label: &str, value: &Option<String>| {
        if let Some(v) = value {
            lines.push(format!("{label}: {v}"));
        }
    };
    text("title", &info.title);
    text("album", &info.album);
    text("artist", &info.artist);
    text("comment", &info.comment);
    text("decoder", &info.decoder_name);
    text("encoder", &info.encode_msg);
    if let Some(t) = info.cur_time {
        lines.push(format!("position: {t:.2}s"));
    }
    if let Some(d) = info.duration {
        lines.push(format!("duration: {d:.2}s"));
    }
    if let Some(clock) = info.cpu_freq {
        lines.push(format!("clock: {}/{} MHz", clock.cpu, clock.bus));
    }
    if let Some(rate) = info.sample_freq {
        lines.push(format!("sample rate: {rate} Hz"));
    }
    if let Some(ch) = info.channels {
        lines.push(format!("channels: {ch}"));
    }
    if let Some(kbps) = info.avg_kbps {
        lines.push(format!("avg bitrate: {kbps:.1} kbps"));
    }
    if let Some(kbps) = info.ins_kbps {
        lines.push(format!("bitrate: {kbps:.1} kbps"));
    }
    lines
}
